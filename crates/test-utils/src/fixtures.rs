//! Common test fixtures.
//!
//! [`FieldBuilder`] assembles small fields axis by axis so tests can state
//! only what they care about.

use cf_model::{Data, Field, ModelResult, PropertyValue, Units, Variable};

/// Reference time units used throughout the test suite.
pub const TIME_UNITS: &str = "days since 2000-01-01";

/// Standard name of the fixture data variable.
pub const AIR_TEMPERATURE: &str = "air_temperature";

struct AxisSpec {
    identity: String,
    values: Vec<f64>,
    bounds: Option<Vec<f64>>,
    units: Units,
}

struct AuxSpec {
    identity: String,
    values: Vec<f64>,
    units: Units,
    axis: usize,
}

/// Builder for a field with one dimension coordinate per axis.
///
/// Axes are created in the order they are added and the data spans all of
/// them in that order.
///
/// # Example
///
/// ```
/// use test_utils::{FieldBuilder, TIME_UNITS};
///
/// let field = FieldBuilder::new("air_temperature", "K")
///     .dim("time", vec![0.0, 1.0], TIME_UNITS)
///     .dim("latitude", vec![-45.0, 45.0], "degrees_north")
///     .build()
///     .unwrap();
/// assert_eq!(field.data.as_ref().unwrap().shape(), &[2, 2]);
/// ```
pub struct FieldBuilder {
    standard_name: String,
    units: Units,
    axes: Vec<AxisSpec>,
    aux: Vec<AuxSpec>,
    properties: Vec<(String, PropertyValue)>,
    attributes: Vec<(String, String)>,
    data: Option<Vec<f64>>,
}

impl FieldBuilder {
    pub fn new(standard_name: &str, units: &str) -> Self {
        Self {
            standard_name: standard_name.to_string(),
            units: Units::new(units),
            axes: Vec::new(),
            aux: Vec::new(),
            properties: Vec::new(),
            attributes: Vec::new(),
            data: None,
        }
    }

    /// Add an axis with a dimension coordinate named `identity`.
    pub fn dim(self, identity: &str, values: Vec<f64>, units: &str) -> Self {
        self.dim_units(identity, values, Units::new(units))
    }

    /// Add an axis whose coordinate carries explicit units, e.g. with a
    /// calendar.
    pub fn dim_units(mut self, identity: &str, values: Vec<f64>, units: Units) -> Self {
        self.axes.push(AxisSpec {
            identity: identity.to_string(),
            values,
            bounds: None,
            units,
        });
        self
    }

    /// Add an axis whose coordinate has flattened `(n, 2)` bounds.
    pub fn dim_with_bounds(mut self, identity: &str, values: Vec<f64>, bounds: Vec<f64>, units: &str) -> Self {
        self.axes.push(AxisSpec {
            identity: identity.to_string(),
            values,
            bounds: Some(bounds),
            units: Units::new(units),
        });
        self
    }

    /// Add a 1-d auxiliary coordinate spanning the `axis`-th added axis.
    pub fn aux(mut self, identity: &str, values: Vec<f64>, units: &str, axis: usize) -> Self {
        self.aux.push(AuxSpec {
            identity: identity.to_string(),
            values,
            units: Units::new(units),
            axis,
        });
        self
    }

    pub fn property(mut self, name: &str, value: impl Into<PropertyValue>) -> Self {
        self.properties.push((name.to_string(), value.into()));
        self
    }

    pub fn attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.push((name.to_string(), value.to_string()));
        self
    }

    /// Explicit data values; defaults to [`crate::grid_values`].
    pub fn data(mut self, values: Vec<f64>) -> Self {
        self.data = Some(values);
        self
    }

    pub fn build(self) -> ModelResult<Field> {
        let mut field = Field::new(&self.standard_name, self.units.clone());
        for (name, value) in self.properties {
            field.set_property(&name, value);
        }
        for (name, value) in &self.attributes {
            field = field.with_attribute(name, value);
        }

        let mut keys = Vec::with_capacity(self.axes.len());
        let mut shape = Vec::with_capacity(self.axes.len());
        for spec in self.axes {
            let n = spec.values.len();
            let key = field.add_axis(n);
            let mut coordinate =
                Variable::new(Data::from_vec(spec.values, spec.units.clone())).with_standard_name(&spec.identity);
            if let Some(bounds) = spec.bounds {
                coordinate = coordinate.with_bounds(Data::from_shape_vec(&[n, 2], bounds, spec.units)?);
            }
            field.set_dimension_coordinate(&key, coordinate)?;
            keys.push(key);
            shape.push(n);
        }

        for spec in self.aux {
            let Some(axis) = keys.get(spec.axis) else {
                continue;
            };
            let coordinate = Variable::new(Data::from_vec(spec.values, spec.units)).with_id(&spec.identity);
            field.add_auxiliary_coordinate(coordinate, &[axis.as_str()])?;
        }

        let values = self.data.unwrap_or_else(|| crate::grid_values(&shape));
        let axes: Vec<&str> = keys.iter().map(String::as_str).collect();
        field.set_data(Data::from_shape_vec(&shape, values, self.units)?, &axes)?;
        Ok(field)
    }
}

/// A monthly-style time slab: `n` daily cells starting at `start`, with
/// contiguous bounds, over a fixed two-point latitude axis.
pub fn time_slab(start: f64, n: usize) -> ModelResult<Field> {
    let times = crate::sequence(start + 0.5, 1.0, n);
    let bounds = crate::cell_bounds(&times);
    FieldBuilder::new(AIR_TEMPERATURE, "K")
        .dim_with_bounds("time", times, bounds, TIME_UNITS)
        .dim("latitude", vec![-45.0, 45.0], "degrees_north")
        .property("Conventions", "CF-1.6")
        .build()
}

/// A field on a single time with the given latitude and longitude values.
pub fn lat_lon_tile(lats: Vec<f64>, lons: Vec<f64>) -> ModelResult<Field> {
    FieldBuilder::new(AIR_TEMPERATURE, "K")
        .dim("time", vec![0.0], TIME_UNITS)
        .dim("latitude", lats, "degrees_north")
        .dim("longitude", lons, "degrees_east")
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_shape_and_axes() {
        let field = FieldBuilder::new("air_temperature", "K")
            .dim("time", vec![0.0, 1.0, 2.0], TIME_UNITS)
            .dim("longitude", vec![0.0, 90.0], "degrees_east")
            .build()
            .unwrap();
        assert_eq!(field.axes.len(), 2);
        assert_eq!(field.dimension_coordinates.len(), 2);
        assert_eq!(field.data.as_ref().unwrap().shape(), &[3, 2]);
    }

    #[test]
    fn test_builder_properties_and_aux() {
        let field = FieldBuilder::new("air_temperature", "K")
            .dim("time", vec![0.0, 1.0], TIME_UNITS)
            .aux("forecast_period", vec![6.0, 12.0], "hours", 0)
            .property("long_name", "Surface temperature")
            .attribute("source", "model")
            .build()
            .unwrap();
        assert_eq!(field.property_text("long_name"), Some("Surface temperature"));
        assert_eq!(field.auxiliary_coordinates.len(), 1);
        assert_eq!(field.attributes.get("source").map(String::as_str), Some("model"));
    }

    #[test]
    fn test_builder_rejects_bad_bounds() {
        let result = FieldBuilder::new("air_temperature", "K")
            .dim_with_bounds("time", vec![0.5], vec![0.0, 1.0, 2.0], TIME_UNITS)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_time_slab() {
        let field = time_slab(31.0, 3).unwrap();
        assert_eq!(field.data.as_ref().unwrap().shape(), &[3, 2]);
    }
}
