//! Fields: a data variable and the constructs describing its domain.

use std::collections::BTreeMap;

use crate::cell_methods::CellMethods;
use crate::coordref::CoordinateReference;
use crate::data::Data;
use crate::error::{ModelError, ModelResult};
use crate::property::{Properties, PropertyValue};
use crate::units::Units;
use crate::variable::Variable;

/// A domain axis and, when read from netCDF, its dimension name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DomainAxis {
    pub size: usize,
    pub ncdim: Option<String>,
}

/// A variable spanning an ordered list of domain axis keys.
#[derive(Debug, Clone, PartialEq)]
pub struct Construct {
    pub variable: Variable,
    pub axes: Vec<String>,
}

impl Construct {
    pub fn position(&self, axis: &str) -> Option<usize> {
        self.axes.iter().position(|a| a == axis)
    }

    pub fn spans(&self, axis: &str) -> bool {
        self.position(axis).is_some()
    }
}

/// A CF field.
///
/// Constructs are stored under generated keys (`dim0`, `aux1`, `msr0`,
/// `fav0`, `cct0`, `ref0`). Dimension coordinates are keyed by the key of
/// the axis they describe.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Field {
    pub properties: Properties,
    pub units: Units,
    pub ncvar: Option<String>,
    pub id: Option<String>,
    pub data: Option<Data>,
    /// Axis keys spanned by the data, in data dimension order.
    pub data_axes: Vec<String>,
    pub axes: BTreeMap<String, DomainAxis>,
    pub dimension_coordinates: BTreeMap<String, Variable>,
    pub auxiliary_coordinates: BTreeMap<String, Construct>,
    pub cell_measures: BTreeMap<String, Construct>,
    pub field_ancillaries: BTreeMap<String, Construct>,
    pub domain_ancillaries: BTreeMap<String, Construct>,
    pub coordinate_references: BTreeMap<String, CoordinateReference>,
    pub cell_methods: CellMethods,
    /// Non-CF attributes, such as the originating `file`.
    pub attributes: BTreeMap<String, String>,
}

fn next_key<'a>(prefix: &str, used: impl Iterator<Item = &'a String> + Clone) -> String {
    (0..)
        .map(|n| format!("{}{}", prefix, n))
        .find(|key| !used.clone().any(|k| k == key))
        .unwrap_or_else(|| prefix.to_string())
}

impl Field {
    pub fn new(standard_name: &str, units: Units) -> Self {
        let mut field = Self {
            units,
            ..Self::default()
        };
        field.set_property("standard_name", standard_name);
        field
    }

    pub fn with_property(mut self, name: &str, value: impl Into<PropertyValue>) -> Self {
        self.set_property(name, value);
        self
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_ncvar(mut self, ncvar: &str) -> Self {
        self.ncvar = Some(ncvar.to_string());
        self
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    pub fn property_text(&self, name: &str) -> Option<&str> {
        self.properties.get(name).and_then(PropertyValue::as_text)
    }

    pub fn set_property(&mut self, name: &str, value: impl Into<PropertyValue>) {
        self.properties.insert(name.to_string(), value.into());
    }

    pub fn del_property(&mut self, name: &str) -> Option<PropertyValue> {
        self.properties.remove(name)
    }

    /// Identity as for [`Variable::identity`], without an axis hint.
    pub fn identity(&self, strict: bool, ncvar_only: bool) -> Option<String> {
        if ncvar_only {
            return self.ncvar.clone();
        }
        if let Some(name) = self.property_text("standard_name") {
            return Some(name.to_string());
        }
        if let Some(id) = &self.id {
            return Some(id.clone());
        }
        if !strict {
            if let Some(name) = self.property_text("long_name") {
                return Some(name.to_string());
            }
            return self.ncvar.clone();
        }
        None
    }

    pub fn add_axis(&mut self, size: usize) -> String {
        let key = next_key("dim", self.axes.keys());
        self.axes.insert(key.clone(), DomainAxis { size, ncdim: None });
        key
    }

    pub fn add_axis_with_ncdim(&mut self, size: usize, ncdim: &str) -> String {
        let key = self.add_axis(size);
        if let Some(axis) = self.axes.get_mut(&key) {
            axis.ncdim = Some(ncdim.to_string());
        }
        key
    }

    pub fn axis_size(&self, axis: &str) -> ModelResult<usize> {
        self.axes
            .get(axis)
            .map(|a| a.size)
            .ok_or_else(|| ModelError::invalid_axis(format!("no domain axis {}", axis)))
    }

    fn check_shape(&self, what: &str, variable: &Variable, axes: &[String]) -> ModelResult<()> {
        let sizes = axes
            .iter()
            .map(|a| self.axis_size(a))
            .collect::<ModelResult<Vec<_>>>()?;
        if let Some(data) = &variable.data {
            if data.shape() != sizes.as_slice() {
                return Err(ModelError::shape_mismatch(format!(
                    "{} shape {:?} does not match axes {:?} of sizes {:?}",
                    what,
                    data.shape(),
                    axes,
                    sizes
                )));
            }
        }
        if let Some(bounds) = &variable.bounds {
            if bounds.ndim() != sizes.len() + 1 || bounds.shape()[..sizes.len()] != sizes[..] {
                return Err(ModelError::shape_mismatch(format!(
                    "{} bounds shape {:?} does not match axes {:?}",
                    what,
                    bounds.shape(),
                    axes
                )));
            }
        }
        Ok(())
    }

    fn owned_axes(axes: &[&str]) -> Vec<String> {
        axes.iter().map(|a| a.to_string()).collect()
    }

    pub fn set_dimension_coordinate(&mut self, axis: &str, coordinate: Variable) -> ModelResult<()> {
        self.check_shape("dimension coordinate", &coordinate, &[axis.to_string()])?;
        self.dimension_coordinates.insert(axis.to_string(), coordinate);
        Ok(())
    }

    pub fn add_auxiliary_coordinate(&mut self, coordinate: Variable, axes: &[&str]) -> ModelResult<String> {
        let axes = Self::owned_axes(axes);
        if axes.is_empty() {
            return Err(ModelError::invalid_axis("auxiliary coordinate spans no axes"));
        }
        self.check_shape("auxiliary coordinate", &coordinate, &axes)?;
        let key = next_key("aux", self.auxiliary_coordinates.keys());
        self.auxiliary_coordinates.insert(key.clone(), Construct { variable: coordinate, axes });
        Ok(key)
    }

    pub fn add_cell_measure(&mut self, measure: Variable, axes: &[&str]) -> ModelResult<String> {
        let axes = Self::owned_axes(axes);
        self.check_shape("cell measure", &measure, &axes)?;
        let key = next_key("msr", self.cell_measures.keys());
        self.cell_measures.insert(key.clone(), Construct { variable: measure, axes });
        Ok(key)
    }

    pub fn add_field_ancillary(&mut self, ancillary: Variable, axes: &[&str]) -> ModelResult<String> {
        let axes = Self::owned_axes(axes);
        self.check_shape("field ancillary", &ancillary, &axes)?;
        let key = next_key("fav", self.field_ancillaries.keys());
        self.field_ancillaries.insert(key.clone(), Construct { variable: ancillary, axes });
        Ok(key)
    }

    pub fn add_domain_ancillary(&mut self, ancillary: Variable, axes: &[&str]) -> ModelResult<String> {
        let axes = Self::owned_axes(axes);
        self.check_shape("domain ancillary", &ancillary, &axes)?;
        let key = next_key("cct", self.domain_ancillaries.keys());
        self.domain_ancillaries.insert(key.clone(), Construct { variable: ancillary, axes });
        Ok(key)
    }

    pub fn add_coordinate_reference(&mut self, reference: CoordinateReference) -> String {
        let key = next_key("ref", self.coordinate_references.keys());
        self.coordinate_references.insert(key.clone(), reference);
        key
    }

    /// Attach the data array. Units defined on the data become the field's
    /// units; otherwise the data takes the field's units.
    pub fn set_data(&mut self, mut data: Data, axes: &[&str]) -> ModelResult<()> {
        let axes = Self::owned_axes(axes);
        self.check_shape("field data", &Variable::new(data.clone()), &axes)?;
        if data.units().is_defined() {
            self.units = data.units().clone();
        } else {
            data.set_units(self.units.clone());
        }
        self.data = Some(data);
        self.data_axes = axes;
        Ok(())
    }

    /// Dimension or auxiliary coordinate by key.
    pub fn coordinate(&self, key: &str) -> Option<&Variable> {
        self.dimension_coordinates
            .get(key)
            .or_else(|| self.auxiliary_coordinates.get(key).map(|c| &c.variable))
    }

    /// Whether the axis runs in increasing order. Axes without a dimension
    /// coordinate count as increasing.
    pub fn direction(&self, axis: &str) -> bool {
        self.dimension_coordinates
            .get(axis)
            .and_then(|dc| dc.data.as_ref())
            .map_or(true, Data::is_increasing)
    }

    /// Reverse the field along one axis: data and every construct that
    /// spans the axis.
    pub fn flip(&mut self, axis: &str) -> ModelResult<()> {
        self.axis_size(axis)?;
        if let Some(pos) = self.data_axes.iter().position(|a| a == axis) {
            if let Some(data) = &self.data {
                self.data = Some(data.reversed(pos)?);
            }
        }
        if let Some(dc) = self.dimension_coordinates.get_mut(axis) {
            *dc = dc.reversed(0, true)?;
        }
        for constructs in [
            &mut self.auxiliary_coordinates,
            &mut self.cell_measures,
            &mut self.field_ancillaries,
            &mut self.domain_ancillaries,
        ] {
            for construct in constructs.values_mut() {
                if let Some(pos) = construct.position(axis) {
                    construct.variable = construct.variable.reversed(pos, false)?;
                }
            }
        }
        Ok(())
    }

    /// Insert a size-1 axis into the data at `position`.
    pub fn expand_dims(&mut self, position: usize, axis: &str) -> ModelResult<()> {
        let size = self.axis_size(axis)?;
        if size != 1 {
            return Err(ModelError::invalid_axis(format!(
                "cannot insert axis {} of size {} into the data",
                axis, size
            )));
        }
        if self.data_axes.iter().any(|a| a == axis) {
            return Err(ModelError::invalid_axis(format!("data already spans axis {}", axis)));
        }
        let data = self
            .data
            .as_ref()
            .ok_or_else(|| ModelError::missing_construct("field has no data"))?;
        self.data = Some(data.insert_axis(position)?);
        self.data_axes.insert(position, axis.to_string());
        Ok(())
    }

    /// Reorder the data dimensions to follow the given axis keys.
    pub fn transpose_data(&mut self, axes: &[String]) -> ModelResult<()> {
        let order = axes
            .iter()
            .map(|axis| {
                self.data_axes
                    .iter()
                    .position(|a| a == axis)
                    .ok_or_else(|| ModelError::invalid_axis(format!("data does not span axis {}", axis)))
            })
            .collect::<ModelResult<Vec<_>>>()?;
        if let Some(data) = &self.data {
            self.data = Some(data.permuted(&order)?);
        }
        self.data_axes = axes.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field() -> Field {
        let mut f = Field::new("air_temperature", Units::new("K"));
        let t = f.add_axis(2);
        let x = f.add_axis(3);
        f.set_dimension_coordinate(&t, Variable::new(Data::from_vec(vec![0.0, 1.0], Units::new("days since 2000-01-01"))))
            .unwrap();
        f.set_dimension_coordinate(&x, Variable::new(Data::from_vec(vec![10.0, 20.0, 30.0], Units::new("m"))))
            .unwrap();
        f.add_auxiliary_coordinate(
            Variable::new(Data::from_vec(vec![5.0, 6.0], Units::new("m"))).with_standard_name("altitude"),
            &[&t],
        )
        .unwrap();
        let data = Data::from_shape_vec(&[2, 3], (0..6).map(f64::from).collect(), Units::none()).unwrap();
        f.set_data(data, &[&t, &x]).unwrap();
        f
    }

    #[test]
    fn test_construct_validation() {
        let mut f = field();
        let bad = Variable::new(Data::from_vec(vec![1.0], Units::new("m")));
        assert!(f.add_auxiliary_coordinate(bad, &["dim0"]).is_err());
        assert!(f.add_cell_measure(Variable::default(), &["dim9"]).is_err());
        assert_eq!(f.data.as_ref().unwrap().units(), &Units::new("K"));
    }

    #[test]
    fn test_flip() {
        let mut f = field();
        assert!(f.direction("dim0"));
        f.flip("dim0").unwrap();
        assert!(!f.direction("dim0"));
        assert_eq!(
            f.data.as_ref().unwrap().to_f64_vec().unwrap(),
            vec![3.0, 4.0, 5.0, 0.0, 1.0, 2.0]
        );
        let aux = &f.auxiliary_coordinates["aux0"].variable;
        assert_eq!(aux.data.as_ref().unwrap().to_f64_vec().unwrap(), vec![6.0, 5.0]);
    }

    #[test]
    fn test_expand_and_transpose() {
        let mut f = field();
        let z = f.add_axis(1);
        f.expand_dims(0, &z).unwrap();
        assert_eq!(f.data.as_ref().unwrap().shape(), &[1, 2, 3]);
        assert!(f.expand_dims(0, &z).is_err());
        assert!(f.expand_dims(0, "dim1").is_err());

        f.transpose_data(&["dim1".to_string(), "dim2".to_string(), "dim0".to_string()])
            .unwrap();
        assert_eq!(f.data.as_ref().unwrap().shape(), &[3, 1, 2]);
        assert_eq!(f.data_axes, vec!["dim1", "dim2", "dim0"]);
    }

    #[test]
    fn test_identity() {
        let f = Field::default().with_property("long_name", "temperature").with_ncvar("ta");
        assert_eq!(f.identity(true, false), None);
        assert_eq!(f.identity(false, false), Some("temperature".to_string()));
        assert_eq!(f.identity(false, true), Some("ta".to_string()));
    }
}
