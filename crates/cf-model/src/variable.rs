//! Variables: data with bounds and descriptive properties.
//!
//! Coordinates, cell measures and ancillaries are all variables; the
//! construct kind is given by where a variable sits in a [`crate::Field`].

use std::fmt;

use crate::data::Data;
use crate::error::{ModelError, ModelResult};
use crate::property::{Properties, PropertyValue};
use crate::units::Units;

/// The CF `axis` attribute of a coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AxisHint {
    T,
    X,
    Y,
    Z,
}

impl AxisHint {
    pub fn letter(&self) -> &'static str {
        match self {
            AxisHint::T => "T",
            AxisHint::X => "X",
            AxisHint::Y => "Y",
            AxisHint::Z => "Z",
        }
    }
}

impl fmt::Display for AxisHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.letter())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Variable {
    pub properties: Properties,
    pub data: Option<Data>,
    /// Cell bounds: the data shape plus one trailing vertex dimension.
    pub bounds: Option<Data>,
    pub ncvar: Option<String>,
    /// Explicit identity, used when no `standard_name` is present.
    pub id: Option<String>,
    pub axis_hint: Option<AxisHint>,
    /// Cell measure kind (`area`, `volume`).
    pub measure: Option<String>,
}

impl Variable {
    pub fn new(data: Data) -> Self {
        Self {
            data: Some(data),
            ..Self::default()
        }
    }

    pub fn with_standard_name(self, name: &str) -> Self {
        self.with_property("standard_name", name)
    }

    pub fn with_long_name(self, name: &str) -> Self {
        self.with_property("long_name", name)
    }

    pub fn with_property(mut self, name: &str, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.to_string(), value.into());
        self
    }

    pub fn with_bounds(mut self, bounds: Data) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn with_ncvar(mut self, ncvar: &str) -> Self {
        self.ncvar = Some(ncvar.to_string());
        self
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_axis_hint(mut self, hint: AxisHint) -> Self {
        self.axis_hint = Some(hint);
        self
    }

    pub fn with_measure(mut self, measure: &str) -> Self {
        self.measure = Some(measure.to_string());
        self
    }

    pub fn property_text(&self, name: &str) -> Option<&str> {
        self.properties.get(name).and_then(PropertyValue::as_text)
    }

    /// Units of the data, falling back to the bounds.
    pub fn units(&self) -> Units {
        self.data
            .as_ref()
            .or(self.bounds.as_ref())
            .map(|d| d.units().clone())
            .unwrap_or_default()
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    pub fn is_text(&self) -> bool {
        self.data.as_ref().is_some_and(Data::is_text)
    }

    /// Resolve the identity: `standard_name`, then the explicit id, then
    /// (when not strict) `long_name` and the netCDF name, then the axis
    /// hint. With `ncvar_only` the netCDF name is the identity.
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
            if let Some(ncvar) = &self.ncvar {
                return Some(ncvar.clone());
            }
        }
        self.axis_hint.map(|h| h.letter().to_string())
    }

    /// Reverse data and bounds along `position`. With `flip_vertices` the
    /// trailing bounds dimension is reversed too so that each cell's bounds
    /// keep the direction of the coordinate.
    pub fn reversed(&self, position: usize, flip_vertices: bool) -> ModelResult<Variable> {
        let mut out = self.clone();
        out.data = self.data.as_ref().map(|d| d.reversed(position)).transpose()?;
        out.bounds = match &self.bounds {
            Some(b) => {
                let mut b = b.reversed(position)?;
                if flip_vertices {
                    b = b.reversed(b.ndim() - 1)?;
                }
                Some(b)
            }
            None => None,
        };
        Ok(out)
    }

    /// Permute data and bounds; the bounds vertex dimension stays last.
    pub fn permuted(&self, order: &[usize]) -> ModelResult<Variable> {
        let mut out = self.clone();
        out.data = self.data.as_ref().map(|d| d.permuted(order)).transpose()?;
        if let Some(b) = &self.bounds {
            let mut bounds_order = order.to_vec();
            bounds_order.push(order.len());
            out.bounds = Some(b.permuted(&bounds_order)?);
        }
        Ok(out)
    }

    /// Concatenate `other` after `self` along `position`. Both variables
    /// must agree on having bounds.
    pub fn concatenate(&self, other: &Variable, position: usize) -> ModelResult<Variable> {
        let mut out = self.clone();
        out.data = match (&self.data, &other.data) {
            (Some(a), Some(b)) => Some(a.concatenate(b, position)?),
            (None, None) => None,
            _ => return Err(ModelError::missing_construct("data on only one variable")),
        };
        out.bounds = match (&self.bounds, &other.bounds) {
            (Some(a), Some(b)) => Some(a.concatenate(b, position)?),
            (None, None) => None,
            _ => return Err(ModelError::missing_construct("bounds on only one variable")),
        };
        Ok(out)
    }

    /// Insert a size-1 dimension into data and bounds.
    pub fn insert_axis(&self, position: usize) -> ModelResult<Variable> {
        let mut out = self.clone();
        out.data = self.data.as_ref().map(|d| d.insert_axis(position)).transpose()?;
        out.bounds = self.bounds.as_ref().map(|b| b.insert_axis(position)).transpose()?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord() -> Variable {
        Variable::new(Data::from_vec(vec![0.0, 1.0], Units::new("days since 2000-01-01")))
            .with_bounds(
                Data::from_shape_vec(&[2, 2], vec![-0.5, 0.5, 0.5, 1.5], Units::new("days since 2000-01-01"))
                    .unwrap(),
            )
    }

    #[test]
    fn test_identity_resolution() {
        let v = coord().with_long_name("model time").with_ncvar("t");
        assert_eq!(v.identity(true, false), None);
        assert_eq!(v.identity(false, false), Some("model time".to_string()));
        assert_eq!(v.identity(true, true), Some("t".to_string()));

        let v = v.with_standard_name("time");
        assert_eq!(v.identity(true, false), Some("time".to_string()));

        let hinted = coord().with_axis_hint(AxisHint::T);
        assert_eq!(hinted.identity(true, false), Some("T".to_string()));
    }

    #[test]
    fn test_reverse_flips_vertices() {
        let v = coord().reversed(0, true).unwrap();
        assert_eq!(v.data.unwrap().to_f64_vec().unwrap(), vec![1.0, 0.0]);
        assert_eq!(
            v.bounds.unwrap().to_f64_vec().unwrap(),
            vec![1.5, 0.5, 0.5, -0.5]
        );
    }

    #[test]
    fn test_concatenate_requires_matching_bounds() {
        let a = coord();
        let mut b = coord();
        b.bounds = None;
        assert!(a.concatenate(&b, 0).is_err());
        let joined = a.concatenate(&coord(), 0).unwrap();
        assert_eq!(joined.bounds.unwrap().shape(), &[4, 2]);
    }
}
