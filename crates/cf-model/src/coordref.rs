//! Coordinate reference constructs (grid mappings and formula terms).

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::property::PropertyValue;

/// A coordinate reference: a named grid mapping or vertical coordinate
/// formula, the coordinates it applies to, its scalar parameters and the
/// domain ancillaries that supply its formula terms.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CoordinateReference {
    /// `grid_mapping_name` or the `standard_name` of a vertical formula.
    pub name: Option<String>,
    /// Keys of the coordinate constructs this reference applies to.
    pub coordinates: BTreeSet<String>,
    pub parameters: BTreeMap<String, PropertyValue>,
    /// Formula term name to domain ancillary key.
    pub ancillaries: BTreeMap<String, String>,
}

/// Structural identity of a coordinate reference, comparable across fields.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct CoordRefSignature {
    pub name: Option<String>,
    pub parameters: Vec<(String, String)>,
    pub terms: Vec<String>,
}

impl CoordinateReference {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_coordinate(mut self, key: impl Into<String>) -> Self {
        self.coordinates.insert(key.into());
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_ancillary(mut self, term: impl Into<String>, key: impl Into<String>) -> Self {
        self.ancillaries.insert(term.into(), key.into());
        self
    }

    /// Name, normalised parameter values and formula term names.
    pub fn structural_signature(&self) -> CoordRefSignature {
        CoordRefSignature {
            name: self.name.clone(),
            parameters: self
                .parameters
                .iter()
                .map(|(k, v)| (k.clone(), v.canonical()))
                .collect(),
            terms: self.ancillaries.keys().cloned().collect(),
        }
    }

    /// Whether both references carry the same parameters with tolerantly
    /// equal values.
    pub fn parameters_allclose(&self, other: &CoordinateReference, rtol: f64, atol: f64) -> bool {
        self.parameters.len() == other.parameters.len()
            && self
                .parameters
                .iter()
                .all(|(k, v)| other.parameters.get(k).is_some_and(|w| v.equals(w, rtol, atol)))
    }
}
