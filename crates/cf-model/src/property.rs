//! Descriptive property values (netCDF attributes) of fields and variables.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Named properties, ordered by name.
pub type Properties = BTreeMap<String, PropertyValue>;

/// A property value: a string, a number or a numeric vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Number(f64),
    Numbers(Vec<f64>),
    Text(String),
}

impl PropertyValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }

    fn numbers(&self) -> Option<&[f64]> {
        match self {
            PropertyValue::Number(v) => Some(std::slice::from_ref(v)),
            PropertyValue::Numbers(v) => Some(v),
            PropertyValue::Text(_) => None,
        }
    }

    /// Equality with numeric tolerance. Strings must match exactly.
    pub fn equals(&self, other: &PropertyValue, rtol: f64, atol: f64) -> bool {
        match (self.numbers(), other.numbers()) {
            (Some(a), Some(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|(x, y)| x == y || (x - y).abs() <= atol + rtol * y.abs())
            }
            (None, None) => self.as_text() == other.as_text(),
            _ => false,
        }
    }

    /// Stable text form used for signature comparison. Numbers are
    /// rendered to 12 significant digits so that tiny representation
    /// differences do not split otherwise identical values.
    pub fn canonical(&self) -> String {
        match self {
            PropertyValue::Text(s) => s.clone(),
            PropertyValue::Number(v) => format!("{:.11e}", v),
            PropertyValue::Numbers(vs) => vs
                .iter()
                .map(|v| format!("{:.11e}", v))
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    /// Convert a JSON scalar or numeric array.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Text(s) => f.write_str(s),
            PropertyValue::Number(v) => write!(f, "{}", v),
            PropertyValue::Numbers(vs) => {
                let parts: Vec<String> = vs.iter().map(|v| v.to_string()).collect();
                f.write_str(&parts.join(" "))
            }
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Text(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Number(value)
    }
}

impl From<Vec<f64>> for PropertyValue {
    fn from(value: Vec<f64>) -> Self {
        PropertyValue::Numbers(value)
    }
}
