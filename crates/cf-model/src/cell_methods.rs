//! CF cell methods (`time: mean (interval: 1 hour)`).

use std::collections::BTreeMap;
use std::fmt;

use crate::property::PropertyValue;

/// One cell method: the axes it applies to, the method and its qualifiers
/// (`interval`, `comment`, `where`, ...).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CellMethod {
    pub axes: Vec<String>,
    pub method: String,
    pub qualifiers: BTreeMap<String, PropertyValue>,
}

impl CellMethod {
    pub fn new<S: Into<String>>(axes: impl IntoIterator<Item = S>, method: impl Into<String>) -> Self {
        Self {
            axes: axes.into_iter().map(Into::into).collect(),
            method: method.into(),
            qualifiers: BTreeMap::new(),
        }
    }

    pub fn with_qualifier(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.qualifiers.insert(name.into(), value.into());
        self
    }

    fn equivalent(&self, other: &CellMethod, rtol: f64, atol: f64) -> bool {
        self.method == other.method
            && self.axes == other.axes
            && self.qualifiers.len() == other.qualifiers.len()
            && self
                .qualifiers
                .iter()
                .all(|(k, v)| other.qualifiers.get(k).is_some_and(|w| v.equals(w, rtol, atol)))
    }
}

/// An ordered sequence of cell methods.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CellMethods(pub Vec<CellMethod>);

impl CellMethods {
    pub fn new(methods: Vec<CellMethod>) -> Self {
        Self(methods)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CellMethod> {
        self.0.iter()
    }

    /// Same methods in the same order with tolerantly equal qualifiers.
    pub fn equivalent(&self, other: &CellMethods, rtol: f64, atol: f64) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .zip(&other.0)
                .all(|(a, b)| a.equivalent(b, rtol, atol))
    }

    /// Rename axes (e.g. construct keys to axis identities) and sort each
    /// method's axes so that equal methods compare equal.
    pub fn map_axes(&self, rename: impl Fn(&str) -> String) -> CellMethods {
        CellMethods(
            self.0
                .iter()
                .map(|cm| {
                    let mut axes: Vec<String> = cm.axes.iter().map(|a| rename(a)).collect();
                    axes.sort();
                    CellMethod {
                        axes,
                        method: cm.method.clone(),
                        qualifiers: cm.qualifiers.clone(),
                    }
                })
                .collect(),
        )
    }
}

impl fmt::Display for CellMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for axis in &self.axes {
            write!(f, "{}: ", axis)?;
        }
        f.write_str(&self.method)?;
        if !self.qualifiers.is_empty() {
            let parts: Vec<String> = self
                .qualifiers
                .iter()
                .map(|(k, v)| format!("{}: {}", k, v))
                .collect();
            write!(f, " ({})", parts.join(" "))?;
        }
        Ok(())
    }
}

impl fmt::Display for CellMethods {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|cm| cm.to_string()).collect();
        f.write_str(&parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let cms = CellMethods::new(vec![
            CellMethod::new(["area"], "mean"),
            CellMethod::new(["time"], "maximum").with_qualifier("interval", "1 hour"),
        ]);
        assert_eq!(cms.to_string(), "area: mean time: maximum (interval: 1 hour)");
    }

    #[test]
    fn test_equivalence_with_tolerance() {
        let a = CellMethods::new(vec![CellMethod::new(["time"], "mean").with_qualifier("interval", 1.0)]);
        let b = CellMethods::new(vec![CellMethod::new(["time"], "mean").with_qualifier("interval", 1.0 + 1e-15)]);
        let c = CellMethods::new(vec![CellMethod::new(["time"], "maximum")]);
        assert!(a.equivalent(&b, 1e-12, 1e-12));
        assert!(!a.equivalent(&c, 1e-12, 1e-12));
    }

    #[test]
    fn test_map_axes_sorts() {
        let cms = CellMethods::new(vec![CellMethod::new(["dim1", "dim0"], "mean")]);
        let mapped = cms.map_axes(|key| match key {
            "dim0" => "latitude".to_string(),
            "dim1" => "longitude".to_string(),
            other => other.to_string(),
        });
        assert_eq!(mapped.0[0].axes, vec!["latitude", "longitude"]);
    }
}
