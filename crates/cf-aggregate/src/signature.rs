//! Structural signatures and the index that buckets probes by them.
//!
//! A signature captures everything about a field's structure that must be
//! identical for two fields to be aggregatable: identities, canonical
//! units, axis layout, coordinate reference structure and the properties
//! selected for comparison. It deliberately omits coordinate values.

use std::collections::BTreeMap;

use cf_model::{CoordRefSignature, Field};
use serde::Serialize;

use crate::probe::{ConstructSummary, Probe};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct AxisSignature {
    pub identity: String,
    pub ids: Vec<String>,
    pub units: Vec<String>,
    pub has_bounds: Vec<bool>,
    pub coordrefs: Vec<Vec<String>>,
    pub size: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NdAuxSignature {
    pub identity: String,
    pub units: String,
    pub axes: Vec<String>,
    pub has_bounds: bool,
    pub coordrefs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MeasureSignature {
    pub units: String,
    pub axes: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct AncillarySignature {
    pub identity: String,
    pub units: String,
    pub axes: Vec<String>,
}

/// Exact-equality key for grouping probes. Field order is significant: it
/// defines the order in which buckets are processed.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct StructuralSignature {
    /// Value of the field's override attribute. When set, every other
    /// member is left at its default.
    pub overridden: Option<String>,
    pub identity: Option<String>,
    pub units: String,
    pub cell_methods: Option<String>,
    pub has_data: bool,
    pub properties: Vec<(String, Option<String>)>,
    pub standard_error_multiplier: Option<String>,
    /// `valid_min`, `valid_max`, `valid_range` when respected.
    pub valid: [Option<String>; 3],
    /// `flag_values`, `flag_masks`, `flag_meanings`.
    pub flags: [Option<String>; 3],
    pub coordinate_references: Vec<CoordRefSignature>,
    pub axes: Vec<AxisSignature>,
    pub dim_coords: Vec<bool>,
    pub nd_aux: Vec<NdAuxSignature>,
    pub cell_measures: Vec<MeasureSignature>,
    pub domain_ancillaries: Vec<AncillarySignature>,
    pub field_ancillaries: Vec<AncillarySignature>,
}

fn ancillaries(summaries: &BTreeMap<String, ConstructSummary>) -> Vec<AncillarySignature> {
    summaries
        .iter()
        .map(|(identity, s)| AncillarySignature {
            identity: identity.clone(),
            units: s.units.formatted(),
            axes: s.axes.clone(),
        })
        .collect()
}

impl StructuralSignature {
    /// Derive the signature of a described probe. `field` is the probe's
    /// (possibly not yet attached) field.
    pub(crate) fn derive(probe: &Probe, field: &Field, respect_valid: bool) -> Self {
        let prop = |name: &str| field.property(name).map(|v| v.canonical());

        let valid = if respect_valid {
            [prop("valid_min"), prop("valid_max"), prop("valid_range")]
        } else {
            [None, None, None]
        };

        let axes = probe
            .axes
            .iter()
            .map(|(identity, axis)| AxisSignature {
                identity: identity.clone(),
                ids: axis.ids.clone(),
                units: axis.units.iter().map(|u| u.formatted()).collect(),
                has_bounds: axis.has_bounds.clone(),
                coordrefs: axis.coordrefs.clone(),
                size: axis.size,
            })
            .collect();

        let nd_aux = probe
            .nd_aux
            .iter()
            .map(|(identity, s)| NdAuxSignature {
                identity: identity.clone(),
                units: s.units.formatted(),
                axes: s.axes.clone(),
                has_bounds: s.has_bounds,
                coordrefs: s.coordrefs.clone(),
            })
            .collect();

        let cell_measures = probe
            .cell_measures
            .iter()
            .map(|(units, group)| MeasureSignature {
                units: units.clone(),
                axes: group.iter().map(|m| m.axes.clone()).collect(),
            })
            .collect();

        Self {
            overridden: None,
            identity: probe.identity.clone(),
            units: probe.units.formatted(),
            cell_methods: probe.cell_methods.as_ref().map(|cm| cm.to_string()),
            has_data: probe.has_data,
            properties: probe.properties.clone(),
            standard_error_multiplier: prop("standard_error_multiplier"),
            valid,
            flags: [prop("flag_values"), prop("flag_masks"), prop("flag_meanings")],
            coordinate_references: probe.coordref_signatures.clone(),
            axes,
            dim_coords: probe.axes.values().map(|a| a.dim_coord_index.is_some()).collect(),
            nd_aux,
            cell_measures,
            domain_ancillaries: ancillaries(&probe.domain_ancillaries),
            field_ancillaries: ancillaries(&probe.field_ancillaries),
        }
    }

    /// Pretty JSON rendering for diagnostics.
    pub fn describe(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| format!("{:?}", self))
    }
}

/// Buckets of probes keyed by structural signature, iterated in signature
/// order.
#[derive(Default)]
pub struct SignatureIndex {
    buckets: BTreeMap<StructuralSignature, Vec<Probe>>,
}

impl SignatureIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, probe: Probe) {
        self.buckets
            .entry(probe.signature.clone())
            .or_default()
            .push(probe);
    }

    /// Number of buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn probe_count(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn into_buckets(self) -> impl Iterator<Item = (StructuralSignature, Vec<Probe>)> {
        self.buckets.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AggregateOptions;
    use crate::context::AggregationContext;
    use cf_model::{Data, Units, Variable};

    fn field(name: &str, times: Vec<f64>) -> Field {
        let mut f = Field::new(name, Units::new("K"));
        let n = times.len();
        let t = f.add_axis(n);
        f.set_dimension_coordinate(
            &t,
            Variable::new(Data::from_vec(times, Units::new("days since 2000-01-01"))).with_standard_name("time"),
        )
        .unwrap();
        f.set_data(Data::from_vec(vec![0.0; n], Units::new("K")), &[t.as_str()]).unwrap();
        f
    }

    fn probe(ctx: &mut AggregationContext, f: Field, options: &AggregateOptions) -> Probe {
        Probe::build(f, options, ctx).unwrap()
    }

    #[test]
    fn test_signature_ignores_coordinate_values() {
        let mut ctx = AggregationContext::default();
        let options = AggregateOptions::default();
        let a = probe(&mut ctx, field("air_temperature", vec![0.0]), &options);
        let b = probe(&mut ctx, field("air_temperature", vec![5.0, 6.0]), &options);
        assert_eq!(a.signature, b.signature);

        let c = probe(&mut ctx, field("air_pressure", vec![0.0]), &options);
        assert_ne!(a.signature, c.signature);
    }

    #[test]
    fn test_valid_range_only_when_respected() {
        let mut ctx = AggregationContext::default();
        let f0 = field("air_temperature", vec![0.0]).with_property("valid_max", 350.0);
        let f1 = field("air_temperature", vec![1.0]).with_property("valid_max", 340.0);

        let lenient = AggregateOptions::default();
        assert_eq!(
            probe(&mut ctx, f0.clone(), &lenient).signature,
            probe(&mut ctx, f1.clone(), &lenient).signature
        );

        let strict = AggregateOptions {
            respect_valid: true,
            ..Default::default()
        };
        assert_ne!(
            probe(&mut ctx, f0, &strict).signature,
            probe(&mut ctx, f1, &strict).signature
        );
    }

    #[test]
    fn test_index_buckets_in_signature_order() {
        let mut ctx = AggregationContext::default();
        let options = AggregateOptions::default();
        let mut index = SignatureIndex::new();
        assert!(index.is_empty());
        index.insert(probe(&mut ctx, field("b_field", vec![0.0]), &options));
        index.insert(probe(&mut ctx, field("a_field", vec![0.0]), &options));
        index.insert(probe(&mut ctx, field("b_field", vec![1.0]), &options));

        assert_eq!(index.len(), 2);
        assert_eq!(index.probe_count(), 3);
        let sizes: Vec<(Option<String>, usize)> = index
            .into_buckets()
            .map(|(sig, probes)| (sig.identity, probes.len()))
            .collect();
        assert_eq!(
            sizes,
            vec![(Some("a_field".to_string()), 1), (Some("b_field".to_string()), 2)]
        );
    }

    #[test]
    fn test_describe_is_json() {
        let mut ctx = AggregationContext::default();
        let p = probe(&mut ctx, field("air_temperature", vec![0.0]), &AggregateOptions::default());
        let text = p.signature.describe();
        assert!(text.contains("\"identity\": \"air_temperature\""));
    }

    #[test]
    fn test_override_replaces_derived_signature() {
        let mut ctx = AggregationContext::default();
        let options = AggregateOptions::default();
        let a = field("air_temperature", vec![0.0]).with_attribute("aggregate", "group-1");
        let b = field("air_pressure", vec![0.0, 1.0]).with_attribute("aggregate", "group-1");
        let c = field("air_temperature", vec![0.0]).with_attribute("aggregate", "group-2");

        let (a, b, c) = (
            probe(&mut ctx, a, &options),
            probe(&mut ctx, b, &options),
            probe(&mut ctx, c, &options),
        );
        assert_eq!(a.signature, b.signature);
        assert_ne!(a.signature, c.signature);
        assert_eq!(a.signature.overridden.as_deref(), Some("group-1"));
        assert!(a.signature.axes.is_empty());
    }
}
