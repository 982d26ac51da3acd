//! Splitting a signature bucket into subgroups that differ along exactly
//! one axis.

use crate::error::{AggregateError, Result};
use crate::probe::{ConstructSummary, Probe};
use crate::types::HashEntry;

/// Per-axis hash lists with `axis` moved last.
fn sort_key(probe: &Probe, axis: &str) -> Vec<Vec<HashEntry>> {
    let mut key: Vec<Vec<HashEntry>> = probe
        .hashes
        .iter()
        .filter(|(id, _)| id.as_str() != axis)
        .map(|(_, h)| h.clone())
        .collect();
    if let Some(h) = probe.hashes.get(axis) {
        key.push(h.clone());
    }
    key
}

/// Axes whose hash lists differ between two probes.
fn differing_axes<'a>(p0: &'a Probe, p1: &Probe) -> Vec<&'a str> {
    p0.hashes
        .iter()
        .filter(|(id, h)| p1.hashes.get(*id) != Some(*h))
        .map(|(id, _)| id.as_str())
        .collect()
}

/// Whether constructs not spanning `axis` carry identical values.
fn same_off_axis<'a>(
    a: impl IntoIterator<Item = &'a ConstructSummary>,
    b: impl IntoIterator<Item = &'a ConstructSummary>,
    axis: &str,
) -> bool {
    a.into_iter()
        .zip(b)
        .all(|(x, y)| x.spans(axis) || x.hash == y.hash)
}

fn can_join(p0: &Probe, p1: &Probe, axis: &str) -> bool {
    same_off_axis(p0.nd_aux.values(), p1.nd_aux.values(), axis)
        && same_off_axis(
            p0.cell_measures.values().flatten(),
            p1.cell_measures.values().flatten(),
            axis,
        )
        && same_off_axis(p0.field_ancillaries.values(), p1.field_ancillaries.values(), axis)
        && same_off_axis(p0.domain_ancillaries.values(), p1.domain_ancillaries.values(), axis)
}

/// Sort the probes of one bucket and split them into subgroups whose
/// members differ only along `axis`. Members of subgroups with more than
/// one probe have `a_identity` set to `axis`.
///
/// Fails when two probes cannot be told apart on any axis.
pub fn group_by_axis(mut probes: Vec<Probe>, axis: &str) -> Result<Vec<Vec<Probe>>> {
    probes.sort_by_cached_key(|p| sort_key(p, axis));

    let mut groups: Vec<Vec<Probe>> = Vec::new();
    for probe in probes {
        let join = match groups.last().and_then(|g| g.last()) {
            None => false,
            Some(prev) => {
                let differing = differing_axes(prev, &probe);
                match differing.as_slice() {
                    [] => {
                        return Err(AggregateError::not_aggregatable(
                            "indistinguishable coordinates or other domain information",
                        ))
                    }
                    [only] => *only == axis && can_join(prev, &probe, axis),
                    _ => false,
                }
            }
        };
        match groups.last_mut() {
            Some(group) if join => group.push(probe),
            _ => groups.push(vec![probe]),
        }
    }

    for group in groups.iter_mut().filter(|g| g.len() > 1) {
        for probe in group.iter_mut() {
            probe.a_identity = Some(axis.to_string());
        }
    }
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AggregateOptions;
    use crate::context::AggregationContext;
    use crate::types::Fingerprint;
    use cf_model::{Data, Field, Units, Variable};
    use std::collections::BTreeMap;

    fn probe(ctx: &mut AggregationContext) -> Probe {
        let mut f = Field::new("air_temperature", Units::new("K"));
        let t = f.add_axis(1);
        f.set_dimension_coordinate(
            &t,
            Variable::new(Data::from_vec(vec![0.0], Units::new("days since 2000-01-01"))).with_standard_name("time"),
        )
        .unwrap();
        let x = f.add_axis(1);
        f.set_dimension_coordinate(
            &x,
            Variable::new(Data::from_vec(vec![0.0], Units::new("degrees_east"))).with_standard_name("longitude"),
        )
        .unwrap();
        f.set_data(
            Data::from_shape_vec(&[1, 1], vec![0.0], Units::new("K")).unwrap(),
            &[t.as_str(), x.as_str()],
        )
        .unwrap();
        Probe::build(f, &AggregateOptions::default(), ctx).unwrap()
    }

    fn with_hashes(mut p: Probe, time: u64, lon: u64) -> Probe {
        p.hashes = BTreeMap::from([
            ("time".to_string(), vec![HashEntry::Array(Fingerprint(time))]),
            ("longitude".to_string(), vec![HashEntry::Array(Fingerprint(lon))]),
        ]);
        p
    }

    #[test]
    fn test_groups_along_axis() {
        let mut ctx = AggregationContext::default();
        let probes = vec![
            with_hashes(probe(&mut ctx), 2, 1),
            with_hashes(probe(&mut ctx), 1, 1),
            with_hashes(probe(&mut ctx), 1, 2),
        ];
        let groups = group_by_axis(probes, "time").unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[0][0].a_identity.as_deref(), Some("time"));
        assert_eq!(groups[1].len(), 1);
        assert_eq!(groups[1][0].a_identity, None);
    }

    #[test]
    fn test_other_axis_differs() {
        let mut ctx = AggregationContext::default();
        let probes = vec![with_hashes(probe(&mut ctx), 1, 1), with_hashes(probe(&mut ctx), 1, 2)];
        let groups = group_by_axis(probes, "time").unwrap();
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn test_indistinguishable() {
        let mut ctx = AggregationContext::default();
        let probes = vec![with_hashes(probe(&mut ctx), 1, 1), with_hashes(probe(&mut ctx), 1, 1)];
        let err = group_by_axis(probes, "time").unwrap_err();
        assert!(err.to_string().contains("indistinguishable"));
    }

    #[test]
    fn test_off_axis_construct_blocks_join() {
        let mut ctx = AggregationContext::default();
        let summary = |fp| ConstructSummary {
            key: "aux0".to_string(),
            axes: vec!["longitude".to_string()],
            units: Units::new("m"),
            has_bounds: false,
            coordrefs: Vec::new(),
            hash: HashEntry::Array(Fingerprint(fp)),
        };
        let mut a = with_hashes(probe(&mut ctx), 1, 1);
        let mut b = with_hashes(probe(&mut ctx), 2, 1);
        a.field_ancillaries.insert("altitude".to_string(), summary(5));
        b.field_ancillaries.insert("altitude".to_string(), summary(6));
        let groups = group_by_axis(vec![a, b], "time").unwrap();
        assert_eq!(groups.len(), 2);
    }
}
