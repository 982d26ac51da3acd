//! Ordering and overlap checks along the aggregating axis.

use std::collections::BTreeSet;

use cf_model::{Data, Values};

use crate::error::{AggregateError, Result};
use crate::probe::Probe;
use crate::types::CellValue;

/// Sort a subgroup by the canonical first values of its coordinates along
/// `axis`.
pub fn sort_by_first_values(group: &mut [Probe], axis: &str) {
    group.sort_by(|a, b| a.first_values.get(axis).cmp(&b.first_values.get(axis)));
}

fn cell_values(data: &Data) -> Vec<CellValue> {
    match data.values() {
        Values::Text(a) => a.iter().map(|s| CellValue::Text(s.clone())).collect(),
        _ => data
            .to_f64_vec()
            .unwrap_or_default()
            .into_iter()
            .map(CellValue::Number)
            .collect(),
    }
}

/// Check that neighbouring members of a sorted subgroup can be joined
/// along `axis`.
///
/// With a dimension coordinate, cell centres must be strictly increasing
/// across members; bounds are then checked for overlap (`no_overlap`) and
/// gaps (`contiguous`). Without one, every 1-d auxiliary coordinate must
/// be free of duplicate values over the whole subgroup.
pub fn check_coordinates(group: &[Probe], axis: &str, no_overlap: bool, contiguous: bool) -> Result<()> {
    let Some(leader) = group.first() else {
        return Ok(());
    };
    let descriptor = leader
        .axes
        .get(axis)
        .ok_or_else(|| AggregateError::overlap(format!("no axis {}", axis)))?;

    if let Some(dci) = descriptor.dim_coord_index {
        let name = &descriptor.ids[dci];
        for pair in group.windows(2) {
            let (p0, p1) = (&pair[0], &pair[1]);
            let last = p0.last_values.get(axis).and_then(|v| v.get(dci));
            let first = p1.first_values.get(axis).and_then(|v| v.get(dci));
            if let (Some(last), Some(first)) = (last, first) {
                if last >= first {
                    return Err(AggregateError::overlap(format!(
                        "{:?} dimension coordinate values overlap ({} >= {})",
                        name, last, first
                    )));
                }
            }
        }

        if !leader.first_bounds.contains_key(axis) {
            return Ok(());
        }
        for pair in group.windows(2) {
            let (Some(last), Some(first)) = (pair[0].last_bounds.get(axis), pair[1].first_bounds.get(axis)) else {
                return Err(AggregateError::overlap(format!(
                    "{:?} dimension coordinate bounds missing on some fields",
                    name
                )));
            };
            let (Some(&upper), Some(&lower)) = (last.get(1), first.first()) else {
                return Err(AggregateError::overlap(format!(
                    "{:?} dimension coordinate bounds have fewer than 2 vertices",
                    name
                )));
            };
            if no_overlap && lower < upper {
                return Err(AggregateError::overlap(format!(
                    "{:?} dimension coordinate bounds values overlap ({} < {})",
                    name, lower, upper
                )));
            }
            if contiguous && upper < lower {
                return Err(AggregateError::overlap(format!(
                    "{:?} dimension coordinate cells are not contiguous ({} < {})",
                    name, upper, lower
                )));
            }
        }
        return Ok(());
    }

    for (i, identity) in descriptor.ids.iter().enumerate() {
        let mut seen = BTreeSet::new();
        let mut count = 0;
        for probe in group {
            let Some(axis_descriptor) = probe.axes.get(axis) else {
                continue;
            };
            let data = axis_descriptor
                .keys
                .get(i)
                .and_then(|key| probe.field.coordinate(key))
                .and_then(|c| c.data.as_ref());
            let Some(data) = data else {
                continue;
            };
            let data = data.convert_units(&axis_descriptor.units[i])?;
            let values = cell_values(&data);
            count += values.len();
            seen.extend(values);
            if seen.len() != count {
                return Err(AggregateError::overlap(format!(
                    "no {:?} dimension coordinates and {:?} auxiliary coordinates have duplicate values",
                    identity, identity
                )));
            }
        }
    }
    Ok(())
}
