//! Joining two probed fields along their one differing axis.

use std::collections::{BTreeMap, BTreeSet};

use cf_model::{CoordinateReference, Data, Field, Variable};
use tracing::debug;

use crate::config::AggregateOptions;
use crate::error::{AggregateError, Result};
use crate::probe::{ConstructSummary, Probe};

const AGGREGATED: &str = " :AGGREGATED: ";

fn variable<'f>(field: &'f Field, key: &str) -> Option<&'f Variable> {
    field
        .dimension_coordinates
        .get(key)
        .or_else(|| {
            [
                &field.auxiliary_coordinates,
                &field.cell_measures,
                &field.field_ancillaries,
                &field.domain_ancillaries,
            ]
            .into_iter()
            .find_map(|constructs| constructs.get(key))
            .map(|c| &c.variable)
        })
}

fn variable_mut<'f>(field: &'f mut Field, key: &str) -> Option<&'f mut Variable> {
    if let Some(dc) = field.dimension_coordinates.get_mut(key) {
        return Some(dc);
    }
    [
        &mut field.auxiliary_coordinates,
        &mut field.cell_measures,
        &mut field.field_ancillaries,
        &mut field.domain_ancillaries,
    ]
    .into_iter()
    .find_map(|constructs| constructs.get_mut(key))
    .map(|c| &mut c.variable)
}

/// Axis keys spanned by a construct, in storage order.
fn construct_axes(field: &Field, key: &str) -> Option<Vec<String>> {
    if field.dimension_coordinates.contains_key(key) {
        return Some(vec![key.to_string()]);
    }
    [
        &field.auxiliary_coordinates,
        &field.cell_measures,
        &field.field_ancillaries,
        &field.domain_ancillaries,
    ]
    .into_iter()
    .find_map(|constructs| constructs.get(key))
    .map(|c| c.axes.clone())
}

/// Join `d1` onto `d0` along `position`, in `d0`'s units. With a decreasing
/// axis `d1` goes first.
fn join(d0: &Data, d1: &Data, position: usize, increasing: bool) -> Result<Data> {
    let d1 = d1.convert_units(d0.units())?;
    let joined = if increasing {
        d0.concatenate(&d1, position)?
    } else {
        d1.concatenate(d0, position)?
    };
    Ok(joined)
}

fn join_optional(a: &Option<Data>, b: &Option<Data>, position: usize, increasing: bool) -> Result<Option<Data>> {
    match (a, b) {
        (Some(a), Some(b)) => Ok(Some(join(a, b, position, increasing)?)),
        (None, None) => Ok(None),
        _ => Err(AggregateError::incompatible(
            "data or bounds present on only one of a pair of constructs",
        )),
    }
}

/// Construct key pairs spanning `axis` in both fields, with the hashes
/// folded together as a side effect.
fn spanning_pairs(p0: &mut Probe, p1: &Probe, axis: &str) -> Result<Vec<(String, String)>> {
    let missing = |what: &str| AggregateError::incompatible(format!("{} missing on second field", what));

    let mut pairs = Vec::new();

    let (axis0, axis1) = match (p0.axes.get(axis), p1.axes.get(axis)) {
        (Some(a0), Some(a1)) => (a0, a1),
        _ => return Err(missing(axis)),
    };
    pairs.extend(axis0.keys.iter().cloned().zip(axis1.keys.iter().cloned()));

    let hashes1 = p1.hashes.get(axis).ok_or_else(|| missing(axis))?;
    if let Some(hashes0) = p0.hashes.get_mut(axis) {
        for (h0, h1) in hashes0.iter_mut().zip(hashes1) {
            h0.absorb(h1.clone());
        }
    }

    let mut fold = |s0: &mut ConstructSummary, s1: &ConstructSummary| {
        if s0.spans(axis) {
            pairs.push((s0.key.clone(), s1.key.clone()));
            s0.hash.absorb(s1.hash.clone());
        }
    };

    for (id, s0) in p0.nd_aux.iter_mut() {
        fold(s0, p1.nd_aux.get(id).ok_or_else(|| missing(id))?);
    }
    for (units, group0) in p0.cell_measures.iter_mut() {
        let group1 = p1.cell_measures.get(units).ok_or_else(|| missing(units))?;
        for (s0, s1) in group0.iter_mut().zip(group1) {
            fold(s0, s1);
        }
    }
    for (id, s0) in p0.field_ancillaries.iter_mut() {
        fold(s0, p1.field_ancillaries.get(id).ok_or_else(|| missing(id))?);
    }
    for (id, s0) in p0.domain_ancillaries.iter_mut() {
        fold(s0, p1.domain_ancillaries.get(id).ok_or_else(|| missing(id))?);
    }
    Ok(pairs)
}

/// Coordinate references in structural signature order.
fn sorted_references(field: &Field) -> Vec<&CoordinateReference> {
    let mut refs: Vec<_> = field.coordinate_references.values().collect();
    refs.sort_by_cached_key(|r| r.structural_signature());
    refs
}

/// Coordinate reference parameters must agree within tolerance.
fn check_coordinate_references(field0: &Field, field1: &Field, rtol: f64, atol: f64) -> Result<()> {
    let (refs0, refs1) = (sorted_references(field0), sorted_references(field1));
    if refs0.len() != refs1.len() {
        return Err(AggregateError::incompatible("different numbers of coordinate references"));
    }
    for (r0, r1) in refs0.into_iter().zip(refs1) {
        if r0.name != r1.name || !r0.parameters_allclose(r1, rtol, atol) {
            return Err(AggregateError::incompatible(format!(
                "coordinate reference {} has different parameter values",
                r0.name.as_deref().unwrap_or("<unnamed>")
            )));
        }
    }
    Ok(())
}

/// Merge properties and user attributes of `field1` into `field0`.
fn merge_properties(field0: &mut Field, field1: &Field, options: &AggregateOptions) {
    let names: BTreeSet<String> = field0
        .properties
        .keys()
        .chain(field1.properties.keys())
        .cloned()
        .collect();

    for name in names {
        if matches!(name.as_str(), "valid_min" | "valid_max" | "valid_range") {
            if !options.respect_valid {
                field0.del_property(&name);
            }
            continue;
        }
        if matches!(name.as_str(), "_FillValue" | "missing_value") {
            continue;
        }
        let value0 = field0.property(&name).cloned();
        let value1 = field1.property(&name).cloned();
        let equal = match (&value0, &value1) {
            (Some(a), Some(b)) => a.equals(b, options.rtol, options.atol),
            (None, None) => true,
            _ => false,
        };
        if equal {
            continue;
        }
        if options.concatenate {
            match (value0, value1) {
                (Some(a), Some(b)) => field0.set_property(&name, format!("{}{}{}", a, AGGREGATED, b)),
                (None, Some(b)) => field0.set_property(&name, format!("{}{}", AGGREGATED, b)),
                _ => {}
            }
        } else {
            field0.del_property(&name);
        }
    }

    for attr in &options.attributes {
        let value0 = field0.attributes.get(attr).cloned();
        let value1 = field1.attributes.get(attr).cloned();
        if value0 == value1 {
            continue;
        }
        if options.concatenate {
            match (value0, value1) {
                (Some(a), Some(b)) => {
                    field0.attributes.insert(attr.clone(), format!("{}{}{}", a, AGGREGATED, b));
                }
                (None, Some(b)) => {
                    field0.attributes.insert(attr.clone(), format!("{}{}", AGGREGATED, b));
                }
                _ => {}
            }
        } else {
            field0.attributes.remove(attr);
        }
    }
}

/// Merge `p1` into `p0` along `axis`. `p0` must precede `p1` in canonical
/// order along the axis and the two must agree everywhere else.
///
/// Both probes are consumed; on failure the caller restores its own copy.
pub fn merge_pair(mut p0: Probe, p1: Probe, axis: &str, options: &AggregateOptions) -> Result<Probe> {
    // axis0 -> axis1 by identity
    let mut to_axis1 = BTreeMap::new();
    let mut to_axis0 = BTreeMap::new();
    for (id, descriptor) in &p0.axes {
        let axis1 = p1
            .id_to_axis
            .get(id)
            .ok_or_else(|| AggregateError::incompatible(format!("axis {} missing on second field", id)))?;
        if options.shared_nc_domain {
            let ncdim1 = p1.axes.get(id).and_then(|a| a.ncdim.as_ref());
            if let (Some(n0), Some(n1)) = (&descriptor.ncdim, ncdim1) {
                if n0 != n1 {
                    return Err(AggregateError::incompatible(format!(
                        "axis {} has netCDF dimension {} on one field and {} on the other",
                        id, n0, n1
                    )));
                }
            }
        }
        to_axis1.insert(descriptor.key.clone(), axis1.clone());
        to_axis0.insert(axis1.clone(), descriptor.key.clone());
    }

    let adim0 = p0
        .id_to_axis
        .get(axis)
        .cloned()
        .ok_or_else(|| AggregateError::incompatible(format!("no axis {}", axis)))?;
    let adim1 = to_axis1
        .get(&adim0)
        .cloned()
        .ok_or_else(|| AggregateError::incompatible(format!("no axis {} on second field", axis)))?;

    check_coordinate_references(&p0.field, &p1.field, options.rtol, options.atol)?;

    let mut field1 = p1.field.clone();
    let increasing = p0.field.direction(&adim0);
    if field1.direction(&adim1) != increasing {
        field1.flip(&adim1)?;
    }

    // Constructs spanning the axis
    for (key0, key1) in spanning_pairs(&mut p0, &p1, axis)? {
        let axes0 = construct_axes(&p0.field, &key0)
            .ok_or_else(|| AggregateError::incompatible(format!("construct {} not found", key0)))?;
        let axes1 = construct_axes(&field1, &key1)
            .ok_or_else(|| AggregateError::incompatible(format!("construct {} not found", key1)))?;
        let order = axes0
            .iter()
            .map(|a0| {
                to_axis1
                    .get(a0)
                    .and_then(|a1| axes1.iter().position(|a| a == a1))
                    .ok_or_else(|| AggregateError::incompatible(format!("construct {} spans different axes", key1)))
            })
            .collect::<Result<Vec<_>>>()?;
        let position = axes0
            .iter()
            .position(|a| *a == adim0)
            .ok_or_else(|| AggregateError::incompatible(format!("construct {} does not span {}", key0, axis)))?;

        let item1 = variable(&field1, &key1)
            .ok_or_else(|| AggregateError::incompatible(format!("construct {} not found", key1)))?
            .permuted(&order)?;
        let item0 = variable_mut(&mut p0.field, &key0)
            .ok_or_else(|| AggregateError::incompatible(format!("construct {} not found", key0)))?;
        let data = join_optional(&item0.data, &item1.data, position, increasing)?;
        let bounds = join_optional(&item0.bounds, &item1.bounds, position, increasing)?;
        item0.data = data;
        item0.bounds = bounds;
    }

    // Field data
    let field0 = &mut p0.field;
    if p0.has_data {
        for a1 in field1.data_axes.clone() {
            let a0 = to_axis0
                .get(&a1)
                .ok_or_else(|| AggregateError::incompatible(format!("axis {} has no counterpart", a1)))?;
            if !field0.data_axes.contains(a0) {
                field0.expand_dims(0, a0)?;
            }
        }
        for a0 in field0.data_axes.clone() {
            let a1 = to_axis1
                .get(&a0)
                .ok_or_else(|| AggregateError::incompatible(format!("axis {} has no counterpart", a0)))?;
            if !field1.data_axes.contains(a1) {
                field1.expand_dims(0, a1)?;
            }
        }
        let position = match field0.data_axes.iter().position(|a| *a == adim0) {
            Some(position) => position,
            None => {
                field0.expand_dims(0, &adim0)?;
                field1.expand_dims(0, &adim1)?;
                0
            }
        };
        let target: Vec<String> = field0
            .data_axes
            .iter()
            .filter_map(|a0| to_axis1.get(a0).cloned())
            .collect();
        if target != field1.data_axes {
            field1.transpose_data(&target)?;
        }
        let joined = match (&field0.data, &field1.data) {
            (Some(d0), Some(d1)) => join(d0, d1, position, increasing)?,
            _ => return Err(AggregateError::incompatible("data present on only one field")),
        };
        field0.data = Some(joined);
    }

    let size1 = field1.axis_size(&adim1)?;
    if let Some(domain_axis) = field0.axes.get_mut(&adim0) {
        domain_axis.size += size1;
    }

    if field0.id.is_some() {
        if let Some(name) = field1.property("standard_name").cloned() {
            field0.set_property("standard_name", name);
            field0.id = None;
        }
    }

    merge_properties(field0, &field1, options);

    if let Some(last) = p1.last_values.get(axis) {
        p0.last_values.insert(axis.to_string(), last.clone());
    }
    if let Some(last) = p1.last_bounds.get(axis) {
        p0.last_bounds.insert(axis.to_string(), last.clone());
    }
    p0.aggregated_field = true;

    debug!(
        axis,
        size = p0.field.axes.get(&adim0).map(|a| a.size).unwrap_or_default(),
        "merged pair"
    );
    Ok(p0)
}
