//! Content fingerprints, sort orders and first/last values of probed
//! fields.
//!
//! Every array is first put into canonical form: widened to float unless it
//! holds text, converted to its canonical units and reordered so that each
//! axis runs in increasing order. The fingerprint of that canonical array
//! is then resolved through the [`HashCache`], which folds arrays equal
//! within tolerance onto a single fingerprint.

use std::collections::BTreeMap;

use cf_model::{Construct, Data, Units, Values, Variable};
use ndarray::ArrayD;
use sha2::{Digest, Sha256};
use tracing::trace;

use crate::cache::HashCache;
use crate::config::AggregateOptions;
use crate::error::{AggregateError, Result};
use crate::probe::{ConstructSummary, Probe};
use crate::types::{CellValue, Fingerprint, HashEntry, SortOrder};

/// SHA-256 over dtype name, shape, mask and elements in logical order,
/// truncated to 64 bits.
pub fn fingerprint(values: &Values, mask: Option<&ArrayD<bool>>) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(values.dtype_name().as_bytes());
    for &n in values.shape() {
        hasher.update((n as u64).to_le_bytes());
    }
    if let Some(mask) = mask {
        hasher.update(b"mask");
        for &m in mask.iter() {
            hasher.update([u8::from(m)]);
        }
    }
    match values {
        Values::Float(a) => {
            for v in a.iter() {
                hasher.update(v.to_le_bytes());
            }
        }
        Values::Int(a) => {
            for v in a.iter() {
                hasher.update(v.to_le_bytes());
            }
        }
        Values::Text(a) => {
            for s in a.iter() {
                hasher.update((s.len() as u64).to_le_bytes());
                hasher.update(s.as_bytes());
            }
        }
    }
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    Fingerprint(u64::from_le_bytes(bytes))
}

/// Indices that sort a 1-d array into increasing order.
fn argsort(data: &Data) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..data.size()).collect();
    match data.values() {
        Values::Text(a) => {
            let values: Vec<&String> = a.iter().collect();
            indices.sort_by(|&i, &j| values[i].cmp(values[j]));
        }
        _ => {
            let values = data.to_f64_vec().unwrap_or_default();
            indices.sort_by(|&i, &j| values[i].total_cmp(&values[j]));
        }
    }
    indices
}

/// Convert to canonical units and dtype, then reorder the leading
/// dimensions. Trailing dimensions (bounds vertices) are left alone.
fn canonicalise(data: &Data, units: &Units, sorts: &[&SortOrder]) -> Result<Data> {
    let mut data = data.convert_units(units)?.to_float();
    for (dim, order) in sorts.iter().enumerate() {
        data = match order {
            SortOrder::Identity => data,
            SortOrder::Reversed => data.reversed(dim)?,
            SortOrder::Permutation(indices) => data.select(dim, indices)?,
        };
    }
    Ok(data)
}

/// Sorted vertices of the first and last cells of 2-d bounds.
fn bounds_rows(bounds: &Data) -> Option<(Vec<f64>, Vec<f64>)> {
    let nv = *bounds.shape().last()?;
    let values = bounds.to_f64_vec()?;
    if nv == 0 || values.len() < nv {
        return None;
    }
    let mut first = values[..nv].to_vec();
    let mut last = values[values.len() - nv..].to_vec();
    first.sort_by(f64::total_cmp);
    last.sort_by(f64::total_cmp);
    Some((first, last))
}

struct Hashed {
    fingerprint: Fingerprint,
    first_last: Option<(CellValue, CellValue)>,
    first_last_bounds: Option<(Vec<f64>, Vec<f64>)>,
}

/// Fills in the hashes, first/last values and sort orders of probes.
pub struct HashBuilder<'a> {
    cache: &'a mut HashCache,
    rtol: f64,
    atol: f64,
    skip_non_aggregating: bool,
    info: u8,
}

impl<'a> HashBuilder<'a> {
    pub fn new(cache: &'a mut HashCache, options: &AggregateOptions) -> Self {
        Self {
            cache,
            rtol: options.rtol,
            atol: options.atol,
            skip_non_aggregating: options.do_not_check_non_aggregating_axes,
            info: options.info,
        }
    }

    fn hash_data(
        &mut self,
        data: &Data,
        units: &Units,
        sorts: &[&SortOrder],
        want_first_last: bool,
        want_bounds: bool,
    ) -> Result<Hashed> {
        let pointer = data.file_pointer().cloned();
        let cached = pointer.as_ref().and_then(|p| self.cache.hash(p));
        let cached_fl = if want_first_last {
            pointer.as_ref().and_then(|p| self.cache.first_last(p))
        } else {
            None
        };
        let cached_flb = if want_bounds {
            pointer.as_ref().and_then(|p| self.cache.first_last_bounds(p))
        } else {
            None
        };

        if let Some(fingerprint) = cached {
            if (!want_first_last || cached_fl.is_some()) && (!want_bounds || cached_flb.is_some()) {
                return Ok(Hashed {
                    fingerprint,
                    first_last: cached_fl,
                    first_last_bounds: cached_flb,
                });
            }
        }

        let array = canonicalise(data, units, sorts)?;

        let fingerprint = match cached {
            Some(fp) => fp,
            None => {
                let raw = fingerprint(array.values(), array.mask());
                let fp = self
                    .cache
                    .resolve(raw, array.values(), array.mask(), self.rtol, self.atol);
                if let Some(p) = &pointer {
                    self.cache.store_hash(p.clone(), fp);
                }
                fp
            }
        };

        let first_last = match (want_first_last, cached_fl) {
            (false, _) => None,
            (true, Some(fl)) => Some(fl),
            (true, None) => {
                let fl = (CellValue::from(array.first()), CellValue::from(array.last()));
                if let Some(p) = &pointer {
                    self.cache.store_first_last(p.clone(), fl.clone());
                }
                Some(fl)
            }
        };

        let first_last_bounds = match (want_bounds, cached_flb) {
            (false, _) => None,
            (true, Some(flb)) => Some(flb),
            (true, None) => {
                let flb = bounds_rows(&array);
                if let (Some(p), Some(flb)) = (&pointer, &flb) {
                    self.cache.store_first_last_bounds(p.clone(), flb.clone());
                }
                flb
            }
        };

        Ok(Hashed {
            fingerprint,
            first_last,
            first_last_bounds,
        })
    }

    /// Hash of a data array and, when present, its bounds.
    fn hash_variable(&mut self, variable: &Variable, units: &Units, sorts: &[&SortOrder]) -> Result<HashEntry> {
        let data = variable
            .data
            .as_ref()
            .ok_or_else(|| AggregateError::not_aggregatable("construct has no data"))?;
        let h = self.hash_data(data, units, sorts, false, false)?.fingerprint;
        match &variable.bounds {
            Some(bounds) => {
                let hb = self.hash_data(bounds, units, sorts, false, false)?.fingerprint;
                Ok(HashEntry::WithBounds(h, hb))
            }
            None => Ok(HashEntry::Array(h)),
        }
    }

    /// Hash a multi-axis construct after permuting it into canonical axis
    /// order.
    fn hash_construct(
        &mut self,
        construct: &Construct,
        summary: &ConstructSummary,
        axis_to_id: &BTreeMap<String, String>,
        sort_orders: &BTreeMap<String, SortOrder>,
    ) -> Result<HashEntry> {
        let order = summary
            .axes
            .iter()
            .map(|id| {
                construct
                    .axes
                    .iter()
                    .position(|key| axis_to_id.get(key) == Some(id))
                    .ok_or_else(|| {
                        AggregateError::not_aggregatable(format!(
                            "construct {} does not span axis {}",
                            summary.key, id
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        let variable = construct.variable.permuted(&order)?;
        let sorts: Vec<&SortOrder> = summary
            .axes
            .iter()
            .map(|id| sort_orders.get(id).unwrap_or(&SortOrder::Identity))
            .collect();
        self.hash_variable(&variable, &summary.units, &sorts)
    }

    /// Compute everything the grouping and overlap stages need for one
    /// probe. With `aggregating` set and non-aggregating checks disabled,
    /// axes outside `aggregating` and all multi-axis constructs get
    /// placeholders instead of hashes.
    pub fn build(&mut self, probe: &mut Probe, aggregating: Option<&[String]>) -> Result<()> {
        let skipping = self.skip_non_aggregating && aggregating.is_some();
        let field = &probe.field;

        let mut hashes = BTreeMap::new();
        let mut first_values = BTreeMap::new();
        let mut last_values = BTreeMap::new();
        let mut first_bounds = BTreeMap::new();
        let mut last_bounds = BTreeMap::new();
        let mut sort_orders = BTreeMap::new();

        for (id, axis) in &probe.axes {
            let skip = skipping && aggregating.is_some_and(|axes| !axes.contains(id));
            if skip {
                let n = axis.ids.len().max(1);
                hashes.insert(id.clone(), vec![HashEntry::Skipped; n]);
                first_values.insert(id.clone(), vec![CellValue::Skipped; n]);
                last_values.insert(id.clone(), vec![CellValue::Skipped; n]);
                sort_orders.insert(id.clone(), SortOrder::Identity);
                continue;
            }

            if let Some(size) = axis.size {
                hashes.insert(id.clone(), vec![HashEntry::Size(size)]);
                first_values.insert(id.clone(), vec![CellValue::Missing]);
                last_values.insert(id.clone(), vec![CellValue::Missing]);
                sort_orders.insert(id.clone(), SortOrder::Identity);
                continue;
            }

            let sort = if axis.dim_coord_index.is_some() {
                if field.direction(&axis.key) {
                    SortOrder::Identity
                } else {
                    SortOrder::Reversed
                }
            } else {
                let first = axis
                    .keys
                    .first()
                    .and_then(|key| field.coordinate(key))
                    .and_then(|c| c.data.as_ref())
                    .ok_or_else(|| {
                        AggregateError::not_aggregatable(format!("axis {} has no coordinate data", id))
                    })?;
                let indices = argsort(first);
                if indices.iter().enumerate().all(|(i, &j)| i == j) {
                    SortOrder::Identity
                } else {
                    SortOrder::Permutation(indices)
                }
            };

            let mut axis_hashes = Vec::with_capacity(axis.keys.len());
            let mut axis_first = Vec::with_capacity(axis.keys.len());
            let mut axis_last = Vec::with_capacity(axis.keys.len());

            for (i, (key, units)) in axis.keys.iter().zip(&axis.units).enumerate() {
                let coordinate = field.coordinate(key).ok_or_else(|| {
                    AggregateError::not_aggregatable(format!("coordinate {} not found", key))
                })?;
                let data = coordinate.data.as_ref().ok_or_else(|| {
                    AggregateError::not_aggregatable(format!("coordinate {} has no data", key))
                })?;
                let hashed = self.hash_data(data, units, &[&sort], true, false)?;
                let (first, last) = hashed
                    .first_last
                    .unwrap_or((CellValue::Missing, CellValue::Missing));
                axis_first.push(first);
                axis_last.push(last);

                let entry = match &coordinate.bounds {
                    Some(bounds) => {
                        let is_dim = axis.dim_coord_index == Some(i);
                        let hb = self.hash_data(bounds, units, &[&sort], false, is_dim)?;
                        if let Some((fb, lb)) = hb.first_last_bounds {
                            first_bounds.insert(id.clone(), fb);
                            last_bounds.insert(id.clone(), lb);
                        }
                        HashEntry::WithBounds(hashed.fingerprint, hb.fingerprint)
                    }
                    None => HashEntry::Array(hashed.fingerprint),
                };
                axis_hashes.push(entry);
            }

            hashes.insert(id.clone(), axis_hashes);
            first_values.insert(id.clone(), axis_first);
            last_values.insert(id.clone(), axis_last);
            sort_orders.insert(id.clone(), sort);
        }

        let constructs: [(&BTreeMap<String, Construct>, Vec<&mut ConstructSummary>); 4] = [
            (&field.auxiliary_coordinates, probe.nd_aux.values_mut().collect()),
            (
                &field.cell_measures,
                probe.cell_measures.values_mut().flatten().collect(),
            ),
            (&field.field_ancillaries, probe.field_ancillaries.values_mut().collect()),
            (&field.domain_ancillaries, probe.domain_ancillaries.values_mut().collect()),
        ];
        for (stored, summaries) in constructs {
            for summary in summaries {
                if skipping {
                    summary.hash = HashEntry::Skipped;
                    continue;
                }
                let construct = stored.get(&summary.key).ok_or_else(|| {
                    AggregateError::not_aggregatable(format!("construct {} not found", summary.key))
                })?;
                summary.hash = self.hash_construct(construct, summary, &probe.axis_to_id, &sort_orders)?;
            }
        }

        probe.hashes = hashes;
        probe.first_values = first_values;
        probe.last_values = last_values;
        probe.first_bounds = first_bounds;
        probe.last_bounds = last_bounds;
        probe.sort_orders = sort_orders;

        if self.info >= 3 {
            trace!(
                identity = probe.identity.as_deref().unwrap_or("<none>"),
                hashes = ?probe.hashes,
                first_values = ?probe.first_values,
                last_values = ?probe.last_values,
                "probe hashed"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AggregationContext;
    use cf_model::{Field, FilePointer};

    fn values(v: Vec<f64>) -> Values {
        Values::Float(ndarray::Array1::from(v).into_dyn())
    }

    fn probe_with_time(times: Vec<f64>, bounds: Option<Vec<f64>>, ctx: &mut AggregationContext) -> Probe {
        let mut f = Field::new("air_temperature", Units::new("K"));
        let n = times.len();
        let t = f.add_axis(n);
        let mut coord = Variable::new(Data::from_vec(times, Units::new("days since 2000-01-01")))
            .with_standard_name("time");
        if let Some(b) = bounds {
            coord = coord.with_bounds(Data::from_shape_vec(&[n, 2], b, Units::new("days since 2000-01-01")).unwrap());
        }
        f.set_dimension_coordinate(&t, coord).unwrap();
        f.set_data(Data::from_vec(vec![0.0; n], Units::new("K")), &[t.as_str()])
            .unwrap();
        Probe::build(f, &AggregateOptions::default(), ctx).unwrap()
    }

    #[test]
    fn test_fingerprint_depends_on_dtype_and_shape() {
        let a = fingerprint(&values(vec![1.0, 2.0]), None);
        let b = fingerprint(&Values::Int(ndarray::Array1::from(vec![1i64, 2]).into_dyn()), None);
        let c = fingerprint(&values(vec![1.0, 2.0, 3.0]), None);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, fingerprint(&values(vec![1.0, 2.0]), None));

        let mask = ArrayD::from_elem(ndarray::IxDyn(&[2]), false);
        assert_ne!(a, fingerprint(&values(vec![1.0, 2.0]), Some(&mask)));
    }

    #[test]
    fn test_decreasing_axis_hashes_like_increasing() {
        let mut ctx = AggregationContext::default();
        let options = AggregateOptions::default();
        let mut up = probe_with_time(vec![0.0, 1.0, 2.0], None, &mut ctx);
        let mut down = probe_with_time(vec![2.0, 1.0, 0.0], None, &mut ctx);
        HashBuilder::new(&mut ctx.cache, &options).build(&mut up, None).unwrap();
        HashBuilder::new(&mut ctx.cache, &options).build(&mut down, None).unwrap();

        assert_eq!(up.hashes["time"], down.hashes["time"]);
        assert_eq!(down.sort_orders["time"], SortOrder::Reversed);
        assert_eq!(down.first_values["time"], vec![CellValue::Number(0.0)]);
        assert_eq!(down.last_values["time"], vec![CellValue::Number(2.0)]);
    }

    #[test]
    fn test_first_last_bounds_sorted() {
        let mut ctx = AggregationContext::default();
        let options = AggregateOptions::default();
        let mut p = probe_with_time(vec![1.5, 0.5], Some(vec![2.0, 1.0, 1.0, 0.0]), &mut ctx);
        HashBuilder::new(&mut ctx.cache, &options).build(&mut p, None).unwrap();
        assert_eq!(p.first_bounds["time"], vec![0.0, 1.0]);
        assert_eq!(p.last_bounds["time"], vec![1.0, 2.0]);
        assert!(matches!(p.hashes["time"][0], HashEntry::WithBounds(_, _)));
    }

    #[test]
    fn test_equivalent_units_hash_equal() {
        let mut ctx = AggregationContext::default();
        let options = AggregateOptions::default();
        let mut days = probe_with_time(vec![1.0], None, &mut ctx);

        let mut f = Field::new("air_temperature", Units::new("K"));
        let t = f.add_axis(1);
        f.set_dimension_coordinate(
            &t,
            Variable::new(Data::from_vec(vec![24.0], Units::new("hours since 2000-01-01"))).with_standard_name("time"),
        )
        .unwrap();
        f.set_data(Data::from_vec(vec![0.0], Units::new("K")), &[t.as_str()]).unwrap();
        let mut hours = Probe::build(f, &options, &mut ctx).unwrap();

        HashBuilder::new(&mut ctx.cache, &options).build(&mut days, None).unwrap();
        HashBuilder::new(&mut ctx.cache, &options).build(&mut hours, None).unwrap();
        assert_eq!(days.hashes, hours.hashes);
    }

    #[test]
    fn test_skipped_axes() {
        let mut ctx = AggregationContext::default();
        let options = AggregateOptions {
            do_not_check_non_aggregating_axes: true,
            ..Default::default()
        };
        let mut p = probe_with_time(vec![0.0, 1.0], None, &mut ctx);
        HashBuilder::new(&mut ctx.cache, &options)
            .build(&mut p, Some(&["height".to_string()]))
            .unwrap();
        assert_eq!(p.hashes["time"], vec![HashEntry::Skipped]);
        assert_eq!(p.first_values["time"], vec![CellValue::Skipped]);
    }

    #[test]
    fn test_file_pointer_served_from_cache() {
        let mut ctx = AggregationContext::default();
        let options = AggregateOptions::default();
        let data = Data::from_vec(vec![3.0, 1.0, 2.0], Units::new("m")).with_file_pointer(FilePointer::new("a.nc:x"));
        let mut builder = HashBuilder::new(&mut ctx.cache, &options);
        let sort = SortOrder::Identity;
        let first = builder.hash_data(&data, &Units::new("m"), &[&sort], true, false).unwrap();
        let second = builder.hash_data(&data, &Units::new("m"), &[&sort], true, false).unwrap();
        assert_eq!(first.fingerprint, second.fingerprint);
        assert_eq!(second.first_last, Some((CellValue::Number(3.0), CellValue::Number(2.0))));
        assert!(ctx.cache.stats().hits >= 2);
    }

    #[test]
    fn test_argsort_text() {
        let data = Data::from_strings(&[3], vec!["b".into(), "c".into(), "a".into()]).unwrap();
        assert_eq!(argsort(&data), vec![2, 0, 1]);
    }
}
