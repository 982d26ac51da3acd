//! Top-level aggregation: probe, bucket, hash, then merge axis by axis.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::PoisonError;

use cf_model::{Field, PropertyValue};
use tracing::{debug, info, warn};

use crate::config::AggregateOptions;
use crate::context::AggregationContext;
use crate::error::{AggregateError, Result};
use crate::grouping::group_by_axis;
use crate::hashing::HashBuilder;
use crate::merge::merge_pair;
use crate::overlap::{check_coordinates, sort_by_first_values};
use crate::probe::Probe;
use crate::signature::SignatureIndex;
use crate::types::AggregateStatus;

static LAST_STATUS: AtomicU8 = AtomicU8::new(0);

/// Result of one aggregation call.
#[derive(Debug)]
pub struct AggregateOutcome {
    pub fields: Vec<Field>,
    pub status: AggregateStatus,
    /// One message per rejected field or abandoned group.
    pub diagnostics: Vec<String>,
}

/// Aggregation engine owning its options and context.
pub struct Aggregator {
    options: AggregateOptions,
    context: AggregationContext,
}

impl Aggregator {
    /// Create an aggregator with a private context.
    pub fn new(options: AggregateOptions) -> Result<Self> {
        options.validate()?;
        let context = AggregationContext::new(options.hash_cache_entries);
        Ok(Self { options, context })
    }

    /// Create an aggregator reusing an existing context, so canonical units
    /// and cached hashes carry over from earlier calls.
    pub fn with_context(options: AggregateOptions, context: AggregationContext) -> Result<Self> {
        options.validate()?;
        Ok(Self { options, context })
    }

    pub fn options(&self) -> &AggregateOptions {
        &self.options
    }

    pub fn context(&self) -> &AggregationContext {
        &self.context
    }

    pub fn into_context(self) -> AggregationContext {
        self.context
    }

    pub fn run(&mut self, fields: Vec<Field>) -> Result<AggregateOutcome> {
        aggregate_with_context(fields, &self.options, &mut self.context)
    }

    pub fn ensemble(&mut self, fields: Vec<Field>, property: &str) -> Result<Field> {
        ensemble_with_context(fields, property, &self.options, &mut self.context)
    }
}

/// Aggregate with the process-wide context and record the status for
/// [`last_status`].
pub fn aggregate(fields: Vec<Field>, options: &AggregateOptions) -> Result<Vec<Field>> {
    let mut ctx = AggregationContext::global()
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    let outcome = aggregate_with_context(fields, options, &mut ctx)?;
    LAST_STATUS.store(outcome.status.code(), Ordering::Relaxed);
    Ok(outcome.fields)
}

/// Status of the most recent [`aggregate`] call.
pub fn last_status() -> AggregateStatus {
    match LAST_STATUS.load(Ordering::Relaxed) {
        0 => AggregateStatus::Success,
        _ => AggregateStatus::Failed,
    }
}

/// Combine mutually unaggregatable fields into one along a new axis named
/// by `property`, using the process-wide context.
pub fn ensemble(fields: Vec<Field>, property: &str, options: &AggregateOptions) -> Result<Field> {
    let mut ctx = AggregationContext::global()
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    ensemble_with_context(fields, property, options, &mut ctx)
}

/// Map the requested axis names onto axis identities of `leader`. A name
/// matches an axis identity or the identity of any 1-d coordinate of the
/// axis.
fn resolve_axes(leader: &Probe, requested: Option<&[String]>) -> Vec<String> {
    let Some(requested) = requested else {
        return leader.axis_ids();
    };
    let mut resolved: Vec<String> = Vec::new();
    for name in requested {
        let found = if leader.axes.contains_key(name) {
            Some(name.clone())
        } else {
            leader
                .axes
                .iter()
                .find(|(_, axis)| axis.ids.contains(name))
                .map(|(id, _)| id.clone())
        };
        if let Some(id) = found {
            if !resolved.contains(&id) {
                resolved.push(id);
            }
        }
    }
    resolved
}

/// One pass along `axis`: group, check and merge.
fn run_pass(probes: Vec<Probe>, axis: &str, options: &AggregateOptions) -> Result<Vec<Probe>> {
    let groups = group_by_axis(probes, axis)?;
    debug!(axis, groups = groups.len(), "aggregation pass");

    let mut out = Vec::with_capacity(groups.len());
    for mut group in groups {
        if group.len() > 1 {
            sort_by_first_values(&mut group, axis);
            check_coordinates(&group, axis, options.no_overlap, options.contiguous)?;
        }
        let group_size = group.len();
        let mut members = group.into_iter();
        let Some(mut merged) = members.next() else {
            continue;
        };
        for next in members {
            merged = merge_pair(merged, next, axis, options)?;
        }
        merged.a_identity = None;
        if group_size > 1 {
            debug!(axis, group_size, merged = true, "subgroup merged");
        }
        out.push(merged);
    }
    Ok(out)
}

/// Aggregate `fields` using an explicit context.
pub fn aggregate_with_context(
    fields: Vec<Field>,
    options: &AggregateOptions,
    ctx: &mut AggregationContext,
) -> Result<AggregateOutcome> {
    options.validate()?;

    let mut status = AggregateStatus::Success;
    let mut diagnostics = Vec::new();
    let mut output = Vec::new();
    let mut index = SignatureIndex::new();

    for field in fields {
        match Probe::build(field, options, ctx) {
            Ok(probe) => index.insert(probe),
            Err(rejected) => {
                status = AggregateStatus::Failed;
                let identity = rejected.field.identity(false, false).unwrap_or_default();
                diagnostics.push(format!("{}: {}", identity, rejected.reason));
                if options.info >= 1 {
                    info!(
                        field = %identity,
                        reason = %rejected.reason,
                        excluded = options.exclude,
                        "unaggregatable field"
                    );
                }
                if !options.exclude {
                    output.push(rejected.field);
                }
            }
        }
    }

    debug!(
        buckets = index.len(),
        probes = index.probe_count(),
        "fields bucketed by signature"
    );

    for (_, mut probes) in index.into_buckets() {
        if probes.len() == 1 {
            output.extend(probes.into_iter().map(|p| p.field));
            continue;
        }

        let axes = match probes.first() {
            Some(leader) => resolve_axes(leader, options.axes.as_deref()),
            None => continue,
        };
        let aggregating = options.axes.as_ref().map(|_| axes.as_slice());

        let hashed = {
            let mut builder = HashBuilder::new(&mut ctx.cache, options);
            probes.iter_mut().try_for_each(|p| builder.build(p, aggregating))
        };
        if let Err(e) = hashed {
            status = AggregateStatus::Failed;
            diagnostics.push(e.to_string());
            warn!(error = %e, "failed to hash group");
            if !options.exclude {
                output.extend(probes.into_iter().map(|p| p.field));
            }
            continue;
        }

        if options.info >= 2 {
            for p in &probes {
                debug!(
                    identity = p.identity.as_deref().unwrap_or("<none>"),
                    signature = %p.describe_signature(),
                    coordinates = ?p.coordinate_values(),
                    "probe"
                );
            }
        }

        for axis in &axes {
            let snapshot = (options.copy || !options.exclude).then(|| probes.clone());
            match run_pass(std::mem::take(&mut probes), axis, options) {
                Ok(next) => probes = next,
                Err(e) => {
                    status = AggregateStatus::Failed;
                    diagnostics.push(format!("{}: {}", axis, e));
                    if options.info >= 1 {
                        info!(axis = %axis, reason = %e, excluded = options.exclude, "unaggregatable group");
                    }
                    probes = match (options.exclude, snapshot) {
                        (false, Some(saved)) => saved,
                        _ => Vec::new(),
                    };
                    break;
                }
            }
        }

        output.extend(probes.into_iter().map(|p| p.field));
    }

    Ok(AggregateOutcome {
        fields: output,
        status,
        diagnostics,
    })
}

/// Give every field a distinct value of `property`, then aggregate along
/// the new axis that property becomes. The inputs must not aggregate among
/// themselves and must combine into exactly one field.
pub fn ensemble_with_context(
    fields: Vec<Field>,
    property: &str,
    options: &AggregateOptions,
    ctx: &mut AggregationContext,
) -> Result<Field> {
    let count = fields.len();
    let check = aggregate_with_context(fields.clone(), options, ctx)?;
    if check.fields.len() != count {
        return Err(AggregateError::not_aggregatable(format!(
            "{} fields aggregate into {} without a new axis",
            count,
            check.fields.len()
        )));
    }

    let mut used = BTreeSet::new();
    let mut members = Vec::with_capacity(count);
    let mut pending = Vec::new();
    for field in fields {
        match field.property(property).map(PropertyValue::canonical) {
            Some(value) if used.insert(value.clone()) => {}
            _ => pending.push(members.len()),
        }
        members.push(field);
    }
    let mut next = 0usize;
    for i in pending {
        while used.contains(&next.to_string()) {
            next += 1;
        }
        used.insert(next.to_string());
        members[i].set_property(property, next.to_string());
    }

    let mut options = options.clone();
    if !options.dimension.iter().any(|d| d == property) {
        options.dimension.push(property.to_string());
    }
    let outcome = aggregate_with_context(members, &options, ctx)?;
    let mut fields = outcome.fields;
    match (fields.pop(), fields.is_empty()) {
        (Some(field), true) => Ok(field),
        _ => Err(AggregateError::not_aggregatable(format!(
            "fields do not combine into a single {} ensemble",
            property
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_model::{Data, Units, Variable};

    fn field(times: Vec<f64>) -> Field {
        let mut f = Field::new("air_temperature", Units::new("K"));
        let n = times.len();
        let t = f.add_axis(n);
        f.set_dimension_coordinate(
            &t,
            Variable::new(Data::from_vec(times.clone(), Units::new("days since 2000-01-01"))).with_standard_name("time"),
        )
        .unwrap();
        f.set_data(Data::from_vec(times, Units::new("K")), &[t.as_str()]).unwrap();
        f
    }

    #[test]
    fn test_resolve_axes_by_coordinate_identity() {
        let mut ctx = AggregationContext::default();
        let mut f = field(vec![0.0]);
        f.add_auxiliary_coordinate(
            Variable::new(Data::from_vec(vec![5.0], Units::new("days"))).with_standard_name("forecast_period"),
            &["dim0"],
        )
        .unwrap();
        let p = Probe::build(f, &AggregateOptions::default(), &mut ctx).unwrap();
        assert_eq!(resolve_axes(&p, None), vec!["time"]);
        let requested = vec!["forecast_period".to_string(), "time".to_string(), "height".to_string()];
        assert_eq!(resolve_axes(&p, Some(&requested)), vec!["time"]);
    }

    #[test]
    fn test_invalid_options_rejected() {
        let options = AggregateOptions {
            equal_all: true,
            exist_all: true,
            ..Default::default()
        };
        assert!(Aggregator::new(options).is_err());
    }

    #[test]
    fn test_run_merges_and_reports() {
        let mut aggregator = Aggregator::new(AggregateOptions::default()).unwrap();
        let outcome = aggregator
            .run(vec![field(vec![2.0, 3.0]), field(vec![0.0, 1.0])])
            .unwrap();
        assert_eq!(outcome.status, AggregateStatus::Success);
        assert_eq!(outcome.fields.len(), 1);
        assert_eq!(
            outcome.fields[0].data.as_ref().unwrap().to_f64_vec().unwrap(),
            vec![0.0, 1.0, 2.0, 3.0]
        );
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn test_failed_group_restored() {
        let mut aggregator = Aggregator::new(AggregateOptions::default()).unwrap();
        let outcome = aggregator
            .run(vec![field(vec![0.0, 1.0, 2.0]), field(vec![2.0, 3.0])])
            .unwrap();
        assert_eq!(outcome.status, AggregateStatus::Failed);
        assert_eq!(outcome.fields.len(), 2);
        assert_eq!(outcome.diagnostics.len(), 1);
    }

    #[test]
    fn test_failed_group_excluded() {
        let options = AggregateOptions {
            exclude: true,
            copy: false,
            ..Default::default()
        };
        let mut aggregator = Aggregator::new(options).unwrap();
        let outcome = aggregator
            .run(vec![field(vec![0.0, 1.0, 2.0]), field(vec![2.0, 3.0])])
            .unwrap();
        assert_eq!(outcome.status, AggregateStatus::Failed);
        assert!(outcome.fields.is_empty());
    }

    #[test]
    fn test_ensemble() {
        let mut aggregator = Aggregator::new(AggregateOptions::default()).unwrap();
        let members = vec![
            field(vec![0.0, 1.0]).with_property("realization", "r1"),
            field(vec![0.0, 1.0]).with_property("source", "model-b"),
        ];
        let combined = aggregator.ensemble(members, "realization").unwrap();
        assert_eq!(combined.data.as_ref().unwrap().shape(), &[2, 2]);
    }

    #[test]
    fn test_ensemble_duplicate_member_values_renumbered() {
        let mut aggregator = Aggregator::new(AggregateOptions::default()).unwrap();
        let members = vec![
            field(vec![0.0, 1.0]).with_property("realization", "r1"),
            field(vec![0.0, 1.0]).with_property("realization", "r1"),
        ];
        let combined = aggregator.ensemble(members, "realization").unwrap();
        assert_eq!(combined.data.as_ref().unwrap().shape(), &[2, 2]);
        assert!(combined.property("realization").is_none());
    }

    #[test]
    fn test_ensemble_rejects_aggregatable_inputs() {
        let mut aggregator = Aggregator::new(AggregateOptions::default()).unwrap();
        let members = vec![field(vec![0.0]), field(vec![1.0])];
        assert!(aggregator.ensemble(members, "realization").is_err());
    }
}
