//! Per-field summaries used to decide which fields can be aggregated.
//!
//! A [`Probe`] records, for one field, the identities and canonical units
//! of every construct, how the axes are described by 1-d coordinates, the
//! properties that must agree across a group and the structural signature
//! derived from all of these. Hashes and first/last coordinate values are
//! filled in later by [`crate::hashing::HashBuilder`].

use std::collections::{BTreeMap, BTreeSet};

use cf_model::{CellMethods, CoordRefSignature, Data, Field, PropertyValue, Units, Variable};
use tracing::{debug, info};

use crate::config::AggregateOptions;
use crate::context::AggregationContext;
use crate::error::{AggregateError, Result};
use crate::signature::StructuralSignature;
use crate::types::{CellValue, HashEntry, SortOrder};

/// The 1-d coordinates describing one axis.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisDescriptor {
    /// Key of the axis in the field.
    pub key: String,
    /// Coordinate identities: the dimension coordinate first, then
    /// auxiliaries sorted by identity.
    pub ids: Vec<String>,
    pub keys: Vec<String>,
    pub units: Vec<Units>,
    pub has_bounds: Vec<bool>,
    pub coordrefs: Vec<Vec<String>>,
    pub dim_coord_index: Option<usize>,
    /// Axis size, recorded only when no 1-d coordinates exist.
    pub size: Option<usize>,
    pub ncdim: Option<String>,
}

/// An N-d auxiliary coordinate, cell measure or ancillary.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstructSummary {
    pub key: String,
    /// Sorted identities of the spanned axes.
    pub axes: Vec<String>,
    pub units: Units,
    pub has_bounds: bool,
    pub coordrefs: Vec<String>,
    pub hash: HashEntry,
}

impl ConstructSummary {
    pub fn spans(&self, axis: &str) -> bool {
        self.axes.iter().any(|a| a == axis)
    }
}

/// A field that could not be probed, returned with the reason.
#[derive(Debug)]
pub struct Rejected {
    pub field: Field,
    pub reason: AggregateError,
}

/// Field attribute whose value, when present, replaces the derived
/// structural signature.
pub const SIGNATURE_OVERRIDE_ATTRIBUTE: &str = "aggregate";

/// Aggregation summary of one field.
#[derive(Debug, Clone, Default)]
pub struct Probe {
    pub field: Field,
    pub identity: Option<String>,
    pub units: Units,
    pub has_data: bool,
    /// Axis identity to descriptor.
    pub axes: BTreeMap<String, AxisDescriptor>,
    pub id_to_axis: BTreeMap<String, String>,
    pub axis_to_id: BTreeMap<String, String>,
    pub nd_aux: BTreeMap<String, ConstructSummary>,
    /// Canonical units string to cell measures sorted by axes.
    pub cell_measures: BTreeMap<String, Vec<ConstructSummary>>,
    pub field_ancillaries: BTreeMap<String, ConstructSummary>,
    pub domain_ancillaries: BTreeMap<String, ConstructSummary>,
    pub cell_methods: Option<CellMethods>,
    pub coordref_signatures: Vec<CoordRefSignature>,
    /// Properties that must match across a group; `None` marks a property
    /// that must only exist.
    pub properties: Vec<(String, Option<String>)>,
    pub signature: StructuralSignature,
    /// Per axis identity, one hash per 1-d coordinate.
    pub hashes: BTreeMap<String, Vec<HashEntry>>,
    pub first_values: BTreeMap<String, Vec<CellValue>>,
    pub last_values: BTreeMap<String, Vec<CellValue>>,
    pub first_bounds: BTreeMap<String, Vec<f64>>,
    pub last_bounds: BTreeMap<String, Vec<f64>>,
    pub sort_orders: BTreeMap<String, SortOrder>,
    /// Axis along which this probe is currently being merged.
    pub a_identity: Option<String>,
    pub aggregated_field: bool,
}

struct CoordInfo {
    identity: String,
    key: String,
    units: Units,
    has_bounds: bool,
    coordrefs: Vec<String>,
}

fn coordinate_identity(variable: &Variable, options: &AggregateOptions) -> Option<String> {
    if !variable.has_data() {
        return None;
    }
    variable.identity(options.strict_identities(), options.ncvar_identities)
}

fn field_identity(field: &Field, options: &AggregateOptions) -> Option<String> {
    if let Some(name) = field.property_text("standard_name") {
        return Some(name.to_string());
    }
    if options.field_long_name_identities {
        if let Some(name) = field.property_text("long_name") {
            return Some(name.to_string());
        }
    }
    if options.ncvar_identities {
        if let Some(ncvar) = &field.ncvar {
            return Some(ncvar.clone());
        }
    }
    field.identity(options.strict_identities(), false)
}

/// Coordinate bounds need a trailing vertex dimension of at least two.
fn check_bounds(variable: &Variable, what: &str) -> Result<()> {
    match variable.bounds.as_ref().map(|b| b.shape().last().copied().unwrap_or(0)) {
        Some(vertices) if vertices < 2 => Err(AggregateError::not_aggregatable(format!(
            "{} bounds have {} vertices; at least 2 are required",
            what, vertices
        ))),
        _ => Ok(()),
    }
}

/// Names of the coordinate references that list `key` among their
/// coordinates.
fn coordrefs_of(field: &Field, key: &str) -> Vec<String> {
    let mut names: Vec<String> = field
        .coordinate_references
        .values()
        .filter(|r| r.coordinates.contains(key))
        .filter_map(|r| r.name.clone())
        .collect();
    names.sort();
    names
}

/// Replace each configured property by a new size-1 axis carrying an
/// auxiliary coordinate with the property's value.
fn promote_properties(field: &mut Field, names: &[String]) -> Result<()> {
    for name in names {
        let Some(value) = field.del_property(name) else {
            continue;
        };
        let data = match value {
            PropertyValue::Number(v) => Data::from_vec(vec![v], Units::new("1")),
            PropertyValue::Numbers(vs) if vs.len() == 1 => Data::from_vec(vs, Units::new("1")),
            other => Data::from_strings(&[1], vec![other.to_string()])?,
        };
        let coordinate = Variable::new(data)
            .with_id(name)
            .with_long_name(name)
            .with_ncvar(name);
        let axis = field.add_axis(1);
        field.add_auxiliary_coordinate(coordinate, &[&axis])?;
    }
    Ok(())
}

impl Probe {
    /// Probe a field. Rejected fields come back unchanged together with the
    /// reason.
    pub fn build(
        field: Field,
        options: &AggregateOptions,
        ctx: &mut AggregationContext,
    ) -> std::result::Result<Probe, Rejected> {
        if let Some(signature) = field.attributes.get(SIGNATURE_OVERRIDE_ATTRIBUTE).cloned() {
            let probe = Probe {
                identity: field_identity(&field, options),
                units: field.units.clone(),
                has_data: field.data.is_some(),
                signature: StructuralSignature {
                    overridden: Some(signature),
                    ..StructuralSignature::default()
                },
                field,
                ..Probe::default()
            };
            if options.info >= 2 {
                debug!(
                    identity = probe.identity.as_deref().unwrap_or("<none>"),
                    signature = probe.signature.overridden.as_deref().unwrap_or_default(),
                    "structural signature overridden"
                );
            }
            return Ok(probe);
        }

        let original = (!options.dimension.is_empty()).then(|| field.clone());
        let mut field = field;
        let described = promote_properties(&mut field, &options.dimension)
            .and_then(|()| Self::describe(&field, options, ctx));
        match described {
            Ok(mut probe) => {
                probe.field = field;
                Ok(probe)
            }
            Err(reason) => {
                if options.info >= 1 {
                    info!(
                        field = field_identity(&field, options).as_deref().unwrap_or("<unknown>"),
                        %reason,
                        "field is not aggregatable"
                    );
                }
                Err(Rejected {
                    field: original.unwrap_or(field),
                    reason,
                })
            }
        }
    }

    fn canonical_units(
        ctx: &mut AggregationContext,
        options: &AggregateOptions,
        identity: Option<&str>,
        variable: &Variable,
        what: &str,
    ) -> Result<Units> {
        ctx.units
            .canonicalise(identity, &variable.units(), options.relaxed_units, variable.is_text())
            .ok_or_else(|| {
                AggregateError::not_aggregatable(format!(
                    "{} has no units; consider setting relaxed_units",
                    what
                ))
            })
    }

    /// Summarise `field` without taking ownership. The returned probe has
    /// an empty placeholder field.
    fn describe(field: &Field, options: &AggregateOptions, ctx: &mut AggregationContext) -> Result<Probe> {
        let strict = options.strict_identities();
        let identity = field_identity(field, options);
        let has_data = field.data.is_some();

        if identity.is_none() && has_data && !options.allow_no_identity {
            return Err(AggregateError::not_aggregatable(
                "field has no identity; consider setting relaxed_identities or allow_no_identity",
            ));
        }
        if identity.is_some() && !has_data {
            return Err(AggregateError::not_aggregatable("no data array"));
        }

        let field_variable = Variable {
            data: field.data.clone().map(|mut d| {
                d.set_units(field.units.clone());
                d
            }),
            ..Variable::default()
        };
        let units = if field_variable.has_data() {
            Self::canonical_units(ctx, options, identity.as_deref(), &field_variable, "field")?
        } else {
            ctx.units
                .canonicalise(identity.as_deref(), &field.units, true, false)
                .unwrap_or_default()
        };

        // Axes and their 1-d coordinates
        let mut axes = BTreeMap::new();
        let mut id_to_axis = BTreeMap::new();
        let mut axis_to_id = BTreeMap::new();
        let mut dim_identities = BTreeSet::new();

        for (axis_key, domain_axis) in &field.axes {
            let mut info_1d: Vec<CoordInfo> = Vec::new();
            let mut seen = BTreeSet::new();
            let mut dim_coord_index = None;

            if let Some(dc) = field.dimension_coordinates.get(axis_key) {
                let id = coordinate_identity(dc, options).ok_or_else(|| {
                    AggregateError::not_aggregatable(format!(
                        "dimension coordinate of axis {} has no identity or no data",
                        axis_key
                    ))
                })?;
                if !dim_identities.insert(id.clone()) {
                    return Err(AggregateError::not_aggregatable(format!(
                        "multiple dimension coordinates with identity {}",
                        id
                    )));
                }
                check_bounds(dc, &format!("{} dimension coordinate", id))?;
                let units = Self::canonical_units(ctx, options, Some(&id), dc, &format!("{} coordinate", id))?;
                seen.insert(id.clone());
                dim_coord_index = Some(0);
                info_1d.push(CoordInfo {
                    identity: id,
                    key: axis_key.clone(),
                    units,
                    has_bounds: dc.bounds.is_some(),
                    coordrefs: coordrefs_of(field, axis_key),
                });
            }

            let mut aux_info = Vec::new();
            for (aux_key, aux) in &field.auxiliary_coordinates {
                if aux.axes.len() != 1 || aux.axes[0] != *axis_key {
                    continue;
                }
                let id = coordinate_identity(&aux.variable, options).ok_or_else(|| {
                    AggregateError::not_aggregatable(format!(
                        "auxiliary coordinate {} has no identity or no data",
                        aux_key
                    ))
                })?;
                if !seen.insert(id.clone()) {
                    return Err(AggregateError::not_aggregatable(format!(
                        "multiple 1-d coordinates with identity {} on one axis",
                        id
                    )));
                }
                check_bounds(&aux.variable, &format!("{} auxiliary coordinate", id))?;
                let units =
                    Self::canonical_units(ctx, options, Some(&id), &aux.variable, &format!("{} coordinate", id))?;
                aux_info.push(CoordInfo {
                    identity: id,
                    key: aux_key.clone(),
                    units,
                    has_bounds: aux.variable.bounds.is_some(),
                    coordrefs: coordrefs_of(field, aux_key),
                });
            }
            aux_info.sort_by(|a, b| a.identity.cmp(&b.identity));
            info_1d.extend(aux_info);

            let (axis_identity, size) = match info_1d.first() {
                Some(first) => (first.identity.clone(), None),
                None if options.relaxed_identities => match &domain_axis.ncdim {
                    Some(ncdim) => (ncdim.clone(), Some(domain_axis.size)),
                    None => {
                        return Err(AggregateError::not_aggregatable(format!(
                            "axis {} has no coordinates and no netCDF dimension name",
                            axis_key
                        )))
                    }
                },
                None => {
                    return Err(AggregateError::not_aggregatable(format!(
                        "axis {} has no 1-d coordinates; consider setting relaxed_identities",
                        axis_key
                    )))
                }
            };

            if axes.contains_key(&axis_identity) {
                return Err(AggregateError::not_aggregatable(format!(
                    "multiple axes with identity {}",
                    axis_identity
                )));
            }

            id_to_axis.insert(axis_identity.clone(), axis_key.clone());
            axis_to_id.insert(axis_key.clone(), axis_identity.clone());
            axes.insert(
                axis_identity,
                AxisDescriptor {
                    key: axis_key.clone(),
                    ids: info_1d.iter().map(|c| c.identity.clone()).collect(),
                    keys: info_1d.iter().map(|c| c.key.clone()).collect(),
                    units: info_1d.iter().map(|c| c.units.clone()).collect(),
                    has_bounds: info_1d.iter().map(|c| c.has_bounds).collect(),
                    coordrefs: info_1d.iter().map(|c| c.coordrefs.clone()).collect(),
                    dim_coord_index,
                    size,
                    ncdim: domain_axis.ncdim.clone(),
                },
            );
        }

        let canonical_axes = |keys: &[String]| -> Vec<String> {
            let mut ids: Vec<String> = keys
                .iter()
                .map(|k| axis_to_id.get(k).cloned().unwrap_or_else(|| k.clone()))
                .collect();
            ids.sort();
            ids
        };

        // N-d auxiliary coordinates
        let mut nd_aux = BTreeMap::new();
        for (key, aux) in &field.auxiliary_coordinates {
            if aux.axes.len() < 2 {
                continue;
            }
            let id = coordinate_identity(&aux.variable, options).ok_or_else(|| {
                AggregateError::not_aggregatable(format!(
                    "auxiliary coordinate {} has no identity or no data",
                    key
                ))
            })?;
            if nd_aux.contains_key(&id) || axes.contains_key(&id) {
                return Err(AggregateError::not_aggregatable(format!(
                    "multiple coordinates with identity {}",
                    id
                )));
            }
            check_bounds(&aux.variable, &format!("{} auxiliary coordinate", id))?;
            let units = Self::canonical_units(ctx, options, Some(&id), &aux.variable, &format!("{} coordinate", id))?;
            nd_aux.insert(
                id,
                ConstructSummary {
                    key: key.clone(),
                    axes: canonical_axes(&aux.axes),
                    units,
                    has_bounds: aux.variable.bounds.is_some(),
                    coordrefs: coordrefs_of(field, key),
                    hash: HashEntry::Skipped,
                },
            );
        }

        // Cell methods, with axis keys replaced by axis identities
        let cell_methods = if field.cell_methods.is_empty() {
            None
        } else {
            let renamed = field
                .cell_methods
                .map_axes(|a| axis_to_id.get(a).cloned().unwrap_or_else(|| a.to_string()));
            Some(ctx.cell_methods.canonicalise(&renamed, options.rtol, options.atol))
        };

        // Field ancillaries
        let mut field_ancillaries = BTreeMap::new();
        for (key, anc) in &field.field_ancillaries {
            let id = coordinate_identity(&anc.variable, options).ok_or_else(|| {
                AggregateError::not_aggregatable(format!(
                    "field ancillary {} has no identity or no data",
                    key
                ))
            })?;
            if field_ancillaries.contains_key(&id) {
                return Err(AggregateError::not_aggregatable(format!(
                    "multiple field ancillaries with identity {}",
                    id
                )));
            }
            let units = Self::canonical_units(ctx, options, Some(&id), &anc.variable, &format!("{} field ancillary", id))?;
            field_ancillaries.insert(
                id,
                ConstructSummary {
                    key: key.clone(),
                    axes: canonical_axes(&anc.axes),
                    units,
                    has_bounds: false,
                    coordrefs: Vec::new(),
                    hash: HashEntry::Skipped,
                },
            );
        }

        // Coordinate references
        let mut coordref_signatures = Vec::new();
        for (key, reference) in &field.coordinate_references {
            if reference.name.is_none() {
                return Err(AggregateError::not_aggregatable(format!(
                    "coordinate reference {} has no name",
                    key
                )));
            }
            coordref_signatures.push(reference.structural_signature());
        }
        coordref_signatures.sort();

        // Domain ancillaries: formula terms first, under (reference, term)
        let mut domain_ancillaries = BTreeMap::new();
        let mut claimed = BTreeSet::new();
        let mut add_domain_ancillary =
            |ctx: &mut AggregationContext, identity: String, key: &String| -> Result<()> {
                let Some(anc) = field.domain_ancillaries.get(key) else {
                    return Ok(());
                };
                if !anc.variable.has_data() {
                    return Err(AggregateError::not_aggregatable(format!(
                        "domain ancillary {} has no data",
                        key
                    )));
                }
                if domain_ancillaries.contains_key(&identity) {
                    return Err(AggregateError::not_aggregatable(format!(
                        "multiple domain ancillaries with identity {}",
                        identity
                    )));
                }
                let units = Self::canonical_units(
                    ctx,
                    options,
                    Some(&identity),
                    &anc.variable,
                    &format!("{} domain ancillary", identity),
                )?;
                domain_ancillaries.insert(
                    identity,
                    ConstructSummary {
                        key: key.clone(),
                        axes: canonical_axes(&anc.axes),
                        units,
                        has_bounds: anc.variable.bounds.is_some(),
                        coordrefs: Vec::new(),
                        hash: HashEntry::Skipped,
                    },
                );
                Ok(())
            };
        for reference in field.coordinate_references.values() {
            let name = reference.name.clone().unwrap_or_default();
            for (term, anc_key) in &reference.ancillaries {
                if field.domain_ancillaries.contains_key(anc_key) && claimed.insert(anc_key.clone()) {
                    add_domain_ancillary(ctx, format!("({}, {})", name, term), anc_key)?;
                }
            }
        }
        for (key, anc) in &field.domain_ancillaries {
            if claimed.contains(key) {
                continue;
            }
            let id = anc.variable.identity(strict, options.ncvar_identities).ok_or_else(|| {
                AggregateError::not_aggregatable(format!("domain ancillary {} has no identity", key))
            })?;
            add_domain_ancillary(ctx, id, key)?;
        }

        // Cell measures, grouped by canonical units
        let mut cell_measures: BTreeMap<String, Vec<ConstructSummary>> = BTreeMap::new();
        for (key, msr) in &field.cell_measures {
            let msr_units = msr.variable.units();
            if !msr_units.is_defined() {
                return Err(AggregateError::not_aggregatable(format!(
                    "cell measure {} has no units",
                    key
                )));
            }
            if !msr.variable.has_data() {
                return Err(AggregateError::not_aggregatable(format!(
                    "cell measure {} has no data",
                    key
                )));
            }
            let id = msr
                .variable
                .measure
                .clone()
                .or_else(|| msr.variable.identity(strict, options.ncvar_identities));
            let units = ctx
                .units
                .canonicalise(id.as_deref(), &msr_units, false, false)
                .unwrap_or(msr_units);
            let measure_axes = canonical_axes(&msr.axes);
            let group = cell_measures.entry(units.formatted()).or_default();
            if group.iter().any(|m| m.axes == measure_axes) {
                return Err(AggregateError::not_aggregatable(format!(
                    "multiple cell measures with units {} over axes {:?}",
                    units, measure_axes
                )));
            }
            group.push(ConstructSummary {
                key: key.clone(),
                axes: measure_axes,
                units,
                has_bounds: false,
                coordrefs: Vec::new(),
                hash: HashEntry::Skipped,
            });
        }
        for group in cell_measures.values_mut() {
            group.sort_by(|a, b| a.axes.cmp(&b.axes));
        }

        let properties = Self::comparable_properties(field, options);

        let mut probe = Probe {
            field: Field::default(),
            identity,
            units,
            has_data,
            axes,
            id_to_axis,
            axis_to_id,
            nd_aux,
            cell_measures,
            field_ancillaries,
            domain_ancillaries,
            cell_methods,
            coordref_signatures,
            properties,
            signature: StructuralSignature::default(),
            hashes: BTreeMap::new(),
            first_values: BTreeMap::new(),
            last_values: BTreeMap::new(),
            first_bounds: BTreeMap::new(),
            last_bounds: BTreeMap::new(),
            sort_orders: BTreeMap::new(),
            a_identity: None,
            aggregated_field: false,
        };
        probe.signature = StructuralSignature::derive(&probe, field, options.respect_valid);
        if options.info >= 2 {
            debug!(
                identity = probe.identity.as_deref().unwrap_or("<none>"),
                signature = %probe.signature.describe(),
                "structural signature"
            );
        }
        Ok(probe)
    }

    /// Properties selected by `equal`, `exist`, `equal_all` and `exist_all`,
    /// excluding ignored and signature properties.
    fn comparable_properties(field: &Field, options: &AggregateOptions) -> Vec<(String, Option<String>)> {
        if !(options.equal_all || options.exist_all || !options.equal.is_empty() || !options.exist.is_empty()) {
            return Vec::new();
        }
        let ignored = options.ignored_properties();
        let mut properties: Vec<(String, Option<String>)> = field
            .properties
            .iter()
            .filter(|(name, _)| !ignored.contains(*name))
            .filter_map(|(name, value)| {
                if options.equal.contains(name) {
                    Some((name.clone(), Some(value.canonical())))
                } else if options.exist.contains(name) {
                    Some((name.clone(), None))
                } else if options.equal_all {
                    Some((name.clone(), Some(value.canonical())))
                } else if options.exist_all {
                    Some((name.clone(), None))
                } else {
                    None
                }
            })
            .collect();
        properties.sort();
        properties
    }

    /// Pretty rendering of the structural signature.
    pub fn describe_signature(&self) -> String {
        self.signature.describe()
    }

    /// First and last canonical values of each axis's primary coordinate.
    pub fn coordinate_values(&self) -> BTreeMap<String, (CellValue, CellValue)> {
        self.axes
            .keys()
            .map(|id| {
                let first = self
                    .first_values
                    .get(id)
                    .and_then(|v| v.first().cloned())
                    .unwrap_or(CellValue::Missing);
                let last = self
                    .last_values
                    .get(id)
                    .and_then(|v| v.first().cloned())
                    .unwrap_or(CellValue::Missing);
                (id.clone(), (first, last))
            })
            .collect()
    }

    /// Axis identities of this probe, in signature order.
    pub fn axis_ids(&self) -> Vec<String> {
        self.axes.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_model::{CellMethod, CoordinateReference, Data};

    fn time_field(times: &[f64], units: &str) -> Field {
        let mut f = Field::new("air_temperature", Units::new("K"));
        let t = f.add_axis(times.len());
        f.set_dimension_coordinate(
            &t,
            Variable::new(Data::from_vec(times.to_vec(), Units::new(units))).with_standard_name("time"),
        )
        .unwrap();
        f.set_data(Data::from_vec(vec![1.0; times.len()], Units::new("K")), &[&t])
            .unwrap();
        f
    }

    fn probe(field: Field, options: &AggregateOptions) -> std::result::Result<Probe, Rejected> {
        let mut ctx = AggregationContext::default();
        Probe::build(field, options, &mut ctx)
    }

    #[test]
    fn test_axes_described() {
        let p = probe(time_field(&[0.0, 1.0], "days since 2000-01-01"), &AggregateOptions::default()).unwrap();
        assert_eq!(p.identity.as_deref(), Some("air_temperature"));
        assert_eq!(p.axis_ids(), vec!["time"]);
        let axis = &p.axes["time"];
        assert_eq!(axis.ids, vec!["time"]);
        assert_eq!(axis.dim_coord_index, Some(0));
        assert_eq!(axis.size, None);
        assert_eq!(p.id_to_axis["time"], "dim0");
    }

    #[test]
    fn test_equivalent_units_share_signature() {
        let mut ctx = AggregationContext::default();
        let options = AggregateOptions::default();
        let a = Probe::build(time_field(&[0.0], "days since 2000-01-01"), &options, &mut ctx).unwrap();
        let b = Probe::build(time_field(&[24.0], "hours since 2000-01-01"), &options, &mut ctx).unwrap();
        assert_eq!(a.signature, b.signature);
    }

    #[test]
    fn test_missing_units_rejected_unless_relaxed() {
        let mut field = time_field(&[0.0], "days since 2000-01-01");
        field.units = Units::none();
        if let Some(d) = field.data.as_mut() {
            d.set_units(Units::none());
        }
        let rejected = probe(field.clone(), &AggregateOptions::default()).unwrap_err();
        assert!(rejected.reason.to_string().contains("relaxed_units"));
        assert_eq!(rejected.field, field);

        let options = AggregateOptions {
            relaxed_units: true,
            ..Default::default()
        };
        assert!(probe(field, &options).is_ok());
    }

    #[test]
    fn test_no_identity() {
        let mut field = time_field(&[0.0], "days since 2000-01-01");
        field.del_property("standard_name");
        field.set_property("long_name", "temperature");
        assert!(probe(field.clone(), &AggregateOptions::default()).is_err());

        let options = AggregateOptions {
            field_long_name_identities: true,
            ..Default::default()
        };
        assert_eq!(probe(field, &options).unwrap().identity.as_deref(), Some("temperature"));
    }

    #[test]
    fn test_duplicate_axis_coordinates_rejected() {
        let mut field = time_field(&[0.0, 1.0], "days since 2000-01-01");
        let aux = Variable::new(Data::from_vec(vec![5.0, 6.0], Units::new("days since 2000-01-01")))
            .with_standard_name("time");
        field.add_auxiliary_coordinate(aux, &["dim0"]).unwrap();
        assert!(probe(field, &AggregateOptions::default()).is_err());
    }

    #[test]
    fn test_size_only_axis_needs_relaxed_identities() {
        let mut field = time_field(&[0.0], "days since 2000-01-01");
        field.add_axis_with_ncdim(1, "bnds");
        assert!(probe(field.clone(), &AggregateOptions::default()).is_err());

        let options = AggregateOptions {
            relaxed_identities: true,
            ..Default::default()
        };
        let p = probe(field, &options).unwrap();
        assert_eq!(p.axes["bnds"].size, Some(1));
    }

    #[test]
    fn test_property_promotion() {
        let field = time_field(&[0.0], "days since 2000-01-01").with_property("realization", "r1");
        let options = AggregateOptions {
            dimension: vec!["realization".to_string()],
            ..Default::default()
        };
        let p = probe(field, &options).unwrap();
        assert!(p.axes.contains_key("realization"));
        assert!(p.field.property("realization").is_none());
        assert_eq!(p.field.axes.len(), 2);
    }

    #[test]
    fn test_comparable_properties() {
        let field = time_field(&[0.0], "days since 2000-01-01")
            .with_property("source", "model")
            .with_property("history", "created")
            .with_property("valid_max", 400.0);
        let options = AggregateOptions {
            equal_all: true,
            exist: vec!["history".to_string()],
            ..Default::default()
        };
        let p = probe(field, &options).unwrap();
        assert_eq!(
            p.properties,
            vec![
                ("history".to_string(), None),
                ("source".to_string(), Some("model".to_string())),
            ]
        );
    }

    #[test]
    fn test_cell_methods_use_axis_identities() {
        let mut field = time_field(&[0.0], "days since 2000-01-01");
        field.cell_methods = CellMethods::new(vec![CellMethod::new(["dim0"], "mean")]);
        let p = probe(field, &AggregateOptions::default()).unwrap();
        assert_eq!(p.cell_methods.unwrap().to_string(), "time: mean");
    }

    #[test]
    fn test_unnamed_coordinate_reference_rejected() {
        let mut field = time_field(&[0.0], "days since 2000-01-01");
        field.add_coordinate_reference(CoordinateReference::default());
        assert!(probe(field, &AggregateOptions::default()).is_err());
    }

    #[test]
    fn test_cell_measure_checks() {
        let mut field = time_field(&[0.0, 1.0], "days since 2000-01-01");
        let area = Variable::new(Data::from_vec(vec![1.0, 1.0], Units::new("m2"))).with_measure("area");
        field.add_cell_measure(area.clone(), &["dim0"]).unwrap();
        field.add_cell_measure(area, &["dim0"]).unwrap();
        assert!(probe(field, &AggregateOptions::default()).is_err());

        let mut field = time_field(&[0.0, 1.0], "days since 2000-01-01");
        let unitless = Variable::new(Data::from_vec(vec![1.0, 1.0], Units::none())).with_measure("area");
        field.add_cell_measure(unitless, &["dim0"]).unwrap();
        assert!(probe(field, &AggregateOptions::default()).is_err());
    }

    #[test]
    fn test_single_vertex_bounds_rejected() {
        let mut field = time_field(&[0.0], "days since 2000-01-01");
        let bounds = Data::from_shape_vec(&[1, 1], vec![5.0], Units::new("days since 2000-01-01")).unwrap();
        field.dimension_coordinates.get_mut("dim0").unwrap().bounds = Some(bounds);
        let rejected = probe(field, &AggregateOptions::default()).unwrap_err();
        assert_eq!(rejected.reason.kind(), crate::error::ErrorKind::NotAggregatable);
        assert!(rejected.reason.to_string().contains("vertices"));

        let mut field = time_field(&[0.0, 1.0], "days since 2000-01-01");
        let aux = Variable::new(Data::from_vec(vec![6.0, 12.0], Units::new("hours")))
            .with_standard_name("forecast_period")
            .with_bounds(Data::from_shape_vec(&[2, 1], vec![0.0, 6.0], Units::new("hours")).unwrap());
        field.add_auxiliary_coordinate(aux, &["dim0"]).unwrap();
        assert!(probe(field, &AggregateOptions::default()).is_err());
    }

    #[test]
    fn test_field_without_data_rejected() {
        let mut field = time_field(&[0.0], "days since 2000-01-01");
        field.data = None;
        field.data_axes.clear();
        let rejected = probe(field, &AggregateOptions::default()).unwrap_err();
        assert!(rejected.reason.to_string().contains("no data array"));
    }

    #[test]
    fn test_signature_override_skips_description() {
        let mut field = time_field(&[0.0], "days since 2000-01-01")
            .with_property("realization", "r1")
            .with_attribute(SIGNATURE_OVERRIDE_ATTRIBUTE, "ensemble-a");
        // Would otherwise be rejected for having no identity.
        field.del_property("standard_name");
        let options = AggregateOptions {
            dimension: vec!["realization".to_string()],
            ..Default::default()
        };
        let p = probe(field.clone(), &options).unwrap();
        assert_eq!(p.signature.overridden.as_deref(), Some("ensemble-a"));
        assert!(p.axes.is_empty());
        assert_eq!(p.field, field);
    }
}
