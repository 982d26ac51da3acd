//! Configuration for field aggregation.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AggregateError, Result};

/// Properties that are part of a field's structural signature and so never
/// take part in the equal/exist property checks.
pub const SIGNATURE_PROPERTIES: &[&str] = &[
    "_FillValue",
    "add_offset",
    "calendar",
    "cell_methods",
    "flag_masks",
    "flag_meanings",
    "flag_values",
    "missing_value",
    "scale_factor",
    "standard_error_multiplier",
    "standard_name",
    "units",
    "valid_max",
    "valid_min",
    "valid_range",
];

/// Options controlling aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateOptions {
    /// Restrict aggregation to axes with these identities, in this order.
    pub axes: Option<Vec<String>>,

    /// Verbosity 0-3: 1 logs rejections, 2 adds signatures, 3 adds hashing.
    pub info: u8,

    /// Reject neighbouring fields whose coordinate bounds overlap.
    pub no_overlap: bool,

    /// Reject neighbouring fields whose coordinate bounds leave a gap.
    pub contiguous: bool,

    /// Treat missing units as "no units" instead of rejecting the field.
    pub relaxed_units: bool,

    /// Fall back to `long_name` and netCDF names when resolving identities.
    pub relaxed_identities: bool,

    /// Use netCDF variable names as identities.
    pub ncvar_identities: bool,

    /// Use the field's `long_name` as its identity.
    pub field_long_name_identities: bool,

    /// Accept fields without an identity.
    pub allow_no_identity: bool,

    /// Keep `valid_min`, `valid_max` and `valid_range` on merged fields.
    pub respect_valid: bool,

    /// Require every common property to be equal.
    pub equal_all: bool,

    /// Require every property to exist on all fields.
    pub exist_all: bool,

    /// Properties that must be equal.
    pub equal: Vec<String>,

    /// Properties that must exist on all fields.
    pub exist: Vec<String>,

    /// Properties excluded from the equal/exist checks.
    pub ignore: Vec<String>,

    /// Properties promoted to new size-1 axes before aggregation.
    pub dimension: Vec<String>,

    /// Join differing property values on merge instead of dropping them.
    pub concatenate: bool,

    /// Keep a snapshot of each group so a failed pass can be undone.
    pub copy: bool,

    /// Replace hashes of non-aggregating axes with placeholders.
    #[serde(alias = "donotchecknonaggregatingaxes")]
    pub do_not_check_non_aggregating_axes: bool,

    /// Drop fields that fail to aggregate instead of returning them.
    pub exclude: bool,

    pub rtol: f64,
    pub atol: f64,

    /// Require netCDF dimension names to agree when axes are matched.
    pub shared_nc_domain: bool,

    /// Non-CF attributes merged like properties (e.g. `file`).
    pub attributes: Vec<String>,

    /// Capacity of each file-pointer keyed hash cache.
    pub hash_cache_entries: usize,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            axes: None,
            info: 0,
            no_overlap: false,
            contiguous: false,
            relaxed_units: false,
            relaxed_identities: false,
            ncvar_identities: false,
            field_long_name_identities: false,
            allow_no_identity: false,
            respect_valid: false,
            equal_all: false,
            exist_all: false,
            equal: Vec::new(),
            exist: Vec::new(),
            ignore: Vec::new(),
            dimension: Vec::new(),
            concatenate: true,
            copy: true,
            do_not_check_non_aggregating_axes: false,
            exclude: false,
            rtol: 1e-12,
            atol: 1e-12,
            shared_nc_domain: false,
            attributes: vec!["file".to_string()],
            hash_cache_entries: 4096,
        }
    }
}

fn env_flag(val: &str) -> bool {
    val.to_lowercase() == "true" || val == "1"
}

fn env_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl AggregateOptions {
    /// Start from the defaults and apply `CF_AGGREGATE_*` environment
    /// variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("CF_AGGREGATE_RTOL") {
            if let Ok(rtol) = val.parse() {
                config.rtol = rtol;
            }
        }

        if let Ok(val) = std::env::var("CF_AGGREGATE_ATOL") {
            if let Ok(atol) = val.parse() {
                config.atol = atol;
            }
        }

        if let Ok(val) = std::env::var("CF_AGGREGATE_INFO") {
            if let Ok(info) = val.parse() {
                config.info = info;
            }
        }

        if let Ok(val) = std::env::var("CF_AGGREGATE_EXCLUDE") {
            config.exclude = env_flag(&val);
        }

        if let Ok(val) = std::env::var("CF_AGGREGATE_CONCATENATE") {
            config.concatenate = env_flag(&val);
        }

        if let Ok(val) = std::env::var("CF_AGGREGATE_RELAXED_UNITS") {
            config.relaxed_units = env_flag(&val);
        }

        if let Ok(val) = std::env::var("CF_AGGREGATE_RELAXED_IDENTITIES") {
            config.relaxed_identities = env_flag(&val);
        }

        if let Ok(val) = std::env::var("CF_AGGREGATE_AXES") {
            let axes = env_list(&val);
            config.axes = (!axes.is_empty()).then_some(axes);
        }

        if let Ok(val) = std::env::var("CF_AGGREGATE_HASH_CACHE_ENTRIES") {
            if let Ok(entries) = val.parse() {
                config.hash_cache_entries = entries;
            }
        }

        config
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.equal_all && self.exist_all {
            return Err(AggregateError::configuration(
                "equal_all and exist_all cannot both be set",
            ));
        }

        let equal: BTreeSet<&str> = self.equal.iter().map(String::as_str).collect();
        let exist: BTreeSet<&str> = self.exist.iter().map(String::as_str).collect();
        if let Some(both) = equal.intersection(&exist).next() {
            return Err(AggregateError::configuration(format!(
                "property {} cannot be in both equal and exist",
                both
            )));
        }

        if let Some(prop) = equal
            .iter()
            .chain(exist.iter())
            .find(|p| SIGNATURE_PROPERTIES.contains(*p))
        {
            return Err(AggregateError::configuration(format!(
                "{} is always checked and cannot be given in equal or exist",
                prop
            )));
        }

        if !(self.rtol.is_finite() && self.rtol >= 0.0) || !(self.atol.is_finite() && self.atol >= 0.0) {
            return Err(AggregateError::configuration(
                "rtol and atol must be finite and non-negative",
            ));
        }

        if self.info > 3 {
            return Err(AggregateError::configuration("info must be 0-3"));
        }

        if self.hash_cache_entries == 0 {
            return Err(AggregateError::configuration("hash_cache_entries must be > 0"));
        }

        Ok(())
    }

    /// Identities are strict unless a relaxed identity mode is selected.
    pub fn strict_identities(&self) -> bool {
        !(self.relaxed_identities || self.ncvar_identities || self.field_long_name_identities)
    }

    /// User-ignored properties together with the signature properties.
    pub fn ignored_properties(&self) -> BTreeSet<String> {
        self.ignore
            .iter()
            .cloned()
            .chain(SIGNATURE_PROPERTIES.iter().map(|p| p.to_string()))
            .collect()
    }
}
