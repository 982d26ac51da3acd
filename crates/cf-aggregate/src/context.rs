//! State shared across aggregation calls: canonical units, canonical cell
//! methods and the hash cache.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use cf_model::{CellMethods, Units};

use crate::cache::HashCache;
use crate::config::AggregateOptions;

/// Registry of canonical units per identity.
///
/// The first units seen for an identity become canonical; later units that
/// are equivalent map onto them, so `km` and `m` for the same coordinate
/// produce the same signature.
#[derive(Debug, Default)]
pub struct CanonicalUnits {
    by_identity: HashMap<Option<String>, Vec<Units>>,
}

impl CanonicalUnits {
    /// Canonical units for `units` under `identity`.
    ///
    /// Undefined units map to the no-units value when `relaxed` is set or
    /// the variable holds text, and are otherwise refused with `None`.
    pub fn canonicalise(
        &mut self,
        identity: Option<&str>,
        units: &Units,
        relaxed: bool,
        is_text: bool,
    ) -> Option<Units> {
        if !units.is_defined() {
            return (relaxed || is_text).then(Units::none);
        }
        let known = self
            .by_identity
            .entry(identity.map(str::to_string))
            .or_default();
        if let Some(canonical) = known.iter().find(|u| u.equivalent(units)) {
            return Some(canonical.clone());
        }
        known.push(units.clone());
        Some(units.clone())
    }

    pub fn len(&self) -> usize {
        self.by_identity.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_identity.is_empty()
    }
}

/// Registry of canonical cell methods.
#[derive(Debug, Default)]
pub struct CanonicalCellMethods {
    known: Vec<CellMethods>,
}

impl CanonicalCellMethods {
    /// The first registered cell methods equivalent to `methods`, or
    /// `methods` itself after registering it.
    pub fn canonicalise(&mut self, methods: &CellMethods, rtol: f64, atol: f64) -> CellMethods {
        if let Some(canonical) = self.known.iter().find(|cm| cm.equivalent(methods, rtol, atol)) {
            return canonical.clone();
        }
        self.known.push(methods.clone());
        methods.clone()
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}

/// Long-lived aggregation state. Registries only grow; the hash cache is
/// bounded per its capacity.
pub struct AggregationContext {
    pub units: CanonicalUnits,
    pub cell_methods: CanonicalCellMethods,
    pub cache: HashCache,
}

impl AggregationContext {
    pub fn new(hash_cache_entries: usize) -> Self {
        Self {
            units: CanonicalUnits::default(),
            cell_methods: CanonicalCellMethods::default(),
            cache: HashCache::new(hash_cache_entries),
        }
    }

    /// Drop all registered units, cell methods and cached hashes.
    pub fn reset(&mut self) {
        self.units = CanonicalUnits::default();
        self.cell_methods = CanonicalCellMethods::default();
        self.cache.clear();
    }

    /// Process-wide context used by [`crate::aggregate`].
    pub fn global() -> &'static Mutex<AggregationContext> {
        static GLOBAL: OnceLock<Mutex<AggregationContext>> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            Mutex::new(AggregationContext::new(
                AggregateOptions::default().hash_cache_entries,
            ))
        })
    }
}

impl Default for AggregationContext {
    fn default() -> Self {
        Self::new(AggregateOptions::default().hash_cache_entries)
    }
}
