//! Fingerprint cache for canonicalised arrays.
//!
//! Two layers:
//! - LRU maps from a data array's [`FilePointer`] to its fingerprint and
//!   first/last values, so arrays read from the same place are only
//!   canonicalised once;
//! - a never-evicted map from fingerprint to the canonical array, used to
//!   fold arrays that are equal within tolerance onto one fingerprint.

use std::collections::HashMap;
use std::num::NonZeroUsize;

use cf_model::{FilePointer, Values};
use lru::LruCache;
use ndarray::ArrayD;

use crate::types::{CellValue, Fingerprint, HashCacheStats};

struct CachedArray {
    values: Values,
    mask: Option<ArrayD<bool>>,
}

/// Cache of array fingerprints, keyed by file pointer and by content.
pub struct HashCache {
    hashes: LruCache<FilePointer, Fingerprint>,
    first_last: LruCache<FilePointer, (CellValue, CellValue)>,
    first_last_bounds: LruCache<FilePointer, (Vec<f64>, Vec<f64>)>,
    arrays: HashMap<Fingerprint, CachedArray>,
    by_shape: HashMap<(Vec<usize>, &'static str), Vec<Fingerprint>>,
    hits: u64,
    misses: u64,
    absorbed: u64,
}

impl HashCache {
    /// Create a cache holding up to `capacity` entries per pointer map.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            hashes: LruCache::new(capacity),
            first_last: LruCache::new(capacity),
            first_last_bounds: LruCache::new(capacity),
            arrays: HashMap::new(),
            by_shape: HashMap::new(),
            hits: 0,
            misses: 0,
            absorbed: 0,
        }
    }

    fn count<T>(&mut self, found: Option<T>) -> Option<T> {
        if found.is_some() {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        found
    }

    pub fn hash(&mut self, pointer: &FilePointer) -> Option<Fingerprint> {
        let found = self.hashes.get(pointer).copied();
        self.count(found)
    }

    pub fn first_last(&mut self, pointer: &FilePointer) -> Option<(CellValue, CellValue)> {
        let found = self.first_last.get(pointer).cloned();
        self.count(found)
    }

    pub fn first_last_bounds(&mut self, pointer: &FilePointer) -> Option<(Vec<f64>, Vec<f64>)> {
        let found = self.first_last_bounds.get(pointer).cloned();
        self.count(found)
    }

    pub fn store_hash(&mut self, pointer: FilePointer, fingerprint: Fingerprint) {
        self.hashes.put(pointer, fingerprint);
    }

    pub fn store_first_last(&mut self, pointer: FilePointer, values: (CellValue, CellValue)) {
        self.first_last.put(pointer, values);
    }

    pub fn store_first_last_bounds(&mut self, pointer: FilePointer, bounds: (Vec<f64>, Vec<f64>)) {
        self.first_last_bounds.put(pointer, bounds);
    }

    /// Resolve a freshly computed fingerprint. A fingerprint seen before is
    /// returned as is. Otherwise the array is compared against every cached
    /// array of the same shape and kind; the first that is equal within
    /// tolerance donates its fingerprint. Failing that the array is cached
    /// under its own fingerprint.
    pub fn resolve(
        &mut self,
        fingerprint: Fingerprint,
        values: &Values,
        mask: Option<&ArrayD<bool>>,
        rtol: f64,
        atol: f64,
    ) -> Fingerprint {
        if self.arrays.contains_key(&fingerprint) {
            return fingerprint;
        }

        let key = (values.shape().to_vec(), values.dtype_name());
        let candidates = self.by_shape.entry(key).or_default();
        for candidate in candidates.iter() {
            if let Some(cached) = self.arrays.get(candidate) {
                if cached.mask.as_ref() == mask && cached.values.allclose(values, rtol, atol) {
                    self.absorbed += 1;
                    return *candidate;
                }
            }
        }

        candidates.push(fingerprint);
        self.arrays.insert(
            fingerprint,
            CachedArray {
                values: values.clone(),
                mask: mask.cloned(),
            },
        );
        fingerprint
    }

    /// Get cache statistics.
    pub fn stats(&self) -> HashCacheStats {
        HashCacheStats {
            hits: self.hits,
            misses: self.misses,
            absorbed: self.absorbed,
            pointer_entries: self.hashes.len(),
            arrays: self.arrays.len(),
        }
    }

    /// Clear all entries and reset the statistics.
    pub fn clear(&mut self) {
        self.hits = 0;
        self.misses = 0;
        self.absorbed = 0;
        self.hashes.clear();
        self.first_last.clear();
        self.first_last_bounds.clear();
        self.arrays.clear();
        self.by_shape.clear();
    }

    /// Number of cached arrays.
    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }
}
