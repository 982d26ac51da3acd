//! Core types for aggregation.

use std::cmp::Ordering;
use std::fmt;

use cf_model::Scalar;
use serde::{Deserialize, Serialize};

/// Content fingerprint of a canonicalised array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(pub u64);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Hash recorded for one coordinate, cell measure or ancillary.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HashEntry {
    /// Not computed: the axis does not aggregate and checking is disabled.
    Skipped,
    /// An axis with no coordinates, identified by its size.
    Size(usize),
    Array(Fingerprint),
    WithBounds(Fingerprint, Fingerprint),
    /// Entries of fields already merged along the aggregating axis.
    Merged(Vec<HashEntry>),
}

impl HashEntry {
    /// Fold `other` into this entry after a merge.
    pub fn absorb(&mut self, other: HashEntry) {
        let mine = std::mem::replace(self, HashEntry::Skipped);
        let mut entries = match mine {
            HashEntry::Merged(entries) => entries,
            single => vec![single],
        };
        match other {
            HashEntry::Merged(more) => entries.extend(more),
            single => entries.push(single),
        }
        *self = HashEntry::Merged(entries);
    }
}

/// First or last value of a canonicalised coordinate.
#[derive(Debug, Clone)]
pub enum CellValue {
    /// The coordinate has no values (size-only axis).
    Missing,
    /// Not computed for a non-aggregating axis.
    Skipped,
    Number(f64),
    Text(String),
}

impl CellValue {
    fn rank(&self) -> u8 {
        match self {
            CellValue::Missing => 0,
            CellValue::Skipped => 1,
            CellValue::Number(_) => 2,
            CellValue::Text(_) => 3,
        }
    }
}

impl From<Option<Scalar>> for CellValue {
    fn from(value: Option<Scalar>) -> Self {
        match value {
            None => CellValue::Missing,
            Some(Scalar::Number(v)) => CellValue::Number(v),
            Some(Scalar::Text(s)) => CellValue::Text(s),
        }
    }
}

impl Ord for CellValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (CellValue::Number(a), CellValue::Number(b)) => a.total_cmp(b),
            (CellValue::Text(a), CellValue::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for CellValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for CellValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for CellValue {}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Missing => f.write_str("<missing>"),
            CellValue::Skipped => f.write_str("<skipped>"),
            CellValue::Number(v) => write!(f, "{}", v),
            CellValue::Text(s) => f.write_str(s),
        }
    }
}

/// How an axis is reordered into canonical (increasing) order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortOrder {
    Identity,
    Reversed,
    Permutation(Vec<usize>),
}

/// Overall outcome of an aggregation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AggregateStatus {
    /// Every field was either aggregated or legitimately left alone.
    #[default]
    Success,
    /// At least one field or group could not be aggregated.
    Failed,
}

impl AggregateStatus {
    /// Numeric status: 0 on success, 1 on failure.
    pub fn code(&self) -> u8 {
        match self {
            AggregateStatus::Success => 0,
            AggregateStatus::Failed => 1,
        }
    }
}

/// Hash cache statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HashCacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Arrays folded into an earlier fingerprint by tolerant comparison.
    pub absorbed: u64,
    pub pointer_entries: usize,
    pub arrays: usize,
}

impl HashCacheStats {
    /// Calculate the cache hit rate (0.0 - 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absorb_flattens() {
        let mut entry = HashEntry::Array(Fingerprint(1));
        entry.absorb(HashEntry::Array(Fingerprint(2)));
        let mut other = HashEntry::Array(Fingerprint(3));
        other.absorb(HashEntry::Array(Fingerprint(4)));
        entry.absorb(other);
        assert_eq!(
            entry,
            HashEntry::Merged(vec![
                HashEntry::Array(Fingerprint(1)),
                HashEntry::Array(Fingerprint(2)),
                HashEntry::Array(Fingerprint(3)),
                HashEntry::Array(Fingerprint(4)),
            ])
        );
    }

    #[test]
    fn test_cell_value_order() {
        let mut values = vec![
            CellValue::Number(2.0),
            CellValue::Missing,
            CellValue::Number(-1.0),
            CellValue::Text("a".to_string()),
        ];
        values.sort();
        assert_eq!(values[0], CellValue::Missing);
        assert_eq!(values[1], CellValue::Number(-1.0));
        assert_eq!(values[3], CellValue::Text("a".to_string()));
    }

    #[test]
    fn test_hit_rate() {
        let mut stats = HashCacheStats::default();
        assert!((stats.hit_rate() - 0.0).abs() < f64::EPSILON);

        stats.hits = 80;
        stats.misses = 20;
        assert!((stats.hit_rate() - 0.8).abs() < f64::EPSILON);
    }
}
