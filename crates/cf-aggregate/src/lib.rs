//! Aggregation of CF fields
//!
//! This crate joins fields that are fragments of a larger field into that
//! larger field. Fields are combined along an axis when every other part of
//! their domain and metadata matches, so that, for example, one file per
//! month becomes a single multi-year field.
//!
//! - **Structural signatures**: fields are bucketed by identities, canonical
//!   units, axis layout and selected properties
//! - **Content fingerprints**: coordinate arrays are compared by hash after
//!   canonicalising units, dtype and direction, with near-duplicates folded
//!   together within tolerance
//! - **Transactional passes**: a group that fails an overlap or consistency
//!   check is restored to its state before the failing pass
//!
//! # Architecture
//!
//! ```text
//! Vec<Field>
//!      │
//!      ▼
//! Probe::build (per field)
//!      │
//!      ├─► Rejected: passed through or excluded, status = 1
//!      │
//!      ▼
//! SignatureIndex (buckets in signature order)
//!      │
//!      ▼
//! HashBuilder ──► HashCache (file pointer + near-duplicate maps)
//!      │
//!      ▼
//! for each aggregating axis:
//!      group_by_axis ─► check_coordinates ─► merge_pair
//!      │
//!      ▼
//! Vec<Field>
//! ```
//!
//! # Example
//!
//! ```ignore
//! use cf_aggregate::{aggregate, last_status, AggregateOptions};
//!
//! let options = AggregateOptions {
//!     contiguous: true,
//!     ..Default::default()
//! };
//! let merged = aggregate(fields, &options)?;
//! if last_status().code() != 0 {
//!     // some fields could not be aggregated
//! }
//! ```

pub mod cache;
pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod grouping;
pub mod hashing;
pub mod merge;
pub mod overlap;
pub mod probe;
pub mod signature;
pub mod types;

// Re-export commonly used types at crate root
pub use cache::HashCache;
pub use config::{AggregateOptions, SIGNATURE_PROPERTIES};
pub use context::{AggregationContext, CanonicalCellMethods, CanonicalUnits};
pub use driver::{
    aggregate, aggregate_with_context, ensemble, ensemble_with_context, last_status, AggregateOutcome,
    Aggregator,
};
pub use error::{AggregateError, ErrorKind, Result};
pub use hashing::HashBuilder;
pub use probe::{AxisDescriptor, ConstructSummary, Probe, Rejected};
pub use signature::{SignatureIndex, StructuralSignature};
pub use types::{AggregateStatus, CellValue, Fingerprint, HashCacheStats, HashEntry, SortOrder};
