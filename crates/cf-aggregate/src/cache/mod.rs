//! Caches shared across aggregation calls.

mod hash_cache;

pub use hash_cache::HashCache;
