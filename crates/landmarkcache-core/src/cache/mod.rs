//! On-disk cache for landmark results and images.
//!
//! Entries are keyed by query signature (landmarks) or image id (images) and
//! live under a per-mode namespace directory, so production and test data
//! never mix. TTL is evaluated lazily on read; nothing is deleted except by
//! `invalidate`, `clear_all` or an explicit `sweep_expired`.

pub mod atomic;
pub mod entry;
pub mod store;

pub use entry::{format_age, CacheEntry, ImageBlob};
pub use store::{CacheStats, CacheStore, SweepReport};
