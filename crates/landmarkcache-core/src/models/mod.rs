//! Data models for landmark lookups.
//!
//! - `Landmark`: a point of interest with identity, location and metadata
//! - `dedupe_by_id`: first-occurrence-wins merge of upstream duplicates

pub mod landmark;

pub use landmark::{dedupe_by_id, Landmark};
