//! Block structures: the graph core of the block cache.
//!
//! A [`BlockStructure`] is an in-memory directed acyclic graph of content
//! blocks reachable from a root, together with sparse per-block field data.
//! It knows nothing about transformers or caching; those layers read and
//! write it through the namespaced field accessors.
//!
//! # Data
//! - **Relations**: ordered children (display order) and parent sets, always
//!   kept consistent with each other.
//! - **xblock fields**: raw values copied from the content store.
//! - **transformer data**: values derived by transformers, namespaced by
//!   transformer name, either per block or structure-wide.
//!
//! Field values are [`serde_json::Value`]s so that any serde-serializable
//! value can be stored, cached and read back with typed accessors.

mod data;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod fixtures;
mod key;
mod structure;
mod traversal;

pub use crate::data::BlockData;
pub use crate::key::BlockKey;
pub use crate::structure::BlockStructure;
pub use crate::traversal::Traversal;

/// A single field value, as collected from the content store or derived by a
/// transformer.
pub type FieldValue = serde_json::Value;
