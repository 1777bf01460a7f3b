//! Versioned cache of collected block structures.
//!
//! Collecting transformer data over a full course structure is expensive, so
//! the result is stored once and shared by every request until something that
//! could change it does. The cache key captures all of those inputs:
//!
//! - the **root** block the structure was built from,
//! - the content store's **version stamp** for that root's subtree,
//! - the **name and version** of every active transformer
//!   ([`VersionSignature`]).
//!
//! # Architecture
//! - [`backend`]: plain key/value stores for byte blobs
//!   ([`CacheBackend`]), with memory, local filesystem and read-only
//!   implementations.
//! - [`codec`]: snapshots as JSON, optionally gzip/zlib compressed.
//! - [`StructureCache`]: key layout, per-root invalidation, and the rule that
//!   unreadable entries are misses rather than errors.

pub mod backend;
pub mod codec;
pub mod error;
mod key;
pub mod models;
mod signature;
mod store;

pub use crate::backend::CacheBackend;
pub use crate::key::{MAX_KEY_LENGTH, validate as validate_key};
pub use crate::signature::VersionSignature;
pub use crate::store::StructureCache;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn CacheBackend + Send + Sync>;
