//! Cache Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Backend-specific failure (connection, server-side error, ...).
    #[display("cache backend error: {_0}")]
    Backend(#[error(not(source))] String),
    /// Filesystem operation failed in a local backend.
    #[display("I/O error: {}", _0.display())]
    Io(#[error(not(source))] PathBuf),
    /// Key is empty, too long, or contains characters a backend can't store.
    #[display("invalid cache key: {_0:?}")]
    InvalidKey(#[error(not(source))] String),
    /// A structure could not be turned into a snapshot.
    #[display("could not serialize block structure")]
    Serialize,
    /// Stored bytes are not a readable snapshot. Never surfaced by
    /// [`StructureCache::get`](crate::StructureCache::get), which treats it as
    /// a miss.
    #[display("invalid cache data")]
    InvalidData,
    #[display("compression error")]
    Compression,
    /// The cache could not be built from its configuration.
    #[display("invalid cache configuration")]
    Config,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend(_) | Self::Io(_))
    }
}
