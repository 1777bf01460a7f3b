//! Transform Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use blockcache_graph::BlockKey;
use derive_more::{Display, Error};

/// A transform error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for transformer, pipeline and block cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of a failure.
///
/// ### Configuration Errors
/// Reported when a pipeline is assembled, never mid-request.
/// - [`ErrorKind::UnknownTransformer`]
/// - [`ErrorKind::DuplicateTransformer`]
/// - [`ErrorKind::InvalidVersion`]
/// - [`ErrorKind::Config`]
///
/// ### Request Errors
/// - [`ErrorKind::Collection`]: nothing was cached.
/// - [`ErrorKind::Transform`]: the cache is unaffected.
/// - [`ErrorKind::Graph`]
/// - [`ErrorKind::BlockNotFound`]
///
/// ### Dependency Errors
/// - [`ErrorKind::Provider`]
/// - [`ErrorKind::Cache`]
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A block structure operation failed (e.g. the content store reported a
    /// cycle).
    #[display("invalid block structure")]
    Graph,
    /// The block provider (content store) failed.
    #[display("block provider error")]
    Provider,
    /// The requested root does not exist in the content store.
    #[display("block not found: {_0}")]
    BlockNotFound(#[error(not(source))] BlockKey),
    /// A transformer's collect phase failed.
    #[display("collection failed in transformer '{_0}'")]
    Collection(#[error(not(source))] String),
    /// A transformer's transform phase failed.
    #[display("transform failed in transformer '{_0}'")]
    Transform(#[error(not(source))] String),
    /// The structure cache backend failed.
    #[display("structure cache error")]
    Cache,
    #[display("unknown transformer: '{_0}'")]
    UnknownTransformer(#[error(not(source))] String),
    #[display("transformer registered more than once: '{_0}'")]
    DuplicateTransformer(#[error(not(source))] String),
    /// Versions start at 1; 0 would never invalidate anything.
    #[display("transformer '{_0}' has invalid version 0")]
    InvalidVersion(#[error(not(source))] String),
    #[display("invalid block cache configuration")]
    Config,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider | Self::Cache)
    }
}
