//! Graph Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use crate::BlockKey;
use derive_more::{Display, Error};

/// A graph error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for graph operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// [`SelfLoop`](Self::SelfLoop), [`Cycle`](Self::Cycle),
/// [`RootParent`](Self::RootParent) and [`RootRemoval`](Self::RootRemoval)
/// are invariant violations: the operation that triggered them is rejected and
/// the structure is left exactly as it was.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A block cannot be its own parent.
    #[display("block cannot be its own parent: {_0}")]
    SelfLoop(#[error(not(source))] BlockKey),
    /// The relation would make the structure cyclic.
    #[display("relation {parent} -> {child} would create a cycle")]
    Cycle { parent: BlockKey, child: BlockKey },
    /// The root block cannot be given a parent.
    #[display("root block cannot have a parent: {_0}")]
    RootParent(#[error(not(source))] BlockKey),
    /// The root block cannot be removed from its own structure.
    #[display("root block cannot be removed: {_0}")]
    RootRemoval(#[error(not(source))] BlockKey),
    /// The block is not (or no longer) part of the structure.
    #[display("unknown block: {_0}")]
    UnknownBlock(#[error(not(source))] BlockKey),
    /// A stored field value does not have the requested shape.
    #[display("field '{field}' of block {block} has an unexpected type")]
    Field { block: BlockKey, field: String },
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // Graph operations are pure, in-memory computation: the same input
        // will always fail the same way.
        false
    }
}
