//! The transformer contract.

use crate::error::Result;
use blockcache_graph::BlockStructure;

/// A pluggable step that annotates and prunes block structures.
///
/// A transformer works in two phases:
///
/// 1. **collect**: runs once per structure build, against the full and
///    unpruned structure, *before* it is cached. It never sees who the
///    structure is for. Anything it computes is written under its own
///    [`name`](Self::name) (see
///    [`BlockStructure::set_transformer_block_field`]) so transformers can't
///    trample each other's data.
/// 2. **transform**: runs on every request against a private copy of the
///    cached structure, with the caller's usage info (`U`). It communicates
///    only by mutating that copy: removing blocks, rewriting fields.
///
/// Collected data is cached, so [`version`](Self::version) must be bumped
/// whenever collect's output could change; it is part of the cache key.
///
/// # Examples
///
/// ```
/// use blockcache_graph::BlockStructure;
/// use blockcache_transform::{Result, Transformer};
///
/// /// Removes graded blocks for anonymous viewers.
/// struct HideGraded;
///
/// impl Transformer<bool> for HideGraded {
///     fn name(&self) -> &str {
///         "hide_graded"
///     }
///
///     fn version(&self) -> u32 {
///         1
///     }
///
///     fn requested_fields(&self) -> Vec<String> {
///         vec!["graded".to_string()]
///     }
///
///     fn transform(&self, is_anonymous: &bool, structure: &mut BlockStructure) -> Result<()> {
///         if *is_anonymous {
///             structure.remove_block_if(|s, key| s.get_xblock_field(key, "graded", false) == true);
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Transformer<U>: Send + Sync {
    /// Unique, stable identifier; also the namespace for collected data.
    fn name(&self) -> &str;

    /// Positive, static per release of the transformer.
    fn version(&self) -> u32;

    /// Content store fields this transformer needs copied into the structure
    /// before collection runs.
    fn requested_fields(&self) -> Vec<String> {
        Vec::new()
    }

    /// Derive viewer-independent data from the full structure.
    ///
    /// The structure is shared by every viewer once cached, so collect treats
    /// it as read-only apart from writes under this transformer's own
    /// namespace ([`BlockStructure::set_transformer_data`] and
    /// [`BlockStructure::set_transformer_block_field`]). It must not add or
    /// remove blocks or relations, rewrite xblock fields, or depend on another
    /// transformer's collected data. The pipeline rejects a collect phase
    /// that changes the number of blocks.
    fn collect(&self, _structure: &mut BlockStructure) -> Result<()> {
        Ok(())
    }

    /// Adapt a private copy of the collected structure for one viewer.
    fn transform(&self, usage_info: &U, structure: &mut BlockStructure) -> Result<()>;
}
