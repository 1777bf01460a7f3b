//! Transformer pipeline and build/serve orchestration.
//!
//! A request for a block structure goes through these states:
//!
//! ```text
//! MISS -> BUILD -> COLLECT -> CACHE_STORE -> COPY -> TRANSFORM -> SERVE
//! HIT  ---------------------------------->  COPY -> TRANSFORM -> SERVE
//! ```
//!
//! - [`BlockProvider`]: the content store, the source of truth.
//! - [`Transformer`]: a named, versioned step with a viewer-independent
//!   collect phase (cached) and a per-viewer transform phase.
//! - [`Pipeline`]: an ordered set of transformers and their combined version
//!   signature.
//! - [`BlockCache`]: ties the provider, pipeline and
//!   [`StructureCache`](blockcache_cache::StructureCache) together.
//!
//! # Examples
//!
//! ```
//! use async_trait::async_trait;
//! use blockcache_cache::StructureCache;
//! use blockcache_cache::backend::MemoryBackend;
//! use blockcache_graph::BlockKey;
//! use blockcache_transform::{Block, BlockCache, BlockProvider, Pipeline, Result, Transformer};
//! use std::sync::Arc;
//!
//! /// A course with two units.
//! struct Course;
//!
//! #[async_trait]
//! impl BlockProvider for Course {
//!     async fn get_item(&self, key: &BlockKey) -> Result<Option<Block>> {
//!         Ok(match key.as_str() {
//!             "course" => Some(Block::new("course").with_children(["unit1", "unit2"])),
//!             "unit1" | "unit2" => Some(Block::new(key)),
//!             _ => None,
//!         })
//!     }
//!
//!     async fn content_version(&self, _root: &BlockKey) -> Result<String> {
//!         Ok("2024-01-01T00:00:00Z".to_string())
//!     }
//! }
//!
//! /// Hides the second unit from everyone who isn't staff.
//! struct StaffOnly;
//!
//! impl Transformer<bool> for StaffOnly {
//!     fn name(&self) -> &str {
//!         "staff_only"
//!     }
//!
//!     fn version(&self) -> u32 {
//!         1
//!     }
//!
//!     fn transform(&self, is_staff: &bool, structure: &mut blockcache_graph::BlockStructure) -> Result<()> {
//!         if !*is_staff {
//!             structure.remove_block_if(|_, key| key.as_str() == "unit2");
//!         }
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let pipeline = Pipeline::<bool>::new(vec![Arc::new(StaffOnly)])?;
//! let cache = StructureCache::new(Arc::new(MemoryBackend::default()));
//! let blocks = BlockCache::new(Arc::new(Course), cache, pipeline);
//!
//! let root = BlockKey::from("course");
//! assert_eq!(blocks.get_blocks(&true, &root).await?.len(), 3);
//! assert_eq!(blocks.get_blocks(&false, &root).await?.len(), 2);
//! # Ok(())
//! # }
//! ```

mod blocks;
mod builder;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
mod pipeline;
mod provider;
mod registry;
mod transformer;

pub use crate::blocks::BlockCache;
pub use crate::builder::build;
pub use crate::error::{ErrorKind, Result};
pub use crate::pipeline::Pipeline;
pub use crate::provider::{Block, BlockProvider, ProviderHandle};
pub use crate::registry::TransformerRegistry;
pub use crate::transformer::Transformer;
