//! Build, cache and serve transformed block structures.

use crate::error::{ErrorKind, Result};
use crate::{Pipeline, ProviderHandle, TransformerRegistry, build};
use blockcache_cache::{StructureCache, VersionSignature};
use blockcache_config::Config;
use blockcache_graph::{BlockKey, BlockStructure};
use exn::ResultExt;
use tracing::instrument;

/// Entry point for serving block structures.
///
/// For a request, the structure for `root` is looked up in the cache under a
/// signature of the content version and the pipeline's transformer versions.
/// On a miss it is built from the content store, run through every collect
/// phase and stored. Either way the caller then gets its own copy, run through
/// every transform phase with its usage info.
///
/// The cached structure is never handed out, only copies of it, so
/// concurrent requests can't observe each other's transforms. Concurrent
/// misses for the same root may both rebuild; the last write wins.
pub struct BlockCache<U> {
    provider: ProviderHandle,
    cache: StructureCache,
    pipeline: Pipeline<U>,
}

impl<U> BlockCache<U> {
    pub fn new(provider: ProviderHandle, cache: StructureCache, pipeline: Pipeline<U>) -> Self {
        Self { provider, cache, pipeline }
    }

    /// Assemble a block cache from configuration: the cache backend and the
    /// ordered list of transformer names, looked up in `registry`.
    pub fn from_config(config: &Config, provider: ProviderHandle, registry: &TransformerRegistry<U>) -> Result<Self> {
        config.validate().or_raise(|| ErrorKind::Config)?;
        let cache = StructureCache::from_config(&config.cache).or_raise(|| ErrorKind::Config)?;
        let pipeline = Pipeline::from_registry(registry, &config.transformers)?;
        tracing::info!(transformers = ?config.transformers, backend = cache.backend().name(), "Block cache ready");
        Ok(Self::new(provider, cache, pipeline))
    }

    pub fn pipeline(&self) -> &Pipeline<U> {
        &self.pipeline
    }

    pub fn cache(&self) -> &StructureCache {
        &self.cache
    }

    /// The cache signature `root` would be stored under right now.
    pub async fn signature(&self, root: &BlockKey) -> Result<VersionSignature> {
        let content_version = self.provider.content_version(root).await?;
        Ok(self.pipeline.version_signature(content_version))
    }

    /// Build from the content store and run every collect phase.
    async fn build_collected(&self, root: &BlockKey) -> Result<BlockStructure> {
        let mut structure = build(self.provider.as_ref(), root, &self.pipeline.requested_fields()).await?;
        self.pipeline.collect_all(&mut structure)?;
        Ok(structure)
    }

    /// The collected, untransformed structure for `root`, from the cache if
    /// possible.
    ///
    /// The returned structure is a private copy; mutating it doesn't affect
    /// the cache.
    #[instrument(skip_all, fields(root = %root))]
    pub async fn get_collected(&self, root: &BlockKey) -> Result<BlockStructure> {
        let signature = self.signature(root).await?;
        if let Some(structure) = self.cache.get(root, &signature).await.or_raise(|| ErrorKind::Cache)? {
            tracing::debug!("Serving cached block structure");
            return Ok(structure);
        }
        let structure = self.build_collected(root).await?;
        // Only reached once every collect phase has succeeded.
        self.cache.set(root, &signature, &structure).await.or_raise(|| ErrorKind::Cache)?;
        tracing::info!(signature = %signature, blocks = structure.len(), "Collected and cached block structure");
        Ok(structure)
    }

    /// The structure for `root`, transformed for one viewer.
    ///
    /// # Errors
    /// - [`BlockNotFound`](ErrorKind::BlockNotFound) if `root` doesn't exist.
    /// - [`Collection`](ErrorKind::Collection) if a collect phase fails;
    ///   nothing is cached.
    /// - [`Transform`](ErrorKind::Transform) if a transform phase fails; the
    ///   cached structure is unaffected.
    /// - [`Provider`](ErrorKind::Provider) or [`Cache`](ErrorKind::Cache) if
    ///   a dependency fails.
    #[instrument(skip_all, fields(root = %root))]
    pub async fn get_blocks(&self, usage_info: &U, root: &BlockKey) -> Result<BlockStructure> {
        let mut structure = self.get_collected(root).await?;
        self.pipeline.transform_all(usage_info, &mut structure)?;
        Ok(structure)
    }

    /// Drop every cached structure for `root`, whatever its signature.
    pub async fn clear(&self, root: &BlockKey) -> Result<()> {
        self.cache.delete(root).await.or_raise(|| ErrorKind::Cache)
    }

    /// Make sure the current structure of every root is cached, batching
    /// cache reads and writes. Returns how many structures were built.
    #[instrument(skip_all, fields(roots = roots.len()))]
    pub async fn warm(&self, roots: &[BlockKey]) -> Result<usize> {
        let mut requests = Vec::with_capacity(roots.len());
        for root in roots {
            requests.push((root.clone(), self.signature(root).await?));
        }
        let cached = self.cache.get_many(&requests).await.or_raise(|| ErrorKind::Cache)?;

        let mut built: Vec<(&BlockKey, &VersionSignature, BlockStructure)> = Vec::new();
        for ((root, signature), cached) in requests.iter().zip(cached) {
            if cached.is_some() || built.iter().any(|(key, _, _)| *key == root) {
                continue;
            }
            built.push((root, signature, self.build_collected(root).await?));
        }
        let entries: Vec<(&BlockKey, &VersionSignature, &BlockStructure)> =
            built.iter().map(|(root, signature, structure)| (*root, *signature, structure)).collect();
        if !entries.is_empty() {
            self.cache.set_many(&entries).await.or_raise(|| ErrorKind::Cache)?;
        }
        tracing::info!(built = built.len(), "Warmed block structure cache");
        Ok(built.len())
    }
}
