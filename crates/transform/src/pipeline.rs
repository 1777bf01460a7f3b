//! Ordered execution of transformers.

use crate::error::{ErrorKind, Result};
use crate::{Transformer, TransformerRegistry};
use blockcache_cache::VersionSignature;
use blockcache_graph::BlockStructure;
use exn::{OptionExt, ResultExt};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::instrument;

/// An ordered, validated set of transformers.
///
/// Collect and transform phases both run in registration order. Transform
/// phases see the mutations of every transformer before them, so a
/// transformer that prunes should come before transformers that only need
/// to look at what remains.
pub struct Pipeline<U> {
    transformers: Vec<Arc<dyn Transformer<U>>>,
}

impl<U> Clone for Pipeline<U> {
    fn clone(&self) -> Self {
        Self { transformers: self.transformers.clone() }
    }
}

impl<U> Pipeline<U> {
    /// Validate and build a pipeline.
    ///
    /// # Errors
    /// - [`DuplicateTransformer`](ErrorKind::DuplicateTransformer) if two
    ///   transformers share a name (their collected data would collide).
    /// - [`InvalidVersion`](ErrorKind::InvalidVersion) for a version of 0.
    pub fn new(transformers: Vec<Arc<dyn Transformer<U>>>) -> Result<Self> {
        let mut seen = HashSet::new();
        for transformer in &transformers {
            let name = transformer.name();
            if !seen.insert(name) {
                exn::bail!(ErrorKind::DuplicateTransformer(name.to_string()));
            }
            if transformer.version() == 0 {
                exn::bail!(ErrorKind::InvalidVersion(name.to_string()));
            }
        }
        Ok(Self { transformers })
    }

    /// Assemble a pipeline from registered transformers, in the order given.
    pub fn from_registry(registry: &TransformerRegistry<U>, names: &[impl AsRef<str>]) -> Result<Self> {
        let transformers = names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                registry.get(name).cloned().ok_or_raise(|| ErrorKind::UnknownTransformer(name.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(transformers)
    }

    pub fn transformers(&self) -> &[Arc<dyn Transformer<U>>] {
        &self.transformers
    }

    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }

    /// `(name, version)` of every transformer, sorted by name.
    pub fn get_collected_version_signature(&self) -> Vec<(String, u32)> {
        let mut signature: Vec<(String, u32)> =
            self.transformers.iter().map(|t| (t.name().to_string(), t.version())).collect();
        signature.sort();
        signature
    }

    /// Combine the content store's version stamp with this pipeline's
    /// transformer versions.
    pub fn version_signature(&self, content_version: impl Into<String>) -> VersionSignature {
        VersionSignature::new(content_version, self.get_collected_version_signature())
    }

    /// Union of every transformer's requested fields, sorted.
    pub fn requested_fields(&self) -> Vec<String> {
        let fields: BTreeSet<String> = self.transformers.iter().flat_map(|t| t.requested_fields()).collect();
        fields.into_iter().collect()
    }

    /// Run every collect phase against the full structure.
    ///
    /// Stops at the first failure; the structure must then be discarded, not
    /// cached. A collect phase that adds or removes blocks is a failure too.
    #[instrument(skip_all, fields(root = %structure.root(), blocks = structure.len()))]
    pub fn collect_all(&self, structure: &mut BlockStructure) -> Result<()> {
        for transformer in &self.transformers {
            let name = transformer.name();
            let blocks = structure.len();
            transformer.collect(structure).or_raise(|| ErrorKind::Collection(name.to_string()))?;
            if structure.len() != blocks {
                tracing::warn!(transformer = name, before = blocks, after = structure.len(), "Collect phase changed the block set");
                exn::bail!(ErrorKind::Collection(name.to_string()));
            }
            tracing::debug!(transformer = name, "Collect phase complete");
        }
        Ok(())
    }

    /// Run every transform phase against a viewer's private copy.
    #[instrument(skip_all, fields(root = %structure.root()))]
    pub fn transform_all(&self, usage_info: &U, structure: &mut BlockStructure) -> Result<()> {
        for transformer in &self.transformers {
            let name = transformer.name();
            transformer.transform(usage_info, structure).or_raise(|| ErrorKind::Transform(name.to_string()))?;
            tracing::debug!(transformer = name, remaining = structure.len(), "Transform phase complete");
        }
        Ok(())
    }
}
