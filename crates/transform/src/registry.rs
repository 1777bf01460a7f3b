//! Named lookup of available transformers.

use crate::Transformer;
use crate::error::{ErrorKind, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Every transformer the application knows about, by name.
///
/// Pipelines are assembled from a registry and a list of names (usually from
/// configuration) with [`Pipeline::from_registry`](crate::Pipeline::from_registry).
pub struct TransformerRegistry<U> {
    transformers: BTreeMap<String, Arc<dyn Transformer<U>>>,
}

impl<U> TransformerRegistry<U> {
    pub fn new() -> Self {
        Self { transformers: BTreeMap::new() }
    }

    /// Add a transformer. Names must be unique.
    pub fn register(&mut self, transformer: Arc<dyn Transformer<U>>) -> Result<()> {
        let name = transformer.name().to_string();
        if self.transformers.contains_key(&name) {
            exn::bail!(ErrorKind::DuplicateTransformer(name));
        }
        tracing::debug!(transformer = %name, version = transformer.version(), "Registered transformer");
        self.transformers.insert(name, transformer);
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, transformer: Arc<dyn Transformer<U>>) -> Result<Self> {
        self.register(transformer)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Transformer<U>>> {
        self.transformers.get(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.transformers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }
}

impl<U> Default for TransformerRegistry<U> {
    fn default() -> Self {
        Self::new()
    }
}
