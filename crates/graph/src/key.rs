use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Opaque identifier of a content block.
///
/// One key denotes exactly one block within a structure. Keys are usually
/// usage-key style strings handed out by the content store
/// (`block-v1:Org+Course+Run+type@chapter+block@intro`); numbered keys are
/// supported through `From<usize>` so that test fixtures read naturally.
#[derive(Debug, Display, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[display("{_0}")]
#[serde(transparent)]
pub struct BlockKey(String);

impl BlockKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl From<&str> for BlockKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}
impl From<String> for BlockKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}
impl From<usize> for BlockKey {
    fn from(key: usize) -> Self {
        Self(key.to_string())
    }
}
impl From<&BlockKey> for BlockKey {
    fn from(key: &BlockKey) -> Self {
        key.clone()
    }
}
impl AsRef<str> for BlockKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
