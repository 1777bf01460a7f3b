//! Structure version signatures.

use std::fmt;

/// Everything that determines the content of a collected structure, other
/// than its root.
///
/// Built from the content store's version stamp for the root's subtree and
/// the `(name, version)` of every active transformer. Transformers are kept
/// sorted by name, so registration order never affects the signature.
///
/// # Examples
///
/// ```
/// use blockcache_cache::VersionSignature;
///
/// let a = VersionSignature::new("v42", [("visibility", 2), ("completion", 1)]);
/// let b = VersionSignature::new("v42", [("completion", 1), ("visibility", 2)]);
/// assert_eq!(a, b);
/// assert_eq!(a.to_string(), "v42;completion=1,visibility=2");
/// assert_eq!(a.digest(), b.digest());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionSignature {
    content_version: String,
    transformers: Vec<(String, u32)>,
}

impl VersionSignature {
    pub fn new(
        content_version: impl Into<String>,
        transformers: impl IntoIterator<Item = (impl Into<String>, u32)>,
    ) -> Self {
        let mut transformers: Vec<(String, u32)> =
            transformers.into_iter().map(|(name, version)| (name.into(), version)).collect();
        transformers.sort();
        Self { content_version: content_version.into(), transformers }
    }

    pub fn content_version(&self) -> &str {
        &self.content_version
    }

    /// `(name, version)` pairs, sorted by name.
    pub fn transformers(&self) -> &[(String, u32)] {
        &self.transformers
    }

    /// BLAKE3 hex digest of the signature, as used in backend keys.
    ///
    /// Every part is length-prefixed before hashing, so no choice of content
    /// version or transformer name can make two different signatures collide
    /// on their readable form.
    pub fn digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        let mut update = |bytes: &[u8]| {
            hasher.update(&(bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        };
        update(self.content_version.as_bytes());
        for (name, version) in &self.transformers {
            update(name.as_bytes());
            update(&version.to_le_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }
}

impl fmt::Display for VersionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};", self.content_version)?;
        for (i, (name, version)) in self.transformers.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{name}={version}")?;
        }
        Ok(())
    }
}
