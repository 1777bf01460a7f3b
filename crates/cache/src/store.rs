//! The structure cache: collected block structures keyed by root and version
//! signature.

use crate::backend::{LocalBackend, MemoryBackend, ReadOnlyBackend};
use crate::error::{ErrorKind, Result};
use crate::key::{MAX_COMPONENT_LENGTH, MAX_KEY_LENGTH, escape_component};
use crate::{BackendHandle, VersionSignature, codec};
use blockcache_config::{CacheConfig, Compression, DEFAULT_PREFIX, MAX_PREFIX_LENGTH};
use blockcache_graph::{BlockKey, BlockStructure};
use exn::ResultExt;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::instrument;

const GENERATION_SUFFIX: &str = "gen";

/// Generation of a root that has never been invalidated.
const INITIAL_GENERATION: &[u8] = b"0";

/// Snapshot entries are named by a full blake3 hex digest.
const ENTRY_ID_LENGTH: usize = 64;

const _: () = assert!(MAX_PREFIX_LENGTH + 1 + MAX_COMPONENT_LENGTH + 1 + ENTRY_ID_LENGTH <= MAX_KEY_LENGTH);

/// Maps `(root, signature)` to a serialized, post-collect block structure.
///
/// # Key layout
/// - `<prefix>.<root>.gen`: the root's current generation. Absent until the
///   root is first invalidated.
/// - `<prefix>.<root>.<entry>`: one snapshot per signature, where `<entry>`
///   hashes the generation together with the signature digest.
///
/// [`delete`](Self::delete) moves the generation on with a single write, so
/// every snapshot of the previous generation becomes unreachable, including
/// ones written concurrently by a `set` that read the old generation. The
/// backend is expected to evict or expire unreachable entries.
///
/// # Reads never fail on bad data
/// Entries that can't be decoded (corruption, an older snapshot format,
/// truncated writes) are logged and reported as misses, so the caller simply
/// rebuilds and overwrites them.
#[derive(Clone)]
pub struct StructureCache {
    backend: BackendHandle,
    prefix: String,
    compression: Compression,
}

impl StructureCache {
    pub fn new(backend: BackendHandle) -> Self {
        Self { backend, prefix: DEFAULT_PREFIX.to_string(), compression: Compression::default() }
    }

    /// Build a cache from configuration: pick the backend, and wrap it in a
    /// [`ReadOnlyBackend`] if requested.
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        let mut backend: BackendHandle = match config.local_path().or_raise(|| ErrorKind::Config)? {
            Some(path) => Arc::new(LocalBackend::new("local", path)?),
            None => Arc::new(MemoryBackend::default()),
        };
        if config.read_only {
            backend = Arc::new(ReadOnlyBackend::new(backend));
        }
        tracing::debug!(backend = backend.name(), prefix = %config.prefix, read_only = config.read_only, "Structure cache ready");
        Ok(Self::new(backend).with_prefix(config.prefix.clone()).with_compression(config.compression))
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn backend(&self) -> &BackendHandle {
        &self.backend
    }

    fn root_key(&self, root: &BlockKey) -> String {
        format!("{}.{}", self.prefix, escape_component(root.as_str()))
    }

    fn generation_key(&self, root: &BlockKey) -> String {
        format!("{}.{GENERATION_SUFFIX}", self.root_key(root))
    }

    fn snapshot_key(&self, root: &BlockKey, generation: &[u8], signature: &VersionSignature) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(generation.len() as u64).to_le_bytes());
        hasher.update(generation);
        hasher.update(signature.digest().as_bytes());
        format!("{}.{}", self.root_key(root), hasher.finalize().to_hex())
    }

    /// A generation that no previous `delete` can have produced.
    fn next_generation(previous: &[u8]) -> Vec<u8> {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or_default();
        let mut hasher = blake3::Hasher::new();
        hasher.update(previous);
        hasher.update(&nanos.to_le_bytes());
        hasher.update(&std::process::id().to_le_bytes());
        hasher.update(&COUNTER.fetch_add(1, Ordering::Relaxed).to_le_bytes());
        hasher.finalize().to_hex()[..16].as_bytes().to_vec()
    }

    async fn generation(&self, root: &BlockKey) -> Result<Vec<u8>> {
        let generation = self.backend.get(&self.generation_key(root)).await?;
        Ok(generation.unwrap_or_else(|| INITIAL_GENERATION.to_vec()))
    }

    /// Current generation of every distinct root, in one backend round trip.
    async fn generations<'a>(
        &self,
        roots: impl IntoIterator<Item = &'a BlockKey>,
    ) -> Result<HashMap<&'a BlockKey, Vec<u8>>> {
        let roots: BTreeSet<&BlockKey> = roots.into_iter().collect();
        let keys: Vec<String> = roots.iter().map(|root| self.generation_key(root)).collect();
        let mut found = self.backend.get_many(&keys).await?;
        Ok(roots
            .into_iter()
            .zip(&keys)
            .map(|(root, key)| (root, found.remove(key).unwrap_or_else(|| INITIAL_GENERATION.to_vec())))
            .collect())
    }

    /// Decode a stored entry, treating anything unreadable as a miss.
    fn decode(key: &str, root: &BlockKey, bytes: &[u8]) -> Option<BlockStructure> {
        match codec::decode(bytes) {
            Ok(structure) if structure.root() == root => Some(structure),
            Ok(structure) => {
                tracing::warn!(key, expected = %root, found = %structure.root(), "Discarding cache entry for wrong root");
                None
            },
            Err(err) => {
                tracing::warn!(key, error = ?err, "Discarding unreadable cache entry");
                None
            },
        }
    }

    #[instrument(skip_all, fields(root = %root, signature = %signature))]
    pub async fn get(&self, root: &BlockKey, signature: &VersionSignature) -> Result<Option<BlockStructure>> {
        let generation = self.generation(root).await?;
        let key = self.snapshot_key(root, &generation, signature);
        let Some(bytes) = self.backend.get(&key).await? else {
            tracing::debug!(key = %key, "Cache miss");
            return Ok(None);
        };
        let structure = Self::decode(&key, root, &bytes);
        tracing::debug!(key = %key, hit = structure.is_some(), "Cache lookup");
        Ok(structure)
    }

    /// Store a collected structure. Must only be called once collection has
    /// fully succeeded.
    #[instrument(skip_all, fields(root = %root, signature = %signature))]
    pub async fn set(&self, root: &BlockKey, signature: &VersionSignature, structure: &BlockStructure) -> Result<()> {
        let bytes = codec::encode(structure, self.compression)?;
        let generation = self.generation(root).await?;
        let key = self.snapshot_key(root, &generation, signature);
        self.backend.set(&key, &bytes).await?;
        tracing::debug!(key = %key, bytes = bytes.len(), "Cached block structure");
        Ok(())
    }

    /// Look up many `(root, signature)` pairs, batching backend reads.
    ///
    /// The result is aligned with `requests`; misses and unreadable entries
    /// are `None`.
    #[instrument(skip_all, fields(requests = requests.len()))]
    pub async fn get_many(&self, requests: &[(BlockKey, VersionSignature)]) -> Result<Vec<Option<BlockStructure>>> {
        let generations = self.generations(requests.iter().map(|(root, _)| root)).await?;
        let keys: Vec<String> = requests
            .iter()
            .map(|(root, signature)| self.snapshot_key(root, &generations[root], signature))
            .collect();
        let found = self.backend.get_many(&keys).await?;
        let structures: Vec<Option<BlockStructure>> = requests
            .iter()
            .zip(&keys)
            .map(|((root, _), key)| found.get(key).and_then(|bytes| Self::decode(key, root, bytes)))
            .collect();
        tracing::debug!(hits = structures.iter().filter(|s| s.is_some()).count(), "Batched cache lookup");
        Ok(structures)
    }

    /// Store many collected structures, batching backend writes.
    ///
    /// A backend failure on one entry leaves the others intact.
    #[instrument(skip_all, fields(entries = entries.len()))]
    pub async fn set_many(&self, entries: &[(&BlockKey, &VersionSignature, &BlockStructure)]) -> Result<()> {
        let generations = self.generations(entries.iter().map(|(root, _, _)| *root)).await?;
        let mut snapshots = Vec::with_capacity(entries.len());
        for (root, signature, structure) in entries {
            let key = self.snapshot_key(root, &generations[*root], signature);
            snapshots.push((key, codec::encode(structure, self.compression)?));
        }
        self.backend.set_many(&snapshots).await
    }

    /// Make every cached signature for `root` unreachable.
    #[instrument(skip_all, fields(root = %root))]
    pub async fn delete(&self, root: &BlockKey) -> Result<()> {
        let previous = self.generation(root).await?;
        self.backend.set(&self.generation_key(root), &Self::next_generation(&previous)).await?;
        tracing::info!("Invalidated cached block structures");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CacheBackend, MemoryBackend};
    use blockcache_config::Backend;
    use blockcache_graph::fixtures::{
        DAG_CHILDREN_MAP, LINEAR_CHILDREN_MAP, SIMPLE_CHILDREN_MAP, assert_children_map, from_children_map,
    };
    use rstest::rstest;
    use serde_json::json;

    fn signature(version: &str) -> VersionSignature {
        VersionSignature::new(version, [("visibility", 1), ("completion", 2)])
    }

    fn memory_cache() -> (Arc<MemoryBackend>, StructureCache) {
        let backend = Arc::new(MemoryBackend::default());
        (backend.clone(), StructureCache::new(backend))
    }

    #[rstest]
    #[case(SIMPLE_CHILDREN_MAP)]
    #[case(LINEAR_CHILDREN_MAP)]
    #[case(DAG_CHILDREN_MAP)]
    #[tokio::test]
    async fn test_set_then_get(#[case] children_map: &[&[usize]]) {
        let (_backend, cache) = memory_cache();
        let mut structure = from_children_map(children_map);
        structure.set_xblock_field(&BlockKey::from(1), "display_name", "One").unwrap();
        let root = BlockKey::from(0);

        cache.set(&root, &signature("v1"), &structure).await.unwrap();
        let cached = cache.get(&root, &signature("v1")).await.unwrap().unwrap();

        assert_children_map(&cached, children_map, &[]);
        assert_eq!(cached.xblock_field(&BlockKey::from(1), "display_name"), Some(&json!("One")));
    }

    #[tokio::test]
    async fn test_different_signature_misses() {
        let (_backend, cache) = memory_cache();
        let root = BlockKey::from(0);
        cache.set(&root, &signature("v1"), &from_children_map(DAG_CHILDREN_MAP)).await.unwrap();
        assert!(cache.get(&root, &signature("v2")).await.unwrap().is_none());
        let bumped = VersionSignature::new("v1", [("visibility", 2), ("completion", 2)]);
        assert!(cache.get(&root, &bumped).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_key_layout() {
        let (backend, cache) = memory_cache();
        let root = BlockKey::from("course-v1:edX+Demo");
        let sig = signature("v1");
        cache.set(&root, &sig, &BlockStructure::new(root.clone())).await.unwrap();
        let keys = backend.keys().await;
        assert_eq!(keys, vec![cache.snapshot_key(&root, INITIAL_GENERATION, &sig)]);
        assert!(keys[0].starts_with("block_structure.course-v1:edX+Demo."));
        assert_eq!(keys[0].len(), "block_structure.course-v1:edX+Demo.".len() + ENTRY_ID_LENGTH);

        cache.delete(&root).await.unwrap();
        assert!(backend.keys().await.contains(&"block_structure.course-v1:edX+Demo.gen".to_string()));
    }

    #[tokio::test]
    async fn test_longest_prefix_and_root_fit_in_a_key() {
        let backend = Arc::new(MemoryBackend::default());
        let cache = StructureCache::new(backend).with_prefix("p".repeat(MAX_PREFIX_LENGTH));
        let root = BlockKey::from("r".repeat(MAX_COMPONENT_LENGTH));
        cache.set(&root, &signature("v1"), &BlockStructure::new(root.clone())).await.unwrap();
        assert!(cache.get(&root, &signature("v1")).await.unwrap().is_some());
        cache.delete(&root).await.unwrap();
        assert!(cache.get(&root, &signature("v1")).await.unwrap().is_none());
    }

    #[rstest]
    #[case::garbage(b"garbage".to_vec())]
    #[case::truncated_zlib(vec![0x78, 0x9c, 0x01])]
    #[case::unknown_format(br#"{"format":99,"root":"0","blocks":[]}"#.to_vec())]
    #[case::wrong_root(br#"{"format":1,"root":"other","blocks":[{"key":"other"}]}"#.to_vec())]
    #[tokio::test]
    async fn test_unreadable_entry_is_miss(#[case] bytes: Vec<u8>) {
        let (backend, cache) = memory_cache();
        let root = BlockKey::from(0);
        let sig = signature("v1");
        backend.set(&cache.snapshot_key(&root, INITIAL_GENERATION, &sig), &bytes).await.unwrap();
        assert!(cache.get(&root, &sig).await.unwrap().is_none());

        // The next store overwrites the bad entry.
        cache.set(&root, &sig, &from_children_map(LINEAR_CHILDREN_MAP)).await.unwrap();
        assert!(cache.get(&root, &sig).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_removes_every_signature_for_root_only() {
        let (backend, cache) = memory_cache();
        let course = BlockKey::from(0);
        let other = BlockKey::from("other");
        let structure = from_children_map(SIMPLE_CHILDREN_MAP);
        cache.set(&course, &signature("v1"), &structure).await.unwrap();
        cache.set(&course, &signature("v2"), &structure).await.unwrap();
        cache.set(&other, &signature("v1"), &BlockStructure::new(other.clone())).await.unwrap();

        cache.delete(&course).await.unwrap();

        assert!(cache.get(&course, &signature("v1")).await.unwrap().is_none());
        assert!(cache.get(&course, &signature("v2")).await.unwrap().is_none());
        assert!(cache.get(&other, &signature("v1")).await.unwrap().is_some());
        assert!(!backend.keys().await.contains(&"block_structure.other.gen".to_string()));
        // Nothing left to delete is fine.
        cache.delete(&course).await.unwrap();

        // Entries stored after a delete are readable again.
        cache.set(&course, &signature("v3"), &structure).await.unwrap();
        assert!(cache.get(&course, &signature("v3")).await.unwrap().is_some());
        assert!(cache.get(&course, &signature("v1")).await.unwrap().is_none());
    }

    /// Yields to the scheduler after every read, so that concurrent cache
    /// operations interleave between their reads and writes.
    struct YieldingBackend(MemoryBackend);

    #[async_trait::async_trait]
    impl CacheBackend for YieldingBackend {
        fn name(&self) -> &str {
            "yielding"
        }

        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            let value = self.0.get(key).await?;
            tokio::task::yield_now().await;
            Ok(value)
        }

        async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
            self.0.set(key, value).await
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.0.delete(key).await
        }
    }

    #[tokio::test]
    async fn test_delete_after_concurrent_sets_removes_both() {
        let cache = StructureCache::new(Arc::new(YieldingBackend(MemoryBackend::default())));
        let root = BlockKey::from(0);
        let structure = from_children_map(SIMPLE_CHILDREN_MAP);
        let (v1, v2) = (signature("v1"), signature("v2"));
        let (a, b) = tokio::join!(
            cache.set(&root, &v1, &structure),
            cache.set(&root, &v2, &structure),
        );
        a.unwrap();
        b.unwrap();
        assert!(cache.get(&root, &signature("v1")).await.unwrap().is_some());
        assert!(cache.get(&root, &signature("v2")).await.unwrap().is_some());

        cache.delete(&root).await.unwrap();
        assert!(cache.get(&root, &signature("v1")).await.unwrap().is_none());
        assert!(cache.get(&root, &signature("v2")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_racing_delete_is_not_served() {
        let cache = StructureCache::new(Arc::new(YieldingBackend(MemoryBackend::default())));
        let root = BlockKey::from(0);
        let structure = from_children_map(SIMPLE_CHILDREN_MAP);
        // Both read the generation before either writes.
        let v1 = signature("v1");
        let (set, delete) = tokio::join!(cache.set(&root, &v1, &structure), cache.delete(&root));
        set.unwrap();
        delete.unwrap();
        assert!(cache.get(&root, &signature("v1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_many_and_set_many() {
        let (_backend, cache) = memory_cache();
        let a = BlockKey::from("a");
        let b = BlockKey::from("b");
        let missing = BlockKey::from("missing");
        let sig = signature("v1");
        let structure_a = BlockStructure::new(a.clone());
        let structure_b = BlockStructure::new(b.clone());
        cache.set_many(&[(&a, &sig, &structure_a), (&b, &sig, &structure_b)]).await.unwrap();

        let found = cache
            .get_many(&[(a.clone(), sig.clone()), (missing.clone(), sig.clone()), (b.clone(), sig.clone())])
            .await
            .unwrap();
        assert_eq!(found.len(), 3);
        assert_eq!(found[0].as_ref().map(|s| s.root()), Some(&a));
        assert!(found[1].is_none());
        assert_eq!(found[2].as_ref().map(|s| s.root()), Some(&b));

        // set_many writes under the current generation too.
        cache.delete(&a).await.unwrap();
        assert!(cache.get(&a, &sig).await.unwrap().is_none());
        assert!(cache.get(&b, &sig).await.unwrap().is_some());
    }

    #[rstest]
    #[case(Compression::None)]
    #[case(Compression::Gzip)]
    #[case(Compression::Zlib)]
    #[tokio::test]
    async fn test_compression_setting_change_keeps_entries_readable(#[case] compression: Compression) {
        let backend: BackendHandle = Arc::new(MemoryBackend::default());
        let root = BlockKey::from(0);
        let writer = StructureCache::new(backend.clone()).with_compression(compression);
        writer.set(&root, &signature("v1"), &from_children_map(DAG_CHILDREN_MAP)).await.unwrap();
        let reader = StructureCache::new(backend).with_compression(Compression::Gzip);
        assert!(reader.get(&root, &signature("v1")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_from_config_local_read_only() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = CacheConfig {
            backend: Backend::Local { path: Some(temp_dir.path().to_path_buf()) },
            prefix: "courses".to_string(),
            read_only: true,
            ..Default::default()
        };
        let cache = StructureCache::from_config(&config).unwrap();
        assert_eq!(cache.backend().name(), "local");
        let root = BlockKey::from(0);
        cache.set(&root, &signature("v1"), &from_children_map(LINEAR_CHILDREN_MAP)).await.unwrap();
        assert!(cache.get(&root, &signature("v1")).await.unwrap().is_none());
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_from_config_memory() {
        let cache = StructureCache::from_config(&CacheConfig::default()).unwrap();
        assert_eq!(cache.backend().name(), "memory");
        let root = BlockKey::from(0);
        cache.set(&root, &signature("v1"), &from_children_map(LINEAR_CHILDREN_MAP)).await.unwrap();
        assert!(cache.get(&root, &signature("v1")).await.unwrap().is_some());
    }
}
