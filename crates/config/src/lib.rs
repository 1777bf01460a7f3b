//! Layered configuration for the block cache.
//!
//! Values are resolved in order, later layers overriding earlier ones:
//! 1. Built-in defaults ([`Config::default`])
//! 2. An optional configuration file (TOML, YAML or JSON, chosen by extension)
//! 3. Environment variables prefixed with `BLOCKCACHE_`, using `__` to nest
//!    (e.g. `BLOCKCACHE_CACHE__PREFIX=courses`)

pub mod error;

use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "BLOCKCACHE_";
pub const DEFAULT_PREFIX: &str = "block_structure";

/// Longest accepted cache key prefix. Leaves room in a 250 byte key for the
/// escaped root (at most 128 bytes), a 64 byte entry id and two separators.
pub const MAX_PREFIX_LENGTH: usize = 56;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    /// Names of the transformers to run, in order. Resolved against the
    /// transformer registry at startup.
    pub transformers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: Backend,
    /// Namespace prepended to every cache key.
    pub prefix: String,
    pub compression: Compression,
    /// Serve reads from the backend but silently skip all writes.
    pub read_only: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            prefix: DEFAULT_PREFIX.to_string(),
            compression: Compression::default(),
            read_only: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Backend {
    /// Process-local, lost on exit.
    #[default]
    Memory,
    /// One file per cache key under a directory.
    Local {
        /// Defaults to the platform cache directory when unset.
        #[serde(default)]
        path: Option<PathBuf>,
    },
}

/// Compression applied to serialized snapshots before they are stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    Gzip,
    #[default]
    Zlib,
}

impl CacheConfig {
    /// Directory used by the local backend.
    pub fn local_path(&self) -> Result<Option<PathBuf>> {
        match &self.backend {
            Backend::Memory => Ok(None),
            Backend::Local { path: Some(path) } => Ok(Some(path.clone())),
            Backend::Local { path: None } => {
                let dirs = directories::ProjectDirs::from("", "", "blockcache").ok_or_raise(|| ErrorKind::NoCacheDirectory)?;
                Ok(Some(dirs.cache_dir().to_path_buf()))
            },
        }
    }
}

impl Config {
    /// Build the layered figment without extracting it.
    pub fn figment(file: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = file {
            let extension = path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase);
            figment = match extension.as_deref() {
                Some("toml") => figment.merge(Toml::file(path)),
                Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
                Some("json") => figment.merge(Json::file(path)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
            };
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Load and validate configuration.
    #[tracing::instrument]
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let config: Config = Self::figment(file)?.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        tracing::debug!(
            prefix = %config.cache.prefix,
            compression = ?config.cache.compression,
            read_only = config.cache.read_only,
            transformers = config.transformers.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let prefix = &self.cache.prefix;
        if prefix.is_empty() {
            exn::bail!(ErrorKind::Invalid { field: "cache.prefix", reason: "must not be empty".to_string() });
        }
        if prefix.len() > MAX_PREFIX_LENGTH {
            exn::bail!(ErrorKind::Invalid {
                field: "cache.prefix",
                reason: format!("longer than {MAX_PREFIX_LENGTH} bytes"),
            });
        }
        // Cache keys are also file names for the local backend.
        if let Some(c) = prefix
            .chars()
            .find(|c| matches!(*c, '.' | '/' | '\\') || c.is_whitespace() || c.is_control())
        {
            exn::bail!(ErrorKind::Invalid {
                field: "cache.prefix",
                reason: format!("contains forbidden character {c:?}"),
            });
        }
        if let Backend::Local { path: Some(path) } = &self.cache.backend
            && !path.is_absolute()
        {
            exn::bail!(ErrorKind::Invalid {
                field: "cache.backend.path",
                reason: format!("must be absolute, got {}", path.display()),
            });
        }
        let mut seen = HashSet::new();
        for name in &self.transformers {
            if name.trim().is_empty() {
                exn::bail!(ErrorKind::Invalid { field: "transformers", reason: "empty transformer name".to_string() });
            }
            if !seen.insert(name.as_str()) {
                exn::bail!(ErrorKind::Invalid {
                    field: "transformers",
                    reason: format!("'{name}' is listed more than once"),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert_eq!(config.cache.prefix, DEFAULT_PREFIX);
        assert_eq!(config.cache.compression, Compression::Zlib);
        assert_eq!(config.cache.backend, Backend::Memory);
        assert!(!config.cache.read_only);
        config.validate().unwrap();
    }

    #[test]
    fn test_layering_file_then_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "blockcache.toml",
                r#"
                transformers = ["visibility", "completion"]

                [cache]
                prefix = "courses"
                compression = "gzip"

                [cache.backend]
                type = "local"
                path = "/var/cache/blockcache"
                "#,
            )?;
            jail.set_env("BLOCKCACHE_CACHE__READ_ONLY", "true");
            jail.set_env("BLOCKCACHE_CACHE__PREFIX", "from_env");

            let config = Config::load(Some(Path::new("blockcache.toml"))).unwrap();
            assert_eq!(config.cache.prefix, "from_env");
            assert_eq!(config.cache.compression, Compression::Gzip);
            assert!(config.cache.read_only);
            assert_eq!(config.cache.backend, Backend::Local { path: Some(PathBuf::from("/var/cache/blockcache")) });
            assert_eq!(config.transformers, vec!["visibility".to_string(), "completion".to_string()]);
            Ok(())
        });
    }

    #[test]
    fn test_load_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "cache:\n  compression: none\n  backend:\n    type: memory").unwrap();

        // Jail serializes environment access with tests that set variables.
        figment::Jail::expect_with(|_jail| {
            let config = Config::load(Some(&path)).unwrap();
            assert_eq!(config.cache.compression, Compression::None);
            assert_eq!(config.cache.prefix, DEFAULT_PREFIX);
            Ok(())
        });
    }

    #[test]
    fn test_unsupported_extension() {
        let err = Config::figment(Some(Path::new("config.ini"))).unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnsupportedFormat(path) if path == Path::new("config.ini")));
    }

    #[test]
    fn test_malformed_file_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        figment::Jail::expect_with(|_jail| {
            let err = Config::load(Some(&path)).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Load));
            Ok(())
        });
    }

    #[rstest]
    #[case::empty_prefix(|c: &mut Config| c.cache.prefix = String::new(), "cache.prefix")]
    #[case::dotted_prefix(|c: &mut Config| c.cache.prefix = "a.b".to_string(), "cache.prefix")]
    #[case::spaced_prefix(|c: &mut Config| c.cache.prefix = "a b".to_string(), "cache.prefix")]
    #[case::slash_prefix(|c: &mut Config| c.cache.prefix = "courses/prod".to_string(), "cache.prefix")]
    #[case::backslash_prefix(|c: &mut Config| c.cache.prefix = "courses\\prod".to_string(), "cache.prefix")]
    #[case::long_prefix(|c: &mut Config| c.cache.prefix = "p".repeat(MAX_PREFIX_LENGTH + 1), "cache.prefix")]
    #[case::relative_path(
        |c: &mut Config| c.cache.backend = Backend::Local { path: Some(PathBuf::from("relative/dir")) },
        "cache.backend.path"
    )]
    #[case::duplicate_transformer(
        |c: &mut Config| c.transformers = vec!["a".to_string(), "a".to_string()],
        "transformers"
    )]
    #[case::blank_transformer(|c: &mut Config| c.transformers = vec![" ".to_string()], "transformers")]
    fn test_validate_rejects(#[case] mutate: fn(&mut Config), #[case] expected_field: &str) {
        let mut config = Config::default();
        mutate(&mut config);
        let err = config.validate().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid { field, .. } if *field == expected_field));
    }

    #[test]
    fn test_longest_prefix_is_valid() {
        let mut config = Config::default();
        config.cache.prefix = "p".repeat(MAX_PREFIX_LENGTH);
        config.validate().unwrap();
    }

    #[test]
    fn test_local_path_resolution() {
        let config = CacheConfig::default();
        assert_eq!(config.local_path().unwrap(), None);

        let config = CacheConfig { backend: Backend::Local { path: Some(PathBuf::from("/tmp/x")) }, ..Default::default() };
        assert_eq!(config.local_path().unwrap(), Some(PathBuf::from("/tmp/x")));
    }
}
