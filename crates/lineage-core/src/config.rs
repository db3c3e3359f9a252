//! Configuration loading and typed config structures for Lineage.
//!
//! Every section is optional; a missing section or field takes the default
//! documented on it, so an empty document is a valid configuration.
//!
//! ```yaml
//! storage:
//!   bucket_prefix: "kanban"
//!   dragonfly_url: "redis://localhost:6379"
//!   allow_siblings: true
//! ids:
//!   seed: "seed string"
//! resolution:
//!   max_rounds: 64
//!   round_timeout_ms: 2000
//! stores:
//!   board:
//!     actor_bucket: "boards"
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use lineage_actors::ResolverConfig;
use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LineageConfig {
    /// Backend connection and bucket naming.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Id generator settings.
    #[serde(default)]
    pub ids: IdConfig,

    /// Limits for ancestor resolution.
    #[serde(default)]
    pub resolution: ResolutionConfig,

    /// Per actor type bucket overrides, keyed by actor type.
    #[serde(default)]
    pub stores: BTreeMap<String, StoreBuckets>,
}

impl LineageConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `LINEAGE_BUCKET_PREFIX` overrides `storage.bucket_prefix`
    /// - `LINEAGE_DRAGONFLY_URL` overrides `storage.dragonfly_url`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, then apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config = Self::parse_without_env(yaml)?;
        config.storage.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a YAML string, ignoring the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse_without_env(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Bucket overrides for `actor_type`, if any were configured.
    pub fn store(&self, actor_type: &str) -> Option<&StoreBuckets> {
        self.stores.get(actor_type)
    }
}

/// Backend connection and bucket naming.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageConfig {
    /// Prepended to every bucket name as `<prefix>_<bucket>`.
    #[serde(default)]
    pub bucket_prefix: Option<String>,

    /// `Dragonfly` connection URL.
    #[serde(default = "default_dragonfly_url")]
    pub dragonfly_url: String,

    /// Keep concurrent writes as siblings. Turning this off makes every
    /// write replace whatever the key holds.
    #[serde(default = "default_allow_siblings")]
    pub allow_siblings: bool,
}

impl StorageConfig {
    /// Apply `LINEAGE_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("LINEAGE_BUCKET_PREFIX") {
            self.bucket_prefix = Some(val).filter(|p| !p.is_empty());
        }
        if let Ok(val) = std::env::var("LINEAGE_DRAGONFLY_URL") {
            self.dragonfly_url = val;
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket_prefix: None,
            dragonfly_url: default_dragonfly_url(),
            allow_siblings: default_allow_siblings(),
        }
    }
}

/// Id generator settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IdConfig {
    /// Seed hashed into the generator's worker id. Processes writing to the
    /// same buckets should use distinct seeds.
    #[serde(default = "default_id_seed")]
    pub seed: String,
}

impl Default for IdConfig {
    fn default() -> Self {
        Self {
            seed: default_id_seed(),
        }
    }
}

/// Limits for ancestor resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ResolutionConfig {
    /// Rounds after which an unresolved search fails.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,

    /// Deadline for each snapshot fetch within a round, in milliseconds.
    #[serde(default = "default_round_timeout_ms")]
    pub round_timeout_ms: u64,
}

impl ResolutionConfig {
    /// The resolver limits this section describes.
    pub const fn resolver(&self) -> ResolverConfig {
        ResolverConfig {
            max_rounds: self.max_rounds,
            round_timeout: Duration::from_millis(self.round_timeout_ms),
        }
    }
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            round_timeout_ms: default_round_timeout_ms(),
        }
    }
}

/// Bucket name overrides for one actor type. Unset names use the defaults
/// from [`BucketNames`](crate::BucketNames).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StoreBuckets {
    /// Bucket for current records and snapshots.
    #[serde(default)]
    pub actor_bucket: Option<String>,

    /// Bucket for single events.
    #[serde(default)]
    pub event_bucket: Option<String>,

    /// Bucket for event packs.
    #[serde(default)]
    pub event_pack_bucket: Option<String>,
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

fn default_dragonfly_url() -> String {
    "redis://localhost:6379".to_owned()
}

const fn default_allow_siblings() -> bool {
    true
}

fn default_id_seed() -> String {
    "seed string".to_owned()
}

const fn default_max_rounds() -> usize {
    64
}

const fn default_round_timeout_ms() -> u64 {
    2_000
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = LineageConfig::parse_without_env("").ok();
        assert_eq!(config, Some(LineageConfig::default()));

        let config = LineageConfig::default();
        assert!(config.storage.allow_siblings);
        assert_eq!(config.storage.bucket_prefix, None);
        assert_eq!(config.ids.seed, "seed string");
        assert_eq!(config.resolution.max_rounds, 64);
        assert_eq!(config.resolution.round_timeout_ms, 2_000);
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
storage:
  bucket_prefix: "kanban"
  dragonfly_url: "redis://cache:6379"
  allow_siblings: false
ids:
  seed: "worker-7"
resolution:
  max_rounds: 8
  round_timeout_ms: 250
stores:
  board:
    actor_bucket: "boards"
    event_pack_bucket: "board_batches"
"#;
        let Ok(config) = LineageConfig::parse_without_env(yaml) else {
            panic!("config should parse");
        };

        assert_eq!(config.storage.bucket_prefix.as_deref(), Some("kanban"));
        assert_eq!(config.storage.dragonfly_url, "redis://cache:6379");
        assert!(!config.storage.allow_siblings);
        assert_eq!(config.ids.seed, "worker-7");

        let resolver = config.resolution.resolver();
        assert_eq!(resolver.max_rounds, 8);
        assert_eq!(resolver.round_timeout, Duration::from_millis(250));

        let board = config.store("board");
        assert_eq!(
            board.and_then(|b| b.actor_bucket.as_deref()),
            Some("boards")
        );
        assert_eq!(board.and_then(|b| b.event_bucket.as_deref()), None);
        assert!(config.store("card").is_none());
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let Ok(config) = LineageConfig::parse_without_env("resolution:\n  max_rounds: 3\n") else {
            panic!("config should parse");
        };
        assert_eq!(config.resolution.max_rounds, 3);
        assert_eq!(config.resolution.round_timeout_ms, 2_000);
        assert_eq!(config.storage, StorageConfig::default());
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        let result = LineageConfig::parse_without_env("resolution: [not, a, map]");
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }
}
