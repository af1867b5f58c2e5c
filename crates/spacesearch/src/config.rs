//! Configuration loading
//!
//! Settings come from an optional TOML file overlaid by environment
//! variables such as `SPACESEARCH_EVENTS__NUM_CONSUMERS=4`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::DEFAULT_BATCH_SIZE;

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "SPACESEARCH";

/// Configuration result type
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(err: toml::ser::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

/// Top-level service configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpaceSearchConfig {
    pub engine: EngineConfig,
    pub events: EventsConfig,
    pub indexing: IndexingConfig,
    pub log: LogConfig,
}

/// Which index backend to run, chosen once at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EngineConfig {
    Embedded(EmbeddedConfig),
    Clustered(ClusteredConfig),
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig::Embedded(EmbeddedConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddedConfig {
    /// Directory holding the index; the tantivy files live in `<data_path>/tantivy`
    pub data_path: PathBuf,
    pub writer_heap_bytes: usize,
}

impl Default for EmbeddedConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data/search"),
            writer_heap_bytes: 50_000_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteredConfig {
    pub url: String,
    pub index: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// How long the cluster may take to report health at startup
    pub health_timeout_ms: u64,
    /// Skip TLS certificate verification
    pub insecure: bool,
    pub user_agent: String,
}

impl Default for ClusteredConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            index: "spacesearch-resource".to_string(),
            username: None,
            password: None,
            timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
            health_timeout_ms: 5_000,
            insecure: false,
            user_agent: format!("spacesearch/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClusteredConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Workers draining the event stream concurrently
    pub num_consumers: usize,
    pub debounce_duration_ms: u64,
    /// Upper bound on how long a busy space can keep postponing its reindex
    pub debounce_max_wait_ms: u64,
    /// Reindex on `upload-ready` instead of `file-uploaded`
    pub async_uploads: bool,
    pub consumer_group: String,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            num_consumers: 1,
            debounce_duration_ms: 1_000,
            debounce_max_wait_ms: 30_000,
            async_uploads: true,
            consumer_group: "search-pull".to_string(),
        }
    }
}

impl EventsConfig {
    pub fn debounce_duration(&self) -> Duration {
        Duration::from_millis(self.debounce_duration_ms)
    }

    pub fn debounce_max_wait(&self) -> Duration {
        Duration::from_millis(self.debounce_max_wait_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    /// Operations staged per batch during a space reindex
    pub batch_size: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl SpaceSearchConfig {
    /// Load from `path` (if it exists) and the environment, then validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path.to_path_buf()).required(false));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: SpaceSearchConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as TOML
    pub fn save(&self, path: &Path) -> Result<()> {
        let toml = toml::to_string(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.indexing.batch_size == 0 {
            return Err(ConfigError::Validation(
                "indexing.batch_size must be greater than 0".to_string(),
            ));
        }
        if self.events.num_consumers == 0 {
            return Err(ConfigError::Validation(
                "events.num_consumers must be greater than 0".to_string(),
            ));
        }
        if self.events.debounce_max_wait_ms < self.events.debounce_duration_ms {
            return Err(ConfigError::Validation(
                "events.debounce_max_wait_ms must not be shorter than events.debounce_duration_ms"
                    .to_string(),
            ));
        }
        if self.log.level.parse::<tracing::Level>().is_err() {
            return Err(ConfigError::Validation(format!(
                "unknown log level '{}'",
                self.log.level
            )));
        }

        if let EngineConfig::Clustered(clustered) = &self.engine {
            if clustered.index.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "engine.index must not be empty".to_string(),
                ));
            }
            url::Url::parse(&clustered.url).map_err(|e| {
                ConfigError::Validation(format!("invalid engine.url '{}': {}", clustered.url, e))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::tempdir;

    #[test]
    #[serial]
    fn test_defaults_without_file() {
        let config = SpaceSearchConfig::load(None).unwrap();
        assert_eq!(config, SpaceSearchConfig::default());
        assert_eq!(config.indexing.batch_size, DEFAULT_BATCH_SIZE);
        assert!(matches!(config.engine, EngineConfig::Embedded(_)));
    }

    #[test]
    #[serial]
    fn test_load_clustered_from_file() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("search.toml");
        std::fs::write(
            &path,
            r#"
[engine]
type = "clustered"
url = "https://search.internal:9200"
index = "resources"
username = "admin"

[events]
num_consumers = 4
async_uploads = false
"#,
        )
        .unwrap();

        let config = SpaceSearchConfig::load(Some(&path)).unwrap();
        match &config.engine {
            EngineConfig::Clustered(clustered) => {
                assert_eq!(clustered.index, "resources");
                assert_eq!(clustered.username.as_deref(), Some("admin"));
                assert_eq!(clustered.timeout_ms, 30_000);
            }
            other => panic!("expected clustered engine, got {other:?}"),
        }
        assert_eq!(config.events.num_consumers, 4);
        assert!(!config.events.async_uploads);
        assert_eq!(config.events.debounce_duration(), Duration::from_secs(1));
    }

    #[test]
    #[serial]
    fn test_environment_overrides_file() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("search.toml");
        std::fs::write(&path, "[indexing]\nbatch_size = 10\n").unwrap();

        std::env::set_var("SPACESEARCH_INDEXING__BATCH_SIZE", "25");
        let config = SpaceSearchConfig::load(Some(&path));
        std::env::remove_var("SPACESEARCH_INDEXING__BATCH_SIZE");

        assert_eq!(config.unwrap().indexing.batch_size, 25);
    }

    #[test]
    fn test_validation_failures() {
        let mut config = SpaceSearchConfig::default();
        config.indexing.batch_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let mut config = SpaceSearchConfig::default();
        config.log.level = "loud".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let config = SpaceSearchConfig {
            engine: EngineConfig::Clustered(ClusteredConfig {
                url: "not a url".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    #[serial]
    fn test_save_and_reload() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("search.toml");
        let mut config = SpaceSearchConfig::default();
        config.events.num_consumers = 3;
        config.save(&path).unwrap();

        let loaded = SpaceSearchConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded, config);
    }
}
