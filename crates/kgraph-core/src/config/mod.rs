//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub mirror: MirrorConfig,
    pub cache: CacheConfig,
    pub traversal: TraversalConfig,
    pub analytics: AnalyticsConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file; `None` uses the platform default, `:memory:` a private in-memory store
    pub path: Option<PathBuf>,
    pub min_connections: u32,
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Nodes loaded into memory on open/reload
    pub max_nodes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub ttl_secs: u64,
    pub centrality_ttl_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraversalConfig {
    /// Mirror size at or above which traversal and subgraph queries go to the store
    pub memory_threshold: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Node count above which betweenness is approximated
    pub betweenness_exact_threshold: usize,
    /// Pivot count for approximate betweenness
    pub betweenness_samples: usize,
    /// Concurrent analytics jobs
    pub workers: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub operation_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            min_connections: 1,
            max_connections: 8,
            acquire_timeout_ms: 5_000,
        }
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self { max_nodes: 100_000 }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1_000,
            ttl_secs: 300,
            centrality_ttl_secs: 3_600,
        }
    }
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            memory_threshold: 10_000,
        }
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            betweenness_exact_threshold: 1_000,
            betweenness_samples: 100,
            workers: 4,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            operation_timeout_ms: 30_000,
        }
    }
}

/// Upper bound on cache TTLs, in seconds
const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

const KEYS: &[&str] = &[
    "storage.path",
    "storage.min_connections",
    "storage.max_connections",
    "storage.acquire_timeout_ms",
    "mirror.max_nodes",
    "cache.max_entries",
    "cache.ttl_secs",
    "cache.centrality_ttl_secs",
    "traversal.memory_threshold",
    "analytics.betweenness_exact_threshold",
    "analytics.betweenness_samples",
    "analytics.workers",
    "engine.operation_timeout_ms",
];

impl Config {
    /// Configuration backed by a private in-memory store
    pub fn in_memory() -> Self {
        let mut config = Self::default();
        config.storage.path = Some(PathBuf::from(":memory:"));
        config
    }

    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("KGRAPH_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("kgraph")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.storage.max_connections == 0 {
            return Err(anyhow!("storage.max_connections must be at least 1"));
        }
        if self.storage.min_connections > self.storage.max_connections {
            return Err(anyhow!(
                "storage.min_connections ({}) exceeds storage.max_connections ({})",
                self.storage.min_connections,
                self.storage.max_connections
            ));
        }
        for (key, secs) in [
            ("cache.ttl_secs", self.cache.ttl_secs),
            ("cache.centrality_ttl_secs", self.cache.centrality_ttl_secs),
        ] {
            if secs > MAX_TTL_SECS {
                return Err(anyhow!("{} must be at most {} (one year)", key, MAX_TTL_SECS));
            }
        }
        if self.cache.max_entries == 0 {
            return Err(anyhow!("cache.max_entries must be at least 1"));
        }
        if self.analytics.workers == 0 {
            return Err(anyhow!("analytics.workers must be at least 1"));
        }
        if self.analytics.betweenness_samples == 0 {
            return Err(anyhow!("analytics.betweenness_samples must be at least 1"));
        }
        if self.engine.operation_timeout_ms == 0 {
            return Err(anyhow!("engine.operation_timeout_ms must be positive"));
        }
        Ok(())
    }

    /// Deadline applied to every read operation
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.engine.operation_timeout_ms)
    }

    /// Default result cache TTL
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    /// TTL for centrality results
    pub fn centrality_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.centrality_ttl_secs)
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "storage.path" => Ok(self
                .storage
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(default)".to_string())),
            "storage.min_connections" => Ok(self.storage.min_connections.to_string()),
            "storage.max_connections" => Ok(self.storage.max_connections.to_string()),
            "storage.acquire_timeout_ms" => Ok(self.storage.acquire_timeout_ms.to_string()),

            "mirror.max_nodes" => Ok(self.mirror.max_nodes.to_string()),

            "cache.max_entries" => Ok(self.cache.max_entries.to_string()),
            "cache.ttl_secs" => Ok(self.cache.ttl_secs.to_string()),
            "cache.centrality_ttl_secs" => Ok(self.cache.centrality_ttl_secs.to_string()),

            "traversal.memory_threshold" => Ok(self.traversal.memory_threshold.to_string()),

            "analytics.betweenness_exact_threshold" => {
                Ok(self.analytics.betweenness_exact_threshold.to_string())
            }
            "analytics.betweenness_samples" => Ok(self.analytics.betweenness_samples.to_string()),
            "analytics.workers" => Ok(self.analytics.workers.to_string()),

            "engine.operation_timeout_ms" => Ok(self.engine.operation_timeout_ms.to_string()),

            _ => Err(unknown_key(key)),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "storage.path" => {
                self.storage.path = match value.trim() {
                    "" | "(default)" => None,
                    path => Some(PathBuf::from(path)),
                };
            }
            "storage.min_connections" => self.storage.min_connections = parse(key, value)?,
            "storage.max_connections" => self.storage.max_connections = parse(key, value)?,
            "storage.acquire_timeout_ms" => self.storage.acquire_timeout_ms = parse(key, value)?,

            "mirror.max_nodes" => self.mirror.max_nodes = parse(key, value)?,

            "cache.max_entries" => self.cache.max_entries = parse(key, value)?,
            "cache.ttl_secs" => self.cache.ttl_secs = parse(key, value)?,
            "cache.centrality_ttl_secs" => self.cache.centrality_ttl_secs = parse(key, value)?,

            "traversal.memory_threshold" => self.traversal.memory_threshold = parse(key, value)?,

            "analytics.betweenness_exact_threshold" => {
                self.analytics.betweenness_exact_threshold = parse(key, value)?
            }
            "analytics.betweenness_samples" => {
                self.analytics.betweenness_samples = parse(key, value)?
            }
            "analytics.workers" => self.analytics.workers = parse(key, value)?,

            "engine.operation_timeout_ms" => self.engine.operation_timeout_ms = parse(key, value)?,

            _ => return Err(unknown_key(key)),
        }
        self.validate()
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        KEYS.iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}

fn parse<T>(key: &str, value: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid {} value: {}", key, value))
}

fn unknown_key(key: &str) -> anyhow::Error {
    anyhow!(
        "Unknown configuration key: {}. Use `kgraph config list` to see available keys.",
        key
    )
}
