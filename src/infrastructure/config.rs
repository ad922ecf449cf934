//! Configuration loading and management
//!
//! JSON configuration file with sensible defaults. On first run the default
//! configuration is written next to the process so operators have a template
//! to edit; after that the file is authoritative.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::info;

use crate::domain::cursor::CursorAdvance;

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub database: DatabaseConfig,
    pub search: SearchConfig,
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

/// Remote source endpoints and paging shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Paginated query API endpoint.
    pub api_url: String,

    /// Base URL for per-parcel token-URI metadata; the parcel id is appended
    /// as the final path segment.
    pub metadata_base_url: String,

    /// Rows requested per page.
    pub batch_size: u32,

    /// Concurrent in-flight pages per bulk-load round.
    pub concurrency: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000/subgraphs/name/cryptovoxels".to_string(),
            metadata_base_url: "https://www.cryptovoxels.com/p".to_string(),
            batch_size: 1000,
            concurrency: 4,
        }
    }
}

/// Row store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:data/parcel_sync.db".to_string(),
        }
    }
}

/// Search index node and index name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub node_url: String,
    pub index: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            node_url: "http://localhost:9200".to_string(),
            index: "cryptovoxels-parcels".to_string(),
        }
    }
}

/// Which loop owns steady state after bulk load completes. Exactly one of
/// the two runs at a time; enrichment matches the behavior of the service
/// this engine replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SteadyState {
    Enrichment,
    Poll,
}

/// Engine loop tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Poll interval in seconds; converted to milliseconds internally.
    pub refresh_interval_secs: u64,
    pub steady_state: SteadyState,
    pub cursor_advance: CursorAdvance,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 60,
            steady_state: SteadyState::Enrichment,
            cursor_advance: CursorAdvance::default(),
        }
    }
}

impl EngineConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_secs * 1000)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter, overridden by RUST_LOG when set.
    pub level: String,

    /// Also write logs to a daily-rotated file under `dir`.
    pub file_enabled: bool,
    pub dir: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_enabled: false,
            dir: "logs".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `path`, writing the default configuration
    /// there first if the file does not exist yet.
    pub async fn load_or_init(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            let config = Self::default();
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent).await.with_context(|| {
                        format!("Failed to create config directory: {}", parent.display())
                    })?;
                }
            }
            let json = serde_json::to_string_pretty(&config)?;
            fs::write(path, json)
                .await
                .with_context(|| format!("Failed to write default config: {}", path.display()))?;
            info!("Created default configuration at {}", path.display());
            return Ok(config);
        }

        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }
}
