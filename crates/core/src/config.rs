//! TOML-based configuration for the tally analytics engine.

use crate::error::{Result, TallyError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level tally configuration, deserialized from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TallyConfig {
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub batching: BatchingConfig,
    #[serde(default)]
    pub engagement: EngagementConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Where and how event batches are delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub mode: DeliveryMode,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
            mode: DeliveryMode::Remote,
        }
    }
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8080/api/analytics/events".into()
}

fn default_timeout_secs() -> u64 {
    10
}

/// Delivery modes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// POST batches to the collector endpoint.
    #[default]
    Remote,
    /// Development mode: batches are logged and mirrored locally, never sent.
    Local,
}

/// Flush policy for the in-memory event queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchingConfig {
    /// Queue length that triggers an immediate flush.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum time an unflushed event waits before a timed flush.
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
    /// Upper bound on queued events; requeues beyond it drop the oldest events.
    #[serde(default = "default_max_queue_len")]
    pub max_queue_len: usize,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_timeout_ms: default_batch_timeout_ms(),
            max_queue_len: default_max_queue_len(),
        }
    }
}

fn default_batch_size() -> usize {
    10
}

fn default_batch_timeout_ms() -> u64 {
    5000
}

fn default_max_queue_len() -> usize {
    1000
}

/// Dwell-time tracking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementConfig {
    /// Views with less active time than this are discarded without an event.
    #[serde(default = "default_min_dwell_ms")]
    pub min_dwell_ms: i64,
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            min_dwell_ms: default_min_dwell_ms(),
        }
    }
}

fn default_min_dwell_ms() -> i64 {
    10_000
}

/// Durable local storage layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_consent_key")]
    pub consent_key: String,
    #[serde(default = "default_events_key")]
    pub events_key: String,
    /// Mirror delivered batches into local storage for inspection.
    #[serde(default)]
    pub mirror_enabled: bool,
    #[serde(default = "default_mirror_limit")]
    pub mirror_limit: usize,
    /// Directory for the file-backed store. `None` keeps everything in memory.
    #[serde(default)]
    pub data_dir: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            consent_key: default_consent_key(),
            events_key: default_events_key(),
            mirror_enabled: false,
            mirror_limit: default_mirror_limit(),
            data_dir: None,
        }
    }
}

fn default_consent_key() -> String {
    "tally_analytics_consent".into()
}

fn default_events_key() -> String {
    "tally_analytics_events".into()
}

fn default_mirror_limit() -> usize {
    1000
}

impl StorageConfig {
    /// Whether delivered batches should be mirrored, taking the delivery mode into account.
    pub fn mirror_active(&self, mode: DeliveryMode) -> bool {
        self.mirror_enabled || mode == DeliveryMode::Local
    }
}

impl TallyConfig {
    /// Load configuration from a TOML file at the given path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| TallyError::Config(format!("failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Validate the configuration, returning an error for invalid combinations.
    pub fn validate(&self) -> Result<()> {
        if self.collector.mode == DeliveryMode::Remote {
            let endpoint = self.collector.endpoint.as_str();
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(TallyError::Config(format!(
                    "collector.endpoint must be an http(s) URL in remote mode: {endpoint}"
                )));
            }
        }

        if self.batching.batch_size == 0 {
            return Err(TallyError::Config(
                "batching.batch_size must be at least 1".into(),
            ));
        }

        if self.batching.batch_timeout_ms == 0 {
            return Err(TallyError::Config(
                "batching.batch_timeout_ms must be greater than 0".into(),
            ));
        }

        if self.batching.max_queue_len < self.batching.batch_size {
            return Err(TallyError::Config(
                "batching.max_queue_len must not be smaller than batching.batch_size".into(),
            ));
        }

        if self.storage.mirror_limit == 0 {
            return Err(TallyError::Config(
                "storage.mirror_limit must be at least 1".into(),
            ));
        }

        if self.storage.consent_key.is_empty() || self.storage.events_key.is_empty() {
            return Err(TallyError::Config(
                "storage.consent_key and storage.events_key must not be empty".into(),
            ));
        }

        if self.storage.consent_key == self.storage.events_key {
            return Err(TallyError::Config(
                "storage.consent_key and storage.events_key must differ".into(),
            ));
        }

        Ok(())
    }

    /// Generate a sensible default configuration.
    pub fn generate_default() -> Self {
        Self::default()
    }
}
