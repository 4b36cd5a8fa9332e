use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

fn default_target_topic() -> String {
    "device/contact".to_string()
}

fn default_origin_field() -> String {
    "uuid".to_string()
}

fn default_count_field() -> String {
    "count".to_string()
}

fn default_timestamp_field() -> String {
    "timestamp".to_string()
}

fn default_window_seconds() -> i64 {
    20
}

fn default_sweep_interval_seconds() -> u64 {
    300
}

fn default_connect_topic() -> String {
    "sys/connect".to_string()
}

fn default_disconnect_topic() -> String {
    "sys/disconnect".to_string()
}

fn default_qos() -> u8 {
    1
}

fn default_queue_depth() -> usize {
    256
}

/// Top-level configuration for the prism pipeline.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub dedupe: DedupeConfig,
    #[serde(default)]
    pub enrich: EnrichConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

/// Duplicate-suppression parameters.
///
/// Field names refer to keys inside the report payload; the window and
/// sweep interval are wall-clock seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct DedupeConfig {
    /// Topic whose reports are subject to duplicate suppression.
    #[serde(default = "default_target_topic")]
    pub target_topic: String,
    /// Payload field carrying the origin identifier.
    #[serde(default = "default_origin_field")]
    pub origin_field: String,
    /// Payload field carrying the report counter; a value of exactly 0
    /// marks a client restart.
    #[serde(default = "default_count_field")]
    pub count_field: String,
    /// Payload field carrying the device timestamp. Classification uses
    /// server time; the field name is carried so reconfiguration can
    /// replace the full tuple.
    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,
    /// Reports from the same origin within this many seconds are duplicates.
    #[serde(default = "default_window_seconds")]
    pub window_seconds: i64,
    /// How often the background sweep evicts idle cache entries.
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            target_topic: default_target_topic(),
            origin_field: default_origin_field(),
            count_field: default_count_field(),
            timestamp_field: default_timestamp_field(),
            window_seconds: default_window_seconds(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
        }
    }
}

/// Origin-enrichment parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnrichConfig {
    /// Topics whose payloads are wrapped with sender metadata. Empty by
    /// default, so enrichment is inert until configured.
    #[serde(default)]
    pub topics: HashSet<String>,
}

/// Connect/disconnect announcement parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_connect_topic")]
    pub connect_topic: String,
    #[serde(default = "default_disconnect_topic")]
    pub disconnect_topic: String,
    /// Delivery quality level for announcements.
    #[serde(default = "default_qos")]
    pub qos: u8,
    #[serde(default)]
    pub retain: bool,
    /// Announcements queued but not yet delivered; overflow is dropped.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            connect_topic: default_connect_topic(),
            disconnect_topic: default_disconnect_topic(),
            qos: default_qos(),
            retain: false,
            queue_depth: default_queue_depth(),
        }
    }
}

impl Config {
    /// Load configuration from a path resolved via PRISM_CONFIG or defaults
    /// to `config/prism.toml`.
    pub fn load_from_env() -> Result<Self> {
        Self::load(env_config_path())
    }

    /// Load configuration from a specific file (TOML or JSON based on extension).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        let data = fs::read_to_string(path_ref)
            .with_context(|| format!("unable to read config {}", path_ref.display()))?;
        if is_json(path_ref) {
            Ok(serde_json::from_str(&data)
                .with_context(|| format!("invalid JSON config {}", path_ref.display()))?)
        } else {
            Ok(toml::from_str(&data)
                .with_context(|| format!("invalid TOML config {}", path_ref.display()))?)
        }
    }

    /// Validate schema-level invariants before the pipeline is assembled.
    pub fn validate(&self) -> Result<()> {
        if self.dedupe.target_topic.is_empty() {
            bail!("dedupe.target_topic must be non-empty");
        }
        if self.dedupe.origin_field.is_empty() || self.dedupe.count_field.is_empty() {
            bail!("dedupe field names must be non-empty");
        }
        if self.dedupe.window_seconds <= 0 {
            bail!(
                "dedupe.window_seconds must be positive, got {}",
                self.dedupe.window_seconds
            );
        }
        if self.dedupe.sweep_interval_seconds == 0 {
            bail!("dedupe.sweep_interval_seconds must be > 0");
        }
        if self.notify.connect_topic.is_empty() || self.notify.disconnect_topic.is_empty() {
            bail!("notify topics must be non-empty");
        }
        if self.notify.qos > 2 {
            bail!("notify.qos must be 0, 1, or 2, got {}", self.notify.qos);
        }
        if self.notify.queue_depth == 0 {
            bail!("notify.queue_depth must be > 0");
        }
        if self.enrich.topics.iter().any(String::is_empty) {
            bail!("enrich.topics may not contain the empty topic");
        }
        Ok(())
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

fn env_config_path() -> PathBuf {
    if let Ok(path) = std::env::var("PRISM_CONFIG") {
        PathBuf::from(path)
    } else {
        PathBuf::from("config/prism.toml")
    }
}
