//! Engine configuration.
//!
//! The original engine hid its tuning knobs in process-wide constants. Here
//! they are an explicit value passed into each operation so tests can shrink
//! them (tiny waveform widths, small chunks) without touching shared state.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Tuning knobs shared by all engine operations.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// AAC output bit rate in bits per second.
    pub bit_rate: u32,
    /// Bytes of PCM submitted to the encoder per access-unit.
    pub chunk_bytes: usize,
    /// Target point count for the interactive peak-bucket preview.
    pub preview_target_points: usize,
    /// Bounded timeout for each output-slot poll, in milliseconds.
    pub poll_timeout_ms: u64,
    /// Minimum number of processed samples between progress callbacks.
    pub progress_interval_samples: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bit_rate: 128_000,
            chunk_bytes: 4096,
            preview_target_points: 10_000,
            poll_timeout_ms: 10,
            progress_interval_samples: 32_768,
        }
    }
}

impl EngineConfig {
    /// Output-slot poll timeout as a [`Duration`].
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// Parse a configuration from TOML text. Missing fields keep defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse { source })
    }

    /// Load a configuration file from disk.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

/// Errors raised while loading an [`EngineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config: {source}")]
    Parse { source: toml::de::Error },
}
