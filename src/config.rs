//! Pipeline configuration
//!
//! All limits and thresholds travel in one explicit [`AudioConfig`] passed into
//! the pipeline. There is no process-wide mutable configuration state; concurrent
//! runs share the struct read-only.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Read-only configuration for a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Maximum accepted upload size in bytes
    pub max_file_size_bytes: u64,

    /// Minimum decodable duration in seconds (rejects degenerate inputs)
    pub min_duration_secs: f64,

    /// Maximum accepted duration in seconds
    pub max_duration_secs: f64,

    /// Sample rate all analysis runs at; decode resamples to this
    pub target_sample_rate: u32,

    /// Durations above this switch the run to the chunked path (seconds)
    pub chunk_duration_threshold_secs: f64,

    /// File sizes above this switch the run to the chunked path (bytes)
    pub chunk_size_threshold_bytes: u64,

    /// Window length for chunked processing (seconds)
    pub chunk_window_secs: f64,

    /// Process RSS ceiling; crossing it triggers early buffer release (MB)
    pub memory_limit_mb: f64,

    /// Permitted file extensions (lowercase, without dot)
    pub allowed_extensions: Vec<String>,

    /// Rendered waveform width in pixels
    pub waveform_width: u32,

    /// Rendered waveform height in pixels
    pub waveform_height: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: 100 * 1024 * 1024,
            min_duration_secs: 0.5,
            max_duration_secs: 600.0,
            target_sample_rate: 44100,
            chunk_duration_threshold_secs: 120.0,
            chunk_size_threshold_bytes: 50 * 1024 * 1024,
            chunk_window_secs: 30.0,
            memory_limit_mb: 500.0,
            allowed_extensions: ["wav", "mp3", "flac", "ogg", "m4a", "aac"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            waveform_width: 1200,
            waveform_height: 200,
        }
    }
}

impl AudioConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// unspecified keys.
    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AudioConfig = toml::from_str(&content)?;
        Ok(config)
    }
}
