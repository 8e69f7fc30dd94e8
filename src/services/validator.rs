//! Upload admissibility checks
//!
//! Checks run in a fixed order and fail fast with the matching
//! [`ValidationError`] variant: existence, non-zero size, size ceiling, minimum
//! and maximum duration, extension allow-list. Container properties come from
//! lofty without a full decode; true duration is re-checked after decode by the
//! orchestrator since container headers can lie.

use crate::config::AudioConfig;
use crate::error::ValidationError;
use crate::models::ValidationResult;
use lofty::prelude::*;
use lofty::probe::Probe;
use std::path::Path;
use tracing::debug;

/// Upload validator.
pub struct Validator {
    config: AudioConfig,
}

impl Validator {
    pub fn new(config: AudioConfig) -> Self {
        Self { config }
    }

    /// Run all admissibility checks against a file on disk.
    pub fn validate(&self, path: &Path) -> Result<ValidationResult, ValidationError> {
        if !path.exists() {
            return Err(ValidationError::NotFound(path.to_path_buf()));
        }

        let file_size = std::fs::metadata(path)
            .map_err(|_| ValidationError::NotFound(path.to_path_buf()))?
            .len();

        if file_size == 0 {
            return Err(ValidationError::Empty);
        }
        if file_size > self.config.max_file_size_bytes {
            return Err(ValidationError::TooLarge {
                size: file_size,
                max: self.config.max_file_size_bytes,
            });
        }

        // Container-level properties; an unparseable container is a format rejection
        let tagged_file = Probe::open(path)
            .map_err(|e| ValidationError::UnsupportedFormat(e.to_string()))?
            .read()
            .map_err(|e| ValidationError::UnsupportedFormat(e.to_string()))?;
        let properties = tagged_file.properties();

        let duration = properties.duration().as_secs_f64();
        // A parseable container without a sample rate cannot be decoded anyway
        let sample_rate = properties
            .sample_rate()
            .filter(|&rate| rate > 0)
            .ok_or_else(|| {
                ValidationError::UnsupportedFormat("container reports no sample rate".to_string())
            })?;
        let channels = properties.channels().unwrap_or(1).max(1) as u16;

        if duration < self.config.min_duration_secs {
            return Err(ValidationError::TooShort {
                duration,
                min: self.config.min_duration_secs,
            });
        }
        // Ceiling check on the container-reported duration, so an hours-long
        // upload is rejected before anything decodes it in full
        self.validate_duration(duration)?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        if !self.config.allowed_extensions.contains(&extension) {
            return Err(ValidationError::UnsupportedFormat(extension));
        }

        let mime_type = infer::get_from_path(path)
            .ok()
            .flatten()
            .map(|kind| kind.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        debug!(
            "Validated {}: {} bytes, {:.2}s, {} Hz, {} ch, {}",
            path.display(),
            file_size,
            duration,
            sample_rate,
            channels,
            mime_type
        );

        Ok(ValidationResult {
            valid: true,
            file_size,
            mime_type,
            sample_rate,
            duration,
            channels,
        })
    }

    /// Re-check duration against the configured maximum. Called again after
    /// decode, when the true duration is known.
    pub fn validate_duration(&self, duration: f64) -> Result<(), ValidationError> {
        if duration > self.config.max_duration_secs {
            return Err(ValidationError::DurationExceeded {
                duration,
                max: self.config.max_duration_secs,
            });
        }
        Ok(())
    }
}
