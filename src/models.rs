//! Result records handed to downstream collaborators
//!
//! Everything here is `Serialize` so the caller can persist the records onto its
//! own session/order row verbatim. All instances live inside a single pipeline
//! run; nothing is persisted by this crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Decoded mono PCM signal, exclusively owned by the active pipeline run.
#[derive(Debug, Clone)]
pub struct DecodedSignal {
    /// Mono samples, normalized to [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count of the source material (>= 1)
    pub channels: u16,
}

impl DecodedSignal {
    /// Duration in seconds.
    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Outcome of upload admissibility checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub file_size: u64,
    pub mime_type: String,
    pub sample_rate: u32,
    pub duration: f64,
    pub channels: u16,
}

/// Basic signal statistics computed at decode time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioMetadata {
    pub duration: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// RMS amplitude, a loudness proxy (>= 0)
    pub rms_energy: f64,
    /// Largest absolute sample value (>= 0)
    pub peak_amplitude: f64,
    /// Peak-to-RMS spread in dB (>= 0)
    pub dynamic_range: f64,
    /// Mean spectral centroid in Hz
    pub avg_spectral_centroid: f64,
    /// Tempo estimate in BPM (0.0 when no periodicity found)
    pub tempo: f64,
    /// Mean fraction of sign changes per sample pair
    pub zero_crossing_rate: f64,
    pub file_size: u64,
}

/// Four-level categorical noise label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseLevel {
    VeryLow,
    Low,
    Moderate,
    High,
}

/// Composite quality assessment.
///
/// `quality_score` is always in [0, 1] regardless of input quality; degenerate
/// inputs yield neutral values rather than errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub snr_db: f64,
    pub spectral_centroid: f64,
    pub spectral_bandwidth: f64,
    pub spectral_rolloff: f64,
    pub spectral_contrast: f64,
    /// Means of the first 5 mel-cepstral coefficients
    pub mfcc_means: [f64; 5],
    pub zero_crossing_rate: f64,
    pub rms_energy_mean: f64,
    pub rms_energy_std: f64,
    /// Coefficient of variation of frame energy
    pub energy_variation: f64,
    pub is_speech_like: bool,
    /// Fraction of frames judged voiced, in [0, 1]
    pub voice_activity_score: f64,
    /// Estimated noise floor (linear RMS)
    pub noise_floor: f64,
    /// Noise floor relative to mean energy
    pub noise_ratio: f64,
    pub noise_level: NoiseLevel,
    /// Noisiness in [0, 1]; higher means noisier
    pub noise_score: f64,
    /// Encoding quality bucket from container bitrate: high/medium/low/unknown
    pub encoding_quality: String,
    /// Final composite score, clipped to [0, 1]
    pub quality_score: f64,
}

/// Method-specific detail attached to a [`TrimResult`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrimDetails {
    Dynamic {
        threshold_db: f64,
    },
    Split {
        /// Non-silent intervals as (start_sec, end_sec)
        intervals: Vec<(f64, f64)>,
        interval_count: usize,
    },
    Segment {
        segments_processed: usize,
        segments_kept: usize,
    },
    Adaptive {
        threshold_db: f64,
        iterations: usize,
    },
}

/// Silence trimming outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrimResult {
    /// Trimmed mono samples
    #[serde(skip)]
    pub trimmed_signal: Vec<f32>,
    /// Method tag, e.g. "dynamic" or "adaptive_threshold"
    pub method: String,
    pub original_duration: f64,
    /// Always <= original_duration
    pub trimmed_duration: f64,
    /// Seconds of silence removed
    pub silence_removed: f64,
    /// In [0, 100]
    pub silence_percentage: f64,
    pub details: TrimDetails,
}

/// Onset attack peaks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OnsetPeaks {
    pub times: Vec<f64>,
    pub sample_indices: Vec<usize>,
    pub count: usize,
}

/// Mel-band and chroma (pitch-class) spectral peaks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpectralPeaks {
    /// Center frequencies (Hz) of peaked mel bands
    pub mel_peaks: Vec<f64>,
    pub mel_peak_count: usize,
    /// Pitch-class indices (0 = C .. 11 = B) of peaked chroma bins
    pub chroma_peaks: Vec<usize>,
    pub chroma_peak_count: usize,
}

/// Amplitude-envelope local maxima.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvelopePeaks {
    pub times: Vec<f64>,
    pub amplitudes: Vec<f64>,
    pub count: usize,
}

/// Aggregate statistics across requested peak types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeakStatistics {
    pub total_peaks_detected: usize,
    /// Types requested for this run
    pub peak_types: Vec<String>,
    /// Peaks per second of signal
    pub peak_density: f64,
    /// Type contributing the most peaks ("none" when nothing fired)
    pub dominant_peak_type: String,
}

/// Combined peak detection outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeakResult {
    pub onset: Option<OnsetPeaks>,
    pub spectral: Option<SpectralPeaks>,
    pub envelope: Option<EnvelopePeaks>,
    pub statistics: PeakStatistics,
}

/// Aggregates produced by the chunked processing path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkSummary {
    pub chunks_processed: usize,
    /// Always "chunked"
    pub processing_method: String,
    pub duration: f64,
    pub rms_energy: f64,
    pub peak_amplitude: f64,
    pub zero_crossing_rate: f64,
}

/// Per-run performance telemetry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceStats {
    /// Stage name -> wall-clock seconds
    pub processing_times: HashMap<String, f64>,
    pub initial_memory_mb: f64,
    pub final_memory_mb: f64,
    pub memory_used_mb: f64,
    pub chunk_processing_used: bool,
    pub chunks_processed: usize,
}

/// Final artifact returned to the calling collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub status: String,
    /// Storage key of the rendered waveform ("waveforms/{session_id}.png")
    pub waveform_key: String,
    /// Duration after trimming
    pub duration: f64,
    pub original_duration: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub rms_energy: f64,
    pub peak_amplitude: f64,
    pub dynamic_range: f64,
    pub tempo: f64,
    pub zero_crossing_rate: f64,
    pub file_size: u64,
    pub mime_type: String,
    pub quality_score: f64,
    pub snr_db: f64,
    pub quality: QualityMetrics,
    pub trimming: TrimResult,
    pub peaks: PeakResult,
    pub performance: PerformanceStats,
    pub analyzed_at: DateTime<Utc>,
}
