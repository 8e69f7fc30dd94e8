//! Composite quality assessment
//!
//! Estimates SNR against a low-energy-frame noise floor, summarizes the
//! spectrum (centroid, bandwidth, rolloff, contrast, a 5-coefficient mel
//! cepstral summary), applies voice-activity heuristics, classifies noise, and
//! folds everything into one clipped [0, 1] quality score. Analysis is
//! best-effort by contract: non-finite samples are zeroed with a warning, and
//! degenerate input yields neutral metrics rather than an error. Only a
//! literally empty buffer fails.

use crate::dsp;
use crate::error::ProcessingError;
use crate::models::{NoiseLevel, QualityMetrics};
use lofty::prelude::*;
use lofty::probe::Probe;
use std::borrow::Cow;
use std::path::Path;
use tracing::{debug, warn};

/// Composite quality analyzer.
pub struct QualityAnalyzer {
    /// Mel bands for the cepstral summary
    mel_bands: usize,
    /// Fraction of lowest-energy frames treated as the noise floor
    noise_floor_fraction: f64,
}

impl Default for QualityAnalyzer {
    fn default() -> Self {
        Self {
            mel_bands: 20,
            noise_floor_fraction: 0.1,
        }
    }
}

impl QualityAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyze a mono signal, optionally consulting the container at `path`
    /// for an encoding-quality estimate.
    pub fn analyze(
        &self,
        path: Option<&Path>,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<QualityMetrics, ProcessingError> {
        if samples.is_empty() {
            return Err(ProcessingError::EmptySignal);
        }

        let samples: Cow<[f32]> = if dsp::has_non_finite(samples) {
            warn!("Signal contains non-finite samples; zeroing them for quality analysis");
            Cow::Owned(
                samples
                    .iter()
                    .map(|&s| if s.is_finite() { s } else { 0.0 })
                    .collect(),
            )
        } else {
            Cow::Borrowed(samples)
        };
        let samples = samples.as_ref();

        // Frame energy statistics
        let energies = dsp::frame_energies(samples, dsp::FRAME_SIZE, dsp::HOP_SIZE);
        let rms_energy_mean = mean(&energies);
        let rms_energy_std = std_dev(&energies, rms_energy_mean);
        let energy_variation = if rms_energy_mean > 1e-10 {
            rms_energy_std / rms_energy_mean
        } else {
            0.0
        };

        // Noise floor from the quietest frames
        let noise_floor = self.noise_floor(&energies);
        let noise_ratio = if rms_energy_mean > 1e-10 {
            (noise_floor / rms_energy_mean).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let snr_db = snr(rms_energy_mean, noise_floor);

        let noise_level = match noise_ratio {
            r if r < 0.05 => NoiseLevel::VeryLow,
            r if r < 0.15 => NoiseLevel::Low,
            r if r < 0.35 => NoiseLevel::Moderate,
            _ => NoiseLevel::High,
        };
        let noise_score = noise_ratio;

        // Spectral descriptors
        let spec = dsp::stft(samples, sample_rate, dsp::FRAME_SIZE, dsp::HOP_SIZE);
        let per_frame: Vec<(f64, f64, f64, f64)> = spec
            .frames
            .iter()
            .map(|frame| {
                let centroid = dsp::spectral_centroid(frame, sample_rate, dsp::FRAME_SIZE);
                let bandwidth =
                    dsp::spectral_bandwidth(frame, centroid, sample_rate, dsp::FRAME_SIZE);
                let rolloff = dsp::spectral_rolloff(frame, sample_rate, dsp::FRAME_SIZE, 0.85);
                (centroid, bandwidth, rolloff, spectral_contrast(frame))
            })
            .collect();

        let n = per_frame.len().max(1) as f64;
        let spectral_centroid = per_frame.iter().map(|f| f.0).sum::<f64>() / n;
        let spectral_bandwidth = per_frame.iter().map(|f| f.1).sum::<f64>() / n;
        let spectral_rolloff = per_frame.iter().map(|f| f.2).sum::<f64>() / n;
        let spectral_contrast = per_frame.iter().map(|f| f.3).sum::<f64>() / n;

        // Mel cepstral summary over the time-averaged spectrum
        let (band_means, _) = dsp::mel_band_energies(&spec, self.mel_bands);
        let log_bands: Vec<f64> = band_means.iter().map(|&e| (e + 1e-10).ln()).collect();
        let coeffs = dsp::dct_ii(&log_bands, 5);
        let mut mfcc_means = [0.0f64; 5];
        mfcc_means.copy_from_slice(&coeffs);

        // Voice-activity heuristics
        let zero_crossing_rate = dsp::zero_crossing_rate(samples);
        let voiced_frames = energies
            .iter()
            .filter(|&&e| e > (noise_floor * 3.0).max(1e-5))
            .count();
        let voice_activity_score = if energies.is_empty() {
            0.0
        } else {
            (voiced_frames as f64 / energies.len() as f64).clamp(0.0, 1.0)
        };
        let is_speech_like = (0.01..=0.25).contains(&zero_crossing_rate)
            && energy_variation > 0.3
            && voice_activity_score > 0.1;

        // Encoding quality bucket from container bitrate, when readable
        let (encoding_quality, encoding_score) = encoding_quality(path);

        // Composite score
        let peak = dsp::peak_amplitude(samples);
        let dynamic_range_db = if peak > 1e-10 && rms_energy_mean > 1e-10 {
            (20.0 * (peak / rms_energy_mean).log10()).max(0.0)
        } else {
            0.0
        };
        let snr_norm = ((snr_db + 10.0) / 60.0).clamp(0.0, 1.0);
        let dyn_norm = (dynamic_range_db / 40.0).clamp(0.0, 1.0);
        let bw_norm = (spectral_bandwidth / (sample_rate as f64 / 4.0)).clamp(0.0, 1.0);
        let quality_score = (0.3 * snr_norm
            + 0.2 * encoding_score
            + 0.2 * (1.0 - noise_score)
            + 0.15 * dyn_norm
            + 0.15 * bw_norm)
            .clamp(0.0, 1.0);

        debug!(
            "Quality: score={:.3}, snr={:.1} dB, noise={:?}, vad={:.2}",
            quality_score, snr_db, noise_level, voice_activity_score
        );

        Ok(QualityMetrics {
            snr_db,
            spectral_centroid,
            spectral_bandwidth,
            spectral_rolloff,
            spectral_contrast,
            mfcc_means,
            zero_crossing_rate,
            rms_energy_mean,
            rms_energy_std,
            energy_variation,
            is_speech_like,
            voice_activity_score,
            noise_floor,
            noise_ratio,
            noise_level,
            noise_score,
            encoding_quality,
            quality_score,
        })
    }

    /// Mean energy of the quietest `noise_floor_fraction` of frames.
    fn noise_floor(&self, energies: &[f64]) -> f64 {
        if energies.is_empty() {
            return 0.0;
        }
        let mut sorted = energies.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let take = ((sorted.len() as f64 * self.noise_floor_fraction) as usize).max(1);
        sorted[..take].iter().sum::<f64>() / take as f64
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    (values.iter().map(|&v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

/// SNR of mean frame energy against the noise floor, clamped to [-20, 60] dB.
/// 0 dB for silence where neither quantity is meaningful.
fn snr(signal_rms: f64, noise_floor: f64) -> f64 {
    if signal_rms < 1e-10 {
        return 0.0;
    }
    if noise_floor < 1e-10 {
        return 60.0;
    }
    (20.0 * (signal_rms / noise_floor).log10()).clamp(-20.0, 60.0)
}

/// Spread between the loudest and quietest deciles of one magnitude frame, dB.
fn spectral_contrast(magnitudes: &[f32]) -> f64 {
    if magnitudes.len() < 10 {
        return 0.0;
    }
    let mut sorted: Vec<f64> = magnitudes.iter().map(|&m| m as f64).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let decile = (sorted.len() / 10).max(1);
    let bottom = sorted[..decile].iter().sum::<f64>() / decile as f64;
    let top = sorted[sorted.len() - decile..].iter().sum::<f64>() / decile as f64;
    dsp::linear_to_db(top) - dsp::linear_to_db(bottom)
}

/// Bitrate-based encoding quality bucket: label plus a [0, 1] score used by the
/// composite. "unknown" scores neutral.
fn encoding_quality(path: Option<&Path>) -> (String, f64) {
    let bitrate_kbps = path.and_then(|p| {
        Probe::open(p)
            .ok()?
            .read()
            .ok()?
            .properties()
            .audio_bitrate()
    });

    match bitrate_kbps {
        Some(kbps) if kbps >= 256 => ("high".to_string(), 1.0),
        Some(kbps) if kbps >= 128 => ("medium".to_string(), 0.7),
        Some(_) => ("low".to_string(), 0.4),
        None => ("unknown".to_string(), 0.5),
    }
}
