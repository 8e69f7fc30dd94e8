//! Basic signal statistics
//!
//! Decodes at the configured target rate and summarizes the signal: loudness
//! (RMS), peak, dynamic range, mean spectral centroid, a tempo estimate from
//! the onset-envelope autocorrelation, and zero-crossing rate. The same
//! computation is exposed over an in-memory signal for the chunk manager.

use crate::decode::AudioDecoder;
use crate::dsp;
use crate::error::ProcessingError;
use crate::models::AudioMetadata;
use std::path::Path;
use tracing::debug;

/// Tempo search range in BPM.
const TEMPO_MIN_BPM: f64 = 60.0;
const TEMPO_MAX_BPM: f64 = 180.0;

/// Signal statistics extractor.
pub struct MetadataExtractor {
    decoder: AudioDecoder,
}

impl Default for MetadataExtractor {
    fn default() -> Self {
        Self::new(44100)
    }
}

impl MetadataExtractor {
    pub fn new(target_sample_rate: u32) -> Self {
        Self {
            decoder: AudioDecoder::new(target_sample_rate),
        }
    }

    /// Decode a file and summarize its signal statistics.
    pub fn extract(&self, path: &Path) -> Result<AudioMetadata, ProcessingError> {
        let file_size = std::fs::metadata(path)?.len();
        let signal = self.decoder.decode_file(path)?;

        let mut metadata = self.extract_from_signal(&signal.samples, signal.sample_rate)?;
        metadata.channels = signal.channels;
        metadata.file_size = file_size;
        Ok(metadata)
    }

    /// Summarize an in-memory mono signal.
    ///
    /// Fails with `InvalidSignal` for a zero sample rate or non-finite samples,
    /// `EmptySignal` for a zero-length buffer.
    pub fn extract_from_signal(
        &self,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<AudioMetadata, ProcessingError> {
        if sample_rate == 0 {
            return Err(ProcessingError::InvalidSignal(
                "sample rate must be positive".into(),
            ));
        }
        if samples.is_empty() {
            return Err(ProcessingError::EmptySignal);
        }
        if dsp::has_non_finite(samples) {
            return Err(ProcessingError::InvalidSignal(
                "signal contains non-finite samples".into(),
            ));
        }

        let duration = samples.len() as f64 / sample_rate as f64;
        let rms_energy = dsp::rms(samples);
        let peak_amplitude = dsp::peak_amplitude(samples);

        // Peak-to-RMS spread; 0 for silence where the ratio is undefined
        let dynamic_range = if rms_energy > 1e-10 && peak_amplitude > 1e-10 {
            (20.0 * (peak_amplitude / rms_energy).log10()).max(0.0)
        } else {
            0.0
        };

        let spec = dsp::stft(samples, sample_rate, dsp::FRAME_SIZE, dsp::HOP_SIZE);
        let avg_spectral_centroid = if spec.frames.is_empty() {
            0.0
        } else {
            spec.frames
                .iter()
                .map(|frame| dsp::spectral_centroid(frame, sample_rate, dsp::FRAME_SIZE))
                .sum::<f64>()
                / spec.frames.len() as f64
        };

        let tempo = estimate_tempo(samples, sample_rate);
        let zero_crossing_rate = dsp::zero_crossing_rate(samples);

        debug!(
            "Signal stats: {:.2}s, rms={:.4}, peak={:.4}, centroid={:.0} Hz, tempo={:.1} BPM",
            duration, rms_energy, peak_amplitude, avg_spectral_centroid, tempo
        );

        Ok(AudioMetadata {
            duration,
            sample_rate,
            channels: 1,
            rms_energy,
            peak_amplitude,
            dynamic_range,
            avg_spectral_centroid,
            tempo,
            zero_crossing_rate,
            file_size: 0,
        })
    }
}

/// Tempo estimate from the autocorrelation of the onset envelope.
///
/// Returns 0.0 when the signal carries no usable periodicity (steady tones,
/// silence, very short inputs).
fn estimate_tempo(samples: &[f32], sample_rate: u32) -> f64 {
    let hop = dsp::HOP_SIZE;
    let energies = dsp::frame_energies(samples, dsp::FRAME_SIZE, hop);
    if energies.len() < 8 {
        return 0.0;
    }

    // Half-wave rectified energy flux is the onset strength curve
    let flux: Vec<f64> = energies
        .windows(2)
        .map(|w| (w[1] - w[0]).max(0.0))
        .collect();
    let flux_energy: f64 = flux.iter().map(|&f| f * f).sum();
    if flux_energy < 1e-12 {
        return 0.0;
    }

    // Steady signals still show sub-percent frame-level ripple; only treat the
    // flux as onsets when it is a meaningful fraction of the overall energy
    let mean_energy = energies.iter().sum::<f64>() / energies.len() as f64;
    let mean_flux = flux.iter().sum::<f64>() / flux.len() as f64;
    if mean_flux < 0.01 * mean_energy {
        return 0.0;
    }

    let frames_per_sec = sample_rate as f64 / hop as f64;
    let min_lag = ((60.0 / TEMPO_MAX_BPM) * frames_per_sec).floor() as usize;
    let max_lag = ((60.0 / TEMPO_MIN_BPM) * frames_per_sec).ceil() as usize;
    if flux.len() <= max_lag {
        return 0.0;
    }

    let mut best_lag = 0usize;
    let mut best_corr = 0.0f64;
    for lag in min_lag.max(1)..=max_lag {
        let corr: f64 = flux[..flux.len() - lag]
            .iter()
            .zip(&flux[lag..])
            .map(|(&a, &b)| a * b)
            .sum();
        if corr > best_corr {
            best_corr = corr;
            best_lag = lag;
        }
    }

    if best_lag == 0 || best_corr / flux_energy < 0.01 {
        return 0.0;
    }
    60.0 * frames_per_sec / best_lag as f64
}
