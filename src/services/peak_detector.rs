//! Rhythmic and spectral peak detection
//!
//! Three detectors behind one [`PeakType`] set: onset (energy-flux attacks),
//! spectral (mel-band and pitch-class prominences) and envelope (amplitude
//! local maxima). Detection is best-effort by contract: a corrupt but non-empty
//! signal produces neutral sub-results with a logged warning, never an abort.

use crate::dsp;
use crate::error::ProcessingError;
use crate::models::{EnvelopePeaks, OnsetPeaks, PeakResult, PeakStatistics, SpectralPeaks};
use std::str::FromStr;
use tracing::{debug, warn};

/// Closed set of peak detector types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeakType {
    Onset,
    Spectral,
    Envelope,
}

impl PeakType {
    pub fn tag(&self) -> &'static str {
        match self {
            PeakType::Onset => "onset",
            PeakType::Spectral => "spectral",
            PeakType::Envelope => "envelope",
        }
    }

    /// All three detector types, the orchestrator default.
    pub fn all() -> [PeakType; 3] {
        [PeakType::Onset, PeakType::Spectral, PeakType::Envelope]
    }
}

impl FromStr for PeakType {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "onset" => Ok(PeakType::Onset),
            "spectral" => Ok(PeakType::Spectral),
            "envelope" => Ok(PeakType::Envelope),
            other => Err(ProcessingError::UnknownMethod(other.to_string())),
        }
    }
}

/// Peak detector over mono signals.
pub struct PeakDetector {
    /// Mel bands used by the spectral detector
    mel_bands: usize,
    /// Minimum spacing between onsets in seconds
    onset_min_gap_secs: f64,
    /// Envelope window in seconds
    envelope_window_secs: f64,
    /// Envelope peaks must reach this fraction of the envelope maximum
    envelope_height_ratio: f64,
}

impl Default for PeakDetector {
    fn default() -> Self {
        Self {
            mel_bands: 40,
            onset_min_gap_secs: 0.1,
            envelope_window_secs: 0.05,
            envelope_height_ratio: 0.3,
        }
    }
}

impl PeakDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the requested detectors and aggregate their statistics.
    ///
    /// Fails only for a literally empty input; non-finite contamination makes
    /// each sub-detector return its neutral result with a warning.
    pub fn detect(
        &self,
        samples: &[f32],
        sample_rate: u32,
        types: &[PeakType],
    ) -> Result<PeakResult, ProcessingError> {
        if samples.is_empty() {
            return Err(ProcessingError::EmptySignal);
        }

        let corrupt = dsp::has_non_finite(samples);
        if corrupt {
            warn!("Signal contains non-finite samples; peak detectors return neutral results");
        }

        let onset = types.contains(&PeakType::Onset).then(|| {
            if corrupt {
                OnsetPeaks::default()
            } else {
                self.detect_onsets(samples, sample_rate)
            }
        });
        let spectral = types.contains(&PeakType::Spectral).then(|| {
            if corrupt {
                SpectralPeaks::default()
            } else {
                self.detect_spectral(samples, sample_rate)
            }
        });
        let envelope = types.contains(&PeakType::Envelope).then(|| {
            if corrupt {
                EnvelopePeaks::default()
            } else {
                self.detect_envelope(samples, sample_rate)
            }
        });

        let duration = samples.len() as f64 / sample_rate as f64;
        let counts = [
            ("onset", onset.as_ref().map(|p| p.count).unwrap_or(0)),
            (
                "spectral",
                spectral
                    .as_ref()
                    .map(|p| p.mel_peak_count + p.chroma_peak_count)
                    .unwrap_or(0),
            ),
            ("envelope", envelope.as_ref().map(|p| p.count).unwrap_or(0)),
        ];
        let total: usize = counts.iter().map(|(_, c)| c).sum();
        let dominant = counts
            .iter()
            .filter(|(_, c)| *c > 0)
            .max_by_key(|(_, c)| *c)
            .map(|(name, _)| name.to_string())
            .unwrap_or_else(|| "none".to_string());

        let statistics = PeakStatistics {
            total_peaks_detected: total,
            peak_types: types.iter().map(|t| t.tag().to_string()).collect(),
            peak_density: if duration > 0.0 { total as f64 / duration } else { 0.0 },
            dominant_peak_type: dominant,
        };

        debug!(
            "Peak detection: {} total across {:?} ({:.2} peaks/s)",
            total, statistics.peak_types, statistics.peak_density
        );

        Ok(PeakResult {
            onset,
            spectral,
            envelope,
            statistics,
        })
    }

    /// Onset attacks from the half-wave rectified energy flux.
    fn detect_onsets(&self, samples: &[f32], sample_rate: u32) -> OnsetPeaks {
        let hop = dsp::HOP_SIZE;
        let energies = dsp::frame_energies(samples, dsp::FRAME_SIZE, hop);
        if energies.len() < 3 {
            return OnsetPeaks::default();
        }

        let flux: Vec<f64> = energies
            .windows(2)
            .map(|w| (w[1] - w[0]).max(0.0))
            .collect();
        let max_flux = flux.iter().cloned().fold(0.0f64, f64::max);
        if max_flux < 1e-10 {
            return OnsetPeaks::default();
        }

        let mean = flux.iter().sum::<f64>() / flux.len() as f64;
        let std = (flux.iter().map(|&f| (f - mean).powi(2)).sum::<f64>() / flux.len() as f64)
            .sqrt();
        let min_height = mean + 1.5 * std;
        let min_distance =
            ((self.onset_min_gap_secs * sample_rate as f64 / hop as f64) as usize).max(1);

        let picked = dsp::pick_peaks(&flux, min_height, min_distance);
        let sample_indices: Vec<usize> = picked.iter().map(|&i| (i + 1) * hop).collect();
        let times: Vec<f64> = sample_indices
            .iter()
            .map(|&s| s as f64 / sample_rate as f64)
            .collect();
        let count = times.len();

        OnsetPeaks {
            times,
            sample_indices,
            count,
        }
    }

    /// Prominent mel bands and pitch classes of the averaged spectrum.
    fn detect_spectral(&self, samples: &[f32], sample_rate: u32) -> SpectralPeaks {
        let spec = dsp::stft(samples, sample_rate, dsp::FRAME_SIZE, dsp::HOP_SIZE);
        if spec.frames.is_empty() {
            return SpectralPeaks::default();
        }

        let (band_means, centers) = dsp::mel_band_energies(&spec, self.mel_bands);
        let max_band = band_means.iter().cloned().fold(0.0f64, f64::max);

        let mel_peaks: Vec<f64> = if max_band < 1e-12 {
            Vec::new()
        } else {
            let normalized: Vec<f64> = band_means.iter().map(|&e| e / max_band).collect();
            dsp::pick_peaks(&normalized, 0.1, 2)
                .into_iter()
                .map(|band| centers[band])
                .collect()
        };

        let chroma = dsp::chroma_energies(&spec);
        let chroma_mean = chroma.iter().sum::<f64>() / 12.0;
        let chroma_peaks: Vec<usize> = (0..12)
            .filter(|&class| {
                let prev = chroma[(class + 11) % 12];
                let next = chroma[(class + 1) % 12];
                chroma[class] > 1e-12
                    && chroma[class] > prev
                    && chroma[class] >= next
                    && chroma[class] > chroma_mean
            })
            .collect();

        SpectralPeaks {
            mel_peak_count: mel_peaks.len(),
            mel_peaks,
            chroma_peak_count: chroma_peaks.len(),
            chroma_peaks,
        }
    }

    /// Local maxima of the amplitude envelope above a relative height floor.
    fn detect_envelope(&self, samples: &[f32], sample_rate: u32) -> EnvelopePeaks {
        let window = ((self.envelope_window_secs * sample_rate as f64) as usize).max(1);
        let envelope: Vec<f64> = samples
            .chunks(window)
            .map(|chunk| dsp::peak_amplitude(chunk))
            .collect();
        let env_max = envelope.iter().cloned().fold(0.0f64, f64::max);
        if env_max < 1e-10 {
            return EnvelopePeaks::default();
        }

        // At least 0.2s between envelope peaks
        let min_distance = ((0.2 / self.envelope_window_secs) as usize).max(1);
        let picked = dsp::pick_peaks(
            &envelope,
            env_max * self.envelope_height_ratio,
            min_distance,
        );

        let times: Vec<f64> = picked
            .iter()
            .map(|&i| (i * window) as f64 / sample_rate as f64)
            .collect();
        let amplitudes: Vec<f64> = picked.iter().map(|&i| envelope[i]).collect();
        let count = times.len();

        EnvelopePeaks {
            times,
            amplitudes,
            count,
        }
    }
}
