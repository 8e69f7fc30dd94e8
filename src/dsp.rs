//! Shared signal-processing primitives
//!
//! Framing, energy/dB conversions, STFT magnitudes, mel/chroma filterbanks and
//! the running aggregate used by both the whole-buffer and chunked paths. All
//! analysis services build on these so the two processing paths share identical
//! math.

use realfft::num_complex::Complex;
use realfft::RealFftPlanner;

/// Analysis frame length in samples (~46 ms at 44.1 kHz)
pub const FRAME_SIZE: usize = 2048;

/// Hop between analysis frames in samples (~12 ms at 44.1 kHz)
pub const HOP_SIZE: usize = 512;

/// RMS amplitude of a sample slice.
pub fn rms(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f64 = samples.iter().map(|&s| (s as f64).powi(2)).sum();
    (sum_squares / samples.len() as f64).sqrt()
}

/// Largest absolute sample value.
pub fn peak_amplitude(samples: &[f32]) -> f64 {
    samples.iter().fold(0.0f64, |acc, &s| acc.max((s as f64).abs()))
}

/// Convert dB to linear amplitude.
pub fn db_to_linear(db: f64) -> f64 {
    10.0f64.powf(db / 20.0)
}

/// Convert linear amplitude to dB, floored to avoid log(0).
pub fn linear_to_db(linear: f64) -> f64 {
    20.0 * linear.max(1e-10).log10()
}

/// Fraction of adjacent sample pairs that change sign, in [0, 1].
pub fn zero_crossing_rate(samples: &[f32]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let crossings = samples
        .windows(2)
        .filter(|w| (w[0] >= 0.0 && w[1] < 0.0) || (w[0] < 0.0 && w[1] >= 0.0))
        .count();
    crossings as f64 / (samples.len() - 1) as f64
}

/// True if any sample is NaN or infinite.
pub fn has_non_finite(samples: &[f32]) -> bool {
    samples.iter().any(|s| !s.is_finite())
}

/// Iterate fixed-length frames with the given hop. The trailing partial frame
/// is included so short signals still produce at least one frame.
pub fn frames(samples: &[f32], frame_len: usize, hop: usize) -> FrameIter<'_> {
    FrameIter {
        samples,
        frame_len,
        hop: hop.max(1),
        pos: 0,
    }
}

/// Iterator over fixed-size signal windows. Both the whole-buffer path and the
/// chunked path feed windows of this shape into the same analysis code.
pub struct FrameIter<'a> {
    samples: &'a [f32],
    frame_len: usize,
    hop: usize,
    pos: usize,
}

impl<'a> Iterator for FrameIter<'a> {
    type Item = &'a [f32];

    fn next(&mut self) -> Option<&'a [f32]> {
        if self.pos >= self.samples.len() {
            return None;
        }
        let end = (self.pos + self.frame_len).min(self.samples.len());
        let frame = &self.samples[self.pos..end];
        self.pos += self.hop;
        Some(frame)
    }
}

/// RMS energy per frame.
pub fn frame_energies(samples: &[f32], frame_len: usize, hop: usize) -> Vec<f64> {
    frames(samples, frame_len, hop).map(rms).collect()
}

/// Running aggregates accumulated window-by-window without holding the whole
/// signal. Used by the chunk manager and by whole-buffer metadata extraction.
#[derive(Debug, Default, Clone)]
pub struct RunningStats {
    samples_seen: u64,
    sum_squares: f64,
    peak: f64,
    crossings: u64,
    last_sample: Option<f32>,
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one window of samples into the aggregate.
    pub fn update(&mut self, window: &[f32]) {
        for &s in window {
            let s64 = s as f64;
            self.sum_squares += s64 * s64;
            self.peak = self.peak.max(s64.abs());
            if let Some(prev) = self.last_sample {
                if (prev >= 0.0 && s < 0.0) || (prev < 0.0 && s >= 0.0) {
                    self.crossings += 1;
                }
            }
            self.last_sample = Some(s);
        }
        self.samples_seen += window.len() as u64;
    }

    pub fn samples_seen(&self) -> u64 {
        self.samples_seen
    }

    pub fn rms(&self) -> f64 {
        if self.samples_seen == 0 {
            return 0.0;
        }
        (self.sum_squares / self.samples_seen as f64).sqrt()
    }

    pub fn peak(&self) -> f64 {
        self.peak
    }

    pub fn zero_crossing_rate(&self) -> f64 {
        if self.samples_seen < 2 {
            return 0.0;
        }
        self.crossings as f64 / (self.samples_seen - 1) as f64
    }

    pub fn duration_seconds(&self, sample_rate: u32) -> f64 {
        self.samples_seen as f64 / sample_rate as f64
    }
}

/// Magnitude spectrogram: one `fft_size / 2 + 1`-bin frame per hop.
pub struct Spectrogram {
    pub frames: Vec<Vec<f32>>,
    pub sample_rate: u32,
    pub fft_size: usize,
}

impl Spectrogram {
    /// Center frequency of an FFT bin in Hz.
    pub fn bin_frequency(&self, bin: usize) -> f64 {
        bin as f64 * self.sample_rate as f64 / self.fft_size as f64
    }
}

/// Short-time Fourier transform with a Hann window.
///
/// Frames shorter than `fft_size` (the signal tail) are zero-padded. Non-finite
/// samples must be sanitized by the caller first.
pub fn stft(samples: &[f32], sample_rate: u32, fft_size: usize, hop: usize) -> Spectrogram {
    let mut planner = RealFftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(fft_size);

    let window: Vec<f32> = (0..fft_size)
        .map(|i| {
            let x = std::f32::consts::PI * i as f32 / fft_size as f32;
            x.sin() * x.sin()
        })
        .collect();

    let mut input = fft.make_input_vec();
    let mut output: Vec<Complex<f32>> = fft.make_output_vec();
    let mut mag_frames = Vec::new();

    for frame in frames(samples, fft_size, hop) {
        input.fill(0.0);
        for (i, &s) in frame.iter().enumerate() {
            input[i] = s * window[i];
        }
        // realfft only fails on mismatched buffer lengths, which make_*_vec rules out
        if fft.process(&mut input, &mut output).is_ok() {
            mag_frames.push(output.iter().map(|c| c.norm()).collect());
        }
    }

    Spectrogram {
        frames: mag_frames,
        sample_rate,
        fft_size,
    }
}

/// Spectral centroid of one magnitude frame, in Hz.
pub fn spectral_centroid(magnitudes: &[f32], sample_rate: u32, fft_size: usize) -> f64 {
    let total: f64 = magnitudes.iter().map(|&m| m as f64).sum();
    if total < 1e-10 {
        return 0.0;
    }
    let weighted: f64 = magnitudes
        .iter()
        .enumerate()
        .map(|(bin, &m)| bin as f64 * sample_rate as f64 / fft_size as f64 * m as f64)
        .sum();
    weighted / total
}

/// Magnitude-weighted spread around the centroid, in Hz.
pub fn spectral_bandwidth(
    magnitudes: &[f32],
    centroid: f64,
    sample_rate: u32,
    fft_size: usize,
) -> f64 {
    let total: f64 = magnitudes.iter().map(|&m| m as f64).sum();
    if total < 1e-10 {
        return 0.0;
    }
    let variance: f64 = magnitudes
        .iter()
        .enumerate()
        .map(|(bin, &m)| {
            let freq = bin as f64 * sample_rate as f64 / fft_size as f64;
            (freq - centroid).powi(2) * m as f64
        })
        .sum::<f64>()
        / total;
    variance.sqrt()
}

/// Frequency below which `fraction` of the spectral energy lies, in Hz.
pub fn spectral_rolloff(
    magnitudes: &[f32],
    sample_rate: u32,
    fft_size: usize,
    fraction: f64,
) -> f64 {
    let total: f64 = magnitudes.iter().map(|&m| (m as f64).powi(2)).sum();
    if total < 1e-10 {
        return 0.0;
    }
    let target = total * fraction;
    let mut cumulative = 0.0;
    for (bin, &m) in magnitudes.iter().enumerate() {
        cumulative += (m as f64).powi(2);
        if cumulative >= target {
            return bin as f64 * sample_rate as f64 / fft_size as f64;
        }
    }
    (magnitudes.len().saturating_sub(1)) as f64 * sample_rate as f64 / fft_size as f64
}

/// Hz to mel (HTK formula).
pub fn hz_to_mel(hz: f64) -> f64 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

/// Mel to Hz (HTK formula).
pub fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (10.0f64.powf(mel / 2595.0) - 1.0)
}

/// Triangular mel filterbank over `fft_size / 2 + 1` bins.
///
/// Returns one weight row per band plus each band's center frequency in Hz.
pub fn mel_filterbank(
    num_bands: usize,
    fft_size: usize,
    sample_rate: u32,
) -> (Vec<Vec<f32>>, Vec<f64>) {
    let num_bins = fft_size / 2 + 1;
    let max_mel = hz_to_mel(sample_rate as f64 / 2.0);
    let mel_points: Vec<f64> = (0..num_bands + 2)
        .map(|i| mel_to_hz(max_mel * i as f64 / (num_bands + 1) as f64))
        .collect();

    let bin_of = |hz: f64| hz * fft_size as f64 / sample_rate as f64;
    let mut bank = Vec::with_capacity(num_bands);
    let mut centers = Vec::with_capacity(num_bands);

    for band in 0..num_bands {
        let (lo, mid, hi) = (
            bin_of(mel_points[band]),
            bin_of(mel_points[band + 1]),
            bin_of(mel_points[band + 2]),
        );
        centers.push(mel_points[band + 1]);

        let mut weights = vec![0.0f32; num_bins];
        for (bin, weight) in weights.iter_mut().enumerate() {
            let b = bin as f64;
            if b > lo && b < mid {
                *weight = ((b - lo) / (mid - lo).max(1e-10)) as f32;
            } else if b >= mid && b < hi {
                *weight = ((hi - b) / (hi - mid).max(1e-10)) as f32;
            }
        }
        bank.push(weights);
    }

    (bank, centers)
}

/// Mean energy per mel band across all spectrogram frames.
pub fn mel_band_energies(spec: &Spectrogram, num_bands: usize) -> (Vec<f64>, Vec<f64>) {
    let (bank, centers) = mel_filterbank(num_bands, spec.fft_size, spec.sample_rate);
    let mut band_means = vec![0.0f64; num_bands];

    if spec.frames.is_empty() {
        return (band_means, centers);
    }

    for frame in &spec.frames {
        for (band, weights) in bank.iter().enumerate() {
            let energy: f64 = weights
                .iter()
                .zip(frame.iter())
                .map(|(&w, &m)| (w * m) as f64 * (w * m) as f64)
                .sum();
            band_means[band] += energy;
        }
    }
    for mean in &mut band_means {
        *mean /= spec.frames.len() as f64;
    }

    (band_means, centers)
}

/// Mean energy per pitch class (0 = C .. 11 = B) across all frames.
pub fn chroma_energies(spec: &Spectrogram) -> [f64; 12] {
    let mut chroma = [0.0f64; 12];
    if spec.frames.is_empty() {
        return chroma;
    }

    for frame in &spec.frames {
        for (bin, &m) in frame.iter().enumerate().skip(1) {
            let freq = spec.bin_frequency(bin);
            if freq < 27.5 || freq > 8000.0 {
                continue;
            }
            // MIDI note number -> pitch class, A4 = 440 Hz = note 69
            let note = 69.0 + 12.0 * (freq / 440.0).log2();
            let class = (note.round() as i64).rem_euclid(12) as usize;
            chroma[class] += (m as f64).powi(2);
        }
    }
    for value in &mut chroma {
        *value /= spec.frames.len() as f64;
    }
    chroma
}

/// DCT-II of the input, truncated to `n_out` coefficients. Used for the
/// mel-cepstral summary.
pub fn dct_ii(input: &[f64], n_out: usize) -> Vec<f64> {
    let n = input.len();
    if n == 0 {
        return vec![0.0; n_out];
    }
    (0..n_out)
        .map(|k| {
            input
                .iter()
                .enumerate()
                .map(|(i, &x)| {
                    x * (std::f64::consts::PI * k as f64 * (2.0 * i as f64 + 1.0)
                        / (2.0 * n as f64))
                        .cos()
                })
                .sum()
        })
        .collect()
}

/// Indices of local maxima that exceed `min_height`, spaced at least
/// `min_distance` apart. Greedy by amplitude, the way scipy-style peak picking
/// behaves for this use.
pub fn pick_peaks(values: &[f64], min_height: f64, min_distance: usize) -> Vec<usize> {
    let mut candidates: Vec<usize> = (1..values.len().saturating_sub(1))
        .filter(|&i| {
            values[i] >= min_height && values[i] > values[i - 1] && values[i] >= values[i + 1]
        })
        .collect();
    candidates.sort_by(|&a, &b| values[b].partial_cmp(&values[a]).unwrap_or(std::cmp::Ordering::Equal));

    let mut kept: Vec<usize> = Vec::new();
    for idx in candidates {
        if kept.iter().all(|&k| k.abs_diff(idx) >= min_distance) {
            kept.push(idx);
        }
    }
    kept.sort_unstable();
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frequency: f32, duration_secs: f32, sample_rate: u32) -> Vec<f32> {
        let n = (duration_secs * sample_rate as f32) as usize;
        (0..n)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.5
            })
            .collect()
    }

    #[test]
    fn test_rms_of_sine() {
        let samples = sine(440.0, 1.0, 44100);
        // RMS of a 0.5-amplitude sine is 0.5 / sqrt(2)
        assert!((rms(&samples) - 0.5 / std::f64::consts::SQRT_2).abs() < 0.01);
    }

    #[test]
    fn test_db_round_trip() {
        let linear = db_to_linear(-60.0);
        assert!((linear - 0.001).abs() < 1e-6);
        assert!((linear_to_db(linear) + 60.0).abs() < 0.01);
    }

    #[test]
    fn test_frame_iter_covers_signal() {
        let samples = vec![0.0f32; 1000];
        let count = frames(&samples, 256, 128).count();
        // ceil(1000 / 128) frames, trailing partial included
        assert_eq!(count, 8);
    }

    #[test]
    fn test_running_stats_matches_batch() {
        let samples = sine(440.0, 1.0, 44100);
        let mut stats = RunningStats::new();
        for chunk in samples.chunks(1000) {
            stats.update(chunk);
        }
        assert!((stats.rms() - rms(&samples)).abs() < 1e-9);
        assert!((stats.peak() - peak_amplitude(&samples)).abs() < 1e-9);
        assert!((stats.zero_crossing_rate() - zero_crossing_rate(&samples)).abs() < 1e-6);
    }

    #[test]
    fn test_centroid_tracks_frequency() {
        let low = sine(220.0, 1.0, 44100);
        let high = sine(4000.0, 1.0, 44100);
        let spec_low = stft(&low, 44100, FRAME_SIZE, HOP_SIZE);
        let spec_high = stft(&high, 44100, FRAME_SIZE, HOP_SIZE);
        let c_low = spectral_centroid(&spec_low.frames[4], 44100, FRAME_SIZE);
        let c_high = spectral_centroid(&spec_high.frames[4], 44100, FRAME_SIZE);
        assert!(c_high > c_low, "expected {c_high} > {c_low}");
    }

    #[test]
    fn test_rolloff_bounded_by_nyquist() {
        let samples = sine(1000.0, 0.5, 44100);
        let spec = stft(&samples, 44100, FRAME_SIZE, HOP_SIZE);
        let rolloff = spectral_rolloff(&spec.frames[0], 44100, FRAME_SIZE, 0.85);
        assert!(rolloff > 0.0 && rolloff <= 22050.0);
    }

    #[test]
    fn test_mel_round_trip() {
        for hz in [100.0, 440.0, 4000.0, 12000.0] {
            assert!((mel_to_hz(hz_to_mel(hz)) - hz).abs() < 0.01);
        }
    }

    #[test]
    fn test_chroma_concentrates_on_pitch_class() {
        // A4 = 440 Hz = pitch class 9
        let samples = sine(440.0, 1.0, 44100);
        let spec = stft(&samples, 44100, FRAME_SIZE, HOP_SIZE);
        let chroma = chroma_energies(&spec);
        let max_class = chroma
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(max_class, 9);
    }

    #[test]
    fn test_pick_peaks_enforces_distance() {
        let values = vec![0.0, 1.0, 0.0, 0.9, 0.0, 0.8, 0.0];
        let peaks = pick_peaks(&values, 0.5, 3);
        // Strongest peak kept, too-close neighbor dropped, distant one kept
        assert!(peaks.contains(&1));
        assert!(!peaks.contains(&3));
        assert!(peaks.contains(&5));
    }
}
