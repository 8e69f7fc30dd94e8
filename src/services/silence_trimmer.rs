//! Silence trimming strategies
//!
//! Four interchangeable strategies behind one [`TrimMethod`] enum: dynamic
//! (peak-relative threshold on the signal edges), split (non-silent interval
//! extraction), segment (fixed-length block scoring) and adaptive (iteratively
//! refined threshold). Method names parse strictly; an unrecognized name is an
//! error, never a silent fallback.

use crate::dsp;
use crate::error::ProcessingError;
use crate::models::{TrimDetails, TrimResult};
use std::str::FromStr;
use tracing::debug;

/// Closed set of trimming strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimMethod {
    /// Peak-relative dB threshold, strips leading/trailing silence
    Dynamic,
    /// Keeps the concatenation of detected non-silent intervals
    Split,
    /// Scores fixed-length blocks and drops the low-energy ones
    Segment,
    /// Iteratively refined threshold from the frame energy distribution
    Adaptive,
}

impl TrimMethod {
    /// Tag reported in [`TrimResult::method`].
    pub fn tag(&self) -> &'static str {
        match self {
            TrimMethod::Dynamic => "dynamic",
            TrimMethod::Split => "split",
            TrimMethod::Segment => "segment",
            TrimMethod::Adaptive => "adaptive_threshold",
        }
    }
}

impl FromStr for TrimMethod {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dynamic" => Ok(TrimMethod::Dynamic),
            "split" => Ok(TrimMethod::Split),
            "segment" => Ok(TrimMethod::Segment),
            "adaptive" | "adaptive_threshold" => Ok(TrimMethod::Adaptive),
            other => Err(ProcessingError::UnknownMethod(other.to_string())),
        }
    }
}

/// Silence trimmer over mono signals.
pub struct SilenceTrimmer {
    /// Frames this far below the reference level count as silence
    top_db: f64,
    /// Analysis frame length in samples
    frame_len: usize,
    /// Hop between frames in samples
    hop: usize,
    /// Block length for the segment strategy in seconds
    segment_secs: f64,
}

impl Default for SilenceTrimmer {
    fn default() -> Self {
        Self {
            top_db: 40.0,
            frame_len: 2048,
            hop: 512,
            segment_secs: 0.5,
        }
    }
}

impl SilenceTrimmer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_top_db(mut self, top_db: f64) -> Self {
        self.top_db = top_db;
        self
    }

    /// Trim silence with the chosen strategy.
    pub fn trim(
        &self,
        samples: &[f32],
        sample_rate: u32,
        method: TrimMethod,
    ) -> Result<TrimResult, ProcessingError> {
        if samples.is_empty() {
            return Err(ProcessingError::EmptySignal);
        }

        let result = match method {
            TrimMethod::Dynamic => self.trim_dynamic(samples, sample_rate),
            TrimMethod::Split => self.trim_split(samples, sample_rate),
            TrimMethod::Segment => self.trim_segment(samples, sample_rate),
            TrimMethod::Adaptive => self.trim_adaptive(samples, sample_rate),
        };

        debug!(
            "Trim [{}]: {:.2}s -> {:.2}s ({:.1}% silence)",
            result.method, result.original_duration, result.trimmed_duration,
            result.silence_percentage
        );
        Ok(result)
    }

    /// Per-frame RMS levels in dB.
    fn frame_dbs(&self, samples: &[f32]) -> Vec<f64> {
        dsp::frames(samples, self.frame_len, self.hop)
            .map(|frame| dsp::linear_to_db(dsp::rms(frame)))
            .collect()
    }

    /// dB threshold relative to the loudest frame.
    fn peak_relative_threshold(&self, frame_dbs: &[f64]) -> f64 {
        let peak_db = frame_dbs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        peak_db - self.top_db
    }

    fn trim_dynamic(&self, samples: &[f32], sample_rate: u32) -> TrimResult {
        let dbs = self.frame_dbs(samples);
        let threshold_db = self.peak_relative_threshold(&dbs);
        let kept = self.edge_trim(samples, &dbs, threshold_db);

        self.finish(
            samples,
            kept,
            sample_rate,
            TrimMethod::Dynamic.tag(),
            TrimDetails::Dynamic { threshold_db },
        )
    }

    fn trim_split(&self, samples: &[f32], sample_rate: u32) -> TrimResult {
        let dbs = self.frame_dbs(samples);
        let threshold_db = self.peak_relative_threshold(&dbs);

        // Group consecutive active frames into sample intervals. Frame spans
        // overlap by frame_len - hop, so each span is clamped to start no
        // earlier than the previous one ends; otherwise closely spaced runs
        // would duplicate samples in the concatenation.
        let mut intervals: Vec<(usize, usize)> = Vec::new();
        let push_span = |intervals: &mut Vec<(usize, usize)>, span: (usize, usize)| {
            let (mut start, end) = span;
            if let Some(&(_, prev_end)) = intervals.last() {
                start = start.max(prev_end);
            }
            if end > start {
                intervals.push((start, end));
            }
        };
        let mut current: Option<usize> = None;
        for (idx, &db) in dbs.iter().enumerate() {
            if db > threshold_db {
                if current.is_none() {
                    current = Some(idx);
                }
            } else if let Some(start) = current.take() {
                push_span(&mut intervals, self.frame_span(start, idx - 1, samples.len()));
            }
        }
        if let Some(start) = current {
            push_span(&mut intervals, self.frame_span(start, dbs.len() - 1, samples.len()));
        }

        let mut kept = Vec::new();
        for &(start, end) in &intervals {
            kept.extend_from_slice(&samples[start..end]);
        }

        let interval_secs: Vec<(f64, f64)> = intervals
            .iter()
            .map(|&(s, e)| (s as f64 / sample_rate as f64, e as f64 / sample_rate as f64))
            .collect();
        let interval_count = interval_secs.len();

        self.finish(
            samples,
            kept,
            sample_rate,
            TrimMethod::Split.tag(),
            TrimDetails::Split {
                intervals: interval_secs,
                interval_count,
            },
        )
    }

    fn trim_segment(&self, samples: &[f32], sample_rate: u32) -> TrimResult {
        let block_len = ((self.segment_secs * sample_rate as f64) as usize).max(1);
        let block_dbs: Vec<f64> = samples
            .chunks(block_len)
            .map(|block| dsp::linear_to_db(dsp::rms(block)))
            .collect();
        let threshold_db = self.peak_relative_threshold(&block_dbs);

        let mut kept = Vec::new();
        let mut segments_kept = 0usize;
        for (block, &db) in samples.chunks(block_len).zip(&block_dbs) {
            if db > threshold_db {
                kept.extend_from_slice(block);
                segments_kept += 1;
            }
        }

        self.finish(
            samples,
            kept,
            sample_rate,
            TrimMethod::Segment.tag(),
            TrimDetails::Segment {
                segments_processed: block_dbs.len(),
                segments_kept,
            },
        )
    }

    /// Two-class iterative threshold refinement over the frame level
    /// distribution (ISODATA-style), then an edge trim at the refined level.
    fn trim_adaptive(&self, samples: &[f32], sample_rate: u32) -> TrimResult {
        let dbs = self.frame_dbs(samples);
        let min_db = dbs.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_db = dbs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        let mut threshold = (min_db + max_db) / 2.0;
        let mut iterations = 0usize;
        for _ in 0..20 {
            iterations += 1;
            let (low, high): (Vec<f64>, Vec<f64>) =
                dbs.iter().partition(|&&db| db <= threshold);
            if low.is_empty() || high.is_empty() {
                break;
            }
            let mean_low = low.iter().sum::<f64>() / low.len() as f64;
            let mean_high = high.iter().sum::<f64>() / high.len() as f64;
            let refined = (mean_low + mean_high) / 2.0;
            if (refined - threshold).abs() < 0.5 {
                threshold = refined;
                break;
            }
            threshold = refined;
        }

        let kept = self.edge_trim(samples, &dbs, threshold);
        self.finish(
            samples,
            kept,
            sample_rate,
            TrimMethod::Adaptive.tag(),
            TrimDetails::Adaptive {
                threshold_db: threshold,
                iterations,
            },
        )
    }

    /// Strip leading/trailing frames below the threshold, keep the span between.
    fn edge_trim(&self, samples: &[f32], dbs: &[f64], threshold_db: f64) -> Vec<f32> {
        let first = dbs.iter().position(|&db| db > threshold_db);
        let last = dbs.iter().rposition(|&db| db > threshold_db);

        match (first, last) {
            (Some(first), Some(last)) => {
                let (start, _) = self.frame_span(first, first, samples.len());
                let (_, end) = self.frame_span(last, last, samples.len());
                samples[start..end].to_vec()
            }
            // Nothing above the threshold: the whole signal is silence
            _ => Vec::new(),
        }
    }

    /// Sample span covered by an inclusive frame range.
    fn frame_span(&self, first_frame: usize, last_frame: usize, len: usize) -> (usize, usize) {
        let start = first_frame * self.hop;
        let end = (last_frame * self.hop + self.frame_len).min(len);
        (start.min(len), end)
    }

    fn finish(
        &self,
        original: &[f32],
        kept: Vec<f32>,
        sample_rate: u32,
        method: &str,
        details: TrimDetails,
    ) -> TrimResult {
        let original_duration = original.len() as f64 / sample_rate as f64;
        let trimmed_duration = kept.len() as f64 / sample_rate as f64;
        let silence_removed = (original_duration - trimmed_duration).max(0.0);
        let silence_percentage = if original_duration > 0.0 {
            (silence_removed / original_duration * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };

        TrimResult {
            trimmed_signal: kept,
            method: method.to_string(),
            original_duration,
            trimmed_duration,
            silence_removed,
            silence_percentage,
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    const SR: u32 = 44100;

    /// Tone padded with silence on both edges.
    fn padded_tone(lead_secs: f32, tone_secs: f32, tail_secs: f32) -> Vec<f32> {
        let mut samples = vec![0.0f32; (lead_secs * SR as f32) as usize];
        let n = (tone_secs * SR as f32) as usize;
        samples.extend((0..n).map(|i| {
            let t = i as f32 / SR as f32;
            (2.0 * PI * 440.0 * t).sin() * 0.5
        }));
        samples.extend(vec![0.0f32; (tail_secs * SR as f32) as usize]);
        samples
    }

    #[test]
    fn test_empty_signal_errors_for_all_methods() {
        let trimmer = SilenceTrimmer::new();
        for method in [
            TrimMethod::Dynamic,
            TrimMethod::Split,
            TrimMethod::Segment,
            TrimMethod::Adaptive,
        ] {
            let result = trimmer.trim(&[], SR, method);
            assert!(matches!(result, Err(ProcessingError::EmptySignal)));
        }
    }

    #[test]
    fn test_unknown_method_is_an_error() {
        let result = TrimMethod::from_str("aggressive");
        assert!(matches!(result, Err(ProcessingError::UnknownMethod(_))));
    }

    #[test]
    fn test_method_tags() {
        assert_eq!(TrimMethod::from_str("dynamic").unwrap().tag(), "dynamic");
        assert_eq!(
            TrimMethod::from_str("adaptive").unwrap().tag(),
            "adaptive_threshold"
        );
    }

    #[test]
    fn test_invariants_hold_for_all_methods() {
        let trimmer = SilenceTrimmer::new();
        let samples = padded_tone(0.3, 1.5, 0.3);

        for method in [
            TrimMethod::Dynamic,
            TrimMethod::Split,
            TrimMethod::Segment,
            TrimMethod::Adaptive,
        ] {
            let result = trimmer.trim(&samples, SR, method).unwrap();
            assert!(
                result.trimmed_duration <= result.original_duration,
                "{}: trimmed > original",
                result.method
            );
            assert!(
                (0.0..=100.0).contains(&result.silence_percentage),
                "{}: percentage out of range",
                result.method
            );
        }
    }

    #[test]
    fn test_dynamic_strips_edges() {
        let trimmer = SilenceTrimmer::new();
        let samples = padded_tone(0.4, 1.2, 0.4);
        let result = trimmer
            .trim(&samples, SR, TrimMethod::Dynamic)
            .unwrap();

        // 0.8s of 2.0s is silence; frame granularity allows some slack
        assert!(result.silence_percentage > 25.0);
        assert!(result.silence_percentage < 50.0);
        assert!(matches!(result.details, TrimDetails::Dynamic { .. }));
    }

    #[test]
    fn test_split_finds_two_intervals() {
        let trimmer = SilenceTrimmer::new();
        // Tone, inner silence, tone
        let mut samples = padded_tone(0.0, 0.8, 0.8);
        samples.extend(padded_tone(0.0, 0.8, 0.0));

        let result = trimmer.trim(&samples, SR, TrimMethod::Split).unwrap();
        match &result.details {
            TrimDetails::Split {
                intervals,
                interval_count,
            } => {
                assert_eq!(*interval_count, 2);
                assert_eq!(intervals.len(), 2);
                assert!(intervals[0].0 < intervals[0].1);
            }
            other => panic!("wrong details: {other:?}"),
        }
        // Inner silence removed too, unlike edge-only trimming
        assert!(result.trimmed_duration < 2.0);
    }

    #[test]
    fn test_split_closely_spaced_transients_never_grow_duration() {
        let trimmer = SilenceTrimmer::new();
        // Impulses one silent frame apart: the expanded frame spans of
        // adjacent active runs overlap each other
        let mut samples = vec![0.0f32; 2 * SR as usize];
        let mut i = 0;
        while i < samples.len() {
            samples[i] = 0.9;
            i += 2560;
        }

        let result = trimmer.trim(&samples, SR, TrimMethod::Split).unwrap();

        assert!(
            result.trimmed_duration <= result.original_duration,
            "trimmed {:.4}s > original {:.4}s",
            result.trimmed_duration,
            result.original_duration
        );
        assert!((0.0..=100.0).contains(&result.silence_percentage));
        match &result.details {
            TrimDetails::Split { intervals, .. } => {
                for pair in intervals.windows(2) {
                    assert!(
                        pair[1].0 >= pair[0].1,
                        "intervals overlap: {:?} then {:?}",
                        pair[0],
                        pair[1]
                    );
                }
            }
            other => panic!("wrong details: {other:?}"),
        }
    }

    #[test]
    fn test_segment_counts() {
        let trimmer = SilenceTrimmer::new();
        let samples = padded_tone(0.5, 1.0, 0.5);
        let result = trimmer.trim(&samples, SR, TrimMethod::Segment).unwrap();

        match result.details {
            TrimDetails::Segment {
                segments_processed,
                segments_kept,
            } => {
                assert_eq!(segments_processed, 4);
                assert!(segments_kept < segments_processed);
                assert!(segments_kept >= 2);
            }
            other => panic!("wrong details: {other:?}"),
        }
    }

    #[test]
    fn test_adaptive_reports_refinement() {
        let trimmer = SilenceTrimmer::new();
        let samples = padded_tone(0.3, 1.4, 0.3);
        let result = trimmer.trim(&samples, SR, TrimMethod::Adaptive).unwrap();

        assert_eq!(result.method, "adaptive_threshold");
        match result.details {
            TrimDetails::Adaptive {
                threshold_db,
                iterations,
            } => {
                assert!(iterations >= 1);
                assert!(threshold_db < 0.0);
            }
            other => panic!("wrong details: {other:?}"),
        }
        assert!(result.silence_removed > 0.0);
    }

    #[test]
    fn test_all_silence_holds_invariants() {
        let trimmer = SilenceTrimmer::new();
        let samples = vec![0.0f32; SR as usize];
        let result = trimmer.trim(&samples, SR, TrimMethod::Dynamic).unwrap();

        // Every frame of a constant-level signal sits at the peak level, so
        // the peak-relative threshold strips nothing; only the duration
        // invariants are asserted
        assert!(result.trimmed_duration <= result.original_duration);
        assert!((0.0..=100.0).contains(&result.silence_percentage));
    }
}
