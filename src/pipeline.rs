//! Pipeline orchestration
//!
//! [`AudioPipeline`] composes the service components into one run: download the
//! upload, validate it, decode and normalize, trim silence, detect peaks,
//! assess quality, render the waveform poster, and upload the artifact. All
//! CPU-bound analysis happens inside a single `spawn_blocking` section so the
//! async runtime stays responsive; runs share no mutable state and may execute
//! concurrently.
//!
//! The downloaded bytes are staged in a named temporary file that is removed
//! on every exit path, including early error returns.

use crate::config::AudioConfig;
use crate::decode::AudioDecoder;
use crate::dsp;
use crate::error::{PipelineError, ProcessingError};
use crate::models::{
    AudioMetadata, ChunkSummary, PeakResult, PerformanceStats, ProcessingResult, QualityMetrics,
    TrimResult, ValidationResult,
};
use crate::services::{
    chunk_manager::force_reclaim, ChunkManager, MemoryMonitor, MetadataExtractor, PeakDetector,
    PeakType, QualityAnalyzer, SilenceTrimmer, TrimMethod, Validator, WaveformRenderer,
};
use crate::storage::AudioStorage;
use chrono::Utc;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Peak level the decoded signal is normalized to before analysis.
const NORMALIZE_PEAK: f64 = 0.95;

/// Everything the blocking analysis section produces.
struct AnalysisOutput {
    validation: ValidationResult,
    metadata: AudioMetadata,
    trimming: TrimResult,
    peaks: PeakResult,
    quality: QualityMetrics,
    png: Vec<u8>,
    chunk_summary: Option<ChunkSummary>,
    timings: HashMap<String, f64>,
    initial_memory_mb: f64,
    final_memory_mb: f64,
}

/// End-to-end audio analysis pipeline.
///
/// Cheap to clone; concurrent runs are independent.
#[derive(Clone)]
pub struct AudioPipeline {
    config: AudioConfig,
    storage: Arc<dyn AudioStorage>,
}

impl AudioPipeline {
    pub fn new(config: AudioConfig, storage: Arc<dyn AudioStorage>) -> Self {
        Self { config, storage }
    }

    /// Process the upload stored under `upload_key` and return the full
    /// analysis record. The rendered waveform is uploaded to
    /// `waveforms/{session_id}.png` before this returns.
    pub async fn process(
        &self,
        session_id: Uuid,
        upload_key: &str,
        trim_method: TrimMethod,
    ) -> Result<ProcessingResult, PipelineError> {
        info!("Processing session {session_id} from {upload_key}");

        let download_started = Instant::now();
        let bytes = self.storage.download(upload_key).await?;
        let download_secs = download_started.elapsed().as_secs_f64();

        let extension = Path::new(upload_key)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin")
            .to_ascii_lowercase();

        let config = self.config.clone();
        let mut output =
            tokio::task::spawn_blocking(move || analyze(&config, &bytes, &extension, trim_method))
                .await
                .map_err(|e| PipelineError::Task(e.to_string()))??;
        output
            .timings
            .insert("download".to_string(), download_secs);

        let waveform_key = format!("waveforms/{session_id}.png");
        let upload_started = Instant::now();
        self.storage
            .upload(&waveform_key, std::mem::take(&mut output.png))
            .await?;
        output
            .timings
            .insert("upload".to_string(), upload_started.elapsed().as_secs_f64());

        // Chunked runs report aggregates from the streaming pass.
        let (rms_energy, peak_amplitude, zero_crossing_rate) = match &output.chunk_summary {
            Some(summary) => (
                summary.rms_energy,
                summary.peak_amplitude,
                summary.zero_crossing_rate,
            ),
            None => (
                output.metadata.rms_energy,
                output.metadata.peak_amplitude,
                output.metadata.zero_crossing_rate,
            ),
        };

        let performance = PerformanceStats {
            processing_times: output.timings,
            initial_memory_mb: output.initial_memory_mb,
            final_memory_mb: output.final_memory_mb,
            memory_used_mb: output.final_memory_mb - output.initial_memory_mb,
            chunk_processing_used: output.chunk_summary.is_some(),
            chunks_processed: output
                .chunk_summary
                .as_ref()
                .map(|s| s.chunks_processed)
                .unwrap_or(0),
        };

        info!(
            "Session {session_id} complete: {:.2}s audio, quality {:.2}, waveform at {waveform_key}",
            output.trimming.trimmed_duration, output.quality.quality_score
        );

        Ok(ProcessingResult {
            status: "completed".to_string(),
            waveform_key,
            duration: output.trimming.trimmed_duration,
            original_duration: output.trimming.original_duration,
            sample_rate: output.metadata.sample_rate,
            channels: output.metadata.channels,
            rms_energy,
            peak_amplitude,
            dynamic_range: output.metadata.dynamic_range,
            tempo: output.metadata.tempo,
            zero_crossing_rate,
            file_size: output.validation.file_size,
            mime_type: output.validation.mime_type.clone(),
            quality_score: output.quality.quality_score,
            snr_db: output.quality.snr_db,
            quality: output.quality,
            trimming: output.trimming,
            peaks: output.peaks,
            performance,
            analyzed_at: Utc::now(),
        })
    }
}

/// The synchronous CPU-bound section of a run. Stages the bytes into a
/// temporary file, then validates, decodes, trims, detects, assesses, and
/// renders. The temporary file is removed when this returns, on success or
/// failure.
fn analyze(
    config: &AudioConfig,
    bytes: &[u8],
    extension: &str,
    trim_method: TrimMethod,
) -> Result<AnalysisOutput, PipelineError> {
    let mut timings = HashMap::new();
    let monitor = MemoryMonitor::new(config.memory_limit_mb);
    let initial_memory_mb = monitor.current_usage_mb();

    let mut tmp = tempfile::Builder::new()
        .prefix("soundprint-")
        .suffix(&format!(".{extension}"))
        .tempfile()
        .map_err(ProcessingError::from)?;
    tmp.write_all(bytes).map_err(ProcessingError::from)?;
    tmp.flush().map_err(ProcessingError::from)?;
    let path = tmp.path().to_path_buf();

    let started = Instant::now();
    let validator = Validator::new(config.clone());
    let validation = validator.validate(&path)?;
    timings.insert("validation".to_string(), started.elapsed().as_secs_f64());

    let started = Instant::now();
    let decoder = AudioDecoder::new(config.target_sample_rate);
    let signal = decoder.decode_file(&path)?;
    timings.insert("decode".to_string(), started.elapsed().as_secs_f64());

    // The container header can understate duration; re-check on real samples.
    validator.validate_duration(signal.duration_seconds())?;

    let started = Instant::now();
    let extractor = MetadataExtractor::new(config.target_sample_rate);
    let mut metadata = extractor.extract_from_signal(&signal.samples, signal.sample_rate)?;
    metadata.channels = signal.channels;
    metadata.file_size = validation.file_size;
    timings.insert("metadata".to_string(), started.elapsed().as_secs_f64());

    let chunker = ChunkManager::new(config.clone());
    let chunk_summary = if chunker.should_chunk(signal.duration_seconds(), validation.file_size) {
        debug!(
            "Chunked path engaged: {:.1}s / {} bytes",
            signal.duration_seconds(),
            validation.file_size
        );
        let started = Instant::now();
        let summary = chunker.process_in_chunks(&path)?;
        timings.insert(
            "chunked_analysis".to_string(),
            started.elapsed().as_secs_f64(),
        );
        Some(summary)
    } else {
        None
    };

    // Normalize peaks so trimming thresholds and the rendered poster are
    // consistent across quiet and loud uploads.
    let mut samples = signal.samples;
    let peak = dsp::peak_amplitude(&samples);
    if peak > 1e-10 {
        let gain = (NORMALIZE_PEAK / peak) as f32;
        if (gain - 1.0).abs() > 1e-6 {
            for s in &mut samples {
                *s *= gain;
            }
        }
    }

    let started = Instant::now();
    let trimmer = SilenceTrimmer::new();
    let mut trimming = trimmer.trim(&samples, signal.sample_rate, trim_method)?;
    timings.insert("trimming".to_string(), started.elapsed().as_secs_f64());

    // A fully silent upload trims to nothing; analyze the untrimmed signal
    // rather than failing the run.
    let analysis: &[f32] = if trimming.trimmed_signal.is_empty() {
        warn!("Trimming removed the entire signal; analyzing untrimmed audio");
        &samples
    } else {
        &trimming.trimmed_signal
    };

    let started = Instant::now();
    let detector = PeakDetector::new();
    let peaks = detector.detect(analysis, signal.sample_rate, &PeakType::all())?;
    timings.insert(
        "peak_detection".to_string(),
        started.elapsed().as_secs_f64(),
    );

    let started = Instant::now();
    let analyzer = QualityAnalyzer::new();
    let quality = analyzer.analyze(Some(&path), analysis, signal.sample_rate)?;
    timings.insert(
        "quality_analysis".to_string(),
        started.elapsed().as_secs_f64(),
    );

    let started = Instant::now();
    let renderer = WaveformRenderer::new(config.waveform_width, config.waveform_height);
    let png = renderer.render_png(analysis)?;
    timings.insert(
        "waveform_render".to_string(),
        started.elapsed().as_secs_f64(),
    );

    if monitor.exceeds_threshold() {
        warn!(
            "Memory usage {:.1} MB exceeds the configured limit",
            monitor.current_usage_mb()
        );
    }
    // Analysis is done; release the large buffers before returning.
    force_reclaim(&mut samples);
    force_reclaim(&mut trimming.trimmed_signal);

    let final_memory_mb = monitor.current_usage_mb();

    Ok(AnalysisOutput {
        validation,
        metadata,
        trimming,
        peaks,
        quality,
        png,
        chunk_summary,
        timings,
        initial_memory_mb,
        final_memory_mb,
    })
}
