//! Chunked processing and memory bounds
//!
//! Long or large uploads are analyzed as a stream of fixed-length windows
//! instead of one decoded buffer; both paths feed the same
//! [`crate::dsp::RunningStats`] so results agree. Memory use is watched via
//! process RSS, and large run-local buffers are released deterministically when
//! the ceiling is crossed.

use crate::config::AudioConfig;
use crate::decode::AudioDecoder;
use crate::dsp::RunningStats;
use crate::error::ProcessingError;
use crate::models::ChunkSummary;
use std::path::Path;
use std::sync::Mutex;
use sysinfo::{Pid, System};
use tracing::{debug, warn};

/// Decides between whole-buffer and chunked processing, and runs the chunked
/// path.
pub struct ChunkManager {
    config: AudioConfig,
    decoder: AudioDecoder,
}

impl ChunkManager {
    pub fn new(config: AudioConfig) -> Self {
        let decoder = AudioDecoder::new(config.target_sample_rate);
        Self { config, decoder }
    }

    /// Whether this input should take the chunked path. Either the duration or
    /// the byte-size threshold alone is enough to trigger it.
    pub fn should_chunk(&self, duration_secs: f64, size_bytes: u64) -> bool {
        duration_secs > self.config.chunk_duration_threshold_secs
            || size_bytes > self.config.chunk_size_threshold_bytes
    }

    /// Analyze a file window-by-window without materializing the full signal.
    ///
    /// Windows arrive at the file's native sample rate; aggregates (peak, RMS,
    /// zero-crossing rate, duration) accumulate across windows.
    pub fn process_in_chunks(&self, path: &Path) -> Result<ChunkSummary, ProcessingError> {
        let mut stats = RunningStats::new();
        let mut native_rate = self.config.target_sample_rate;

        let chunks_processed =
            self.decoder
                .stream_windows(path, self.config.chunk_window_secs, |window, rate| {
                    native_rate = rate;
                    stats.update(window);
                })?;

        if stats.samples_seen() == 0 {
            return Err(ProcessingError::EmptySignal);
        }

        let summary = ChunkSummary {
            chunks_processed,
            processing_method: "chunked".to_string(),
            duration: stats.duration_seconds(native_rate),
            rms_energy: stats.rms(),
            peak_amplitude: stats.peak(),
            zero_crossing_rate: stats.zero_crossing_rate(),
        };

        debug!(
            "Chunked analysis: {} windows, {:.1}s, rms={:.4}",
            summary.chunks_processed, summary.duration, summary.rms_energy
        );
        Ok(summary)
    }
}

/// Process RSS monitor with a configurable ceiling.
pub struct MemoryMonitor {
    system: Mutex<System>,
    pid: Option<Pid>,
    limit_mb: f64,
}

impl MemoryMonitor {
    pub fn new(limit_mb: f64) -> Self {
        let mut system = System::new_all();
        system.refresh_all();
        let pid = sysinfo::get_current_pid().ok();
        if pid.is_none() {
            warn!("Could not determine own PID; memory monitoring disabled");
        }
        Self {
            system: Mutex::new(system),
            pid,
            limit_mb,
        }
    }

    /// Current process RSS in MB. 0.0 when the process cannot be observed.
    pub fn current_usage_mb(&self) -> f64 {
        let Some(pid) = self.pid else {
            return 0.0;
        };
        let mut system = match self.system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        system.refresh_all();
        system
            .process(pid)
            .map(|p| p.memory() as f64 / (1024.0 * 1024.0))
            .unwrap_or(0.0)
    }

    /// Whether RSS currently exceeds the configured ceiling.
    pub fn exceeds_threshold(&self) -> bool {
        self.current_usage_mb() > self.limit_mb
    }
}

/// Release a large buffer deterministically: drop its contents and return its
/// capacity to the allocator. The run keeps the (now empty) handle.
pub fn force_reclaim<T>(buffer: &mut Vec<T>) {
    let released = buffer.capacity() * std::mem::size_of::<T>();
    buffer.clear();
    buffer.shrink_to_fit();
    debug!("Reclaimed {} KiB of buffer capacity", released / 1024);
}

/// Halve the numeric footprint of a scratch buffer where double precision is
/// not needed.
pub fn downcast_precision(samples: &[f64]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn manager() -> ChunkManager {
        ChunkManager::new(AudioConfig::default())
    }

    #[test]
    fn test_should_chunk_thresholds() {
        let m = manager();
        let mb = 1024 * 1024;
        assert!(!m.should_chunk(60.0, 10 * mb));
        assert!(m.should_chunk(180.0, 10 * mb));
        assert!(m.should_chunk(60.0, 60 * mb));
    }

    #[test]
    fn test_process_in_chunks_aggregates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..44100 * 5 {
            let s = (2.0 * PI * 440.0 * i as f32 / 44100.0).sin() * 0.5;
            writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();

        let mut config = AudioConfig::default();
        config.chunk_window_secs = 1.0;
        let summary = ChunkManager::new(config).process_in_chunks(&path).unwrap();

        assert_eq!(summary.chunks_processed, 5);
        assert_eq!(summary.processing_method, "chunked");
        assert!((summary.duration - 5.0).abs() < 0.05);
        assert!((summary.rms_energy - 0.5 / std::f64::consts::SQRT_2).abs() < 0.02);
        assert!((summary.peak_amplitude - 0.5).abs() < 0.02);
    }

    #[test]
    fn test_memory_monitor_reports_nonzero() {
        let monitor = MemoryMonitor::new(500.0);
        // A running test process always has some RSS
        assert!(monitor.current_usage_mb() > 0.0);
    }

    #[test]
    fn test_memory_threshold() {
        // Ceiling of 0 MB is always exceeded; an absurdly high one never is
        assert!(MemoryMonitor::new(0.0).exceeds_threshold());
        assert!(!MemoryMonitor::new(1e12).exceeds_threshold());
    }

    #[test]
    fn test_force_reclaim_releases_capacity() {
        let mut buffer: Vec<f32> = Vec::with_capacity(1_000_000);
        buffer.extend_from_slice(&[1.0, 2.0, 3.0]);
        force_reclaim(&mut buffer);
        assert!(buffer.is_empty());
        assert!(buffer.capacity() < 1_000_000);
    }

    #[test]
    fn test_downcast_precision() {
        let wide = vec![0.25f64, -0.5, 1.0];
        let narrow = downcast_precision(&wide);
        assert_eq!(narrow, vec![0.25f32, -0.5, 1.0]);
    }
}
