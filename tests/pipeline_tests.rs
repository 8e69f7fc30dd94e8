//! End-to-end pipeline tests over in-memory storage and generated WAV uploads.

use soundprint_audio::config::AudioConfig;
use soundprint_audio::pipeline::AudioPipeline;
use soundprint_audio::services::TrimMethod;
use soundprint_audio::storage::{AudioStorage, MemoryStorage};
use soundprint_audio::PipelineError;
use std::f32::consts::PI;
use std::sync::Arc;
use uuid::Uuid;

const SR: u32 = 44100;
const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// 2 seconds of audio: silence in [0, 0.2), a 440 Hz + 880 Hz tone in
/// [0.2, 1.8), silence in [1.8, 2.0).
fn padded_tone_samples() -> Vec<f32> {
    let total = 2 * SR as usize;
    let start = (0.2 * SR as f32) as usize;
    let end = (1.8 * SR as f32) as usize;
    (0..total)
        .map(|i| {
            if i < start || i >= end {
                0.0
            } else {
                let t = i as f32 / SR as f32;
                (2.0 * PI * 440.0 * t).sin() * 0.5 + (2.0 * PI * 880.0 * t).sin() * 0.3
            }
        })
        .collect()
}

fn wav_bytes(samples: &[f32]) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SR,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer
                .write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                .unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

async fn seeded_pipeline(key: &str, samples: &[f32]) -> (AudioPipeline, Arc<MemoryStorage>) {
    init_tracing();
    let storage = Arc::new(MemoryStorage::new());
    storage.insert(key, wav_bytes(samples)).await;
    (
        AudioPipeline::new(AudioConfig::default(), storage.clone()),
        storage,
    )
}

#[tokio::test]
async fn end_to_end_padded_tone() {
    let (pipeline, storage) = seeded_pipeline("uploads/take.wav", &padded_tone_samples()).await;
    let session = Uuid::new_v4();

    let result = pipeline
        .process(session, "uploads/take.wav", TrimMethod::Dynamic)
        .await
        .unwrap();

    assert_eq!(result.status, "completed");
    assert!((result.original_duration - 2.0).abs() < 0.05);

    // The edge silence totals 0.4 s; frame-granular trimming removes some of
    // it but never more than actually exists.
    assert!(
        result.trimming.silence_percentage > 0.0,
        "expected some silence removed, got {}%",
        result.trimming.silence_percentage
    );
    assert!(
        result.trimming.silence_percentage < 20.0,
        "removed more silence than the signal contains: {}%",
        result.trimming.silence_percentage
    );
    assert!(result.duration <= result.original_duration);

    // A steady tone has amplitude-envelope peaks.
    let envelope = result.peaks.envelope.as_ref().unwrap();
    assert!(envelope.count > 0);

    assert!((0.0..=1.0).contains(&result.quality_score));
    assert!(result.rms_energy > 0.0);
    assert!(result.sample_rate > 0);
    assert_eq!(result.mime_type, "audio/x-wav");

    let png = storage.download(&result.waveform_key).await.unwrap();
    assert_eq!(&png[..8], &PNG_MAGIC);
}

#[tokio::test]
async fn every_trim_method_completes() {
    let samples = padded_tone_samples();
    for method in [
        TrimMethod::Dynamic,
        TrimMethod::Split,
        TrimMethod::Segment,
        TrimMethod::Adaptive,
    ] {
        let (pipeline, _) = seeded_pipeline("uploads/take.wav", &samples).await;
        let result = pipeline
            .process(Uuid::new_v4(), "uploads/take.wav", method)
            .await
            .unwrap();

        assert_eq!(result.trimming.method, method.tag());
        assert!(result.trimming.trimmed_duration <= result.trimming.original_duration);
        assert!((0.0..=100.0).contains(&result.trimming.silence_percentage));
    }
}

#[tokio::test]
async fn concurrent_sessions_do_not_interfere() {
    init_tracing();
    let storage = Arc::new(MemoryStorage::new());
    let samples = padded_tone_samples();
    for i in 0..4 {
        storage
            .insert(&format!("uploads/take-{i}.wav"), wav_bytes(&samples))
            .await;
    }
    let pipeline = AudioPipeline::new(AudioConfig::default(), storage.clone());

    let mut handles = Vec::new();
    for i in 0..4 {
        let pipeline = pipeline.clone();
        let session = Uuid::new_v4();
        handles.push(tokio::spawn(async move {
            let result = pipeline
                .process(session, &format!("uploads/take-{i}.wav"), TrimMethod::Dynamic)
                .await
                .unwrap();
            (session, result)
        }));
    }

    let mut seen_keys = std::collections::HashSet::new();
    for handle in handles {
        let (session, result) = handle.await.unwrap();
        assert_eq!(result.waveform_key, format!("waveforms/{session}.png"));
        assert!(seen_keys.insert(result.waveform_key.clone()));
        assert!((result.original_duration - 2.0).abs() < 0.05);

        let png = storage.download(&result.waveform_key).await.unwrap();
        assert_eq!(&png[..8], &PNG_MAGIC);
    }
    assert_eq!(seen_keys.len(), 4);
}

#[tokio::test]
async fn too_short_upload_is_final() {
    let short: Vec<f32> = (0..(0.1 * SR as f32) as usize)
        .map(|i| (2.0 * PI * 440.0 * i as f32 / SR as f32).sin() * 0.5)
        .collect();
    let (pipeline, _) = seeded_pipeline("uploads/blip.wav", &short).await;

    let err = pipeline
        .process(Uuid::new_v4(), "uploads/blip.wav", TrimMethod::Dynamic)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn fully_silent_upload_still_completes() {
    let silence = vec![0.0f32; 2 * SR as usize];
    let (pipeline, storage) = seeded_pipeline("uploads/silence.wav", &silence).await;

    let result = pipeline
        .process(Uuid::new_v4(), "uploads/silence.wav", TrimMethod::Dynamic)
        .await
        .unwrap();

    assert_eq!(result.status, "completed");
    assert!((0.0..=1.0).contains(&result.quality_score));
    assert!(storage.exists(&result.waveform_key).await.unwrap());
}

#[tokio::test]
async fn performance_telemetry_is_populated() {
    let (pipeline, _) = seeded_pipeline("uploads/take.wav", &padded_tone_samples()).await;

    let result = pipeline
        .process(Uuid::new_v4(), "uploads/take.wav", TrimMethod::Adaptive)
        .await
        .unwrap();

    let times = &result.performance.processing_times;
    for stage in [
        "download",
        "validation",
        "decode",
        "metadata",
        "trimming",
        "peak_detection",
        "quality_analysis",
        "waveform_render",
        "upload",
    ] {
        assert!(times.contains_key(stage), "missing stage timing: {stage}");
        assert!(times[stage] >= 0.0);
    }
    assert!(!result.performance.chunk_processing_used);
    assert_eq!(result.performance.chunks_processed, 0);
}
