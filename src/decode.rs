//! PCM extraction via symphonia
//!
//! Decodes any supported container to mono f32 at the configured target rate
//! (rubato sinc resampling when the native rate differs). Also provides a
//! streaming window reader used by the chunked path, which never materializes
//! the full decoded signal.

use crate::error::ProcessingError;
use crate::models::DecodedSignal;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::path::Path;
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;
use tracing::debug;

/// Audio decoder with a fixed target sample rate for full decodes.
pub struct AudioDecoder {
    target_sample_rate: u32,
}

impl Default for AudioDecoder {
    fn default() -> Self {
        Self {
            target_sample_rate: 44100,
        }
    }
}

struct OpenedTrack {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: u16,
}

impl AudioDecoder {
    pub fn new(target_sample_rate: u32) -> Self {
        Self { target_sample_rate }
    }

    /// Decode an entire file to mono PCM at the target sample rate.
    pub fn decode_file(&self, path: &Path) -> Result<DecodedSignal, ProcessingError> {
        let mut opened = open_track(path)?;
        let native_rate = opened.sample_rate;
        let channels = opened.channels;

        let mut samples = Vec::new();
        read_packets(&mut opened, |window| {
            samples.extend_from_slice(window);
            true
        })?;

        debug!(
            "Decoded {} mono samples at {} Hz ({} source channels)",
            samples.len(),
            native_rate,
            channels
        );

        let samples = if native_rate != self.target_sample_rate {
            resample_mono(samples, native_rate, self.target_sample_rate)?
        } else {
            samples
        };

        Ok(DecodedSignal {
            samples,
            sample_rate: self.target_sample_rate,
            channels,
        })
    }

    /// Stream fixed-length mono windows at the file's native sample rate.
    ///
    /// `on_window` receives each window and the native rate; the full signal is
    /// never held in memory at once. Returns the number of windows delivered
    /// (the trailing partial window counts).
    pub fn stream_windows<F>(
        &self,
        path: &Path,
        window_secs: f64,
        mut on_window: F,
    ) -> Result<usize, ProcessingError>
    where
        F: FnMut(&[f32], u32),
    {
        let mut opened = open_track(path)?;
        let native_rate = opened.sample_rate;
        let window_len = ((window_secs * native_rate as f64) as usize).max(1);

        let mut buffer: Vec<f32> = Vec::with_capacity(window_len);
        let mut windows = 0usize;

        read_packets(&mut opened, |chunk| {
            buffer.extend_from_slice(chunk);
            while buffer.len() >= window_len {
                on_window(&buffer[..window_len], native_rate);
                windows += 1;
                buffer.drain(..window_len);
            }
            true
        })?;

        if !buffer.is_empty() {
            on_window(&buffer, native_rate);
            windows += 1;
        }

        debug!("Streamed {windows} windows of {window_secs}s from {}", path.display());
        Ok(windows)
    }
}

/// Probe the container and set up a decoder for the default audio track.
fn open_track(path: &Path) -> Result<OpenedTrack, ProcessingError> {
    let file = std::fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| ProcessingError::Decode(format!("format probe failed: {e}")))?;

    let format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| ProcessingError::Format("no audio tracks in container".into()))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| ProcessingError::Decode("sample rate missing from codec params".into()))?;
    let channels = codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(1)
        .max(1);

    let decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| ProcessingError::Format(format!("unsupported codec: {e}")))?;

    Ok(OpenedTrack {
        format,
        decoder,
        track_id,
        sample_rate,
        channels,
    })
}

/// Drive the packet loop, handing mono-mixed sample runs to `on_samples`.
/// Stops at EOF or when the callback returns false.
fn read_packets<F>(opened: &mut OpenedTrack, mut on_samples: F) -> Result<(), ProcessingError>
where
    F: FnMut(&[f32]) -> bool,
{
    loop {
        let packet = match opened.format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(ProcessingError::Decode(format!("packet read failed: {e}"))),
        };

        if packet.track_id() != opened.track_id {
            continue;
        }

        let decoded = opened
            .decoder
            .decode(&packet)
            .map_err(|e| ProcessingError::Decode(format!("packet decode failed: {e}")))?;

        let mono = buffer_to_mono(&decoded);
        if !on_samples(&mono) {
            break;
        }
    }
    Ok(())
}

/// Downmix a decoded buffer of any sample format to mono f32.
fn buffer_to_mono(decoded: &AudioBufferRef) -> Vec<f32> {
    match decoded {
        AudioBufferRef::F32(buf) => mono_mix(buf, |s| s),
        AudioBufferRef::F64(buf) => mono_mix(buf, |s| s as f32),
        AudioBufferRef::S8(buf) => mono_mix(buf, |s| s as f32 / 128.0),
        AudioBufferRef::S16(buf) => mono_mix(buf, |s| s as f32 / 32768.0),
        AudioBufferRef::S24(buf) => mono_mix(buf, |s| s.inner() as f32 / 8388608.0),
        AudioBufferRef::S32(buf) => mono_mix(buf, |s| s as f32 / 2147483648.0),
        AudioBufferRef::U8(buf) => mono_mix(buf, |s| (s as f32 - 128.0) / 128.0),
        AudioBufferRef::U16(buf) => mono_mix(buf, |s| (s as f32 - 32768.0) / 32768.0),
        AudioBufferRef::U24(buf) => mono_mix(buf, |s| (s.inner() as f32 - 8388608.0) / 8388608.0),
        AudioBufferRef::U32(buf) => {
            mono_mix(buf, |s| (s as f32 - 2147483648.0) / 2147483648.0)
        }
    }
}

/// Average all channels of a planar buffer into mono.
fn mono_mix<S, C>(buf: &AudioBuffer<S>, convert: C) -> Vec<f32>
where
    S: Sample + Copy,
    C: Fn(S) -> f32,
{
    let channels = buf.spec().channels.count();
    let frames = buf.frames();
    let mut out = vec![0.0f32; frames];

    for ch in 0..channels {
        let plane = buf.chan(ch);
        for (i, value) in out.iter_mut().enumerate() {
            *value += convert(plane[i]);
        }
    }
    if channels > 1 {
        let scale = 1.0 / channels as f32;
        for value in &mut out {
            *value *= scale;
        }
    }
    out
}

/// Sinc-resample a mono signal to the target rate.
fn resample_mono(
    samples: Vec<f32>,
    source_rate: u32,
    target_rate: u32,
) -> Result<Vec<f32>, ProcessingError> {
    if samples.is_empty() {
        return Ok(samples);
    }

    debug!("Resampling {} Hz -> {} Hz", source_rate, target_rate);

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = target_rate as f64 / source_rate as f64;
    let num_frames = samples.len();

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, num_frames, 1)
        .map_err(|e| ProcessingError::Decode(format!("resampler construction failed: {e}")))?;

    let output = resampler
        .process(&[samples], None)
        .map_err(|e| ProcessingError::Decode(format!("resampling failed: {e}")))?;

    Ok(output.into_iter().next().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn write_wav(path: &Path, samples: &[f32], sample_rate: u32, channels: u16) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_decode_mono_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<f32> = (0..44100)
            .map(|i| (2.0 * PI * 440.0 * i as f32 / 44100.0).sin() * 0.5)
            .collect();
        write_wav(&path, &samples, 44100, 1);

        let decoder = AudioDecoder::new(44100);
        let signal = decoder.decode_file(&path).unwrap();

        assert_eq!(signal.sample_rate, 44100);
        assert_eq!(signal.channels, 1);
        assert!((signal.duration_seconds() - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_decode_downmixes_stereo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        // Interleaved L/R with opposite constants; mono mix should be near zero
        let mut interleaved = Vec::new();
        for _ in 0..4410 {
            interleaved.push(0.5f32);
            interleaved.push(-0.5f32);
        }
        write_wav(&path, &interleaved, 44100, 2);

        let decoder = AudioDecoder::new(44100);
        let signal = decoder.decode_file(&path).unwrap();

        assert_eq!(signal.channels, 2);
        let peak = crate::dsp::peak_amplitude(&signal.samples);
        assert!(peak < 0.01, "downmix should cancel, peak was {peak}");
    }

    #[test]
    fn test_decode_resamples_to_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone48k.wav");
        let samples: Vec<f32> = (0..48000)
            .map(|i| (2.0 * PI * 440.0 * i as f32 / 48000.0).sin() * 0.5)
            .collect();
        write_wav(&path, &samples, 48000, 1);

        let decoder = AudioDecoder::new(44100);
        let signal = decoder.decode_file(&path).unwrap();

        assert_eq!(signal.sample_rate, 44100);
        // 1 second at 48 kHz should land near 44100 samples, ±1%
        let expected = 44100.0;
        assert!((signal.samples.len() as f64 - expected).abs() < expected * 0.01);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.wav");
        std::fs::write(&path, b"this is not audio data at all").unwrap();

        let decoder = AudioDecoder::default();
        let result = decoder.decode_file(&path);
        assert!(matches!(result, Err(ProcessingError::Decode(_))));
    }

    #[test]
    fn test_stream_windows_counts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.wav");
        let samples: Vec<f32> = (0..44100 * 3)
            .map(|i| (2.0 * PI * 220.0 * i as f32 / 44100.0).sin() * 0.3)
            .collect();
        write_wav(&path, &samples, 44100, 1);

        let decoder = AudioDecoder::default();
        let mut seen_samples = 0usize;
        let windows = decoder
            .stream_windows(&path, 1.0, |window, rate| {
                assert_eq!(rate, 44100);
                seen_samples += window.len();
            })
            .unwrap();

        assert_eq!(windows, 3);
        assert_eq!(seen_samples, 44100 * 3);
    }
}
