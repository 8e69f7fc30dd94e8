//! Waveform poster rendering
//!
//! Draws a min/max envelope of the signal into an RGBA image and encodes it as
//! PNG in memory. Each pixel column covers an equal span of samples, so long
//! files decimate naturally without a separate downsampling pass. The
//! background is fully transparent for compositing onto product artwork.

use crate::dsp;
use crate::error::ProcessingError;
use tracing::debug;

/// Waveform color, RGBA. A deep blue that reads well on light and dark stock.
const WAVE_COLOR: [u8; 4] = [30, 64, 175, 255];

/// Renders a mono signal into an in-memory PNG.
pub struct WaveformRenderer {
    width: u32,
    height: u32,
}

impl WaveformRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    /// Render the signal's min/max envelope and encode it as PNG bytes.
    pub fn render_png(&self, samples: &[f32]) -> Result<Vec<u8>, ProcessingError> {
        if samples.is_empty() {
            return Err(ProcessingError::EmptySignal);
        }

        let pixels = self.rasterize(samples);
        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, self.width, self.height);
            encoder.set_color(png::ColorType::Rgba);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder
                .write_header()
                .map_err(|e| ProcessingError::Format(format!("PNG header: {e}")))?;
            writer
                .write_image_data(&pixels)
                .map_err(|e| ProcessingError::Format(format!("PNG encode: {e}")))?;
            writer
                .finish()
                .map_err(|e| ProcessingError::Format(format!("PNG finish: {e}")))?;
        }

        debug!(
            "Rendered {}x{} waveform PNG ({} bytes) from {} samples",
            self.width,
            self.height,
            out.len(),
            samples.len()
        );
        Ok(out)
    }

    /// Min/max fill per pixel column into a transparent RGBA buffer.
    fn rasterize(&self, samples: &[f32]) -> Vec<u8> {
        let width = self.width as usize;
        let height = self.height as usize;
        let mut pixels = vec![0u8; width * height * 4];

        // Normalize so the loudest excursion spans the full height; a silent
        // signal draws a one-pixel center line instead of dividing by zero.
        let peak = dsp::peak_amplitude(samples);
        let scale = if peak > 1e-10 { 1.0 / peak } else { 0.0 };
        let mid = (height - 1) as f64 / 2.0;

        for col in 0..width {
            let start = col * samples.len() / width;
            let end = (((col + 1) * samples.len()) / width).max(start + 1);
            let span = &samples[start..end.min(samples.len())];

            let mut lo = f32::INFINITY;
            let mut hi = f32::NEG_INFINITY;
            for &s in span {
                let s = if s.is_finite() { s } else { 0.0 };
                lo = lo.min(s);
                hi = hi.max(s);
            }

            // Sample +1.0 maps to the top row
            let y_top = (mid - hi as f64 * scale * mid).round().clamp(0.0, (height - 1) as f64) as usize;
            let y_bot = (mid - lo as f64 * scale * mid).round().clamp(0.0, (height - 1) as f64) as usize;

            for y in y_top..=y_bot.max(y_top) {
                let idx = (y * width + col) * 4;
                pixels[idx..idx + 4].copy_from_slice(&WAVE_COLOR);
            }
        }

        pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    fn sine(frequency: f32, duration_secs: f32) -> Vec<f32> {
        let sr = 44100.0;
        let n = (duration_secs * sr) as usize;
        (0..n)
            .map(|i| (2.0 * PI * frequency * i as f32 / sr).sin() * 0.5)
            .collect()
    }

    fn ihdr_dimensions(png_bytes: &[u8]) -> (u32, u32) {
        // IHDR is always the first chunk: width at offset 16, height at 20
        let w = u32::from_be_bytes(png_bytes[16..20].try_into().unwrap());
        let h = u32::from_be_bytes(png_bytes[20..24].try_into().unwrap());
        (w, h)
    }

    #[test]
    fn test_empty_signal_errors() {
        let renderer = WaveformRenderer::new(1200, 200);
        assert!(matches!(
            renderer.render_png(&[]),
            Err(ProcessingError::EmptySignal)
        ));
    }

    #[test]
    fn test_png_magic_and_dimensions() {
        let renderer = WaveformRenderer::new(1200, 200);
        let bytes = renderer.render_png(&sine(440.0, 1.0)).unwrap();

        assert!(bytes.len() > 8);
        assert_eq!(&bytes[..8], &PNG_MAGIC);
        assert_eq!(ihdr_dimensions(&bytes), (1200, 200));
    }

    #[test]
    fn test_silence_still_renders() {
        let renderer = WaveformRenderer::new(400, 100);
        let bytes = renderer.render_png(&vec![0.0f32; 44100]).unwrap();
        assert_eq!(&bytes[..8], &PNG_MAGIC);
    }

    #[test]
    fn test_fewer_samples_than_columns() {
        let renderer = WaveformRenderer::new(800, 150);
        let bytes = renderer.render_png(&[0.1, -0.4, 0.9]).unwrap();
        assert_eq!(&bytes[..8], &PNG_MAGIC);
        assert_eq!(ihdr_dimensions(&bytes), (800, 150));
    }

    #[test]
    fn test_non_finite_samples_do_not_panic() {
        let renderer = WaveformRenderer::new(200, 50);
        let mut samples = sine(440.0, 0.5);
        samples[100] = f32::NAN;
        samples[200] = f32::INFINITY;
        let bytes = renderer.render_png(&samples).unwrap();
        assert_eq!(&bytes[..8], &PNG_MAGIC);
    }
}
