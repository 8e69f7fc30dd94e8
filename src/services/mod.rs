//! Analysis service components, composed by the pipeline.

pub mod chunk_manager;
pub mod metadata_extractor;
pub mod peak_detector;
pub mod quality_analyzer;
pub mod silence_trimmer;
pub mod validator;
pub mod waveform_renderer;

pub use chunk_manager::{ChunkManager, MemoryMonitor};
pub use metadata_extractor::MetadataExtractor;
pub use peak_detector::{PeakDetector, PeakType};
pub use quality_analyzer::QualityAnalyzer;
pub use silence_trimmer::{SilenceTrimmer, TrimMethod};
pub use validator::Validator;
pub use waveform_renderer::WaveformRenderer;
