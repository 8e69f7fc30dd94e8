//! Audio analysis core for waveform poster generation.
//!
//! Takes a customer's uploaded audio file and produces everything the product
//! needs to print it: a rendered waveform PNG plus a full analysis record
//! (signal statistics, silence trimming, peak detection, quality assessment,
//! performance telemetry).
//!
//! The crate deliberately owns no persistence and no HTTP surface. Uploaded
//! bytes and rendered artifacts move through the [`storage::AudioStorage`]
//! trait; results come back as serializable records for the caller to store.
//!
//! ```no_run
//! use soundprint_audio::config::AudioConfig;
//! use soundprint_audio::pipeline::AudioPipeline;
//! use soundprint_audio::services::TrimMethod;
//! use soundprint_audio::storage::MemoryStorage;
//! use std::sync::Arc;
//! use uuid::Uuid;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = Arc::new(MemoryStorage::new());
//! storage.insert("uploads/take1.wav", std::fs::read("take1.wav")?).await;
//!
//! let pipeline = AudioPipeline::new(AudioConfig::default(), storage.clone());
//! let result = pipeline
//!     .process(Uuid::new_v4(), "uploads/take1.wav", TrimMethod::Adaptive)
//!     .await?;
//! println!("quality {:.2}, waveform at {}", result.quality_score, result.waveform_key);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod decode;
pub mod dsp;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;

pub use config::AudioConfig;
pub use error::{PipelineError, ProcessingError, StorageError, ValidationError};
pub use models::ProcessingResult;
pub use pipeline::AudioPipeline;
pub use services::{PeakType, TrimMethod};
pub use storage::{AudioStorage, MemoryStorage};
