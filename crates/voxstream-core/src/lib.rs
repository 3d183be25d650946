//! # Voxstream Core
//!
//! Low-latency streaming delivery for neural text-to-speech.
//!
//! ## Features
//!
//! - Sentence-aware text segmentation with date and time verbalization
//! - Phoneme cache with a fallback grapheme-to-phoneme chain
//! - Primer cache that gets the first words of a request out early
//! - Deduplicated warmup across startup stages
//! - Buffer health monitoring with an end-of-session report
//! - Parallel decode with wall-clock playback pacing
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use voxstream_core::{
//!     PipelineConfig, StreamEvent, StreamRequest, SynthesisBackend, SynthesisRequest,
//!     TtsPipeline, VoxstreamResult,
//! };
//!
//! struct Silence;
//!
//! #[async_trait::async_trait]
//! impl SynthesisBackend for Silence {
//!     async fn synthesize(&self, request: &SynthesisRequest) -> VoxstreamResult<Vec<u8>> {
//!         Ok(vec![0; request.text.len() * 480])
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pipeline = TtsPipeline::builder(PipelineConfig::default(), Arc::new(Silence)).build()?;
//!     let mut stream = pipeline.stream(StreamRequest::new("Hello, world!"))?;
//!
//!     while let Some(event) = stream.next_event().await {
//!         match event {
//!             StreamEvent::Audio(bytes) => println!("{} bytes", bytes.len()),
//!             StreamEvent::FirstAudio { ttfa } => println!("first audio after {ttfa:?}"),
//!             StreamEvent::Completed(summary) => println!("done: {summary:?}"),
//!             StreamEvent::Failed { error, .. } => return Err(error.into()),
//!         }
//!     }
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod phoneme;
pub mod pipeline;
pub mod primer_cache;
pub mod streaming;
pub mod synthesis;
pub mod text;
pub mod voice;
pub mod warmup;

// Re-export main types for convenience
pub use config::PipelineConfig;
pub use error::{VoxstreamError, VoxstreamResult};
pub use logging::init_tracing;
pub use monitor::{BufferMetrics, BufferMonitorConfig, BufferUtilizationReport, StreamingBufferMonitor};
pub use phoneme::{
    CharacterTokenizer, PhonemeCache, PhonemeCacheConfig, PhonemeCacheStats, PhonemeSequence,
    PhonemeSource, Phonemizer, PhonemizerOutput,
};
pub use pipeline::{PipelineBuilder, PipelineStatus, SessionCounters, StreamRequest, TtsPipeline};
pub use primer_cache::{PrimerCache, PrimerCacheStats, PrimerConfig, PrimerOutcome, PrimerPlan};
pub use streaming::{
    AudioStream, OutputFormat, PlaybackSynchronizer, StreamDecoder, StreamEvent, StreamSummary,
    StreamingConfig,
};
pub use synthesis::{DeviceHint, SynthesisBackend, SynthesisConfig, SynthesisRequest};
pub use text::{segment_text, Segmenter, SegmenterConfig, TextSegment};
pub use voice::{Gender, Voice, VoiceCatalog};
pub use warmup::{WarmupCoordinator, WarmupOutcome, WarmupPattern, WarmupStage, WarmupStatus};

/// Version information for the voxstream-core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default sample rate for audio processing (24 kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;

/// Default number of audio channels (mono)
pub const DEFAULT_CHANNELS: u16 = 1;

/// Maximum text length for synthesis, in characters
pub const MAX_TEXT_LENGTH: usize = 100_000;
