//! Streaming delivery: decode, pace, frame and hand chunks to the caller.
//!
//! A session is three tasks joined by bounded channels:
//!
//! ```text
//! producer --RawMessage--> decoder --ChunkMessage--> emitter --StreamEvent--> caller
//! ```
//!
//! The decoder queue holds `preload_chunks` decoded chunks. The emitter owns
//! the session's buffer monitor and playback synchronizer.

pub mod decoder;
pub mod output;
pub mod session;
pub mod synchronizer;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{VoxstreamError, VoxstreamResult};
use crate::monitor::BufferUtilizationReport;

pub use decoder::{AudioChunk, ChunkMessage, RawChunk, RawMessage, StreamDecoder};
pub use output::{OutputFormat, OutputFramer};
pub use session::StreamingSession;
pub use synchronizer::{PacingDecision, PlaybackSynchronizer};

/// Streaming configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Samples per emitted chunk
    pub chunk_samples: usize,
    /// Decoded chunks buffered ahead of the emitter
    pub preload_chunks: usize,
    /// Emitter wait before a missing chunk counts as an underrun
    pub buffer_window_ms: u64,
    /// Pace emission against wall-clock time
    pub pacing_enabled: bool,
    /// How far ahead of playback chunks may be released
    pub pacing_lead_ms: u64,
    /// Decode worker threads (0 picks automatically)
    pub decode_workers: usize,
    /// Wire format of emitted bytes
    pub output_format: OutputFormat,
    /// Capacity of the caller-facing event channel
    pub output_channel_capacity: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            sample_rate: crate::DEFAULT_SAMPLE_RATE,
            chunk_samples: 2400,
            preload_chunks: 3,
            buffer_window_ms: 50,
            pacing_enabled: true,
            pacing_lead_ms: 50,
            decode_workers: 0,
            output_format: OutputFormat::Pcm,
            output_channel_capacity: 32,
        }
    }
}

impl StreamingConfig {
    /// Validate streaming configuration
    pub fn validate(&self) -> VoxstreamResult<()> {
        if self.sample_rate == 0 {
            return Err(VoxstreamError::configuration("sample_rate must be greater than 0"));
        }
        if self.chunk_samples == 0 {
            return Err(VoxstreamError::configuration("chunk_samples must be greater than 0"));
        }
        if self.preload_chunks == 0 {
            return Err(VoxstreamError::configuration("preload_chunks must be greater than 0"));
        }
        if self.buffer_window_ms == 0 {
            return Err(VoxstreamError::configuration(
                "buffer_window_ms must be greater than 0",
            ));
        }
        if self.output_channel_capacity == 0 {
            return Err(VoxstreamError::configuration(
                "output_channel_capacity must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Underrun timeout as a duration
    #[must_use]
    pub const fn buffer_window(&self) -> Duration {
        Duration::from_millis(self.buffer_window_ms)
    }

    /// Bytes of PCM16 per full chunk
    #[must_use]
    pub const fn chunk_bytes(&self) -> usize {
        self.chunk_samples * 2
    }
}

/// End-of-session accounting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamSummary {
    /// Session id
    pub session_id: Uuid,
    /// Time to first audio, if any audio was emitted
    pub ttfa: Option<Duration>,
    /// Playback length of emitted audio
    pub audio_duration: Duration,
    /// Wall-clock session length
    pub elapsed: Duration,
    /// Chunks emitted
    pub chunks_emitted: u64,
    /// Bytes emitted
    pub bytes_emitted: u64,
    /// Segments that used a degraded phoneme path
    pub degraded_segments: usize,
    /// Whether the session was cancelled
    pub cancelled: bool,
    /// Terminal buffer report
    pub buffer_report: Option<BufferUtilizationReport>,
}

/// Item yielded by an [`AudioStream`]
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Framed audio bytes
    Audio(Vec<u8>),
    /// First audio was just emitted
    FirstAudio {
        /// Time from request to first chunk
        ttfa: Duration,
    },
    /// Session finished normally or was cancelled
    Completed(StreamSummary),
    /// Session ended with an error; audio already emitted stands
    Failed {
        /// What went wrong
        error: VoxstreamError,
        /// Accounting up to the failure
        summary: StreamSummary,
    },
}

/// Caller handle for one streaming session
#[derive(Debug)]
pub struct AudioStream {
    session_id: Uuid,
    events: mpsc::Receiver<StreamEvent>,
    cancel: CancellationToken,
}

impl AudioStream {
    pub(crate) const fn new(
        session_id: Uuid,
        events: mpsc::Receiver<StreamEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session_id,
            events,
            cancel,
        }
    }

    /// Session id
    #[must_use]
    pub const fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Next event, or `None` once the session has ended
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// Stop the session; the stream then drains and completes
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this session
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drain the stream, concatenating all audio bytes.
    ///
    /// # Errors
    ///
    /// Returns the session error if the stream ends with `Failed`, or a
    /// stream error if it closes without a terminal event
    pub async fn collect_audio(mut self) -> VoxstreamResult<(Vec<u8>, StreamSummary)> {
        let mut audio = Vec::new();
        while let Some(event) = self.events.recv().await {
            match event {
                StreamEvent::Audio(bytes) => audio.extend_from_slice(&bytes),
                StreamEvent::FirstAudio { .. } => {}
                StreamEvent::Completed(summary) => return Ok((audio, summary)),
                StreamEvent::Failed { error, .. } => return Err(error),
            }
        }
        Err(VoxstreamError::stream("stream closed without a terminal event"))
    }
}

impl Drop for AudioStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
