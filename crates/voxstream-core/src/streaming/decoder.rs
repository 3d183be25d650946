//! Raw synthesis output to timed PCM chunks.
//!
//! Decoding runs on a dedicated rayon pool so the async pacing loop never
//! does CPU work. Chunks are decoded one at a time in arrival order, which
//! keeps per-session FIFO ordering without any reordering buffer.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{VoxstreamError, VoxstreamResult};

/// Raw PCM bytes from the synthesis backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChunk {
    /// Segment the bytes belong to (1-based)
    pub segment_index: usize,
    /// 16-bit little-endian PCM
    pub bytes: Vec<u8>,
}

/// Producer to decoder channel item
#[derive(Debug)]
pub enum RawMessage {
    /// Audio bytes to decode
    Data(RawChunk),
    /// Producer finished normally
    EndOfStream,
    /// Producer hit a session-fatal error
    Failed(VoxstreamError),
}

/// One decoded chunk ready for playback
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// Position within the session, starting at 0
    pub sequence: u64,
    /// Segment the chunk belongs to (1-based)
    pub segment_index: usize,
    /// Normalized mono samples in [-1, 1]
    pub samples: Vec<f32>,
    /// Raw bytes consumed, after odd-byte truncation
    pub byte_len: usize,
    /// Time spent decoding
    pub decode_ms: f64,
}

/// Decoder to emitter channel item
#[derive(Debug)]
pub enum ChunkMessage {
    /// Decoded audio
    Chunk(AudioChunk),
    /// No more audio will follow
    EndOfStream,
    /// The session cannot continue
    Failed(VoxstreamError),
}

/// Decode PCM16 LE into normalized samples.
///
/// A trailing odd byte is dropped; the flag reports whether that happened.
#[must_use]
pub fn decode_pcm16(bytes: &[u8]) -> (Vec<f32>, bool) {
    let truncated = bytes.len() % 2 == 1;
    let samples = bytes
        .chunks_exact(2)
        .map(|pair| (f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0).clamp(-1.0, 1.0))
        .collect();
    (samples, truncated)
}

/// Pool-backed decoder shared by all sessions of a pipeline
#[derive(Debug, Clone)]
pub struct StreamDecoder {
    pool: Arc<rayon::ThreadPool>,
    queue_capacity: usize,
}

impl StreamDecoder {
    /// Build a decoder with `workers` threads (0 picks the CPU count)
    ///
    /// # Errors
    ///
    /// Returns an error if the worker pool cannot be created
    pub fn new(workers: usize, queue_capacity: usize) -> VoxstreamResult<Self> {
        let threads = if workers == 0 {
            num_cpus::get().clamp(1, 4)
        } else {
            workers
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("voxstream-decode-{i}"))
            .build()
            .map_err(|e| VoxstreamError::concurrency(format!("Failed to build decode pool: {e}")))?;
        debug!("Decode pool ready with {} workers", threads);
        Ok(Self {
            pool: Arc::new(pool),
            queue_capacity: queue_capacity.max(1),
        })
    }

    /// Decode one raw chunk on the worker pool
    pub async fn decode(&self, raw: RawChunk, sequence: u64) -> VoxstreamResult<AudioChunk> {
        let (tx, rx) = oneshot::channel();
        self.pool.spawn(move || {
            let started = Instant::now();
            let (samples, truncated) = decode_pcm16(&raw.bytes);
            let chunk = AudioChunk {
                sequence,
                segment_index: raw.segment_index,
                byte_len: samples.len() * 2,
                samples,
                decode_ms: started.elapsed().as_secs_f64() * 1000.0,
            };
            let _ = tx.send((chunk, truncated));
        });

        let (chunk, truncated) = rx
            .await
            .map_err(|_| VoxstreamError::decode("decode worker dropped its result"))?;
        if truncated {
            warn!(
                "Odd-length audio chunk in segment {} truncated by one byte",
                chunk.segment_index
            );
        }
        Ok(chunk)
    }

    /// Spawn the decode task for one session.
    ///
    /// The returned queue holds at most `queue_capacity` decoded chunks. It
    /// ends with `EndOfStream` or `Failed`, or simply closes on cancellation.
    #[must_use]
    pub fn decode_stream(
        &self,
        mut raw_rx: mpsc::Receiver<RawMessage>,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<ChunkMessage> {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let decoder = self.clone();

        tokio::spawn(async move {
            let mut sequence = 0u64;
            loop {
                let message = tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Decoder cancelled after {} chunks", sequence);
                        return;
                    }
                    message = raw_rx.recv() => message,
                };

                let outgoing = match message {
                    Some(RawMessage::Data(raw)) => match decoder.decode(raw, sequence).await {
                        Ok(chunk) => {
                            sequence += 1;
                            ChunkMessage::Chunk(chunk)
                        }
                        Err(err) => ChunkMessage::Failed(err),
                    },
                    Some(RawMessage::EndOfStream) => ChunkMessage::EndOfStream,
                    Some(RawMessage::Failed(err)) => ChunkMessage::Failed(err),
                    None if cancel.is_cancelled() => return,
                    None => ChunkMessage::Failed(VoxstreamError::stream(
                        "producer stopped without end-of-stream",
                    )),
                };

                let terminal = !matches!(outgoing, ChunkMessage::Chunk(_));
                let sent = tokio::select! {
                    _ = cancel.cancelled() => return,
                    sent = tx.send(outgoing) => sent,
                };
                if sent.is_err() || terminal {
                    return;
                }
            }
        });

        rx
    }
}
