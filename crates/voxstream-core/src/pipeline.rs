//! Streaming text-to-speech pipeline.
//!
//! [`TtsPipeline::stream`] turns one request into an [`AudioStream`]. Behind
//! it three tasks run per session: a producer that segments, phonemizes and
//! synthesizes; the shared decoder; and an emitter that paces, frames and
//! monitors the audio on its way to the caller.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::error::{VoxstreamError, VoxstreamResult};
use crate::monitor::{BufferMetrics, StreamingBufferMonitor};
use crate::phoneme::{PhonemeCache, PhonemeCacheStats, PhonemeSequence, Phonemizer};
use crate::primer_cache::{PrimerCache, PrimerCacheStats, PrimerOutcome};
use crate::streaming::{
    AudioChunk, AudioStream, ChunkMessage, OutputFramer, PlaybackSynchronizer, RawChunk,
    RawMessage, StreamDecoder, StreamEvent, StreamSummary, StreamingSession,
};
use crate::synthesis::{synthesize_with_fallback, DeviceHint, SynthesisBackend, SynthesisRequest};
use crate::text::{Segmenter, TextSegment};
use crate::voice::{validate_speed, VoiceCatalog};
use crate::warmup::{WarmupCoordinator, WarmupOutcome, WarmupPattern, WarmupStage, WarmupStatus};

/// One streaming synthesis request
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRequest {
    /// Text to speak
    pub text: String,
    /// Voice id; the configured default when absent
    pub voice: Option<String>,
    /// Speed multiplier; the configured default when absent
    pub speed: Option<f32>,
    /// Language code; derived from the voice when absent
    pub lang: Option<String>,
}

impl StreamRequest {
    /// Request with default voice, speed and language
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: None,
            speed: None,
            lang: None,
        }
    }

    /// Set the voice
    #[must_use]
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    /// Set the speed multiplier
    #[must_use]
    pub const fn with_speed(mut self, speed: f32) -> Self {
        self.speed = Some(speed);
        self
    }

    /// Set the language
    #[must_use]
    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }
}

/// Session counters since pipeline construction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionCounters {
    /// Sessions accepted
    pub started: u64,
    /// Sessions that ended normally
    pub completed: u64,
    /// Sessions that were cancelled
    pub cancelled: u64,
    /// Sessions that ended with an error
    pub failed: u64,
}

/// Read-only health snapshot
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    /// Sessions currently streaming
    pub active_sessions: usize,
    /// Lifetime session counters
    pub sessions: SessionCounters,
    /// Most recent metrics published by any session
    pub buffer_metrics: Option<BufferMetrics>,
    /// Phoneme cache counters
    pub phoneme_cache: PhonemeCacheStats,
    /// Phoneme cache hit rate
    pub phoneme_hit_rate: f64,
    /// Primer cache counters
    pub primer_cache: PrimerCacheStats,
    /// Primer cache hit rate
    pub primer_hit_rate: f64,
    /// Warmup progress
    pub warmup: WarmupStatus,
}

impl PipelineStatus {
    /// Render the snapshot as JSON for health endpoints
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails
    pub fn to_json(&self) -> VoxstreamResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Default)]
struct Counters {
    started: AtomicU64,
    completed: AtomicU64,
    cancelled: AtomicU64,
    failed: AtomicU64,
}

struct PipelineInner {
    config: PipelineConfig,
    backend: Arc<dyn SynthesisBackend>,
    segmenter: Segmenter,
    phonemes: Arc<PhonemeCache>,
    primers: PrimerCache,
    warmup: WarmupCoordinator,
    voices: VoiceCatalog,
    decoder: StreamDecoder,
    latest_metrics: Mutex<Option<BufferMetrics>>,
    active_sessions: AtomicUsize,
    counters: Counters,
}

/// Builder for [`TtsPipeline`]
pub struct PipelineBuilder {
    config: PipelineConfig,
    backend: Arc<dyn SynthesisBackend>,
    phonemizer: Option<Arc<dyn Phonemizer>>,
    fallback_phonemizer: Option<Arc<dyn Phonemizer>>,
    voices: VoiceCatalog,
}

impl PipelineBuilder {
    /// Primary grapheme-to-phoneme converter
    #[must_use]
    pub fn phonemizer(mut self, phonemizer: Arc<dyn Phonemizer>) -> Self {
        self.phonemizer = Some(phonemizer);
        self
    }

    /// Secondary converter tried when the primary fails
    #[must_use]
    pub fn fallback_phonemizer(mut self, phonemizer: Arc<dyn Phonemizer>) -> Self {
        self.fallback_phonemizer = Some(phonemizer);
        self
    }

    /// Replace the stock voice catalogue
    #[must_use]
    pub fn voices(mut self, voices: VoiceCatalog) -> Self {
        self.voices = voices;
        self
    }

    /// Validate the configuration and build the pipeline
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the default voice is
    /// unknown, the backend's sample rate differs from the streaming one, or
    /// the decode pool cannot be created
    pub fn build(self) -> VoxstreamResult<TtsPipeline> {
        self.config.validate()?;
        self.voices.get_voice(&self.config.synthesis.default_voice)?;
        let backend_rate = self.backend.sample_rate();
        if backend_rate != self.config.streaming.sample_rate {
            return Err(VoxstreamError::configuration(format!(
                "backend produces {backend_rate} Hz but streaming is configured for {} Hz",
                self.config.streaming.sample_rate
            )));
        }

        let decoder = StreamDecoder::new(
            self.config.streaming.decode_workers,
            self.config.streaming.preload_chunks,
        )?;

        info!(
            "Creating TTS pipeline (max segment {} chars, {} Hz, format {:?})",
            self.config.segmenter.max_segment_length,
            self.config.streaming.sample_rate,
            self.config.streaming.output_format
        );

        Ok(TtsPipeline {
            inner: Arc::new(PipelineInner {
                segmenter: Segmenter::new(self.config.segmenter.clone()),
                phonemes: Arc::new(PhonemeCache::new(
                    self.config.phoneme_cache.clone(),
                    self.phonemizer,
                    self.fallback_phonemizer,
                )),
                primers: PrimerCache::new(self.config.primer.clone()),
                warmup: WarmupCoordinator::new(),
                voices: self.voices,
                decoder,
                backend: self.backend,
                latest_metrics: Mutex::new(None),
                active_sessions: AtomicUsize::new(0),
                counters: Counters::default(),
                config: self.config,
            }),
        })
    }
}

/// Streaming TTS pipeline; cheap to clone and share between tasks
#[derive(Clone)]
pub struct TtsPipeline {
    inner: Arc<PipelineInner>,
}

impl std::fmt::Debug for TtsPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtsPipeline")
            .field("config", &self.inner.config)
            .field("active_sessions", &self.inner.active_sessions.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl TtsPipeline {
    /// Start building a pipeline over a synthesis backend
    #[must_use]
    pub fn builder(config: PipelineConfig, backend: Arc<dyn SynthesisBackend>) -> PipelineBuilder {
        PipelineBuilder {
            config,
            backend,
            phonemizer: None,
            fallback_phonemizer: None,
            voices: VoiceCatalog::new(),
        }
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    /// Start streaming a request. Must be called inside a Tokio runtime.
    ///
    /// Input problems are reported here; anything that goes wrong after this
    /// returns arrives as a `StreamEvent::Failed` on the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is too long, the voice is unknown or the
    /// speed is out of range
    pub fn stream(&self, request: StreamRequest) -> VoxstreamResult<AudioStream> {
        let inner = &self.inner;
        let params = self.resolve_params(&request)?;

        let char_count = request.text.chars().count();
        if char_count > inner.config.synthesis.max_text_length {
            return Err(VoxstreamError::invalid_input(format!(
                "Text length {} exceeds maximum of {}",
                char_count, inner.config.synthesis.max_text_length
            )));
        }

        let segments = inner.segmenter.segment(&request.text);
        let session = StreamingSession::new();
        let session_id = session.session_id;
        let cancel = CancellationToken::new();

        info!(
            "Session {} started: {} chars in {} segments (voice {}, lang {})",
            session_id,
            char_count,
            segments.len(),
            params.voice,
            params.lang
        );

        inner.counters.started.fetch_add(1, Ordering::Relaxed);
        inner.active_sessions.fetch_add(1, Ordering::Relaxed);
        let active = ActiveSession(Arc::clone(inner));

        let streaming = &inner.config.streaming;
        let (raw_tx, raw_rx) = mpsc::channel(streaming.preload_chunks);
        let (event_tx, event_rx) = mpsc::channel(streaming.output_channel_capacity);
        let degraded = Arc::new(AtomicUsize::new(0));

        let producer = Producer {
            context: SynthesisContext::new(inner, params),
            pipeline: Arc::clone(inner),
            raw_tx,
            cancel: cancel.clone(),
            chunk_bytes: streaming.chunk_bytes(),
            degraded: Arc::clone(&degraded),
        };
        tokio::spawn(producer.run(segments));

        let chunk_rx = inner.decoder.decode_stream(raw_rx, cancel.clone());

        let emitter = Emitter {
            inner: Arc::clone(inner),
            session,
            event_tx,
            cancel: cancel.clone(),
            degraded,
            _active: active,
        };
        tokio::spawn(emitter.run(chunk_rx));

        Ok(AudioStream::new(session_id, event_rx, cancel))
    }

    /// Stream a request and collect all audio bytes
    ///
    /// # Errors
    ///
    /// Returns the session error if synthesis fails
    pub async fn synthesize(&self, request: StreamRequest) -> VoxstreamResult<(Vec<u8>, StreamSummary)> {
        self.stream(request)?.collect_audio().await
    }

    /// Run the default warmup utterances for `stage` with the default voice.
    ///
    /// Patterns already warmed by another stage are skipped.
    pub async fn warm_up(&self, stage: WarmupStage) -> Vec<WarmupOutcome<usize>> {
        let synthesis = &self.inner.config.synthesis;
        let lang = self
            .inner
            .voices
            .resolve_language(&synthesis.default_voice, None)
            .unwrap_or_else(|_| "en-us".to_string());
        let patterns = WarmupPattern::defaults_for(stage, &synthesis.default_voice, &lang);
        self.warm_up_patterns(stage, &patterns).await
    }

    /// Warm specific patterns under `stage`
    pub async fn warm_up_patterns(
        &self,
        stage: WarmupStage,
        patterns: &[WarmupPattern],
    ) -> Vec<WarmupOutcome<usize>> {
        let inner = &self.inner;
        inner
            .warmup
            .run_stage(stage, patterns, |pattern| {
                let speed = pattern.speed();
                let WarmupPattern {
                    text, voice, lang, ..
                } = pattern;
                let context = SynthesisContext::new(inner, RequestParams { voice, speed, lang });
                async move {
                    let (audio, _) = context.synthesize_text(text).await?;
                    Ok(audio.len())
                }
            })
            .await
    }

    /// Warmup coordinator shared by every startup routine of this pipeline
    #[must_use]
    pub fn warmup_coordinator(&self) -> &WarmupCoordinator {
        &self.inner.warmup
    }

    /// Read-only health snapshot
    #[must_use]
    pub fn status(&self) -> PipelineStatus {
        let inner = &self.inner;
        let phoneme_cache = inner.phonemes.stats();
        let primer_cache = inner.primers.stats();
        PipelineStatus {
            active_sessions: inner.active_sessions.load(Ordering::Relaxed),
            sessions: SessionCounters {
                started: inner.counters.started.load(Ordering::Relaxed),
                completed: inner.counters.completed.load(Ordering::Relaxed),
                cancelled: inner.counters.cancelled.load(Ordering::Relaxed),
                failed: inner.counters.failed.load(Ordering::Relaxed),
            },
            buffer_metrics: inner.latest_metrics.lock().clone(),
            phoneme_hit_rate: phoneme_cache.hit_rate(),
            phoneme_cache,
            primer_hit_rate: primer_cache.hit_rate(),
            primer_cache,
            warmup: inner.warmup.status(),
        }
    }

    /// Drop cached phonemes and primers
    pub fn clear_caches(&self) {
        self.inner.phonemes.clear();
        self.inner.primers.clear();
        info!("Pipeline caches cleared");
    }

    fn resolve_params(&self, request: &StreamRequest) -> VoxstreamResult<RequestParams> {
        let synthesis = &self.inner.config.synthesis;
        let voice = request
            .voice
            .clone()
            .unwrap_or_else(|| synthesis.default_voice.clone());
        let speed = request.speed.unwrap_or(synthesis.default_speed);
        validate_speed(speed)?;
        let lang = self
            .inner
            .voices
            .resolve_language(&voice, request.lang.as_deref())?;
        Ok(RequestParams { voice, speed, lang })
    }
}

#[derive(Debug, Clone)]
struct RequestParams {
    voice: String,
    speed: f32,
    lang: String,
}

struct ActiveSession(Arc<PipelineInner>);

impl Drop for ActiveSession {
    fn drop(&mut self) {
        self.0.active_sessions.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Everything a detached synthesis task needs
#[derive(Clone)]
struct SynthesisContext {
    backend: Arc<dyn SynthesisBackend>,
    phonemes: Arc<PhonemeCache>,
    device: DeviceHint,
    timeout: Duration,
    params: RequestParams,
}

impl SynthesisContext {
    fn new(inner: &PipelineInner, params: RequestParams) -> Self {
        Self {
            backend: Arc::clone(&inner.backend),
            phonemes: Arc::clone(&inner.phonemes),
            device: inner.config.synthesis.device,
            timeout: inner.config.synthesis.synthesis_timeout(),
            params,
        }
    }

    async fn phonemize(&self, text: String) -> VoxstreamResult<PhonemeSequence> {
        let cache = Arc::clone(&self.phonemes);
        let lang = self.params.lang.clone();
        Ok(tokio::task::spawn_blocking(move || cache.to_phonemes(&text, &lang)).await?)
    }

    /// Phonemize and synthesize; the flag reports a degraded phoneme path.
    async fn synthesize_text(self, text: String) -> VoxstreamResult<(Vec<u8>, bool)> {
        let phonemes = self.phonemize(text.clone()).await?;
        let degraded = phonemes.source.is_degraded();
        let request = SynthesisRequest::new(
            text,
            self.params.voice.clone(),
            self.params.speed,
            self.params.lang.clone(),
        )
        .with_device(self.device)
        .with_phonemes(phonemes);

        let started = Instant::now();
        let audio = tokio::time::timeout(
            self.timeout,
            synthesize_with_fallback(self.backend.as_ref(), &request),
        )
        .await??;
        debug!(
            "Synthesized {} chars into {} bytes in {:?}",
            request.text.chars().count(),
            audio.len(),
            started.elapsed()
        );
        Ok((audio, degraded))
    }

    /// Run synthesis in its own task so cancellation can abandon it.
    fn spawn(&self, text: String) -> JoinHandle<VoxstreamResult<(Vec<u8>, bool)>> {
        tokio::spawn(self.clone().synthesize_text(text))
    }
}

struct Producer {
    context: SynthesisContext,
    pipeline: Arc<PipelineInner>,
    raw_tx: mpsc::Sender<RawMessage>,
    cancel: CancellationToken,
    chunk_bytes: usize,
    degraded: Arc<AtomicUsize>,
}

impl Producer {
    async fn run(self, segments: Vec<TextSegment>) {
        let message = match self.produce(&segments).await {
            Ok(()) => RawMessage::EndOfStream,
            Err(err) => {
                warn!("Producer failed: {}", err);
                RawMessage::Failed(err)
            }
        };
        if self.cancel.is_cancelled() {
            return;
        }
        let _ = self.raw_tx.send(message).await;
    }

    async fn produce(&self, segments: &[TextSegment]) -> VoxstreamResult<()> {
        for segment in segments {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            let keep_going = if segment.index == 1 {
                self.produce_first(segment).await?
            } else {
                self.produce_whole(segment).await?
            };
            if !keep_going {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Await a detached synthesis; `None` once the session is cancelled.
    async fn await_synthesis(
        &self,
        handle: JoinHandle<VoxstreamResult<(Vec<u8>, bool)>>,
    ) -> VoxstreamResult<Option<(Vec<u8>, bool)>> {
        tokio::select! {
            _ = self.cancel.cancelled() => {
                debug!("Discarding in-flight synthesis after cancellation");
                Ok(None)
            }
            joined = handle => Ok(Some(joined??)),
        }
    }

    async fn synthesize(&self, text: &str) -> VoxstreamResult<Option<(Vec<u8>, bool)>> {
        self.await_synthesis(self.context.spawn(text.to_string())).await
    }

    async fn produce_whole(&self, segment: &TextSegment) -> VoxstreamResult<bool> {
        let Some((audio, degraded)) = self.synthesize(&segment.content).await? else {
            return Ok(false);
        };
        if degraded {
            self.degraded.fetch_add(1, Ordering::Relaxed);
        }
        Ok(self.send_audio(segment.index, audio).await)
    }

    async fn produce_first(&self, segment: &TextSegment) -> VoxstreamResult<bool> {
        let params = &self.context.params;
        let degraded = AtomicBool::new(false);
        let degraded_ref = &degraded;

        let outcome = self
            .pipeline
            .primers
            .get_or_synthesize_primer(segment, &params.voice, params.speed, &params.lang, |primer| async move {
                match self.synthesize(&primer).await? {
                    Some((audio, was_degraded)) => {
                        degraded_ref.fetch_or(was_degraded, Ordering::Relaxed);
                        Ok(audio)
                    }
                    None => Err(VoxstreamError::stream("session cancelled during primer synthesis")),
                }
            })
            .await;

        let keep_going = match outcome {
            Ok(PrimerOutcome::Bypassed) => return self.produce_whole(segment).await,
            Ok(PrimerOutcome::Hit { audio, remainder }) => {
                let rest = self.context.spawn(remainder);
                if !self.send_audio(segment.index, audio).await {
                    return Ok(false);
                }
                self.finish_remainder(segment.index, self.await_synthesis(rest).await?, &degraded)
                    .await
            }
            Ok(PrimerOutcome::Miss { audio, remainder, .. }) => {
                if !self.send_audio(segment.index, audio).await {
                    return Ok(false);
                }
                let rest = self.synthesize(&remainder).await?;
                self.finish_remainder(segment.index, rest, &degraded).await
            }
            Err(_) if self.cancel.is_cancelled() => false,
            Err(err) => {
                warn!("Primer synthesis failed ({}), synthesizing first segment whole", err);
                return self.produce_whole(segment).await;
            }
        };

        if degraded.load(Ordering::Relaxed) {
            self.degraded.fetch_add(1, Ordering::Relaxed);
        }
        Ok(keep_going)
    }

    async fn finish_remainder(
        &self,
        segment_index: usize,
        rest: Option<(Vec<u8>, bool)>,
        degraded: &AtomicBool,
    ) -> bool {
        let Some((audio, was_degraded)) = rest else {
            return false;
        };
        degraded.fetch_or(was_degraded, Ordering::Relaxed);
        self.send_audio(segment_index, audio).await
    }

    /// Split audio into chunk-sized pieces; `false` once nobody is listening.
    async fn send_audio(&self, segment_index: usize, audio: Vec<u8>) -> bool {
        for piece in audio.chunks(self.chunk_bytes) {
            let message = RawMessage::Data(RawChunk {
                segment_index,
                bytes: piece.to_vec(),
            });
            let sent = tokio::select! {
                _ = self.cancel.cancelled() => return false,
                sent = self.raw_tx.send(message) => sent,
            };
            if sent.is_err() {
                return false;
            }
        }
        true
    }
}

struct Emitter {
    inner: Arc<PipelineInner>,
    session: StreamingSession,
    event_tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
    degraded: Arc<AtomicUsize>,
    _active: ActiveSession,
}

impl Emitter {
    async fn run(mut self, mut chunk_rx: mpsc::Receiver<ChunkMessage>) {
        let config = &self.inner.config;
        let streaming = config.streaming.clone();
        let mut monitor = StreamingBufferMonitor::new(config.monitor.clone());
        let mut sync = PlaybackSynchronizer::new(
            streaming.sample_rate,
            Duration::from_millis(streaming.pacing_lead_ms),
            streaming.pacing_enabled,
        );
        let mut framer = OutputFramer::new(streaming.output_format, streaming.sample_rate, crate::DEFAULT_CHANNELS);
        let window = streaming.buffer_window();
        let mut failure = None;

        loop {
            let waiting_since = Instant::now();
            let playback_started = self.session.chunks_emitted > 0;
            let message = tokio::select! {
                _ = self.cancel.cancelled() => break,
                message = next_chunk(&mut chunk_rx, &mut monitor, playback_started, window) => message,
            };

            match message {
                Some(ChunkMessage::Chunk(chunk)) => {
                    let wait_ms = waiting_since.elapsed().as_secs_f64() * 1000.0;
                    if !self.emit(chunk, wait_ms, &mut monitor, &mut sync, &mut framer).await {
                        self.cancel.cancel();
                        break;
                    }
                }
                Some(ChunkMessage::EndOfStream) => break,
                Some(ChunkMessage::Failed(err)) => {
                    failure = Some(err);
                    break;
                }
                None if self.cancel.is_cancelled() => break,
                None => {
                    failure = Some(VoxstreamError::stream("decoder stopped unexpectedly"));
                    break;
                }
            }
        }

        let report = monitor.stop_monitoring();
        if let Some(report) = &report {
            *self.inner.latest_metrics.lock() = Some(report.final_metrics.clone());
        }
        let cancelled = failure.is_none() && self.cancel.is_cancelled();
        let summary = StreamSummary {
            session_id: self.session.session_id,
            ttfa: self.session.ttfa(),
            audio_duration: self.session.audio_duration(streaming.sample_rate),
            elapsed: self.session.start_time.elapsed(),
            chunks_emitted: self.session.chunks_emitted,
            bytes_emitted: self.session.bytes_emitted,
            degraded_segments: self.degraded.load(Ordering::Relaxed),
            cancelled,
            buffer_report: report,
        };

        let counters = &self.inner.counters;
        let event = match failure {
            Some(error) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Session {} failed after {} chunks: {}",
                    summary.session_id, summary.chunks_emitted, error
                );
                StreamEvent::Failed { error, summary }
            }
            None => {
                if cancelled {
                    counters.cancelled.fetch_add(1, Ordering::Relaxed);
                } else {
                    counters.completed.fetch_add(1, Ordering::Relaxed);
                }
                info!(
                    "Session {} {}: {} chunks, {:?} of audio, TTFA {:?}",
                    summary.session_id,
                    if cancelled { "cancelled" } else { "completed" },
                    summary.chunks_emitted,
                    summary.audio_duration,
                    summary.ttfa
                );
                StreamEvent::Completed(summary)
            }
        };
        let _ = self.event_tx.send(event).await;
    }

    /// Pace, frame and send one chunk; `false` once the caller is gone.
    async fn emit(
        &mut self,
        chunk: AudioChunk,
        wait_ms: f64,
        monitor: &mut StreamingBufferMonitor,
        sync: &mut PlaybackSynchronizer,
        framer: &mut OutputFramer,
    ) -> bool {
        sync.pace(chunk.samples.len()).await;
        let bytes = framer.frame(&chunk.samples);

        if let Some(metrics) = monitor.record_chunk_processed(chunk.byte_len, chunk.decode_ms + wait_ms) {
            *self.inner.latest_metrics.lock() = Some(metrics);
        }

        let ttfa = self.session.record_chunk(bytes.len(), chunk.samples.len());
        if self.event_tx.send(StreamEvent::Audio(bytes)).await.is_err() {
            debug!("Session {} receiver dropped", self.session.session_id);
            return false;
        }
        if let Some(ttfa) = ttfa {
            info!("Session {} first audio after {:?}", self.session.session_id, ttfa);
            if self.event_tx.send(StreamEvent::FirstAudio { ttfa }).await.is_err() {
                return false;
            }
        }
        true
    }
}

/// Wait for the next decoded chunk.
///
/// Once playback has started, a chunk that misses the buffer window counts
/// as one underrun and the wait continues without a deadline.
async fn next_chunk(
    chunk_rx: &mut mpsc::Receiver<ChunkMessage>,
    monitor: &mut StreamingBufferMonitor,
    playback_started: bool,
    window: Duration,
) -> Option<ChunkMessage> {
    if !playback_started {
        return chunk_rx.recv().await;
    }
    match tokio::time::timeout(window, chunk_rx.recv()).await {
        Ok(message) => message,
        Err(_) => {
            monitor.record_underrun(1.0);
            chunk_rx.recv().await
        }
    }
}
