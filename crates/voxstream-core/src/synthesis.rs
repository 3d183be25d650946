//! Boundary to the external synthesis model.
//!
//! The model itself lives behind [`SynthesisBackend`]. This module owns the
//! request shape, the device hint and the one-shot CPU retry that keeps an
//! unavailable accelerator from failing a session.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{VoxstreamError, VoxstreamResult};
use crate::phoneme::PhonemeSequence;

/// Device preference for inference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceHint {
    /// Use CPU for inference
    Cpu,
    /// Use an accelerator (GPU, NPU) if the backend has one
    Accelerator,
    /// Let the backend pick
    Auto,
}

impl Default for DeviceHint {
    fn default() -> Self {
        Self::Auto
    }
}

/// One call to the synthesis model
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    /// Text to speak
    pub text: String,
    /// Voice id
    pub voice: String,
    /// Speed multiplier
    pub speed: f32,
    /// Language code
    pub lang: String,
    /// Device preference
    pub device: DeviceHint,
    /// Precomputed phonemes, when available
    pub phonemes: Option<PhonemeSequence>,
}

impl SynthesisRequest {
    /// Request for plain text with no phonemes attached
    #[must_use]
    pub fn new(text: impl Into<String>, voice: impl Into<String>, speed: f32, lang: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: voice.into(),
            speed,
            lang: lang.into(),
            device: DeviceHint::Auto,
            phonemes: None,
        }
    }

    /// Attach a phoneme sequence
    #[must_use]
    pub fn with_phonemes(mut self, phonemes: PhonemeSequence) -> Self {
        self.phonemes = Some(phonemes);
        self
    }

    /// Set the device preference
    #[must_use]
    pub const fn with_device(mut self, device: DeviceHint) -> Self {
        self.device = device;
        self
    }
}

/// External text-to-speech model producing 16-bit little-endian PCM
#[async_trait]
pub trait SynthesisBackend: Send + Sync {
    /// Synthesize one request into raw PCM bytes
    ///
    /// # Errors
    ///
    /// Returns an error if the model or its device is unavailable
    async fn synthesize(&self, request: &SynthesisRequest) -> VoxstreamResult<Vec<u8>>;

    /// Output sample rate in Hz
    fn sample_rate(&self) -> u32 {
        crate::DEFAULT_SAMPLE_RATE
    }
}

/// Synthesize, retrying once on CPU if a non-CPU attempt fails.
pub async fn synthesize_with_fallback(
    backend: &dyn SynthesisBackend,
    request: &SynthesisRequest,
) -> VoxstreamResult<Vec<u8>> {
    match backend.synthesize(request).await {
        Ok(audio) => Ok(audio),
        Err(err) if request.device != DeviceHint::Cpu => {
            warn!(
                "Synthesis on {:?} failed ({}), retrying on CPU",
                request.device, err
            );
            let cpu_request = request.clone().with_device(DeviceHint::Cpu);
            let audio = backend.synthesize(&cpu_request).await?;
            debug!("CPU retry produced {} bytes", audio.len());
            Ok(audio)
        }
        Err(err) => Err(err),
    }
}

/// Synthesis defaults applied to requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Voice used when a request names none
    pub default_voice: String,
    /// Speed used when a request names none
    pub default_speed: f32,
    /// Device preference for every call
    pub device: DeviceHint,
    /// Longest accepted request text in characters
    pub max_text_length: usize,
    /// Deadline for one segment's synthesis, CPU retry included
    pub synthesis_timeout_ms: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            default_voice: "af_heart".to_string(),
            default_speed: 1.0,
            device: DeviceHint::Auto,
            max_text_length: crate::MAX_TEXT_LENGTH,
            synthesis_timeout_ms: 30_000,
        }
    }
}

impl SynthesisConfig {
    /// Validate synthesis configuration
    pub fn validate(&self) -> VoxstreamResult<()> {
        if self.default_voice.trim().is_empty() {
            return Err(VoxstreamError::configuration("default_voice must not be empty"));
        }
        crate::voice::validate_speed(self.default_speed)
            .map_err(|e| VoxstreamError::configuration(e.to_string()))?;
        if self.max_text_length == 0 {
            return Err(VoxstreamError::configuration(
                "max_text_length must be greater than 0",
            ));
        }
        if self.synthesis_timeout_ms == 0 {
            return Err(VoxstreamError::configuration(
                "synthesis_timeout_ms must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Synthesis deadline as a duration
    #[must_use]
    pub const fn synthesis_timeout(&self) -> Duration {
        Duration::from_millis(self.synthesis_timeout_ms)
    }
}
