//! Shared fakes for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use voxstream_core::{
    PhonemizerOutput, Phonemizer, SynthesisBackend, SynthesisRequest, VoxstreamError,
    VoxstreamResult,
};

/// PCM bytes produced per input character (10 ms at 24 kHz)
pub const BYTES_PER_CHAR: usize = 480;

/// What a [`FakeBackend`] writes into its samples
#[derive(Debug, Clone, Default)]
pub enum Fill {
    /// All zeros
    #[default]
    Silence,
    /// The given samples, repeated
    Pattern(Vec<i16>),
    /// Every sample equals the request's character count
    TextLength,
}

/// Backend returning audio proportional to the text length
#[derive(Debug, Default)]
pub struct FakeBackend {
    fill: Fill,
    sample_rate: Option<u32>,
    stall: Option<(String, Duration)>,
    fail_on: Option<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Sleep for `delay` before answering any text containing `marker`
    pub fn stalling(marker: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            stall: Some((marker.to_string(), delay)),
            ..Self::default()
        })
    }

    /// Stall like [`FakeBackend::stalling`] and fill samples with the text length
    pub fn stalling_tagged(marker: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            fill: Fill::TextLength,
            stall: Some((marker.to_string(), delay)),
            ..Self::default()
        })
    }

    /// Fail every request whose text contains `marker`
    pub fn failing(marker: &str) -> Arc<Self> {
        Arc::new(Self {
            fail_on: Some(marker.to_string()),
            ..Self::default()
        })
    }

    /// Fill output with `fill`
    pub fn filled(fill: Fill) -> Arc<Self> {
        Arc::new(Self {
            fill,
            ..Self::default()
        })
    }

    /// Report `sample_rate` instead of the crate default
    pub fn at_rate(sample_rate: u32) -> Arc<Self> {
        Arc::new(Self {
            sample_rate: Some(sample_rate),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Bytes this backend returns for `text`
    pub fn render(&self, text: &str) -> Vec<u8> {
        let chars = text.chars().count();
        let samples = chars * BYTES_PER_CHAR / 2;
        match &self.fill {
            Fill::Silence => vec![0u8; samples * 2],
            Fill::Pattern(pattern) => pattern
                .iter()
                .cycle()
                .take(samples)
                .flat_map(|v| v.to_le_bytes())
                .collect(),
            Fill::TextLength => std::iter::repeat(chars as i16)
                .take(samples)
                .flat_map(|v| v.to_le_bytes())
                .collect(),
        }
    }
}

#[async_trait]
impl SynthesisBackend for FakeBackend {
    async fn synthesize(&self, request: &SynthesisRequest) -> VoxstreamResult<Vec<u8>> {
        self.calls.lock().push(request.text.clone());
        if let Some((marker, delay)) = &self.stall {
            if request.text.contains(marker.as_str()) {
                tokio::time::sleep(*delay).await;
            }
        }
        if let Some(marker) = &self.fail_on {
            if request.text.contains(marker.as_str()) {
                return Err(VoxstreamError::synthesis(format!("model rejected '{marker}'")));
            }
        }
        Ok(self.render(&request.text))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(voxstream_core::DEFAULT_SAMPLE_RATE)
    }
}

/// Phonemizer that counts calls and optionally always fails
#[derive(Debug)]
pub struct CountingPhonemizer {
    name: &'static str,
    fail: bool,
    calls: AtomicUsize,
}

impl CountingPhonemizer {
    pub fn ok(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn broken(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            fail: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Phonemizer for CountingPhonemizer {
    fn name(&self) -> &str {
        self.name
    }

    fn phonemize(&self, text: &str, _lang: &str) -> VoxstreamResult<PhonemizerOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(VoxstreamError::phonemization(format!("{} unavailable", self.name)));
        }
        let phonemes = text.to_lowercase();
        let tokens = phonemes.split_whitespace().map(str::to_string).collect();
        Ok(PhonemizerOutput { phonemes, tokens })
    }
}

/// A sentence of lowercase words, `len` characters long, ending in a period
pub fn sentence(len: usize) -> String {
    let words = ["alpha", "bravo", "charlie", "delta", "echo", "foxtrot"];
    let mut out = String::new();
    let mut i = 0;
    while out.len() + words[i % words.len()].len() + 2 < len {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(words[i % words.len()]);
        i += 1;
    }
    while out.len() + 1 < len {
        out.push('a');
    }
    out.push('.');
    out
}
