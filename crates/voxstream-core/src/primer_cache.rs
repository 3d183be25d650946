//! Primer audio cache for the first segment of a request.
//!
//! A long first segment is split into a short primer and a remainder. The
//! primer's audio is cached under a fingerprint of its synthesis parameters,
//! so a repeated opening plays back without waiting on the model while the
//! remainder is synthesized behind it.

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{VoxstreamError, VoxstreamResult};
use crate::text::TextSegment;

/// Default minimum first-segment length (chars) before a split is attempted
pub const DEFAULT_SPLIT_THRESHOLD: usize = 60;

/// Default fraction of the first segment used as primer
pub const DEFAULT_PRIMER_FRACTION: f64 = 0.12;

/// Default byte budget for cached primer audio
pub const DEFAULT_MAX_CACHE_BYTES: usize = 32 * 1024 * 1024;

/// Primer split and cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrimerConfig {
    /// First segments shorter than this (chars) are never split
    pub split_threshold: usize,
    /// Fraction of the segment used as primer before word-boundary extension
    pub primer_fraction: f64,
    /// Byte budget for cached audio
    pub max_cache_bytes: usize,
}

impl Default for PrimerConfig {
    fn default() -> Self {
        Self {
            split_threshold: DEFAULT_SPLIT_THRESHOLD,
            primer_fraction: DEFAULT_PRIMER_FRACTION,
            max_cache_bytes: DEFAULT_MAX_CACHE_BYTES,
        }
    }
}

impl PrimerConfig {
    /// Validate primer configuration
    pub fn validate(&self) -> VoxstreamResult<()> {
        if !(self.primer_fraction > 0.0 && self.primer_fraction <= 0.5) {
            return Err(VoxstreamError::configuration(format!(
                "primer_fraction must be in (0, 0.5], got {}",
                self.primer_fraction
            )));
        }
        if self.max_cache_bytes == 0 {
            return Err(VoxstreamError::configuration(
                "max_cache_bytes must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// How the first segment should be synthesized
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimerPlan {
    /// Synthesize the segment as one unit
    Whole,
    /// Synthesize `primer` first, then `remainder`
    Split {
        /// Leading words of the segment
        primer: String,
        /// Rest of the segment
        remainder: String,
    },
}

/// Result of a primer lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimerOutcome {
    /// Segment too short to split; the cache was not consulted
    Bypassed,
    /// Primer audio served from the cache
    Hit {
        /// Cached primer audio
        audio: Vec<u8>,
        /// Text still to synthesize
        remainder: String,
    },
    /// Primer synthesized now and cached
    Miss {
        /// Freshly synthesized primer audio
        audio: Vec<u8>,
        /// Text still to synthesize
        remainder: String,
        /// Time spent synthesizing the primer
        synthesis_time: Duration,
    },
}

impl PrimerOutcome {
    /// Remainder text when the segment was split
    #[must_use]
    pub fn remainder(&self) -> Option<&str> {
        match self {
            Self::Bypassed => None,
            Self::Hit { remainder, .. } | Self::Miss { remainder, .. } => Some(remainder),
        }
    }
}

/// Primer cache counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PrimerCacheStats {
    /// Lookups served from the cache
    pub hits: u64,
    /// Lookups that synthesized the primer
    pub misses: u64,
    /// Segments below the split threshold
    pub bypasses: u64,
    /// Entries evicted to respect the byte budget
    pub evictions: u64,
    /// Bytes currently cached
    pub total_bytes: usize,
    /// Entries currently cached
    pub entries: usize,
}

impl PrimerCacheStats {
    /// Fraction of split lookups served from the cache
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

#[derive(Debug, Clone)]
struct PrimerCacheEntry {
    audio: Vec<u8>,
    access_count: u64,
    last_access: Instant,
    access_seq: u64,
}

#[derive(Debug, Default)]
struct PrimerState {
    entries: HashMap<String, PrimerCacheEntry>,
    stats: PrimerCacheStats,
    clock: u64,
}

impl PrimerState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Evict least recently used entries until the total fits 80% of `budget`.
    fn enforce_budget(&mut self, budget: usize) {
        if self.stats.total_bytes <= budget {
            return;
        }
        let target = budget / 10 * 8;
        let mut by_age: Vec<(u64, String)> = self
            .entries
            .iter()
            .map(|(key, entry)| (entry.access_seq, key.clone()))
            .collect();
        by_age.sort_unstable();

        for (_, key) in by_age {
            if self.stats.total_bytes <= target {
                break;
            }
            if let Some(entry) = self.entries.remove(&key) {
                self.stats.total_bytes -= entry.audio.len();
                self.stats.evictions += 1;
                debug!(
                    "Evicted primer {} ({} bytes, {} accesses, idle {:?})",
                    key,
                    entry.audio.len(),
                    entry.access_count,
                    entry.last_access.elapsed()
                );
            }
        }
        self.stats.entries = self.entries.len();
    }
}

/// Byte-bounded LRU cache of primer audio
#[derive(Debug)]
pub struct PrimerCache {
    config: PrimerConfig,
    state: Mutex<PrimerState>,
}

impl PrimerCache {
    /// Create an empty primer cache
    #[must_use]
    pub fn new(config: PrimerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(PrimerState::default()),
        }
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &PrimerConfig {
        &self.config
    }

    /// Decide whether and where to split the first segment.
    ///
    /// The primer covers `primer_fraction` of the characters, extended forward
    /// to the next whitespace so no word is cut. A segment whose primer would
    /// swallow the whole text is synthesized whole.
    #[must_use]
    pub fn plan(&self, segment: &TextSegment) -> PrimerPlan {
        let content = segment.content.as_str();
        let char_count = content.chars().count();
        if char_count < self.config.split_threshold {
            return PrimerPlan::Whole;
        }

        let target = ((char_count as f64 * self.config.primer_fraction).ceil() as usize).max(1);
        let Some((start, _)) = content.char_indices().nth(target) else {
            return PrimerPlan::Whole;
        };
        let Some(offset) = content[start..].find(char::is_whitespace) else {
            return PrimerPlan::Whole;
        };
        let cut = start + offset;

        let primer = content[..cut].trim_end();
        let remainder = content[cut..].trim_start();
        if primer.is_empty() || remainder.is_empty() {
            return PrimerPlan::Whole;
        }

        PrimerPlan::Split {
            primer: primer.to_string(),
            remainder: remainder.to_string(),
        }
    }

    /// Serve the first segment's primer from the cache, or synthesize it.
    ///
    /// `synthesize_fn` receives the primer text and is only called on a miss.
    /// Its error is returned unchanged so the caller can fall back to
    /// synthesizing the whole segment.
    pub async fn get_or_synthesize_primer<F, Fut>(
        &self,
        first_segment: &TextSegment,
        voice: &str,
        speed: f32,
        lang: &str,
        synthesize_fn: F,
    ) -> VoxstreamResult<PrimerOutcome>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = VoxstreamResult<Vec<u8>>>,
    {
        let PrimerPlan::Split { primer, remainder } = self.plan(first_segment) else {
            self.state.lock().stats.bypasses += 1;
            debug!(
                "Primer bypassed for {}-char first segment",
                first_segment.char_len()
            );
            return Ok(PrimerOutcome::Bypassed);
        };

        let key = primer_fingerprint(&primer, voice, speed, lang);
        if let Some(audio) = self.lookup(&key) {
            debug!("Primer cache hit ({} bytes)", audio.len());
            return Ok(PrimerOutcome::Hit { audio, remainder });
        }

        let started = Instant::now();
        let audio = synthesize_fn(primer.clone()).await?;
        let synthesis_time = started.elapsed();
        info!(
            "Synthesized {}-char primer in {:?} ({} bytes)",
            primer.chars().count(),
            synthesis_time,
            audio.len()
        );
        self.insert(key, &audio);

        Ok(PrimerOutcome::Miss {
            audio,
            remainder,
            synthesis_time,
        })
    }

    fn lookup(&self, key: &str) -> Option<Vec<u8>> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let seq = state.tick();
        match state.entries.get_mut(key) {
            Some(entry) => {
                entry.access_count += 1;
                entry.last_access = Instant::now();
                entry.access_seq = seq;
                state.stats.hits += 1;
                Some(entry.audio.clone())
            }
            None => {
                state.stats.misses += 1;
                None
            }
        }
    }

    fn insert(&self, key: String, audio: &[u8]) {
        if audio.len() > self.config.max_cache_bytes {
            warn!(
                "Primer audio of {} bytes exceeds cache budget of {} bytes, not cached",
                audio.len(),
                self.config.max_cache_bytes
            );
            return;
        }

        let mut state = self.state.lock();
        if state.entries.contains_key(&key) {
            return;
        }
        let seq = state.tick();
        state.entries.insert(
            key,
            PrimerCacheEntry {
                audio: audio.to_vec(),
                access_count: 0,
                last_access: Instant::now(),
                access_seq: seq,
            },
        );
        state.stats.total_bytes += audio.len();
        state.stats.entries = state.entries.len();
        state.enforce_budget(self.config.max_cache_bytes);
    }

    /// Snapshot of the cache counters
    #[must_use]
    pub fn stats(&self) -> PrimerCacheStats {
        self.state.lock().stats.clone()
    }

    /// Drop all cached primers and reset counters
    pub fn clear(&self) {
        *self.state.lock() = PrimerState::default();
    }
}

/// Hex SHA-256 over primer text, voice, speed and language.
#[must_use]
pub fn primer_fingerprint(primer_text: &str, voice: &str, speed: f32, lang: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(primer_text.as_bytes());
    hasher.update([0u8]);
    hasher.update(voice.as_bytes());
    hasher.update([0u8]);
    hasher.update(format!("{speed:.3}").as_bytes());
    hasher.update([0u8]);
    hasher.update(lang.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}
