//! Memoized phonemization with FIFO eviction.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{PhonemeSequence, PhonemeSource, Phonemizer, PhonemizerChain};
use crate::error::{VoxstreamError, VoxstreamResult};

/// Default number of cached entries
pub const DEFAULT_PHONEME_CACHE_CAPACITY: usize = 1000;

/// Phoneme cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhonemeCacheConfig {
    /// Maximum number of entries before the oldest is evicted
    pub capacity: usize,
}

impl Default for PhonemeCacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_PHONEME_CACHE_CAPACITY,
        }
    }
}

impl PhonemeCacheConfig {
    /// Validate cache configuration
    pub fn validate(&self) -> VoxstreamResult<()> {
        if self.capacity == 0 {
            return Err(VoxstreamError::configuration(
                "phoneme cache capacity must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Usage counters, kept consistent with the map under the same lock
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PhonemeCacheStats {
    /// Calls to `to_phonemes`
    pub total_requests: u64,
    /// Requests served from the cache
    pub cache_hits: u64,
    /// Requests that ran the strategy chain
    pub cache_misses: u64,
    /// Misses resolved by the primary phonemizer
    pub primary_successes: u64,
    /// Misses resolved by the secondary phonemizer
    pub fallback_uses: u64,
    /// Misses resolved by character tokenization
    pub character_fallbacks: u64,
    /// Entries removed to respect capacity
    pub evictions: u64,
    /// Running average of request latency in milliseconds
    pub average_latency_ms: f64,
    /// Current number of entries
    pub entries: usize,
}

impl PhonemeCacheStats {
    /// Fraction of requests served from the cache
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.total_requests as f64
        }
    }

    fn record_latency(&mut self, elapsed: Duration) {
        let sample = elapsed.as_secs_f64() * 1000.0;
        self.average_latency_ms += (sample - self.average_latency_ms) / self.total_requests as f64;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    text: String,
    lang: String,
}

/// One memoized phonemization
#[derive(Debug, Clone)]
pub struct PhonemeCacheEntry {
    /// Cached sequence
    pub sequence: PhonemeSequence,
    /// Times this entry was served
    pub hit_count: u64,
    /// When the entry was inserted
    pub created_at: Instant,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<CacheKey, PhonemeCacheEntry>,
    order: VecDeque<CacheKey>,
    stats: PhonemeCacheStats,
}

/// Phoneme cache keyed by normalized text and language
#[derive(Debug)]
pub struct PhonemeCache {
    chain: PhonemizerChain,
    config: PhonemeCacheConfig,
    state: Mutex<CacheState>,
}

impl PhonemeCache {
    /// Create a cache over optional primary and fallback phonemizers
    #[must_use]
    pub fn new(
        config: PhonemeCacheConfig,
        primary: Option<Arc<dyn Phonemizer>>,
        fallback: Option<Arc<dyn Phonemizer>>,
    ) -> Self {
        Self {
            chain: PhonemizerChain::new(primary, fallback),
            config,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Phonemize `text`, serving repeated requests from the cache.
    ///
    /// Never fails: failures degrade to the next strategy in the chain.
    /// Lookup, computation and insertion hold the cache lock throughout so
    /// concurrent callers cannot insert the same key twice.
    pub fn to_phonemes(&self, text: &str, lang: &str) -> PhonemeSequence {
        let started = Instant::now();
        let key = CacheKey {
            text: normalize_cache_text(text),
            lang: lang.to_string(),
        };

        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.stats.total_requests += 1;

        if let Some(entry) = state.entries.get_mut(&key) {
            entry.hit_count += 1;
            let sequence = entry.sequence.clone();
            state.stats.cache_hits += 1;
            state.stats.record_latency(started.elapsed());
            return sequence;
        }

        state.stats.cache_misses += 1;
        let sequence = self.chain.run(&key.text, lang);
        match sequence.source {
            PhonemeSource::Primary => state.stats.primary_successes += 1,
            PhonemeSource::Fallback => state.stats.fallback_uses += 1,
            PhonemeSource::Character => state.stats.character_fallbacks += 1,
        }

        state.order.push_back(key.clone());
        state.entries.insert(
            key,
            PhonemeCacheEntry {
                sequence: sequence.clone(),
                hit_count: 0,
                created_at: Instant::now(),
            },
        );

        while state.entries.len() > self.config.capacity {
            let Some(oldest) = state.order.pop_front() else {
                break;
            };
            if state.entries.remove(&oldest).is_some() {
                state.stats.evictions += 1;
                debug!("Evicted phoneme cache entry ({} chars)", oldest.text.len());
            }
        }

        state.stats.entries = state.entries.len();
        state.stats.record_latency(started.elapsed());
        sequence
    }

    /// Snapshot of the usage counters
    #[must_use]
    pub fn stats(&self) -> PhonemeCacheStats {
        self.state.lock().stats.clone()
    }

    /// Number of cached entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Whether the cache holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a normalized form of `text` is cached for `lang`
    #[must_use]
    pub fn contains(&self, text: &str, lang: &str) -> bool {
        let key = CacheKey {
            text: normalize_cache_text(text),
            lang: lang.to_string(),
        };
        self.state.lock().entries.contains_key(&key)
    }

    /// Drop all entries and reset counters
    pub fn clear(&self) {
        let mut state = self.state.lock();
        *state = CacheState::default();
    }

    /// Reset counters, keeping cached entries
    pub fn reset_stats(&self) {
        let mut state = self.state.lock();
        state.stats = PhonemeCacheStats {
            entries: state.entries.len(),
            ..PhonemeCacheStats::default()
        };
    }
}

/// Cache-key normalization: each line is trimmed, empty lines are dropped,
/// and a line break becomes sentence-ending punctuation unless the line
/// already ends with one.
#[must_use]
pub fn normalize_cache_text(text: &str) -> String {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let mut normalized = String::with_capacity(text.len() + lines.len());
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            normalized.push(' ');
        }
        normalized.push_str(line);
        let is_last = i + 1 == lines.len();
        if !is_last && !line.ends_with(['.', '!', '?', ';', ':']) {
            normalized.push('.');
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{ScriptedMode, ScriptedPhonemizer};
    use super::*;

    fn cache_with(
        capacity: usize,
        primary: Arc<ScriptedPhonemizer>,
        fallback: Option<Arc<ScriptedPhonemizer>>,
    ) -> PhonemeCache {
        PhonemeCache::new(
            PhonemeCacheConfig { capacity },
            Some(primary),
            fallback.map(|f| f as Arc<dyn Phonemizer>),
        )
    }

    #[test]
    fn test_second_request_is_a_hit() {
        let primary = ScriptedPhonemizer::new("primary", ScriptedMode::Uppercase);
        let cache = cache_with(10, primary.clone(), None);

        let first = cache.to_phonemes("hello there", "en-us");
        let second = cache.to_phonemes("hello there", "en-us");

        assert_eq!(first, second);
        assert_eq!(primary.calls(), 1);
        let stats = cache.stats();
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 1);
        assert_eq!(stats.primary_successes, 1);
        assert_eq!(stats.fallback_uses, 0);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_key_includes_language() {
        let primary = ScriptedPhonemizer::new("primary", ScriptedMode::Uppercase);
        let cache = cache_with(10, primary.clone(), None);
        cache.to_phonemes("bonjour", "en-us");
        cache.to_phonemes("bonjour", "fr-fr");
        assert_eq!(primary.calls(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_fifo_eviction() {
        let primary = ScriptedPhonemizer::new("primary", ScriptedMode::Uppercase);
        let cache = cache_with(2, primary, None);
        cache.to_phonemes("one", "en-us");
        cache.to_phonemes("two", "en-us");
        cache.to_phonemes("one", "en-us");
        cache.to_phonemes("three", "en-us");

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains("one", "en-us"));
        assert!(cache.contains("two", "en-us"));
        assert!(cache.contains("three", "en-us"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_fallback_results_are_cached_and_counted() {
        let primary = ScriptedPhonemizer::new("primary", ScriptedMode::Error);
        let fallback = ScriptedPhonemizer::new("fallback", ScriptedMode::Uppercase);
        let cache = cache_with(10, primary.clone(), Some(fallback.clone()));

        let seq = cache.to_phonemes("degraded", "en-us");
        assert_eq!(seq.source, PhonemeSource::Fallback);
        cache.to_phonemes("degraded", "en-us");

        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 1);
        assert_eq!(cache.stats().fallback_uses, 1);
    }

    #[test]
    fn test_character_fallback_counted() {
        let primary = ScriptedPhonemizer::new("primary", ScriptedMode::Empty);
        let cache = cache_with(10, primary, None);
        let seq = cache.to_phonemes("ab c", "en-us");
        assert_eq!(seq.tokens, vec!["a", "b", "c"]);
        assert_eq!(cache.stats().character_fallbacks, 1);
    }

    #[test]
    fn test_trimmed_text_shares_entry() {
        let primary = ScriptedPhonemizer::new("primary", ScriptedMode::Uppercase);
        let cache = cache_with(10, primary.clone(), None);
        cache.to_phonemes("  padded  ", "en-us");
        cache.to_phonemes("padded", "en-us");
        assert_eq!(primary.calls(), 1);
    }

    #[test]
    fn test_multiline_normalization() {
        assert_eq!(normalize_cache_text("Hello\nWorld"), "Hello. World");
        assert_eq!(normalize_cache_text("Hello.\n\n  World  "), "Hello. World");
        assert_eq!(normalize_cache_text("Single line"), "Single line");

        let primary = ScriptedPhonemizer::new("primary", ScriptedMode::Uppercase);
        let cache = cache_with(10, primary.clone(), None);
        cache.to_phonemes("Hello.\nWorld", "en-us");
        cache.to_phonemes("Hello. World", "en-us");
        assert_eq!(primary.calls(), 1);
        cache.to_phonemes("Hello World", "en-us");
        assert_eq!(primary.calls(), 2);
    }

    #[test]
    fn test_clear_resets_state() {
        let primary = ScriptedPhonemizer::new("primary", ScriptedMode::Uppercase);
        let cache = cache_with(10, primary, None);
        cache.to_phonemes("x", "en-us");
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats(), PhonemeCacheStats::default());
    }

    #[test]
    fn test_concurrent_requests_compute_once() {
        let primary = ScriptedPhonemizer::new("primary", ScriptedMode::Uppercase);
        let cache = Arc::new(cache_with(10, primary.clone(), None));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.to_phonemes("shared text", "en-us"))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(primary.calls(), 1);
        assert_eq!(cache.stats().cache_hits, 7);
    }
}
