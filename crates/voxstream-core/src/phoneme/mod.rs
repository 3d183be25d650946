//! Grapheme-to-phoneme front-end with fallback.
//!
//! The phonemizers themselves are external; this module only decides which
//! one to trust. Strategies are tried in order (primary, fallback, then
//! character tokenization) and the first acceptable result wins. Nothing in
//! here surfaces an error to the caller: the terminal strategy always
//! produces a sequence.

pub mod cache;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::VoxstreamResult;

pub use cache::{PhonemeCache, PhonemeCacheConfig, PhonemeCacheStats};

/// Raw output of an external phonemizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhonemizerOutput {
    /// Phoneme string as produced by the G2P model
    pub phonemes: String,
    /// Token list matching `phonemes`
    pub tokens: Vec<String>,
}

/// External grapheme-to-phoneme converter
pub trait Phonemizer: Send + Sync + fmt::Debug {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Convert text in `lang` to phonemes
    ///
    /// # Errors
    ///
    /// Returns an error if the converter cannot handle the input
    fn phonemize(&self, text: &str, lang: &str) -> VoxstreamResult<PhonemizerOutput>;
}

/// Which strategy produced a phoneme sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhonemeSource {
    /// Primary phonemizer
    Primary,
    /// Secondary phonemizer
    Fallback,
    /// Character-level tokenization
    Character,
}

impl PhonemeSource {
    /// Whether this source is a degraded path
    #[must_use]
    pub const fn is_degraded(self) -> bool {
        !matches!(self, Self::Primary)
    }
}

impl fmt::Display for PhonemeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Fallback => write!(f, "fallback"),
            Self::Character => write!(f, "character"),
        }
    }
}

/// Ordered phoneme sequence handed to synthesis
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhonemeSequence {
    /// Phoneme string
    pub phonemes: String,
    /// Tokens in order
    pub tokens: Vec<String>,
    /// Strategy that produced the sequence
    pub source: PhonemeSource,
}

impl PhonemeSequence {
    /// Whether the sequence holds no tokens
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Character-level tokenizer: strips whitespace and emits one token per character.
///
/// Used as the terminal strategy; it never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharacterTokenizer;

impl CharacterTokenizer {
    /// Tokenize without going through the fallible trait method
    #[must_use]
    pub fn tokenize(text: &str) -> PhonemizerOutput {
        let tokens: Vec<String> = text
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(String::from)
            .collect();
        PhonemizerOutput {
            phonemes: tokens.concat(),
            tokens,
        }
    }
}

impl Phonemizer for CharacterTokenizer {
    fn name(&self) -> &str {
        "character"
    }

    fn phonemize(&self, text: &str, _lang: &str) -> VoxstreamResult<PhonemizerOutput> {
        Ok(Self::tokenize(text))
    }
}

/// Tagged result of one strategy attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyOutcome {
    /// Strategy produced an acceptable result
    Success(PhonemizerOutput),
    /// Strategy failed or produced an unusable result
    Failed(String),
}

#[derive(Debug, Clone)]
struct G2pStrategy {
    source: PhonemeSource,
    phonemizer: Arc<dyn Phonemizer>,
}

impl G2pStrategy {
    fn attempt(&self, text: &str, lang: &str) -> StrategyOutcome {
        match self.phonemizer.phonemize(text, lang) {
            Ok(output) => match validate_output(&output) {
                Ok(()) => StrategyOutcome::Success(output),
                Err(reason) => StrategyOutcome::Failed(reason),
            },
            Err(err) => StrategyOutcome::Failed(err.to_string()),
        }
    }
}

fn validate_output(output: &PhonemizerOutput) -> Result<(), String> {
    if output.phonemes.trim().is_empty() {
        return Err("empty phoneme string".to_string());
    }
    if output.tokens.is_empty() {
        return Err("empty token list".to_string());
    }
    if output
        .phonemes
        .chars()
        .any(|c| c == '\u{FFFD}' || (c.is_control() && !c.is_whitespace()))
    {
        return Err("malformed phoneme string".to_string());
    }
    Ok(())
}

/// Ordered list of phonemizer strategies ending in character tokenization
#[derive(Debug, Clone)]
pub struct PhonemizerChain {
    strategies: Vec<G2pStrategy>,
}

impl PhonemizerChain {
    /// Build a chain from optional primary and fallback phonemizers
    ///
    /// Without either, every segment goes straight to character tokenization
    /// and counts as degraded.
    #[must_use]
    pub fn new(
        primary: Option<Arc<dyn Phonemizer>>,
        fallback: Option<Arc<dyn Phonemizer>>,
    ) -> Self {
        let mut strategies = Vec::with_capacity(2);
        if let Some(phonemizer) = primary {
            strategies.push(G2pStrategy {
                source: PhonemeSource::Primary,
                phonemizer,
            });
        }
        if let Some(phonemizer) = fallback {
            strategies.push(G2pStrategy {
                source: PhonemeSource::Fallback,
                phonemizer,
            });
        }
        Self { strategies }
    }

    /// Run the chain; always yields a sequence
    #[must_use]
    pub fn run(&self, text: &str, lang: &str) -> PhonemeSequence {
        for strategy in &self.strategies {
            match strategy.attempt(text, lang) {
                StrategyOutcome::Success(output) => {
                    debug!(
                        "Phonemized {} chars with {} ({})",
                        text.len(),
                        strategy.phonemizer.name(),
                        strategy.source
                    );
                    return PhonemeSequence {
                        phonemes: output.phonemes,
                        tokens: output.tokens,
                        source: strategy.source,
                    };
                }
                StrategyOutcome::Failed(reason) => {
                    warn!(
                        "Phonemizer '{}' ({}) rejected for lang '{}': {}",
                        strategy.phonemizer.name(),
                        strategy.source,
                        lang,
                        reason
                    );
                }
            }
        }

        let output = CharacterTokenizer::tokenize(text);
        PhonemeSequence {
            phonemes: output.phonemes,
            tokens: output.tokens,
            source: PhonemeSource::Character,
        }
    }
}
