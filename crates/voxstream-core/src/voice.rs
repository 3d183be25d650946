//! Voice catalogue and request parameter checks.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{VoxstreamError, VoxstreamResult};

/// Slowest accepted speed multiplier
pub const MIN_SPEED: f32 = 0.1;

/// Fastest accepted speed multiplier
pub const MAX_SPEED: f32 = 3.0;

/// Gender classification for voices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    /// Male voice
    Male,
    /// Female voice
    Female,
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Male => write!(f, "Male"),
            Self::Female => write!(f, "Female"),
        }
    }
}

/// A selectable synthesis voice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    /// Voice id as understood by the backend (e.g. `af_heart`)
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Language code passed to the phonemizer
    pub language: String,
    /// Voice gender
    pub gender: Gender,
}

impl Voice {
    /// Build a voice, deriving language and gender from a Kokoro-style id.
    ///
    /// # Errors
    ///
    /// Returns an error if the id prefix is not a known language/gender pair
    pub fn from_id(id: &str, name: &str) -> VoxstreamResult<Self> {
        let language = language_for_voice(id)
            .ok_or_else(|| VoxstreamError::invalid_input(format!("Unrecognized voice id '{id}'")))?;
        let gender = match id.as_bytes().get(1) {
            Some(b'f') => Gender::Female,
            Some(b'm') => Gender::Male,
            _ => {
                return Err(VoxstreamError::invalid_input(format!(
                    "Voice id '{id}' has no gender marker"
                )))
            }
        };
        Ok(Self {
            id: id.to_string(),
            name: name.to_string(),
            language: language.to_string(),
            gender,
        })
    }
}

/// Language code implied by the first letter of a Kokoro voice id.
#[must_use]
pub fn language_for_voice(voice_id: &str) -> Option<&'static str> {
    let lang = match voice_id.chars().next()? {
        'a' => "en-us",
        'b' => "en-gb",
        'e' => "es",
        'f' => "fr-fr",
        'h' => "hi",
        'i' => "it",
        'j' => "ja",
        'p' => "pt-br",
        'z' => "zh",
        _ => return None,
    };
    Some(lang)
}

/// Check a speed multiplier
///
/// # Errors
///
/// Returns an error if speed is not in the valid range (0.1 to 3.0)
pub fn validate_speed(speed: f32) -> VoxstreamResult<()> {
    if !(MIN_SPEED..=MAX_SPEED).contains(&speed) {
        return Err(VoxstreamError::invalid_input(format!(
            "Speed must be between {MIN_SPEED} and {MAX_SPEED}, got {speed}"
        )));
    }
    Ok(())
}

const DEFAULT_VOICES: [(&str, &str); 10] = [
    ("af_heart", "Heart"),
    ("af_bella", "Bella"),
    ("am_adam", "Adam"),
    ("bf_emma", "Emma"),
    ("bm_george", "George"),
    ("ef_dora", "Dora"),
    ("ff_siwis", "Siwis"),
    ("jf_alpha", "Alpha"),
    ("pf_dora", "Dora (PT)"),
    ("zf_xiaobei", "Xiaobei"),
];

/// Known voices, shared cheaply between pipeline clones
#[derive(Debug, Clone)]
pub struct VoiceCatalog {
    voices: Arc<HashMap<String, Voice>>,
}

impl VoiceCatalog {
    /// Catalogue of the stock Kokoro voices
    #[must_use]
    pub fn new() -> Self {
        let voices = DEFAULT_VOICES
            .iter()
            .filter_map(|(id, name)| Voice::from_id(id, name).ok())
            .collect();
        Self::with_voices(voices)
    }

    /// Catalogue with custom voices
    #[must_use]
    pub fn with_voices(voices: Vec<Voice>) -> Self {
        let map = voices
            .into_iter()
            .map(|voice| (voice.id.clone(), voice))
            .collect();
        Self {
            voices: Arc::new(map),
        }
    }

    /// Look up a voice
    pub fn get_voice(&self, voice_id: &str) -> VoxstreamResult<&Voice> {
        self.voices
            .get(voice_id)
            .ok_or_else(|| VoxstreamError::voice_not_found(voice_id))
    }

    /// Whether the voice is known
    #[must_use]
    pub fn contains(&self, voice_id: &str) -> bool {
        self.voices.contains_key(voice_id)
    }

    /// Language for a request: the explicit one, else the voice's own
    pub fn resolve_language(&self, voice_id: &str, requested: Option<&str>) -> VoxstreamResult<String> {
        let voice = self.get_voice(voice_id)?;
        Ok(requested
            .filter(|lang| !lang.trim().is_empty())
            .map_or_else(|| voice.language.clone(), str::to_string))
    }

    /// Number of voices
    #[must_use]
    pub fn len(&self) -> usize {
        self.voices.len()
    }

    /// Whether the catalogue is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Sorted, deduplicated language codes
    #[must_use]
    pub fn supported_languages(&self) -> Vec<String> {
        let mut languages: Vec<String> = self.voices.values().map(|v| v.language.clone()).collect();
        languages.sort();
        languages.dedup();
        languages
    }
}

impl Default for VoiceCatalog {
    fn default() -> Self {
        Self::new()
    }
}
