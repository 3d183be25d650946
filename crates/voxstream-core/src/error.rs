//! Error types for the Voxstream pipeline.

/// Result type alias for Voxstream operations
pub type VoxstreamResult<T> = Result<T, VoxstreamError>;

/// Main error type for Voxstream pipeline operations
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VoxstreamError {
    /// External synthesis call failed
    #[error("TTS synthesis failed: {message}")]
    SynthesisError {
        /// Error message describing the failure
        message: String,
    },

    /// Grapheme-to-phoneme conversion failed
    #[error("Phonemization failed: {message}")]
    PhonemizationError {
        /// Error message describing the failure
        message: String,
    },

    /// Raw audio could not be decoded into PCM
    #[error("Audio decode error: {message}")]
    DecodeError {
        /// Error message describing the decode issue
        message: String,
    },

    /// Streaming session terminated abnormally
    #[error("Stream error: {message}")]
    StreamError {
        /// Error message describing the session failure
        message: String,
    },

    /// File I/O error
    #[error("File I/O error: {message}")]
    FileError {
        /// Error message describing the file operation failure
        message: String,
    },

    /// Voice not found error
    #[error("Voice '{voice_id}' not found")]
    VoiceNotFound {
        /// The voice ID that was not found
        voice_id: String,
    },

    /// Invalid input error
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Error message describing the invalid input
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigurationError {
        /// Error message describing the configuration issue
        message: String,
    },

    /// Timeout error
    #[error("Operation timed out: {message}")]
    TimeoutError {
        /// Error message describing the timeout
        message: String,
    },

    /// Thread or concurrency error
    #[error("Concurrency error: {message}")]
    ConcurrencyError {
        /// Error message describing the concurrency issue
        message: String,
    },
}

impl VoxstreamError {
    /// Create a new synthesis error
    #[must_use]
    pub fn synthesis<S: Into<String>>(message: S) -> Self {
        Self::SynthesisError {
            message: message.into(),
        }
    }

    /// Create a new phonemization error
    #[must_use]
    pub fn phonemization<S: Into<String>>(message: S) -> Self {
        Self::PhonemizationError {
            message: message.into(),
        }
    }

    /// Create a new decode error
    #[must_use]
    pub fn decode<S: Into<String>>(message: S) -> Self {
        Self::DecodeError {
            message: message.into(),
        }
    }

    /// Create a new stream error
    #[must_use]
    pub fn stream<S: Into<String>>(message: S) -> Self {
        Self::StreamError {
            message: message.into(),
        }
    }

    /// Create a new file error
    #[must_use]
    pub fn file<S: Into<String>>(message: S) -> Self {
        Self::FileError {
            message: message.into(),
        }
    }

    /// Create a new voice not found error
    #[must_use]
    pub fn voice_not_found<S: Into<String>>(voice_id: S) -> Self {
        Self::VoiceNotFound {
            voice_id: voice_id.into(),
        }
    }

    /// Create a new invalid input error
    #[must_use]
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    #[must_use]
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }

    /// Create a new timeout error
    #[must_use]
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::TimeoutError {
            message: message.into(),
        }
    }

    /// Create a new concurrency error
    #[must_use]
    pub fn concurrency<S: Into<String>>(message: S) -> Self {
        Self::ConcurrencyError {
            message: message.into(),
        }
    }

    /// Check if this error is retriable
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::SynthesisError { .. } | Self::TimeoutError { .. }
        )
    }

    /// Check if this error is due to invalid user input
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput { .. }
                | Self::VoiceNotFound { .. }
                | Self::ConfigurationError { .. }
        )
    }

    /// Check if this error ends a streaming session when it escapes the producer
    #[must_use]
    pub const fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            Self::SynthesisError { .. }
                | Self::StreamError { .. }
                | Self::ConcurrencyError { .. }
                | Self::TimeoutError { .. }
        )
    }

    /// Get the error category for logging/metrics
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::SynthesisError { .. } => "synthesis",
            Self::PhonemizationError { .. } => "phonemization",
            Self::DecodeError { .. } => "decode",
            Self::StreamError { .. } => "stream",
            Self::FileError { .. } => "file",
            Self::VoiceNotFound { .. } => "voice",
            Self::InvalidInput { .. } => "input",
            Self::ConfigurationError { .. } => "configuration",
            Self::TimeoutError { .. } => "timeout",
            Self::ConcurrencyError { .. } => "concurrency",
        }
    }
}

// Convert from common error types
impl From<std::io::Error> for VoxstreamError {
    fn from(err: std::io::Error) -> Self {
        Self::file(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for VoxstreamError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        Self::timeout(format!("Operation timed out: {err}"))
    }
}

impl From<tokio::task::JoinError> for VoxstreamError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::concurrency(format!("Task failed to complete: {err}"))
    }
}

impl From<toml::de::Error> for VoxstreamError {
    fn from(err: toml::de::Error) -> Self {
        Self::configuration(format!("Invalid TOML: {err}"))
    }
}

impl From<serde_json::Error> for VoxstreamError {
    fn from(err: serde_json::Error) -> Self {
        Self::file(format!("JSON serialization error: {err}"))
    }
}
