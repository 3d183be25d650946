//! Pipeline configuration loaded from TOML.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{VoxstreamError, VoxstreamResult};
use crate::monitor::BufferMonitorConfig;
use crate::phoneme::PhonemeCacheConfig;
use crate::primer_cache::PrimerConfig;
use crate::streaming::StreamingConfig;
use crate::synthesis::SynthesisConfig;
use crate::text::SegmenterConfig;

/// Complete pipeline configuration; every section and field has a default
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Text segmentation
    pub segmenter: SegmenterConfig,
    /// Phoneme cache
    pub phoneme_cache: PhonemeCacheConfig,
    /// Primer split and cache
    pub primer: PrimerConfig,
    /// Buffer monitor
    pub monitor: BufferMonitorConfig,
    /// Decode, pacing and output
    pub streaming: StreamingConfig,
    /// Synthesis defaults
    pub synthesis: SynthesisConfig,
}

impl PipelineConfig {
    /// Parse and validate a TOML document
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid TOML or fails validation
    pub fn from_toml_str(toml_str: &str) -> VoxstreamResult<Self> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or its content is invalid
    pub fn from_file<P: AsRef<Path>>(path: P) -> VoxstreamResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            VoxstreamError::file(format!("Failed to read config {}: {e}", path.display()))
        })?;
        debug!("Loaded pipeline config from {}", path.display());
        Self::from_toml_str(&content)
    }

    /// Serialize to TOML
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails
    pub fn to_toml_string(&self) -> VoxstreamResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| VoxstreamError::configuration(format!("Failed to serialize config: {e}")))
    }

    /// Validate every section
    pub fn validate(&self) -> VoxstreamResult<()> {
        self.segmenter.validate()?;
        self.phoneme_cache.validate()?;
        self.primer.validate()?;
        self.monitor.validate()?;
        self.streaming.validate()?;
        self.synthesis.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_partial_sections() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [segmenter]
            max_segment_length = 200

            [primer]
            split_threshold = 80

            [streaming]
            output_format = "wav"
            pacing_enabled = false

            [synthesis]
            device = "cpu"
            "#,
        )
        .unwrap();
        assert_eq!(config.segmenter.max_segment_length, 200);
        assert_eq!(config.primer.split_threshold, 80);
        assert!((config.primer.primer_fraction - 0.12).abs() < f64::EPSILON);
        assert_eq!(config.streaming.output_format, crate::streaming::OutputFormat::Wav);
        assert!(!config.streaming.pacing_enabled);
        assert_eq!(config.synthesis.device, crate::synthesis::DeviceHint::Cpu);
        assert_eq!(config.phoneme_cache.capacity, 1000);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = PipelineConfig::from_toml_str("[primer]\nprimer_fraction = 0.9\n").unwrap_err();
        assert!(err.is_user_error());
        let err = PipelineConfig::from_toml_str("[segmenter\n").unwrap_err();
        assert_eq!(err.category(), "configuration");
    }

    #[test]
    fn test_from_file_round_trip() {
        let mut config = PipelineConfig::default();
        config.streaming.preload_chunks = 5;
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(config.to_toml_string().unwrap().as_bytes()).unwrap();

        let loaded = PipelineConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file() {
        let err = PipelineConfig::from_file("/nonexistent/voxstream.toml").unwrap_err();
        assert_eq!(err.category(), "file");
    }
}
