//! Output framing for emitted audio chunks.
//!
//! Chunks leave the pipeline as PCM16 LE bytes. In WAV mode the first chunk
//! carries a 44-byte RIFF header whose size fields are set to `u32::MAX`,
//! the usual convention for a stream of unknown length. A client that saves
//! the stream can patch the sizes afterwards with [`finalize_wav`].

use serde::{Deserialize, Serialize};

use crate::error::{VoxstreamError, VoxstreamResult};

/// Size of the canonical RIFF/WAVE header
pub const WAV_HEADER_LEN: usize = 44;

const BITS_PER_SAMPLE: u16 = 16;

/// Wire format of emitted chunk bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Raw 16-bit little-endian PCM
    #[default]
    Pcm,
    /// PCM preceded by a streaming WAV header on the first chunk
    Wav,
}

/// Build a 16-bit PCM WAV header for `data_len` bytes of audio.
///
/// Pass `None` for a stream of unknown length.
#[must_use]
pub fn wav_header(sample_rate: u32, channels: u16, data_len: Option<u32>) -> [u8; WAV_HEADER_LEN] {
    let block_align = channels * (BITS_PER_SAMPLE / 8);
    let byte_rate = sample_rate * u32::from(block_align);
    let data_size = data_len.unwrap_or(u32::MAX);
    let riff_size = data_len.map_or(u32::MAX, |len| len.saturating_add(36));

    let mut header = [0u8; WAV_HEADER_LEN];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&riff_size.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes());
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());
    header
}

/// Rewrite the size fields of a complete in-memory WAV stream.
///
/// # Errors
///
/// Returns an error if the buffer does not start with a WAV header or is
/// too large for 32-bit RIFF sizes
pub fn finalize_wav(buffer: &mut [u8]) -> VoxstreamResult<()> {
    if buffer.len() < WAV_HEADER_LEN || &buffer[0..4] != b"RIFF" || &buffer[8..12] != b"WAVE" {
        return Err(VoxstreamError::invalid_input("buffer does not start with a WAV header"));
    }
    let data_len = u32::try_from(buffer.len() - WAV_HEADER_LEN)
        .map_err(|_| VoxstreamError::invalid_input("WAV data exceeds 4 GiB"))?;
    buffer[4..8].copy_from_slice(&(data_len + 36).to_le_bytes());
    buffer[40..44].copy_from_slice(&data_len.to_le_bytes());
    Ok(())
}

/// Convert normalized samples back to PCM16 LE bytes.
///
/// Uses the same 32768 scale as decoding, so decoded PCM16 encodes back to
/// identical bytes.
#[must_use]
pub fn samples_to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let value = (sample * 32768.0).round().clamp(-32768.0, 32767.0) as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Frames decoded chunks for the wire, one session at a time
#[derive(Debug, Clone)]
pub struct OutputFramer {
    format: OutputFormat,
    sample_rate: u32,
    channels: u16,
    header_sent: bool,
}

impl OutputFramer {
    /// Framer for a new session
    #[must_use]
    pub const fn new(format: OutputFormat, sample_rate: u32, channels: u16) -> Self {
        Self {
            format,
            sample_rate,
            channels,
            header_sent: false,
        }
    }

    /// Encode one chunk, prepending the header to the first WAV chunk
    pub fn frame(&mut self, samples: &[f32]) -> Vec<u8> {
        let pcm = samples_to_pcm16(samples);
        match self.format {
            OutputFormat::Wav if !self.header_sent => {
                self.header_sent = true;
                let mut out = Vec::with_capacity(WAV_HEADER_LEN + pcm.len());
                out.extend_from_slice(&wav_header(self.sample_rate, self.channels, None));
                out.extend_from_slice(&pcm);
                out
            }
            _ => pcm,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_pcm_conversion_clamps() {
        let bytes = samples_to_pcm16(&[0.0, 1.0, -1.0, 2.0]);
        let values: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(values, vec![0, i16::MAX, i16::MIN, i16::MAX]);
    }

    #[test]
    fn test_decoded_pcm_encodes_back_unchanged() {
        let raw: Vec<u8> = [32767i16, 30000, 20001, 16384, 1, 0, -1, -20001, -32767, -32768]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let (samples, truncated) = crate::streaming::decoder::decode_pcm16(&raw);
        assert!(!truncated);
        assert_eq!(samples_to_pcm16(&samples), raw);

        let mut framer = OutputFramer::new(OutputFormat::Pcm, 24_000, 1);
        assert_eq!(framer.frame(&samples), raw);
    }

    #[test]
    fn test_pcm_framer_adds_no_header() {
        let mut framer = OutputFramer::new(OutputFormat::Pcm, 24_000, 1);
        assert_eq!(framer.frame(&[0.0; 4]).len(), 8);
        assert_eq!(framer.frame(&[0.0; 4]).len(), 8);
    }

    #[test]
    fn test_wav_header_only_on_first_chunk() {
        let mut framer = OutputFramer::new(OutputFormat::Wav, 24_000, 1);
        let first = framer.frame(&[0.0; 4]);
        let second = framer.frame(&[0.0; 4]);
        assert_eq!(first.len(), WAV_HEADER_LEN + 8);
        assert_eq!(&first[0..4], b"RIFF");
        assert_eq!(&first[40..44], &u32::MAX.to_le_bytes());
        assert_eq!(second.len(), 8);
    }

    #[test]
    fn test_finalized_stream_reads_back_with_hound() {
        let mut framer = OutputFramer::new(OutputFormat::Wav, 24_000, 1);
        let mut stream = framer.frame(&[0.0, 0.5]);
        stream.extend(framer.frame(&[-0.5, 1.0]));
        finalize_wav(&mut stream).unwrap();

        let reader = hound::WavReader::new(Cursor::new(stream)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.sample_rate, 24_000);
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.bits_per_sample, 16);
        let samples: Vec<i16> = reader.into_samples::<i16>().map(Result::unwrap).collect();
        assert_eq!(samples, vec![0, 16384, -16384, i16::MAX]);
    }

    #[test]
    fn test_finalize_rejects_non_wav() {
        let mut bytes = vec![0u8; 64];
        assert!(finalize_wav(&mut bytes).is_err());
    }
}
