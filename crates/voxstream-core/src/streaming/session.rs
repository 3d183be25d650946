//! Per-request streaming session bookkeeping.

use std::time::{Duration, Instant};

use uuid::Uuid;

use super::synchronizer::samples_to_duration;

/// Counters for one streaming request
#[derive(Debug, Clone)]
pub struct StreamingSession {
    /// Session id
    pub session_id: Uuid,
    /// When the request was accepted
    pub start_time: Instant,
    ttfa: Option<Duration>,
    /// Bytes handed to the caller
    pub bytes_emitted: u64,
    /// Chunks handed to the caller
    pub chunks_emitted: u64,
    /// Samples handed to the caller
    pub samples_emitted: u64,
}

impl StreamingSession {
    /// Start a session now
    #[must_use]
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            start_time: Instant::now(),
            ttfa: None,
            bytes_emitted: 0,
            chunks_emitted: 0,
            samples_emitted: 0,
        }
    }

    /// Time to first audio, once known
    #[must_use]
    pub const fn ttfa(&self) -> Option<Duration> {
        self.ttfa
    }

    /// Count an emitted chunk; returns the TTFA on the first one only
    pub fn record_chunk(&mut self, bytes: usize, samples: usize) -> Option<Duration> {
        self.bytes_emitted += bytes as u64;
        self.chunks_emitted += 1;
        self.samples_emitted += samples as u64;
        if self.ttfa.is_some() {
            return None;
        }
        let ttfa = self.start_time.elapsed();
        self.ttfa = Some(ttfa);
        Some(ttfa)
    }

    /// Playback length of the audio emitted so far
    #[must_use]
    pub fn audio_duration(&self, sample_rate: u32) -> Duration {
        samples_to_duration(self.samples_emitted, sample_rate)
    }
}

impl Default for StreamingSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttfa_set_once() {
        let mut session = StreamingSession::new();
        assert!(session.ttfa().is_none());
        let first = session.record_chunk(4800, 2400);
        assert!(first.is_some());
        assert!(session.record_chunk(4800, 2400).is_none());
        assert_eq!(session.ttfa(), first);
        assert_eq!(session.chunks_emitted, 2);
        assert_eq!(session.bytes_emitted, 9600);
        assert_eq!(session.audio_duration(24_000), Duration::from_millis(200));
    }

    #[test]
    fn test_session_ids_are_unique() {
        assert_ne!(StreamingSession::new().session_id, StreamingSession::new().session_id);
    }
}
