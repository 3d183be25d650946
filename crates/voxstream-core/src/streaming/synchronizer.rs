//! Wall-clock pacing of emitted chunks.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

/// What `pace` did for a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacingDecision {
    /// Pacing disabled; emitted immediately
    Unpaced,
    /// Anchor already reached; emitted without waiting
    OnTime,
    /// Slept this long before emitting
    Waited(Duration),
    /// More than one chunk behind the anchor by this much; emitted at once
    Behind(Duration),
}

/// Keeps emission at most `lead` ahead of real-time playback.
///
/// Chunk `n` is released at `start + samples_before_n / sample_rate - lead`,
/// where `start` is when the first chunk was paced.
#[derive(Debug, Clone)]
pub struct PlaybackSynchronizer {
    sample_rate: u32,
    lead: Duration,
    enabled: bool,
    start: Option<Instant>,
    samples_emitted: u64,
    behind_count: u64,
}

impl PlaybackSynchronizer {
    /// Create a synchronizer; `enabled == false` makes `pace` a no-op
    #[must_use]
    pub const fn new(sample_rate: u32, lead: Duration, enabled: bool) -> Self {
        Self {
            sample_rate,
            lead,
            enabled,
            start: None,
            samples_emitted: 0,
            behind_count: 0,
        }
    }

    /// Audio already released, as playback time
    #[must_use]
    pub fn emitted_duration(&self) -> Duration {
        samples_to_duration(self.samples_emitted, self.sample_rate)
    }

    /// Chunks released more than a chunk late
    #[must_use]
    pub const fn behind_count(&self) -> u64 {
        self.behind_count
    }

    /// Wait until a chunk of `samples` samples may be released
    pub async fn pace(&mut self, samples: usize) -> PacingDecision {
        let decision = if self.enabled {
            self.wait_for_anchor(samples).await
        } else {
            PacingDecision::Unpaced
        };
        self.samples_emitted += samples as u64;
        decision
    }

    async fn wait_for_anchor(&mut self, samples: usize) -> PacingDecision {
        let now = Instant::now();
        let start = *self.start.get_or_insert(now);
        let playhead = start + self.emitted_duration();
        let anchor = playhead.checked_sub(self.lead).unwrap_or(start);

        if anchor > now {
            let wait = anchor - now;
            tokio::time::sleep_until(anchor).await;
            return PacingDecision::Waited(wait);
        }

        let drift = now - anchor;
        if drift > samples_to_duration(samples as u64, self.sample_rate) {
            self.behind_count += 1;
            warn!(
                "Playback {:?} behind schedule at {:?} of audio",
                drift,
                self.emitted_duration()
            );
            PacingDecision::Behind(drift)
        } else {
            debug!("Chunk on time (drift {:?})", drift);
            PacingDecision::OnTime
        }
    }
}

/// Playback time of `samples` mono samples
#[must_use]
pub fn samples_to_duration(samples: u64, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(samples.saturating_mul(1_000_000_000) / u64::from(sample_rate))
}
