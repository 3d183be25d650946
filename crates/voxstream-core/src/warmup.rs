//! Startup warmup coordination.
//!
//! Several independent startup routines want to run a throwaway synthesis to
//! get the model hot. They all share one completed-pattern set, so a given
//! `(text, voice, speed, lang)` reaches the backend at most once per
//! coordinator lifetime no matter how many stages ask for it.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::VoxstreamResult;

/// Named warmup stage, each owned by a different startup subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarmupStage {
    /// Single short utterance to load the model
    Minimal,
    /// Longer utterances covering more phoneme patterns
    Extended,
    /// Two concurrent sessions
    DualSession,
    /// Full pipeline pass including segmentation
    Pipeline,
    /// First-request path after process start
    ColdStart,
}

impl WarmupStage {
    /// All stages in start-up order
    pub const ALL: [Self; 5] = [
        Self::Minimal,
        Self::Extended,
        Self::DualSession,
        Self::Pipeline,
        Self::ColdStart,
    ];
}

impl fmt::Display for WarmupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Minimal => write!(f, "MINIMAL"),
            Self::Extended => write!(f, "EXTENDED"),
            Self::DualSession => write!(f, "DUAL_SESSION"),
            Self::Pipeline => write!(f, "PIPELINE"),
            Self::ColdStart => write!(f, "COLD_START"),
        }
    }
}

/// Dedup key for one warmup synthesis
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WarmupPattern {
    /// Text to synthesize
    pub text: String,
    /// Voice identifier
    pub voice: String,
    /// Speed in thousandths (1.0 == 1000)
    pub speed_milli: u32,
    /// Language code
    pub lang: String,
}

impl WarmupPattern {
    /// Create a pattern; speed is rounded to thousandths
    #[must_use]
    pub fn new(text: impl Into<String>, voice: impl Into<String>, speed: f32, lang: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: voice.into(),
            speed_milli: (speed.max(0.0) * 1000.0).round() as u32,
            lang: lang.into(),
        }
    }

    /// Speed as a multiplier
    #[must_use]
    pub fn speed(&self) -> f32 {
        self.speed_milli as f32 / 1000.0
    }

    /// Default warmup utterances for a stage.
    ///
    /// Stages deliberately share texts; the coordinator skips the repeats.
    #[must_use]
    pub fn defaults_for(stage: WarmupStage, voice: &str, lang: &str) -> Vec<Self> {
        let texts: &[&str] = match stage {
            WarmupStage::Minimal => &["Hello."],
            WarmupStage::Extended => &[
                "Hello.",
                "The quick brown fox jumps over the lazy dog.",
                "How are you today?",
            ],
            WarmupStage::DualSession => &["Hello.", "How are you today?"],
            WarmupStage::Pipeline => &[
                "The quick brown fox jumps over the lazy dog.",
                "Streaming audio is ready.",
            ],
            WarmupStage::ColdStart => &["Hello.", "Ready."],
        };
        texts
            .iter()
            .map(|text| Self::new(*text, voice, 1.0, lang))
            .collect()
    }
}

/// Result of one `execute_warmup` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarmupOutcome<T> {
    /// `warmup_fn` ran and succeeded
    Completed(T),
    /// `warmup_fn` ran and failed; the pattern is still marked done
    Failed(String),
    /// Pattern already claimed by an earlier call
    Skipped,
}

impl<T> WarmupOutcome<T> {
    /// Whether `warmup_fn` was invoked
    #[must_use]
    pub const fn ran(&self) -> bool {
        !matches!(self, Self::Skipped)
    }
}

/// Snapshot of coordinator progress
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WarmupStatus {
    /// Stages marked complete, in start-up order
    pub completed_stages: Vec<WarmupStage>,
    /// Distinct patterns claimed so far
    pub patterns_completed: usize,
    /// Warmups that ran and succeeded
    pub executed: u64,
    /// Warmups that ran and failed
    pub failed: u64,
    /// Requests skipped as duplicates
    pub skipped: u64,
}

impl WarmupStatus {
    /// Whether `stage` has been marked complete
    #[must_use]
    pub fn is_stage_complete(&self, stage: WarmupStage) -> bool {
        self.completed_stages.contains(&stage)
    }
}

#[derive(Debug, Default)]
struct WarmupState {
    completed: HashSet<WarmupPattern>,
    stages: HashSet<WarmupStage>,
    executed: u64,
    failed: u64,
    skipped: u64,
}

/// Shared dedup guard for warmup synthesis
#[derive(Debug, Default)]
pub struct WarmupCoordinator {
    state: Mutex<WarmupState>,
}

impl WarmupCoordinator {
    /// Create a coordinator with nothing completed
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `pattern` has not been claimed yet
    #[must_use]
    pub fn should_warm(&self, pattern: &WarmupPattern) -> bool {
        !self.state.lock().completed.contains(pattern)
    }

    /// Run `warmup_fn` unless `pattern` was already claimed.
    ///
    /// The pattern is claimed under the lock before `warmup_fn` starts, so a
    /// concurrent call for the same pattern from another stage is skipped
    /// rather than racing. Failures are logged and not retried.
    pub async fn execute_warmup<F, Fut, T>(
        &self,
        pattern: &WarmupPattern,
        stage: WarmupStage,
        warmup_fn: F,
    ) -> WarmupOutcome<T>
    where
        F: FnOnce(WarmupPattern) -> Fut,
        Fut: Future<Output = VoxstreamResult<T>>,
    {
        {
            let mut state = self.state.lock();
            if !state.completed.insert(pattern.clone()) {
                state.skipped += 1;
                debug!(
                    "Warmup '{}' already done, skipping for stage {}",
                    pattern.text, stage
                );
                return WarmupOutcome::Skipped;
            }
        }

        let result = warmup_fn(pattern.clone()).await;

        let mut state = self.state.lock();
        match result {
            Ok(value) => {
                state.executed += 1;
                debug!("Warmup '{}' completed for stage {}", pattern.text, stage);
                WarmupOutcome::Completed(value)
            }
            Err(err) => {
                state.failed += 1;
                warn!("Warmup '{}' failed in stage {}: {}", pattern.text, stage, err);
                WarmupOutcome::Failed(err.to_string())
            }
        }
    }

    /// Mark a stage complete; returns `true` only the first time
    pub fn mark_stage_complete(&self, stage: WarmupStage) -> bool {
        let newly = self.state.lock().stages.insert(stage);
        if newly {
            info!("Warmup stage {} complete", stage);
        }
        newly
    }

    /// Whether `stage` has been marked complete
    #[must_use]
    pub fn is_stage_complete(&self, stage: WarmupStage) -> bool {
        self.state.lock().stages.contains(&stage)
    }

    /// Run every pattern of a stage in order, then mark the stage complete.
    ///
    /// Returns one outcome per pattern, in order.
    pub async fn run_stage<F, Fut, T>(
        &self,
        stage: WarmupStage,
        patterns: &[WarmupPattern],
        warmup_fn: F,
    ) -> Vec<WarmupOutcome<T>>
    where
        F: Fn(WarmupPattern) -> Fut,
        Fut: Future<Output = VoxstreamResult<T>>,
    {
        let mut outcomes = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            outcomes.push(self.execute_warmup(pattern, stage, &warmup_fn).await);
        }
        self.mark_stage_complete(stage);

        let ran = outcomes.iter().filter(|o| o.ran()).count();
        info!(
            "Warmup stage {}: {} of {} patterns synthesized",
            stage,
            ran,
            patterns.len()
        );
        outcomes
    }

    /// Snapshot of stage flags and counters
    #[must_use]
    pub fn status(&self) -> WarmupStatus {
        let state = self.state.lock();
        let mut completed_stages: Vec<WarmupStage> = state.stages.iter().copied().collect();
        completed_stages.sort();
        WarmupStatus {
            completed_stages,
            patterns_completed: state.completed.len(),
            executed: state.executed,
            failed: state.failed,
            skipped: state.skipped,
        }
    }

    /// Forget everything; test-only escape hatch from the append-only set
    pub fn reset(&self) {
        *self.state.lock() = WarmupState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VoxstreamError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pattern(text: &str) -> WarmupPattern {
        WarmupPattern::new(text, "af_heart", 1.0, "en-us")
    }

    #[tokio::test]
    async fn test_pattern_runs_once_across_stages() {
        let coordinator = WarmupCoordinator::new();
        let calls = AtomicUsize::new(0);
        let p = pattern("Hello.");

        for stage in WarmupStage::ALL {
            coordinator
                .execute_warmup(&p, stage, |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok(()) }
                })
                .await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let status = coordinator.status();
        assert_eq!(status.executed, 1);
        assert_eq!(status.skipped, 4);
        assert!(!coordinator.should_warm(&p));
    }

    #[tokio::test]
    async fn test_failure_is_not_retried() {
        let coordinator = WarmupCoordinator::new();
        let p = pattern("Hello.");

        let first = coordinator
            .execute_warmup(&p, WarmupStage::Minimal, |_| async {
                Err::<(), _>(VoxstreamError::synthesis("cold model"))
            })
            .await;
        assert!(matches!(first, WarmupOutcome::Failed(ref msg) if msg.contains("cold model")));

        let second = coordinator
            .execute_warmup(&p, WarmupStage::Extended, |_| async { Ok(()) })
            .await;
        assert_eq!(second, WarmupOutcome::Skipped);
        assert_eq!(coordinator.status().failed, 1);
    }

    #[test]
    fn test_speed_is_part_of_key() {
        assert_ne!(
            WarmupPattern::new("Hi", "af_heart", 1.0, "en-us"),
            WarmupPattern::new("Hi", "af_heart", 1.25, "en-us")
        );
        assert_eq!(
            WarmupPattern::new("Hi", "af_heart", 1.0, "en-us"),
            WarmupPattern::new("Hi", "af_heart", 1.0001, "en-us")
        );
        assert!((WarmupPattern::new("Hi", "v", 1.25, "en-us").speed() - 1.25).abs() < 1e-6);
    }

    #[test]
    fn test_mark_stage_complete_is_idempotent() {
        let coordinator = WarmupCoordinator::new();
        assert!(coordinator.mark_stage_complete(WarmupStage::Pipeline));
        assert!(!coordinator.mark_stage_complete(WarmupStage::Pipeline));
        assert!(coordinator.is_stage_complete(WarmupStage::Pipeline));
        assert_eq!(coordinator.status().completed_stages, vec![WarmupStage::Pipeline]);
    }

    #[tokio::test]
    async fn test_run_stage_dedups_shared_defaults() {
        let coordinator = WarmupCoordinator::new();
        let calls = AtomicUsize::new(0);
        let warm = |p: WarmupPattern| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(p.text.len()) }
        };

        let minimal = WarmupPattern::defaults_for(WarmupStage::Minimal, "af_heart", "en-us");
        let extended = WarmupPattern::defaults_for(WarmupStage::Extended, "af_heart", "en-us");
        coordinator.run_stage(WarmupStage::Minimal, &minimal, warm).await;
        let outcomes = coordinator.run_stage(WarmupStage::Extended, &extended, warm).await;

        assert_eq!(outcomes[0], WarmupOutcome::Skipped);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let status = coordinator.status();
        assert!(status.is_stage_complete(WarmupStage::Minimal));
        assert!(status.is_stage_complete(WarmupStage::Extended));
        assert_eq!(status.patterns_completed, 3);
    }

    #[test]
    fn test_reset_clears_state() {
        let coordinator = WarmupCoordinator::new();
        coordinator.mark_stage_complete(WarmupStage::Minimal);
        coordinator.reset();
        assert_eq!(coordinator.status(), WarmupStatus::default());
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(WarmupStage::DualSession.to_string(), "DUAL_SESSION");
        assert_eq!(WarmupStage::ColdStart.to_string(), "COLD_START");
    }
}
