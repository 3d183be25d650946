//! Warmup deduplication across concurrently running stages

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::FakeBackend;
use rstest::rstest;
use voxstream_core::{
    PipelineConfig, TtsPipeline, VoxstreamError, WarmupCoordinator, WarmupOutcome, WarmupPattern,
    WarmupStage,
};

fn pattern(text: &str) -> WarmupPattern {
    WarmupPattern::new(text, "af_heart", 1.0, "en-us")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_stages_run_each_pattern_once() {
    let coordinator = Arc::new(WarmupCoordinator::new());
    let runs = Arc::new(AtomicUsize::new(0));
    let shared = vec![pattern("Hello."), pattern("How are you today?"), pattern("Ready.")];

    let mut handles = Vec::new();
    for stage in [WarmupStage::DualSession, WarmupStage::Pipeline, WarmupStage::ColdStart] {
        let coordinator = Arc::clone(&coordinator);
        let runs = Arc::clone(&runs);
        let patterns = shared.clone();
        handles.push(tokio::spawn(async move {
            coordinator
                .run_stage(stage, &patterns, |p| {
                    let runs = Arc::clone(&runs);
                    async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok::<_, VoxstreamError>(p.text.len())
                    }
                })
                .await
        }));
    }

    let mut completed = 0;
    let mut skipped = 0;
    for handle in handles {
        for outcome in handle.await.unwrap() {
            match outcome {
                WarmupOutcome::Completed(_) => completed += 1,
                WarmupOutcome::Skipped => skipped += 1,
                WarmupOutcome::Failed(reason) => panic!("unexpected failure: {reason}"),
            }
        }
    }

    assert_eq!(runs.load(Ordering::SeqCst), shared.len());
    assert_eq!(completed, shared.len());
    assert_eq!(skipped, 2 * shared.len());

    let status = coordinator.status();
    assert_eq!(status.patterns_completed, shared.len());
    assert_eq!(status.completed_stages.len(), 3);
}

#[tokio::test]
async fn test_failed_pattern_is_not_retried() {
    let coordinator = WarmupCoordinator::new();
    let p = pattern("Hello.");

    let first = coordinator
        .execute_warmup(&p, WarmupStage::Minimal, |_| async {
            Err::<(), _>(VoxstreamError::synthesis("model not loaded"))
        })
        .await;
    assert!(matches!(first, WarmupOutcome::Failed(_)));

    let second = coordinator
        .execute_warmup(&p, WarmupStage::Extended, |_| async { Ok(()) })
        .await;
    assert_eq!(second, WarmupOutcome::Skipped);

    let status = coordinator.status();
    assert_eq!(status.failed, 1);
    assert_eq!(status.skipped, 1);
}

#[rstest]
#[case(WarmupStage::Minimal, 1)]
#[case(WarmupStage::Extended, 3)]
#[case(WarmupStage::Pipeline, 2)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pipeline_warm_up_synthesizes_stage_patterns(
    #[case] stage: WarmupStage,
    #[case] expected_calls: usize,
) {
    let backend = FakeBackend::new();
    let pipeline = TtsPipeline::builder(PipelineConfig::default(), backend.clone())
        .build()
        .unwrap();

    let outcomes = pipeline.warm_up(stage).await;
    assert_eq!(outcomes.len(), expected_calls);
    assert_eq!(backend.call_count(), expected_calls);
    assert!(pipeline.warmup_coordinator().is_stage_complete(stage));

    // A second run of the same stage synthesizes nothing new
    let again = pipeline.warm_up(stage).await;
    assert!(again.iter().all(|o| *o == WarmupOutcome::Skipped));
    assert_eq!(backend.call_count(), expected_calls);
}
