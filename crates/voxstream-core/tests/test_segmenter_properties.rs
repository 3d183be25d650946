//! Property tests for segmentation and buffer health bounds

use proptest::prelude::*;
use voxstream_core::text::normalize_text;
use voxstream_core::{segment_text, BufferMonitorConfig, StreamingBufferMonitor};

fn words() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            "[a-z]{1,12}",
            "[a-z]{1,8}[.!?]",
            "[A-Z][a-z]{0,6},",
            Just("\n".to_string()),
        ],
        0..120,
    )
    .prop_map(|w| w.join(" "))
}

proptest! {
    #[test]
    fn segments_never_exceed_limit(text in words(), max_len in 5usize..200) {
        for segment in segment_text(&text, max_len) {
            prop_assert!(segment.char_len() <= max_len);
            prop_assert!(!segment.content.trim().is_empty());
        }
    }

    #[test]
    fn spans_point_into_normalized_text(text in words(), max_len in 5usize..200) {
        let normalized = normalize_text(&text);
        let segments = segment_text(&text, max_len);
        let mut last_end = 0;
        for (i, segment) in segments.iter().enumerate() {
            prop_assert_eq!(segment.index, i + 1);
            prop_assert_eq!(&normalized[segment.source_span.clone()], segment.content.as_str());
            prop_assert!(segment.source_span.start >= last_end);
            last_end = segment.source_span.end;
        }
    }

    #[test]
    fn segmentation_keeps_every_word(text in "[a-z]{1,10}( [a-z]{1,10}){0,60}", max_len in 12usize..120) {
        let joined: Vec<String> = segment_text(&text, max_len)
            .into_iter()
            .map(|s| s.content)
            .collect();
        prop_assert_eq!(joined.join(" "), text);
    }

    #[test]
    fn health_score_stays_in_range(
        chunks in prop::collection::vec((0usize..40_000, 0.0f64..500.0), 1..200),
        underruns in 0usize..30,
    ) {
        let mut monitor = StreamingBufferMonitor::new(BufferMonitorConfig::default());
        for (size, ms) in chunks {
            monitor.record_chunk_processed(size, ms);
        }
        for _ in 0..underruns {
            monitor.record_underrun(0.5);
        }
        let metrics = monitor.current_metrics();
        prop_assert!((0.0..=100.0).contains(&metrics.health_score));
        prop_assert!((0.0..=100.0).contains(&metrics.utilization_percent));
        prop_assert_eq!(metrics.underrun_count as usize, underruns);

        let report = monitor.stop_monitoring().unwrap();
        prop_assert!((0.0..=100.0).contains(&report.efficiency_score));
    }
}

#[test]
fn sustained_underruns_bottom_out_scores() {
    let mut monitor = StreamingBufferMonitor::new(BufferMonitorConfig::default());
    for i in 0..10_000u32 {
        if i % 100 == 0 {
            monitor.record_chunk_processed(4_800, f64::from(i % 7) * 3.0);
        }
        monitor.record_underrun(1.0);
    }

    let metrics = monitor.current_metrics();
    assert_eq!(metrics.underrun_count, 10_000);
    assert!((0.0..=100.0).contains(&metrics.health_score));
    assert!(metrics.health_score.abs() < f64::EPSILON);

    let report = monitor.stop_monitoring().unwrap();
    assert_eq!(report.underrun_count, 10_000);
    assert!(report.efficiency_score >= 0.0);
    assert!(report.efficiency_score.abs() < f64::EPSILON);
    assert!(report.first_underrun_ms.is_some());
}
