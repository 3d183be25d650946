//! Terminal buffer utilization report.

use std::collections::VecDeque;
use std::time::Instant;

use serde::Serialize;

use super::{BufferEvent, BufferMetrics, ChunkSample};

const UNDERRUN_EFFICIENCY_PENALTY: f64 = 15.0;
const OVERRUN_EFFICIENCY_PENALTY: f64 = 10.0;
const VARIABILITY_MAX_PENALTY: f64 = 20.0;

/// Processing-time stability class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stability {
    /// Coefficient of variation below 0.2
    Stable,
    /// Coefficient of variation below 0.5
    Moderate,
    /// Coefficient of variation of 0.5 or more
    Unstable,
}

impl Stability {
    fn from_cv(cv: f64) -> Self {
        if cv < 0.2 {
            Self::Stable
        } else if cv < 0.5 {
            Self::Moderate
        } else {
            Self::Unstable
        }
    }
}

/// Direction of processing time across the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    /// Processing time falling
    Improving,
    /// No meaningful change
    Flat,
    /// Processing time rising
    Degrading,
}

/// Processing-time trend over the retained history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendAnalysis {
    /// Stability class
    pub stability: Stability,
    /// Standard deviation divided by mean
    pub coefficient_of_variation: f64,
    /// Least-squares slope in milliseconds per chunk
    pub processing_time_slope_ms: f64,
    /// Sign of the slope, ignoring changes under 10% of the mean
    pub direction: TrendDirection,
}

/// Summary produced once when a session's monitor stops
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BufferUtilizationReport {
    /// Monitored wall-clock time in milliseconds
    pub session_duration_ms: f64,
    /// Chunks recorded over the session
    pub chunks_processed: u64,
    /// Bytes recorded over the session
    pub bytes_processed: u64,
    /// Mean chunk size in the retained history
    pub average_chunk_bytes: f64,
    /// Mean utilization in the retained history
    pub average_utilization_percent: f64,
    /// Peak utilization in the retained history
    pub peak_utilization_percent: f64,
    /// Total underruns
    pub underrun_count: u64,
    /// Total overruns
    pub overrun_count: u64,
    /// Mean severity of retained underrun events
    pub average_underrun_severity: f64,
    /// Offset of the first retained underrun from session start
    pub first_underrun_ms: Option<f64>,
    /// Mean processing time in the retained history
    pub average_processing_ms: f64,
    /// Delivery efficiency in [0, 100]
    pub efficiency_score: f64,
    /// Metrics at the moment monitoring stopped
    pub final_metrics: BufferMetrics,
    /// Processing-time trend
    pub trend: TrendAnalysis,
    /// Tuning suggestions
    pub recommendations: Vec<String>,
}

pub(crate) struct ReportInputs<'a> {
    pub(crate) started_at: Instant,
    pub(crate) samples: &'a VecDeque<ChunkSample>,
    pub(crate) underruns: &'a VecDeque<BufferEvent>,
    pub(crate) overruns: &'a VecDeque<BufferEvent>,
    pub(crate) bytes_processed: u64,
}

pub(crate) fn build_report(inputs: &ReportInputs<'_>, final_metrics: BufferMetrics) -> BufferUtilizationReport {
    let processing: Vec<f64> = inputs.samples.iter().map(|s| s.processing_ms).collect();
    let utilization: Vec<f64> = inputs.samples.iter().map(|s| s.utilization_percent).collect();
    let sizes: Vec<f64> = inputs.samples.iter().map(|s| s.size_bytes as f64).collect();

    let average_processing_ms = mean(&processing);
    let cv = coefficient_of_variation(&processing);
    let slope = least_squares_slope(&processing);
    let average_utilization_percent = mean(&utilization);

    let underrun_count = final_metrics.underrun_count;
    let overrun_count = final_metrics.overrun_count;
    let efficiency_score = (100.0
        - UNDERRUN_EFFICIENCY_PENALTY * underrun_count as f64
        - OVERRUN_EFFICIENCY_PENALTY * overrun_count as f64
        - (VARIABILITY_MAX_PENALTY * cv).min(VARIABILITY_MAX_PENALTY))
    .clamp(0.0, 100.0);

    let change = slope * processing.len().saturating_sub(1) as f64;
    let direction = if average_processing_ms <= 0.0 || change.abs() < 0.1 * average_processing_ms {
        TrendDirection::Flat
    } else if change > 0.0 {
        TrendDirection::Degrading
    } else {
        TrendDirection::Improving
    };

    let severities: Vec<f64> = inputs.underruns.iter().map(|e| e.severity).collect();
    let first_underrun_ms = inputs
        .underruns
        .front()
        .map(|e| e.at.saturating_duration_since(inputs.started_at).as_secs_f64() * 1000.0);
    let peak_overrun = inputs.overruns.iter().map(|e| e.severity).fold(0.0, f64::max);

    let recommendations = recommendations(
        average_utilization_percent,
        underrun_count,
        overrun_count,
        peak_overrun,
        cv,
    );

    BufferUtilizationReport {
        session_duration_ms: inputs.started_at.elapsed().as_secs_f64() * 1000.0,
        chunks_processed: final_metrics.chunks_processed,
        bytes_processed: inputs.bytes_processed,
        average_chunk_bytes: mean(&sizes),
        average_utilization_percent,
        peak_utilization_percent: utilization.iter().copied().fold(0.0, f64::max),
        underrun_count,
        overrun_count,
        average_underrun_severity: mean(&severities),
        first_underrun_ms,
        average_processing_ms,
        efficiency_score,
        final_metrics,
        trend: TrendAnalysis {
            stability: Stability::from_cv(cv),
            coefficient_of_variation: cv,
            processing_time_slope_ms: slope,
            direction,
        },
        recommendations,
    }
}

fn recommendations(
    average_utilization: f64,
    underruns: u64,
    overruns: u64,
    peak_overrun: f64,
    cv: f64,
) -> Vec<String> {
    let mut out = Vec::new();
    if average_utilization < 30.0 {
        out.push(format!(
            "Average utilization {average_utilization:.1}% is low: consider increasing buffer size"
        ));
    } else if average_utilization > 85.0 {
        out.push(format!(
            "Average utilization {average_utilization:.1}% is high: increase consumption rate or reduce chunk size"
        ));
    }
    if underruns > 0 {
        out.push(format!(
            "{underruns} underrun(s) detected: increase preload chunks"
        ));
    }
    if overruns > 0 {
        out.push(format!(
            "{overruns} overrun(s) detected (peak excess {:.0}%): raise buffer capacity",
            peak_overrun * 100.0
        ));
    }
    if cv > 0.5 {
        out.push(format!(
            "Processing time variability {cv:.2} is high: investigate synthesis latency"
        ));
    }
    if out.is_empty() {
        out.push("Buffer performance is healthy".to_string());
    }
    out
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Population standard deviation over mean; 0 for empty or zero-mean input.
pub(crate) fn coefficient_of_variation(values: &[f64]) -> f64 {
    let avg = mean(values);
    if avg <= 0.0 {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt() / avg
}

/// Slope of the least-squares line through `(index, value)`.
pub(crate) fn least_squares_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = mean(values);
    let (num, den) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, y)| {
            let dx = i as f64 - x_mean;
            (num + dx * (y - y_mean), den + dx * dx)
        });
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}
