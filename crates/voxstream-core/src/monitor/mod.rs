//! Streaming buffer health monitoring.
//!
//! The monitor models the playback buffer as a leaky bucket: every processed
//! chunk first lets the consumer drain a fixed fraction of the current level,
//! then adds the chunk. Utilization therefore depends only on the sequence of
//! chunk sizes, never on wall-clock timing. Timing enters only through the
//! processing-time samples and the underrun events the emitter reports.
//!
//! A monitor belongs to one session and is driven by that session's emitter,
//! so it takes `&mut self` and holds no lock. Other tasks see published
//! [`BufferMetrics`] copies.

pub mod report;

use std::collections::VecDeque;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{VoxstreamError, VoxstreamResult};

pub use report::{BufferUtilizationReport, Stability, TrendAnalysis, TrendDirection};

/// Health points lost per underrun
pub const UNDERRUN_PENALTY: f64 = 10.0;

/// Maximum points lost for running nearly empty
pub const LOW_UTILIZATION_MAX_PENALTY: f64 = 20.0;

/// Maximum points lost for running nearly full
pub const HIGH_UTILIZATION_MAX_PENALTY: f64 = 10.0;

/// Buffer monitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferMonitorConfig {
    /// Modeled buffer capacity in bytes
    pub capacity_bytes: usize,
    /// Samples and events retained for the final report
    pub history_capacity: usize,
    /// Fraction of the level drained before each chunk is added
    pub consumption_rate: f64,
    /// Utilization percent below which health is penalized
    pub low_utilization_threshold: f64,
    /// Utilization percent above which health is penalized
    pub high_utilization_threshold: f64,
    /// Emit a periodic health report every N chunks (0 disables)
    pub report_interval_chunks: u64,
}

impl Default for BufferMonitorConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: 16 * 1024,
            history_capacity: 1000,
            consumption_rate: 0.5,
            low_utilization_threshold: 20.0,
            high_utilization_threshold: 90.0,
            report_interval_chunks: 50,
        }
    }
}

impl BufferMonitorConfig {
    /// Validate monitor configuration
    pub fn validate(&self) -> VoxstreamResult<()> {
        if self.capacity_bytes == 0 {
            return Err(VoxstreamError::configuration(
                "buffer capacity_bytes must be greater than 0",
            ));
        }
        if self.history_capacity == 0 {
            return Err(VoxstreamError::configuration(
                "buffer history_capacity must be greater than 0",
            ));
        }
        if !(0.0..=1.0).contains(&self.consumption_rate) {
            return Err(VoxstreamError::configuration(format!(
                "consumption_rate must be in [0, 1], got {}",
                self.consumption_rate
            )));
        }
        if !(0.0 < self.low_utilization_threshold
            && self.low_utilization_threshold < self.high_utilization_threshold
            && self.high_utilization_threshold < 100.0)
        {
            return Err(VoxstreamError::configuration(
                "utilization thresholds must satisfy 0 < low < high < 100",
            ));
        }
        Ok(())
    }
}

/// Point-in-time buffer health
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BufferMetrics {
    /// Modeled capacity
    pub buffer_size_bytes: usize,
    /// Modeled fill level
    pub buffer_level_bytes: usize,
    /// Level as a percentage of capacity
    pub utilization_percent: f64,
    /// Underruns recorded so far
    pub underrun_count: u64,
    /// Overruns recorded so far
    pub overrun_count: u64,
    /// Delivery health in [0, 100]
    pub health_score: f64,
    /// Chunks recorded so far
    pub chunks_processed: u64,
    /// Mean processing time per chunk
    pub average_processing_ms: f64,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ChunkSample {
    pub(crate) size_bytes: usize,
    pub(crate) processing_ms: f64,
    pub(crate) utilization_percent: f64,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct BufferEvent {
    pub(crate) at: Instant,
    pub(crate) severity: f64,
}

/// Per-session buffer monitor
#[derive(Debug)]
pub struct StreamingBufferMonitor {
    config: BufferMonitorConfig,
    started_at: Instant,
    level_bytes: f64,
    history: VecDeque<ChunkSample>,
    underruns: VecDeque<BufferEvent>,
    overruns: VecDeque<BufferEvent>,
    underrun_count: u64,
    overrun_count: u64,
    chunks_processed: u64,
    bytes_processed: u64,
    total_processing_ms: f64,
    active: bool,
}

impl StreamingBufferMonitor {
    /// Start monitoring a session
    #[must_use]
    pub fn new(config: BufferMonitorConfig) -> Self {
        let history_capacity = config.history_capacity;
        Self {
            config,
            started_at: Instant::now(),
            level_bytes: 0.0,
            history: VecDeque::with_capacity(history_capacity),
            underruns: VecDeque::new(),
            overruns: VecDeque::new(),
            underrun_count: 0,
            overrun_count: 0,
            chunks_processed: 0,
            bytes_processed: 0,
            total_processing_ms: 0.0,
            active: true,
        }
    }

    /// Whether the monitor still accepts records
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Record one processed chunk.
    ///
    /// Returns a metrics snapshot every `report_interval_chunks` chunks.
    pub fn record_chunk_processed(
        &mut self,
        size_bytes: usize,
        processing_time_ms: f64,
    ) -> Option<BufferMetrics> {
        if !self.active {
            return None;
        }

        let capacity = self.config.capacity_bytes as f64;
        self.level_bytes *= 1.0 - self.config.consumption_rate;
        self.level_bytes += size_bytes as f64;
        if self.level_bytes > capacity {
            let severity = (self.level_bytes - capacity) / capacity;
            self.level_bytes = capacity;
            self.record_overrun(severity);
        }

        let processing_ms = processing_time_ms.max(0.0);
        self.chunks_processed += 1;
        self.bytes_processed += size_bytes as u64;
        self.total_processing_ms += processing_ms;

        let utilization_percent = self.utilization_percent();
        push_bounded(
            &mut self.history,
            ChunkSample {
                size_bytes,
                processing_ms,
                utilization_percent,
            },
            self.config.history_capacity,
        );

        let interval = self.config.report_interval_chunks;
        if interval > 0 && self.chunks_processed % interval == 0 {
            let metrics = self.current_metrics();
            info!(
                "Buffer health after {} chunks: {:.1} (utilization {:.1}%, {} underruns, {} overruns)",
                metrics.chunks_processed,
                metrics.health_score,
                metrics.utilization_percent,
                metrics.underrun_count,
                metrics.overrun_count
            );
            return Some(metrics);
        }
        None
    }

    /// Record a buffer underrun with severity in [0, 1]
    pub fn record_underrun(&mut self, severity: f64) {
        if !self.active {
            return;
        }
        self.underrun_count = self.underrun_count.saturating_add(1);
        push_bounded(
            &mut self.underruns,
            BufferEvent {
                at: Instant::now(),
                severity: severity.clamp(0.0, 1.0),
            },
            self.config.history_capacity,
        );
        warn!(
            "Buffer underrun #{} (severity {:.2})",
            self.underrun_count, severity
        );
    }

    /// Record a buffer overrun; severity is the excess relative to capacity
    pub fn record_overrun(&mut self, severity: f64) {
        if !self.active {
            return;
        }
        self.overrun_count = self.overrun_count.saturating_add(1);
        push_bounded(
            &mut self.overruns,
            BufferEvent {
                at: Instant::now(),
                severity: severity.max(0.0),
            },
            self.config.history_capacity,
        );
        debug!(
            "Buffer overrun #{} (severity {:.2})",
            self.overrun_count, severity
        );
    }

    fn utilization_percent(&self) -> f64 {
        (self.level_bytes / self.config.capacity_bytes as f64 * 100.0).clamp(0.0, 100.0)
    }

    fn health_score(&self) -> f64 {
        let utilization = self.utilization_percent();
        let low = self.config.low_utilization_threshold;
        let high = self.config.high_utilization_threshold;

        let mut score = 100.0 - UNDERRUN_PENALTY * self.underrun_count as f64;
        if utilization < low {
            score -= LOW_UTILIZATION_MAX_PENALTY * (low - utilization) / low;
        }
        if utilization > high {
            score -= HIGH_UTILIZATION_MAX_PENALTY * (utilization - high) / (100.0 - high);
        }
        score.clamp(0.0, 100.0)
    }

    /// Current health snapshot
    #[must_use]
    pub fn current_metrics(&self) -> BufferMetrics {
        BufferMetrics {
            buffer_size_bytes: self.config.capacity_bytes,
            buffer_level_bytes: self.level_bytes.round() as usize,
            utilization_percent: self.utilization_percent(),
            underrun_count: self.underrun_count,
            overrun_count: self.overrun_count,
            health_score: self.health_score(),
            chunks_processed: self.chunks_processed,
            average_processing_ms: if self.chunks_processed == 0 {
                0.0
            } else {
                self.total_processing_ms / self.chunks_processed as f64
            },
        }
    }

    /// Stop monitoring and produce the terminal report.
    ///
    /// Only the first call yields a report; later records are ignored.
    pub fn stop_monitoring(&mut self) -> Option<BufferUtilizationReport> {
        if !self.active {
            return None;
        }
        let final_metrics = self.current_metrics();
        self.active = false;

        let report = report::build_report(
            &report::ReportInputs {
                started_at: self.started_at,
                samples: &self.history,
                underruns: &self.underruns,
                overruns: &self.overruns,
                bytes_processed: self.bytes_processed,
            },
            final_metrics,
        );
        info!(
            "Buffer report: efficiency {:.1}, {} chunks, {} underruns, {} overruns, stability {:?}",
            report.efficiency_score,
            report.chunks_processed,
            report.underrun_count,
            report.overrun_count,
            report.trend.stability
        );
        Some(report)
    }
}

/// Append to a ring holding at most `capacity` items (never fewer than one).
fn push_bounded<T>(ring: &mut VecDeque<T>, item: T, capacity: usize) {
    while ring.len() >= capacity.max(1) {
        ring.pop_front();
    }
    ring.push_back(item);
}
