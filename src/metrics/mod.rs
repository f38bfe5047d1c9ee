//! Prometheus metrics for the scheduling engine
//!
//! This module provides metrics tracking for:
//! - Allocation: committed allocations, failures by reason, duration
//! - Reschedules
//! - Overwrite sessions: created, confirmed, expired, pending
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram, Counter,
    CounterVec, Encoder, Gauge, Histogram, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all scheduling metrics
struct SchedulingMetrics {
    allocations: CounterVec,
    allocation_failures: CounterVec,
    allocation_duration: Histogram,
    reschedules: Counter,
    batch_rows: CounterVec,
    sessions_created: Counter,
    sessions_confirmed: Counter,
    sessions_expired: Counter,
    sessions_pending: Gauge,
}

/// Global storage for scheduling metrics
static SCHEDULING_METRICS: OnceLock<SchedulingMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// This function should be called once at application startup.
/// If metric registration fails, subsequent metric operations become no-ops.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = shiftline::metrics::init_metrics() {
///     eprintln!("Warning: Metrics initialization failed: {}", e);
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    // Prevent double initialization
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = SchedulingMetrics {
        allocations: register_counter_vec!(
            "shiftline_allocations_total",
            "Total committed allocations, by whether an existing task was reused",
            &["task"]
        )?,
        allocation_failures: register_counter_vec!(
            "shiftline_allocation_failures_total",
            "Total rejected allocations by reason",
            &["reason"]
        )?,
        allocation_duration: register_histogram!(
            "shiftline_allocation_duration_seconds",
            "Time spent selecting and committing an allocation",
            vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
        )?,
        reschedules: register_counter!(
            "shiftline_reschedules_total",
            "Total successful reschedules"
        )?,
        batch_rows: register_counter_vec!(
            "shiftline_batch_rows_total",
            "Batch rows by reconciliation outcome",
            &["outcome"]
        )?,
        sessions_created: register_counter!(
            "shiftline_overwrite_sessions_created_total",
            "Total pending overwrite sessions created"
        )?,
        sessions_confirmed: register_counter!(
            "shiftline_overwrite_sessions_confirmed_total",
            "Total pending overwrite sessions confirmed"
        )?,
        sessions_expired: register_counter!(
            "shiftline_overwrite_sessions_expired_total",
            "Total pending overwrite sessions removed by expiry"
        )?,
        sessions_pending: register_gauge!(
            "shiftline_overwrite_sessions_pending",
            "Pending overwrite sessions currently held"
        )?,
    };

    SCHEDULING_METRICS
        .set(metrics)
        .map_err(|_| "Scheduling metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    SCHEDULING_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record a committed allocation
pub fn record_allocation(reused_task: bool) {
    if let Some(m) = SCHEDULING_METRICS.get() {
        let label = if reused_task { "reused" } else { "created" };
        m.allocations.with_label_values(&[label]).inc();
    }
}

/// Record a rejected allocation
pub fn record_allocation_failure(reason: &str) {
    if let Some(m) = SCHEDULING_METRICS.get() {
        m.allocation_failures.with_label_values(&[reason]).inc();
    }
}

/// Record a successful reschedule
pub fn record_reschedule() {
    if let Some(m) = SCHEDULING_METRICS.get() {
        m.reschedules.inc();
    }
}

/// Record reconciliation outcome counts for one batch
pub fn record_batch_rows(new: usize, duplicate: usize, conflicting: usize, failed: usize) {
    let Some(m) = SCHEDULING_METRICS.get() else {
        return;
    };

    for (outcome, count) in [
        ("new", new),
        ("duplicate", duplicate),
        ("conflicting", conflicting),
        ("failed", failed),
    ] {
        if count > 0 {
            m.batch_rows
                .with_label_values(&[outcome])
                .inc_by(count as f64);
        }
    }
}

/// Record a new pending overwrite session
pub fn record_session_created(pending: usize) {
    if let Some(m) = SCHEDULING_METRICS.get() {
        m.sessions_created.inc();
        m.sessions_pending.set(pending as f64);
    }
}

/// Record a confirmed overwrite session
pub fn record_session_confirmed(pending: usize) {
    if let Some(m) = SCHEDULING_METRICS.get() {
        m.sessions_confirmed.inc();
        m.sessions_pending.set(pending as f64);
    }
}

/// Record sessions removed by the expiry sweep
pub fn record_sessions_expired(count: usize, pending: usize) {
    let Some(m) = SCHEDULING_METRICS.get() else {
        return;
    };

    if count > 0 {
        m.sessions_expired.inc_by(count as f64);
    }
    m.sessions_pending.set(pending as f64);
}

/// Histogram timer guard that records duration on drop
pub struct MetricsTimer {
    timer: Option<prometheus::HistogramTimer>,
}

impl MetricsTimer {
    fn new(timer: prometheus::HistogramTimer) -> Self {
        Self { timer: Some(timer) }
    }

    /// Create a no-op timer when metrics are not initialized
    fn noop() -> Self {
        Self { timer: None }
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_record();
        }
    }
}

/// Start an allocation timer
pub fn start_allocation_timer() -> MetricsTimer {
    match SCHEDULING_METRICS.get() {
        Some(m) => MetricsTimer::new(m.allocation_duration.start_timer()),
        None => MetricsTimer::noop(),
    }
}

// ============================================================================
// Tests
// ============================================================================
