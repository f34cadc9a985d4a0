//! Prometheus metrics for generation jobs.
//!
//! Metrics are registered once in a process-wide registry. Recording before
//! [`init_metrics`] is a no-op, so library users that never call it pay nothing.

use std::sync::OnceLock;
use std::time::Duration;

use prometheus::{Encoder, Gauge, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::MetricsError;
use crate::job::{Mode, Outcome};

/// Global registry for all gen-forge metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Jobs finished, labeled by mode and outcome label.
pub static JOBS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Job wall-clock duration in seconds, labeled by mode.
pub static JOB_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Jobs currently running.
pub static JOBS_IN_PROGRESS: OnceLock<Gauge> = OnceLock::new();

/// Registers all metrics. Calling it again is harmless.
pub fn init_metrics() -> Result<(), MetricsError> {
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let jobs_total = IntCounterVec::new(
        Opts::new("gen_forge_jobs_total", "Total number of generation jobs"),
        &["mode", "outcome"],
    )?;

    let job_duration = HistogramVec::new(
        HistogramOpts::new(
            "gen_forge_job_duration_seconds",
            "Generation job duration in seconds",
        )
        .buckets(vec![0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        &["mode"],
    )?;

    let jobs_in_progress = Gauge::new(
        "gen_forge_jobs_in_progress",
        "Number of generation jobs currently running",
    )?;

    registry.register(Box::new(jobs_total.clone()))?;
    registry.register(Box::new(job_duration.clone()))?;
    registry.register(Box::new(jobs_in_progress.clone()))?;

    // Losing a race with another initializer leaves the winner's metrics in place
    let _ = REGISTRY.set(registry);
    let _ = JOBS_TOTAL.set(jobs_total);
    let _ = JOB_DURATION.set(job_duration);
    let _ = JOBS_IN_PROGRESS.set(jobs_in_progress);

    tracing::debug!("Prometheus metrics initialized");
    Ok(())
}

/// Marks a job as started.
pub fn job_started() {
    if let Some(gauge) = JOBS_IN_PROGRESS.get() {
        gauge.inc();
    }
}

/// Records a finished job.
pub fn job_finished(mode: Mode, outcome: &Outcome, duration: Duration) {
    if let Some(gauge) = JOBS_IN_PROGRESS.get() {
        gauge.dec();
    }
    if let Some(counter) = JOBS_TOTAL.get() {
        counter
            .with_label_values(&[mode.as_str(), outcome.label()])
            .inc();
    }
    if let Some(histogram) = JOB_DURATION.get() {
        histogram
            .with_label_values(&[mode.as_str()])
            .observe(duration.as_secs_f64());
    }
}

/// Renders all registered metrics in the Prometheus text format.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}
