//! Metric instrument factories for sequencer-monitor.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"sequencer-monitor"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for sequencer-monitor instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("sequencer-monitor")
}

/// Counter: monitor cycles run.
/// Labels: `result` ("ok" | "error").
pub fn cycles() -> Counter<u64> {
    meter()
        .u64_counter("sequencer_monitor.cycles")
        .with_description("Number of monitor cycles run")
        .build()
}

/// Counter: jobs found workable for at least the threshold.
/// Labels: `network`.
pub fn unworked_jobs() -> Counter<u64> {
    meter()
        .u64_counter("sequencer_monitor.jobs.unworked")
        .with_description("Jobs left workable for the alert threshold or longer")
        .build()
}

/// Counter: alert deliveries.
/// Labels: `result` ("ok" | "error").
pub fn notifications() -> Counter<u64> {
    meter()
        .u64_counter("sequencer_monitor.notifications")
        .with_description("Number of alert deliveries attempted")
        .build()
}

/// Histogram: cycle duration in milliseconds.
pub fn cycle_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("sequencer_monitor.cycle.duration_ms")
        .with_description("Monitor cycle duration in milliseconds")
        .with_unit("ms")
        .build()
}
