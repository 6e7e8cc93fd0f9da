//! Metrics for the harness
//!
//! Records counters through the `metrics` facade; the embedding application
//! chooses the exporter. Compiled only with the `metrics` feature.

use shared::OpKind;

/// Record a completed operation
pub fn record_op(f: &str, outcome: OpKind) {
    metrics::counter!(
        "harness_ops_total",
        "f" => f.to_string(),
        "outcome" => outcome.to_string(),
    )
    .increment(1);
}

/// Record one nemesis event
pub fn record_nemesis_event() {
    metrics::counter!("harness_nemesis_events_total").increment(1);
}

/// Record a process retirement after an indeterminate outcome
pub fn record_process_retirement() {
    metrics::counter!("harness_process_retirements_total").increment(1);
}

/// Update the active worker gauge
pub fn set_active_workers(count: usize) {
    metrics::gauge!("harness_active_workers").set(count as f64);
}
