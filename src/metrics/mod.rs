//! Prometheus metrics for the submission pipeline
//!
//! Exposes metrics for:
//! - Submissions by broadcast mode
//! - Completed results by delivery code class
//! - Failures by error kind and operator aborts
//! - Poll attempts and end-to-end latency

use crate::node::{BroadcastMode, BroadcastResult};

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    pub static ref TX_SUBMITTED: CounterVec = register_counter_vec!(
        "eve_transactions_submitted_total",
        "Total transactions handed to the broadcaster",
        &["mode"]
    ).unwrap();

    pub static ref TX_COMPLETED: CounterVec = register_counter_vec!(
        "eve_transactions_completed_total",
        "Total transactions with a node result",
        &["mode", "result"]
    ).unwrap();

    pub static ref TX_FAILED: CounterVec = register_counter_vec!(
        "eve_transactions_failed_total",
        "Total submissions that ended in a pipeline error",
        &["kind"]
    ).unwrap();

    pub static ref TX_ABORTED: CounterVec = register_counter_vec!(
        "eve_transactions_aborted_total",
        "Total submissions declined by the operator",
        &[]
    ).unwrap();

    pub static ref POLL_ATTEMPTS: CounterVec = register_counter_vec!(
        "eve_poll_attempts_total",
        "Total queries by hash after a commit timeout",
        &[]
    ).unwrap();

    pub static ref TX_LATENCY: HistogramVec = register_histogram_vec!(
        "eve_submission_latency_seconds",
        "Time from submit to final result",
        &["mode"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    ).unwrap();
}

/// Text exposition of every registered metric
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

// Helper functions to record metrics

pub fn record_tx_submitted(mode: BroadcastMode) {
    TX_SUBMITTED.with_label_values(&[mode.as_str()]).inc();
}

pub fn record_tx_completed(mode: BroadcastMode, result: &BroadcastResult) {
    let class = if result.is_success() { "success" } else { "rejected" };
    TX_COMPLETED
        .with_label_values(&[mode.as_str(), class])
        .inc();
}

pub fn record_tx_failed(kind: &str) {
    TX_FAILED.with_label_values(&[kind]).inc();
}

pub fn record_tx_aborted() {
    TX_ABORTED.with_label_values(&[]).inc();
}

pub fn record_poll_attempt() {
    POLL_ATTEMPTS.with_label_values(&[]).inc();
}

pub fn record_tx_latency(mode: BroadcastMode, latency_secs: f64) {
    TX_LATENCY
        .with_label_values(&[mode.as_str()])
        .observe(latency_secs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::TxHash;

    #[test]
    fn test_render_includes_recorded_metrics() {
        record_tx_submitted(BroadcastMode::Block);
        record_tx_completed(
            BroadcastMode::Block,
            &BroadcastResult::new(TxHash::new([1; 32]), 11, "out of gas"),
        );
        record_tx_failed("simulation");

        let text = render().unwrap();
        assert!(text.contains("eve_transactions_submitted_total{mode=\"block\"}"));
        assert!(text.contains("result=\"rejected\""));
        assert!(text.contains("eve_transactions_failed_total{kind=\"simulation\"}"));
    }

    #[test]
    fn test_counters_increase() {
        let before = POLL_ATTEMPTS.with_label_values(&[]).get();
        record_poll_attempt();
        record_poll_attempt();
        assert!(POLL_ATTEMPTS.with_label_values(&[]).get() >= before + 2.0);
    }
}
