//! Metrics collection and Prometheus export.

use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

/// Global handle to the Prometheus recorder.
pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Must run once, before anything is recorded.
pub fn init_metrics() -> anyhow::Result<()> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    METRICS_HANDLE
        .set(handle)
        .map_err(|_| anyhow::anyhow!("metrics recorder already initialized"))
}

/// Current metrics in Prometheus text format.
pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

/// Final result of an enrollment request, labelled by outcome.
pub fn record_enrollment(outcome: &'static str) {
    counter!("devicecert_enrollments_total", "outcome" => outcome).increment(1);
}

/// One trust-store submission attempt.
pub fn record_submission(outcome: &'static str) {
    counter!("devicecert_trust_store_submissions_total", "outcome" => outcome).increment(1);
}

pub fn record_service_user_refresh(result: &'static str) {
    counter!("devicecert_service_user_refreshes_total", "result" => result).increment(1);
}
