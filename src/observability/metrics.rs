use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// ---------------------------------------------------------------------------
// Metrics catalog
// ---------------------------------------------------------------------------

/// Register all metric descriptors at startup.
///
/// Call once after the recorder is installed. Descriptors provide the
/// human-readable help text shown by Prometheus.
pub fn describe_all_metrics() {
    // -- Map endpoint --
    describe_counter!(
        "clipmap_map_requests_total",
        "Map requests by response status"
    );
    describe_histogram!(
        "clipmap_map_request_duration_seconds",
        "Time to build and encode one manifest"
    );
    describe_histogram!(
        "clipmap_manifest_sequences",
        "Sequences per successful manifest"
    );

    // -- Listing --
    describe_counter!(
        "clipmap_listing_attempts_total",
        "Full listing passes by outcome"
    );
    describe_counter!(
        "clipmap_listing_retries_total",
        "Listing passes restarted after a failure"
    );

    // -- Signing --
    describe_counter!(
        "clipmap_signing_errors_total",
        "Manifests that failed URL signing"
    );

    // -- System --
    describe_gauge!("clipmap_uptime_seconds", "Process uptime");
    describe_counter!(
        "clipmap_panic_total",
        "Total panics caught (should always be 0)"
    );
}

// ---------------------------------------------------------------------------
// Metric recording helpers
// ---------------------------------------------------------------------------

// -- Map endpoint --

pub fn inc_map_request(status: u16) {
    counter!("clipmap_map_requests_total", "status" => status.to_string()).increment(1);
}

pub fn record_map_request_duration(seconds: f64) {
    histogram!("clipmap_map_request_duration_seconds").record(seconds);
}

pub fn record_manifest_sequences(count: usize) {
    histogram!("clipmap_manifest_sequences").record(count as f64);
}

// -- Listing --

pub fn inc_listing_attempt(outcome: &str) {
    counter!("clipmap_listing_attempts_total", "outcome" => outcome.to_string()).increment(1);
}

pub fn inc_listing_retries() {
    counter!("clipmap_listing_retries_total").increment(1);
}

// -- Signing --

pub fn inc_signing_errors() {
    counter!("clipmap_signing_errors_total").increment(1);
}

// -- System --

pub fn set_uptime_seconds(seconds: f64) {
    gauge!("clipmap_uptime_seconds").set(seconds);
}

pub fn inc_panic_total() {
    counter!("clipmap_panic_total").increment(1);
}

// ---------------------------------------------------------------------------
// Uptime tracking task
// ---------------------------------------------------------------------------

/// Update the uptime gauge every second until cancelled.
pub async fn run_uptime_task(start_time: Instant, cancel: tokio_util::sync::CancellationToken) {
    let interval = std::time::Duration::from_secs(1);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {
                set_uptime_seconds(start_time.elapsed().as_secs_f64());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Prometheus recorder installation
// ---------------------------------------------------------------------------

/// Install the global Prometheus recorder.
///
/// Returns a handle that renders the text exposition format for `/metrics`.
/// Fails if another recorder is already installed.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}
