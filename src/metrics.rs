//! Prometheus metrics for the relay.
//!
//! The recorder is installed once per process; every helper here is a cheap
//! no-op until then, which keeps library users and unit tests free of setup.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;
use tracing::warn;

static HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Install the global Prometheus recorder on first call and return its handle.
///
/// Returns `None` when another recorder was already installed.
pub fn init() -> Option<PrometheusHandle> {
    HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Failed to install Prometheus recorder: {}", e);
                None
            }
        })
        .clone()
}

/// Count a finished relay request.
///
/// `kind` is one of `playlist`, `media` or `rejected`.
pub fn record_request(kind: &'static str, status: u16) {
    counter!(
        "hls_relay_requests_total",
        "kind" => kind,
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record time spent serving a relay request.
pub fn record_duration(kind: &'static str, start: Instant) {
    histogram!("hls_relay_request_duration_seconds", "kind" => kind)
        .record(start.elapsed().as_secs_f64());
}

/// Count a transport failure or non-2xx answer from upstream.
pub fn record_upstream_error() {
    counter!("hls_relay_upstream_errors_total").increment(1);
}

/// Count URI references replaced by one rewrite pass.
pub fn record_rewritten_uris(count: usize) {
    counter!("hls_relay_rewritten_uris_total").increment(count as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_harmless() {
        record_request("media", 200);
        record_duration("media", Instant::now());
        record_upstream_error();
        record_rewritten_uris(3);
    }

    #[test]
    fn init_is_idempotent() {
        let first = init().is_some();
        let second = init().is_some();
        assert_eq!(first, second);
    }
}
