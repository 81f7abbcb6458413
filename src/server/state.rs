use crate::{config::Config, metrics, server::upstream};
use metrics_exporter_prometheus::PrometheusHandle;
use reqwest::Client;
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across all handlers.
///
/// Holds no per-request data: relay settings are loaded at the start of each
/// request from `config.settings`.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Shared HTTP client for connection pooling (redirects disabled)
    pub http_client: Client,
    /// Prometheus handle, when this process owns the recorder
    pub metrics: Option<PrometheusHandle>,
    pub started_at: Instant,
}

impl AppState {
    /// Create a new AppState with the given configuration
    pub fn new(config: Config) -> Result<Self, reqwest::Error> {
        Ok(Self::with_http_client(config, upstream::build_client()?))
    }

    /// Create an AppState around a caller-built client.
    ///
    /// The client must not follow redirects on its own, or redirect hops
    /// would skip the host policy.
    pub fn with_http_client(config: Config, http_client: Client) -> Self {
        Self {
            config: Arc::new(config),
            http_client,
            metrics: metrics::init(),
            started_at: Instant::now(),
        }
    }
}
