//! Same-origin relay for HLS content.
//!
//! Fetches third-party manifests and segments on behalf of a browser,
//! rewriting manifest URIs so follow-up requests also flow through the relay.

pub mod config;
pub mod error;
pub mod hls;
pub mod metrics;
pub mod server;
