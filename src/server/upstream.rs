//! Upstream fetch for the relay.
//!
//! Redirects are followed here rather than inside `reqwest` so that every
//! hop passes the same host policy as the original target.

use crate::{
    error::{MAX_DIAGNOSTIC_CHARS, RelayError, Result, truncate_chars},
    server::{host_policy::ensure_relayable, request::ProxyRequest},
};
use axum::body::Bytes;
use reqwest::{
    Client, Response, StatusCode,
    header::{self, HeaderMap},
    redirect,
};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Maximum number of redirects followed for one relay request.
pub const MAX_REDIRECTS: usize = 10;

/// Response headers never copied to the client.
///
/// Hop-by-hop headers (RFC 9110 §7.6.1) plus `content-security-policy`, which
/// would otherwise block the relayed content in the embedding page.
pub const STRIPPED_RESPONSE_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
    "content-security-policy",
];

/// Build the shared upstream client.
///
/// Automatic redirects are disabled; [`fetch`] follows them itself.
pub fn build_client() -> reqwest::Result<Client> {
    Client::builder()
        .redirect(redirect::Policy::none())
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(10)
        .build()
}

/// The upstream answer for one relay request.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub content_type: Option<String>,
    /// Location after all redirects were followed
    pub final_url: Url,
    body: Response,
}

impl UpstreamResponse {
    fn new(final_url: Url, response: Response) -> Self {
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Self {
            status: response.status(),
            headers: response.headers().clone(),
            content_type,
            final_url,
            body: response,
        }
    }

    /// Read the whole body as text.
    pub async fn text(self) -> Result<String> {
        Ok(self.body.text().await?)
    }

    /// Read the whole body as bytes.
    pub async fn bytes(self) -> Result<Bytes> {
        Ok(self.body.bytes().await?)
    }

    /// Convert a non-2xx answer into an error carrying the start of its body.
    ///
    /// Only the first [`MAX_DIAGNOSTIC_CHARS`] characters are read; the rest
    /// of the body is dropped with the connection.
    ///
    /// # Errors
    /// [`RelayError::Transport`] when the body cannot be read.
    pub async fn into_status_error(mut self, target: &str) -> Result<RelayError> {
        let mut buf: Vec<u8> = Vec::new();

        while let Some(chunk) = self.body.chunk().await? {
            buf.extend_from_slice(&chunk);
            if String::from_utf8_lossy(&buf).chars().count() >= MAX_DIAGNOSTIC_CHARS {
                break;
            }
        }

        Ok(RelayError::UpstreamStatus {
            status: self.status,
            target: target.to_string(),
            body: truncate_chars(&String::from_utf8_lossy(&buf), MAX_DIAGNOSTIC_CHARS),
        })
    }
}

/// GET the request's target, following redirects.
///
/// Each redirect hop must itself be relayable under `allow_list`; the first
/// URL is checked by the caller before this is reached.
///
/// # Errors
/// - [`RelayError::Transport`] on network failures
/// - [`RelayError::ForbiddenHost`] / [`RelayError::UnsupportedScheme`] when a
///   redirect points somewhere the relay may not go
/// - [`RelayError::TooManyRedirects`] after [`MAX_REDIRECTS`] hops
pub async fn fetch(
    client: &Client,
    request: &ProxyRequest,
    allow_list: &[String],
) -> Result<UpstreamResponse> {
    let headers = request.upstream_headers();
    let mut current = request.target_url.clone();

    for hop in 0..=MAX_REDIRECTS {
        if hop > 0 {
            ensure_relayable(&current, allow_list)?;
        }

        info!("Fetching upstream: {}", current);
        let response = client
            .get(current.clone())
            .headers(headers.clone())
            .send()
            .await?;

        match redirect_target(&current, &response) {
            Some(next) => {
                debug!(
                    "Upstream {} redirected ({}) to {}",
                    current,
                    response.status(),
                    next
                );
                current = next;
            }
            None => return Ok(UpstreamResponse::new(current, response)),
        }
    }

    Err(RelayError::TooManyRedirects(request.target_host().to_string()))
}

/// Where a redirect response points, resolved against the current URL.
///
/// A redirect status without a usable `Location` is treated as final.
fn redirect_target(current: &Url, response: &Response) -> Option<Url> {
    match response.status() {
        StatusCode::MOVED_PERMANENTLY
        | StatusCode::FOUND
        | StatusCode::SEE_OTHER
        | StatusCode::TEMPORARY_REDIRECT
        | StatusCode::PERMANENT_REDIRECT => {}
        _ => return None,
    }

    let location = response.headers().get(header::LOCATION)?.to_str().ok()?;
    current.join(location).ok()
}

/// Copy upstream headers except [`STRIPPED_RESPONSE_HEADERS`].
pub fn passthrough_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream {
        if !STRIPPED_RESPONSE_HEADERS.contains(&name.as_str()) {
            headers.append(name.clone(), value.clone());
        }
    }
    headers
}
