use crate::{
    config::RelaySettings,
    error::{RelayError, Result},
    hls::{
        classify::is_playlist,
        rewriter::{RewriteContext, rewrite_playlist},
    },
    metrics,
    server::{
        host_policy::ensure_relayable,
        request::ProxyRequest,
        state::AppState,
        upstream::{self, UpstreamResponse, passthrough_headers},
    },
};
use axum::{
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::time::Instant;
use tracing::info;

/// Content type of rewritten manifests.
pub const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl; charset=utf-8";
/// Content type used when upstream sends none.
pub const DEFAULT_MEDIA_CONTENT_TYPE: &str = "application/octet-stream";

/// Relay a manifest or media segment from a third-party origin.
///
/// `OPTIONS` answers the CORS preflight with 204; anything but `GET` is
/// rejected. A `GET` is validated, checked against the host policy, fetched
/// once (no retries) and either rewritten or passed through.
pub async fn relay(
    method: Method,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> Result<Response> {
    if method == Method::OPTIONS {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    if method != Method::GET {
        return Err(RelayError::MethodNotAllowed(method.to_string()));
    }

    let start = Instant::now();
    let settings = state.config.settings.load();

    match forward(&headers, &params, &settings, &state).await {
        Ok((kind, response)) => {
            metrics::record_request(kind, response.status().as_u16());
            metrics::record_duration(kind, start);
            Ok(response)
        }
        Err(e) => {
            if matches!(
                e,
                RelayError::UpstreamStatus { .. }
                    | RelayError::Transport(_)
                    | RelayError::TooManyRedirects(_)
            ) {
                metrics::record_upstream_error();
            }
            metrics::record_request("rejected", e.status_code().as_u16());
            metrics::record_duration("rejected", start);
            Err(e)
        }
    }
}

/// Validate, fetch and emit. Returns the metrics kind with the response.
async fn forward(
    request_headers: &HeaderMap,
    params: &HashMap<String, String>,
    settings: &RelaySettings,
    state: &AppState,
) -> Result<(&'static str, Response)> {
    let request = ProxyRequest::from_query(params)?;
    ensure_relayable(&request.target_url, &settings.allowed_hosts)?;

    info!("Relaying {}", request.target_url);

    let upstream = upstream::fetch(&state.http_client, &request, &settings.allowed_hosts).await?;
    if !upstream.status.is_success() {
        return Err(upstream.into_status_error(request.target_host()).await?);
    }

    if is_playlist(upstream.content_type.as_deref(), &upstream.final_url) {
        let ctx = RewriteContext {
            proxy_base: public_origin(settings, request_headers),
            referer: request.referer.clone(),
            user_agent: request.user_agent.clone(),
            base_url: upstream.final_url.clone(),
        };
        Ok(("playlist", playlist_response(upstream, &ctx).await?))
    } else {
        Ok(("media", media_response(upstream).await?))
    }
}

async fn playlist_response(upstream: UpstreamResponse, ctx: &RewriteContext) -> Result<Response> {
    let manifest = upstream.text().await?;
    let rewritten = rewrite_playlist(&manifest, ctx);

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, PLAYLIST_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-store"),
        ],
        rewritten,
    )
        .into_response())
}

async fn media_response(upstream: UpstreamResponse) -> Result<Response> {
    let mut headers = passthrough_headers(&upstream.headers);
    headers
        .entry(header::CONTENT_TYPE)
        .or_insert(HeaderValue::from_static(DEFAULT_MEDIA_CONTENT_TYPE));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

    let bytes = upstream.bytes().await?;
    info!("Relayed {} bytes", bytes.len());

    Ok((StatusCode::OK, headers, bytes).into_response())
}

/// Public origin used in callback URLs.
///
/// The configured override wins; otherwise it is rebuilt from
/// `X-Forwarded-Proto` (default `http`) and `X-Forwarded-Host`, `Host` or
/// `localhost`.
pub fn public_origin(settings: &RelaySettings, headers: &HeaderMap) -> String {
    if let Some(origin) = &settings.public_origin {
        return origin.trim_end_matches('/').to_string();
    }

    let proto = first_header_value(headers, "x-forwarded-proto").unwrap_or("http");
    let host = first_header_value(headers, "x-forwarded-host")
        .or_else(|| first_header_value(headers, header::HOST.as_str()))
        .unwrap_or("localhost");

    format!("{proto}://{host}")
}

/// First comma-separated value of a header, trimmed.
fn first_header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)?
        .to_str()
        .ok()?
        .split(',')
        .next()
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
