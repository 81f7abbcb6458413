use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::warn;

/// Maximum number of characters of upstream text carried in an error body.
pub const MAX_DIAGNOSTIC_CHARS: usize = 400;

/// Errors surfaced by the relay endpoint.
///
/// Every variant maps to a fixed HTTP status (or mirrors the upstream one)
/// and renders as a small JSON object with at least an `error` field.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Missing required query parameter 'url'")]
    MissingUrl,

    #[error("Invalid target URL: {0}")]
    InvalidUrl(String),

    #[error("Scheme '{0}' not allowed, only http/https are relayed")]
    UnsupportedScheme(String),

    #[error("Target host not allowed: {0}")]
    ForbiddenHost(String),

    #[error("Method {0} not allowed")]
    MethodNotAllowed(String),

    #[error("Upstream responded with status {}", .status.as_u16())]
    UpstreamStatus {
        status: StatusCode,
        target: String,
        body: String,
    },

    #[error("Too many redirects while fetching {0}")]
    TooManyRedirects(String),

    #[error("Upstream fetch failed: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, RelayError>;

impl From<reqwest::Error> for RelayError {
    fn from(e: reqwest::Error) -> Self {
        RelayError::Transport(truncate_chars(&e.to_string(), MAX_DIAGNOSTIC_CHARS))
    }
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::MissingUrl
            | RelayError::InvalidUrl(_)
            | RelayError::UnsupportedScheme(_) => StatusCode::BAD_REQUEST,
            RelayError::ForbiddenHost(_) => StatusCode::FORBIDDEN,
            RelayError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            RelayError::UpstreamStatus { status, .. } => *status,
            RelayError::TooManyRedirects(_) | RelayError::Transport(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// JSON payload for this error.
    pub fn to_json(&self) -> Value {
        match self {
            RelayError::ForbiddenHost(host) => json!({
                "error": "Target host not allowed",
                "host": host,
            }),
            RelayError::UpstreamStatus {
                status,
                target,
                body,
            } => json!({
                "error": self.to_string(),
                "status": status.as_u16(),
                "target": target,
                "body": body,
            }),
            RelayError::TooManyRedirects(target) => json!({
                "error": "Too many redirects",
                "target": target,
            }),
            RelayError::Transport(detail) => json!({
                "error": "Upstream fetch failed",
                "detail": detail,
            }),
            _ => json!({ "error": self.to_string() }),
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        warn!("Relay request failed with {}: {}", status.as_u16(), self);

        let mut response = (status, Json(self.to_json())).into_response();
        if status == StatusCode::METHOD_NOT_ALLOWED {
            response
                .headers_mut()
                .insert(header::ALLOW, header::HeaderValue::from_static("GET, OPTIONS"));
        }
        response
    }
}

/// Keep at most `max` characters of `text`, never splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_bad_request() {
        assert_eq!(RelayError::MissingUrl.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            RelayError::InvalidUrl("nope".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RelayError::UnsupportedScheme("ftp".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn upstream_status_is_mirrored() {
        let err = RelayError::UpstreamStatus {
            status: StatusCode::NOT_FOUND,
            target: "cdn.example.com".into(),
            body: "not found".into(),
        };
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let body = err.to_json();
        assert_eq!(body["status"], 404);
        assert_eq!(body["target"], "cdn.example.com");
        assert_eq!(body["body"], "not found");
        assert_eq!(body["error"], "Upstream responded with status 404");
    }

    #[test]
    fn forbidden_host_names_the_host() {
        let err = RelayError::ForbiddenHost("127.0.0.1".into());
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(err.to_json()["host"], "127.0.0.1");
    }

    #[test]
    fn transport_is_bad_gateway_with_detail() {
        let err = RelayError::Transport("connection refused".into());
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.to_json()["detail"], "connection refused");
    }

    #[test]
    fn method_not_allowed_sets_allow_header() {
        let response = RelayError::MethodNotAllowed("POST".into()).into_response();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], "GET, OPTIONS");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("ééé", 2), "éé");
        assert_eq!(truncate_chars("", 5), "");
    }
}
