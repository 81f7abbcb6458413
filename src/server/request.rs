use crate::error::{RelayError, Result};
use reqwest::header::{self, HeaderMap, HeaderValue};
use std::collections::HashMap;
use tracing::debug;
use url::Url;

/// User-agent sent upstream when the caller does not supply `ua`.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// One validated relay request, built from the query string.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyRequest {
    /// Absolute http(s) URL to fetch
    pub target_url: Url,
    pub referer: Option<String>,
    pub user_agent: String,
}

impl ProxyRequest {
    /// Extract `url`, `referer` and `ua` from the query parameters.
    ///
    /// # Errors
    /// - [`RelayError::MissingUrl`] when `url` is absent or blank
    /// - [`RelayError::InvalidUrl`] when `url` is not an absolute URL
    /// - [`RelayError::UnsupportedScheme`] for schemes other than http/https
    pub fn from_query(params: &HashMap<String, String>) -> Result<Self> {
        let raw_url = params
            .get("url")
            .map(|u| u.trim())
            .filter(|u| !u.is_empty())
            .ok_or(RelayError::MissingUrl)?;

        let target_url =
            Url::parse(raw_url).map_err(|e| RelayError::InvalidUrl(format!("{raw_url}: {e}")))?;

        match target_url.scheme() {
            "http" | "https" => {}
            scheme => return Err(RelayError::UnsupportedScheme(scheme.to_string())),
        }

        let referer = params
            .get("referer")
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        let user_agent = params
            .get("ua")
            .map(|ua| ua.trim())
            .filter(|ua| !ua.is_empty())
            .unwrap_or(DEFAULT_USER_AGENT)
            .to_string();

        Ok(Self {
            target_url,
            referer,
            user_agent,
        })
    }

    /// Hostname of the target, as used in error payloads.
    pub fn target_host(&self) -> &str {
        self.target_url.host_str().unwrap_or_default()
    }

    /// Headers sent on every upstream request for this relay request.
    ///
    /// `referer` and a derived `origin` are added only when a referer was
    /// given; an unparsable referer simply yields no `origin`.
    pub fn upstream_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));

        match HeaderValue::from_str(&self.user_agent) {
            Ok(ua) => {
                headers.insert(header::USER_AGENT, ua);
            }
            Err(_) => {
                debug!("Dropping user-agent with invalid header characters");
                headers.insert(header::USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
            }
        }

        if let Some(referer) = &self.referer {
            if let Ok(value) = HeaderValue::from_str(referer) {
                headers.insert(header::REFERER, value);
            }
            if let Some(origin) = origin_of(referer)
                && let Ok(value) = HeaderValue::from_str(&origin)
            {
                headers.insert(header::ORIGIN, value);
            }
        }

        headers
    }
}

/// Serialized origin (`scheme://host[:port]`) of a referer URL.
fn origin_of(referer: &str) -> Option<String> {
    let origin = Url::parse(referer).ok()?.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}
