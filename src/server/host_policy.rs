use crate::error::{RelayError, Result};
use std::net::Ipv6Addr;
use tracing::debug;
use url::Url;

/// A named predicate over a normalized hostname identifying a loopback,
/// link-local or private target.
#[derive(Debug, Clone, Copy)]
pub struct PrivateHostPattern {
    pub name: &'static str,
    pub matches: fn(&str) -> bool,
}

/// Hosts the relay never contacts, whatever the allow-list says.
///
/// Hostnames are matched textually, without DNS resolution. A public name
/// resolving to a private address is a known gap (DNS rebinding).
pub const PRIVATE_HOST_PATTERNS: &[PrivateHostPattern] = &[
    PrivateHostPattern {
        name: "localhost",
        matches: is_localhost,
    },
    PrivateHostPattern {
        name: "127.0.0.0/8 loopback",
        matches: is_127_loopback,
    },
    PrivateHostPattern {
        name: "10.0.0.0/8 private",
        matches: is_10_private,
    },
    PrivateHostPattern {
        name: "192.168.0.0/16 private",
        matches: is_192_168_private,
    },
    PrivateHostPattern {
        name: "172.16.0.0/12 private",
        matches: is_172_private,
    },
    PrivateHostPattern {
        name: "0.0.0.0 unspecified",
        matches: is_unspecified_v4,
    },
    PrivateHostPattern {
        name: "169.254.0.0/16 link-local",
        matches: is_link_local_v4,
    },
    PrivateHostPattern {
        name: "IPv6 loopback/link-local/unique-local",
        matches: is_private_ipv6_literal,
    },
];

fn is_localhost(host: &str) -> bool {
    host == "localhost" || host.ends_with(".localhost")
}

fn is_127_loopback(host: &str) -> bool {
    host.starts_with("127.")
}

fn is_10_private(host: &str) -> bool {
    host.starts_with("10.")
}

fn is_192_168_private(host: &str) -> bool {
    host.starts_with("192.168.")
}

fn is_unspecified_v4(host: &str) -> bool {
    host == "0.0.0.0"
}

fn is_link_local_v4(host: &str) -> bool {
    host.starts_with("169.254.")
}

fn is_172_private(host: &str) -> bool {
    host.strip_prefix("172.")
        .and_then(|rest| rest.split('.').next())
        .and_then(|octet| octet.parse::<u8>().ok())
        .is_some_and(|octet| (16..=31).contains(&octet))
}

/// Bracketed IPv6 literal (`[::1]`) in a blocked range.
///
/// Blocked ranges:
/// - `::` and `::1`
/// - `fe80::/10` link-local
/// - `fc00::/7`  unique-local
/// - IPv4-mapped addresses whose IPv4 part is itself private
fn is_private_ipv6_literal(host: &str) -> bool {
    let Some(ip) = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .and_then(|h| h.parse::<Ipv6Addr>().ok())
    else {
        return false;
    };

    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_private_host(&v4.to_string());
    }

    let s = ip.segments();
    ip.is_loopback()
        || ip.is_unspecified()
        || (s[0] & 0xffc0) == 0xfe80
        || (s[0] & 0xfe00) == 0xfc00
}

/// Lowercase, trim whitespace and drop a trailing root dot.
fn normalize(hostname: &str) -> String {
    hostname.trim().trim_end_matches('.').to_lowercase()
}

/// The first [`PRIVATE_HOST_PATTERNS`] entry matching `hostname`, if any.
pub fn private_pattern_for(hostname: &str) -> Option<&'static PrivateHostPattern> {
    let host = normalize(hostname);
    PRIVATE_HOST_PATTERNS.iter().find(|p| (p.matches)(&host))
}

/// Returns `true` when `hostname` matches any [`PRIVATE_HOST_PATTERNS`] entry.
pub fn is_private_host(hostname: &str) -> bool {
    private_pattern_for(hostname).is_some()
}

/// Decide whether the relay may contact `hostname`.
///
/// Private targets are always denied. With an empty allow-list any other
/// host passes; otherwise the host must equal an entry or be a subdomain of
/// one. `*.suffix` entries match only subdomains, bare entries match the
/// host itself and all of its subdomains.
pub fn is_allowed(hostname: &str, allow_list: &[String]) -> bool {
    let host = normalize(hostname);
    if host.is_empty() {
        return false;
    }
    if let Some(pattern) = private_pattern_for(&host) {
        debug!("Denied {} ({})", host, pattern.name);
        return false;
    }

    if allow_list.is_empty() {
        return true;
    }

    allow_list.iter().any(|entry| {
        let entry = normalize(entry);
        match entry.strip_prefix("*.") {
            Some(suffix) => host.ends_with(&format!(".{suffix}")),
            None => host == entry || host.ends_with(&format!(".{entry}")),
        }
    })
}

/// Gate a URL before any request is issued for it.
///
/// # Errors
/// - [`RelayError::UnsupportedScheme`] for anything but http/https
/// - [`RelayError::InvalidUrl`] when the URL has no host
/// - [`RelayError::ForbiddenHost`] when [`is_allowed`] denies the host
pub fn ensure_relayable(url: &Url, allow_list: &[String]) -> Result<()> {
    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(RelayError::UnsupportedScheme(scheme.to_string())),
    }

    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| RelayError::InvalidUrl(format!("No host in URL: {url}")))?;

    if !is_allowed(host, allow_list) {
        return Err(RelayError::ForbiddenHost(host.to_string()));
    }

    Ok(())
}
