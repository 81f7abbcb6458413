//! Callback URLs pointing back at the relay.
//!
//! Every URI the relay hands to a player is wrapped as
//! `{proxy_base}/relay?url=..[&referer=..][&ua=..]` so the follow-up request
//! re-enters the relay and is validated again.

use url::{Url, form_urlencoded};

/// Path of the relay endpoint, appended to the proxy base.
pub const RELAY_PATH: &str = "/relay";

/// Build the relay callback URL for `target`.
///
/// Query values are form-encoded, so decoding the `url` parameter yields
/// `target` back verbatim. No validation happens here: the callback is
/// validated when the client dereferences it.
pub fn build_proxy_url(
    proxy_base: &str,
    target: &Url,
    referer: Option<&str>,
    user_agent: Option<&str>,
) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    query.append_pair("url", target.as_str());
    if let Some(referer) = referer.filter(|r| !r.is_empty()) {
        query.append_pair("referer", referer);
    }
    if let Some(ua) = user_agent.filter(|ua| !ua.is_empty()) {
        query.append_pair("ua", ua);
    }

    format!(
        "{}{}?{}",
        proxy_base.trim_end_matches('/'),
        RELAY_PATH,
        query.finish()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn query_of(callback: &str) -> HashMap<String, String> {
        Url::parse(callback)
            .unwrap()
            .query_pairs()
            .into_owned()
            .collect()
    }

    #[test]
    fn builds_minimal_callback() {
        let target = Url::parse("https://cdn.example.com/path/key.bin").unwrap();
        let callback = build_proxy_url("https://relay.example.org", &target, None, None);

        assert_eq!(
            callback,
            "https://relay.example.org/relay?url=https%3A%2F%2Fcdn.example.com%2Fpath%2Fkey.bin"
        );
    }

    #[test]
    fn appends_referer_and_user_agent() {
        let target = Url::parse("https://cdn.example.com/a.ts").unwrap();
        let callback = build_proxy_url(
            "https://relay.example.org",
            &target,
            Some("https://player.example.net/watch?v=1"),
            Some("Mozilla/5.0 (X11; Linux x86_64)"),
        );

        let query = query_of(&callback);
        assert_eq!(query["url"], "https://cdn.example.com/a.ts");
        assert_eq!(query["referer"], "https://player.example.net/watch?v=1");
        assert_eq!(query["ua"], "Mozilla/5.0 (X11; Linux x86_64)");
    }

    #[test]
    fn empty_optionals_are_omitted() {
        let target = Url::parse("https://cdn.example.com/a.ts").unwrap();
        let callback = build_proxy_url("https://relay.example.org", &target, Some(""), Some(""));

        let query = query_of(&callback);
        assert_eq!(query.len(), 1);
    }

    #[test]
    fn trailing_slash_on_base_is_trimmed() {
        let target = Url::parse("https://cdn.example.com/a.ts").unwrap();
        let callback = build_proxy_url("https://relay.example.org/", &target, None, None);
        assert!(callback.starts_with("https://relay.example.org/relay?url="));
    }

    #[test]
    fn target_survives_decoding() {
        for raw in [
            "https://cdn.example.com/live/index.m3u8",
            "https://cdn.example.com/seg%201.ts?token=a+b&sig=x%3Dy#frag",
            "http://[2001:db8::1]:8080/a/b.m3u8?x=1&y=2",
            "https://cdn.example.com/path?redirect=https://other.example.com/?q=1",
        ] {
            let target = Url::parse(raw).unwrap();
            let callback = build_proxy_url("https://relay.example.org", &target, None, None);
            let decoded = Url::parse(&query_of(&callback)["url"]).unwrap();
            assert_eq!(decoded, target, "{raw}");
        }
    }
}
