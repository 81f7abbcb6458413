//! Line-oriented manifest rewriting.
//!
//! The rewrite works on raw text instead of a parsed playlist so that tags
//! the parser does not model (LL-HLS parts, vendor extensions, session data)
//! survive untouched. Two kinds of references are rewritten:
//!
//! 1. `URI="..."` attributes on tag lines (`#EXT-X-KEY`, `#EXT-X-MAP`,
//!    `#EXT-X-MEDIA`, `#EXT-X-PART`, `#EXT-X-PRELOAD-HINT`, ...)
//! 2. Bare reference lines (variant playlists and media segments)
//!
//! Anything that does not resolve to an http(s) URL is left exactly as it
//! was, one occurrence at a time.

use crate::hls::proxy_url::build_proxy_url;
use crate::metrics;
use std::borrow::Cow;
use tracing::debug;
use url::Url;

const URI_ATTRIBUTE: &str = "uri=\"";

/// Inputs shared by every line of one rewrite pass.
#[derive(Debug, Clone)]
pub struct RewriteContext {
    /// Public origin of the relay, e.g. `https://relay.example.org`
    pub proxy_base: String,
    /// Referer forwarded on callbacks
    pub referer: Option<String>,
    /// User-agent forwarded on callbacks
    pub user_agent: String,
    /// Final (post-redirect) location of the manifest being rewritten
    pub base_url: Url,
}

impl RewriteContext {
    /// Resolve `reference` against the manifest location.
    ///
    /// Returns `None` for empty references, resolution failures and
    /// non-http(s) results such as `data:` or `skd://` key URIs.
    fn resolve(&self, reference: &str) -> Option<Url> {
        let reference = reference.trim();
        if reference.is_empty() {
            return None;
        }

        self.base_url
            .join(reference)
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https"))
    }

    fn callback(&self, target: &Url) -> String {
        build_proxy_url(
            &self.proxy_base,
            target,
            self.referer.as_deref(),
            Some(self.user_agent.as_str()),
        )
    }
}

/// Rewrite every URI reference in `manifest` to a relay callback.
///
/// Line order, blank lines and line endings (`\n` or `\r\n`) are preserved.
pub fn rewrite_playlist(manifest: &str, ctx: &RewriteContext) -> String {
    let mut output = String::with_capacity(manifest.len() * 2);
    let mut rewritten = 0usize;

    for (index, line) in manifest.split('\n').enumerate() {
        if index > 0 {
            output.push('\n');
        }
        let (line, count) = rewrite_line(line, ctx);
        output.push_str(&line);
        rewritten += count;
    }

    debug!(
        "Rewrote {} URI references in manifest from {}",
        rewritten, ctx.base_url
    );
    metrics::record_rewritten_uris(rewritten);

    output
}

/// Rewrite one line, returning it together with the number of references
/// replaced.
fn rewrite_line<'a>(line: &'a str, ctx: &RewriteContext) -> (Cow<'a, str>, usize) {
    let (content, line_ending) = match line.strip_suffix('\r') {
        Some(content) => (content, "\r"),
        None => (line, ""),
    };

    let trimmed = content.trim();
    if trimmed.is_empty() {
        return (Cow::Borrowed(line), 0);
    }

    if trimmed.starts_with('#') {
        return match rewrite_uri_attributes(content, ctx) {
            (Some(rewritten), count) => (Cow::Owned(rewritten + line_ending), count),
            (None, _) => (Cow::Borrowed(line), 0),
        };
    }

    match ctx.resolve(trimmed) {
        Some(target) => (Cow::Owned(ctx.callback(&target) + line_ending), 1),
        None => (Cow::Borrowed(line), 0),
    }
}

/// Replace the value of each `URI="..."` attribute on a tag line.
///
/// Returns `None` when nothing on the line was replaced.
fn rewrite_uri_attributes(line: &str, ctx: &RewriteContext) -> (Option<String>, usize) {
    // ASCII lowercasing keeps byte offsets aligned with `line`.
    let lower = line.to_ascii_lowercase();
    let mut output = String::new();
    let mut copied_to = 0;
    let mut search_from = 0;
    let mut count = 0;

    while let Some(found) = lower[search_from..].find(URI_ATTRIBUTE) {
        let attr_start = search_from + found;
        let value_start = attr_start + URI_ATTRIBUTE.len();
        let Some(value_len) = line[value_start..].find('"') else {
            break;
        };
        let value_end = value_start + value_len;
        search_from = value_end + 1;

        if !is_attribute_start(line, attr_start) {
            continue;
        }

        if let Some(target) = ctx.resolve(&line[value_start..value_end]) {
            output.push_str(&line[copied_to..value_start]);
            output.push_str(&ctx.callback(&target));
            copied_to = value_end;
            count += 1;
        }
    }

    if count == 0 {
        return (None, 0);
    }

    output.push_str(&line[copied_to..]);
    (Some(output), count)
}

/// An attribute name starts the tag value or follows a separator.
fn is_attribute_start(line: &str, offset: usize) -> bool {
    offset == 0
        || matches!(
            line.as_bytes()[offset - 1],
            b':' | b',' | b' ' | b'\t'
        )
}
