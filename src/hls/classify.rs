use url::Url;

/// Content types that identify an HLS manifest.
const PLAYLIST_CONTENT_TYPES: &[&str] = &["application/vnd.apple.mpegurl", "application/x-mpegurl"];

/// Decide whether an upstream response is manifest text to rewrite.
///
/// Some origins serve manifests as `text/plain` or `application/octet-stream`,
/// so a `.m3u8` path on the final URL also counts.
pub fn is_playlist(content_type: Option<&str>, final_url: &Url) -> bool {
    let by_type = content_type.is_some_and(|ct| {
        let ct = ct.to_ascii_lowercase();
        PLAYLIST_CONTENT_TYPES.iter().any(|known| ct.contains(known))
    });

    by_type || final_url.path().contains(".m3u8")
}
