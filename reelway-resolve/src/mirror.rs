//! Mirror classification of extracted media URLs.

use url::Url;

use crate::types::MirrorKind;

/// Classifies an extracted media URL, or `None` for an unrecognized host.
///
/// Playable file extensions win over everything else. Recognized but
/// unsupported hosts are checked before the generic HLS markers so a
/// StreamTape link that happens to mention "hls" is still rejected.
pub fn classify(media_url: &str) -> Option<MirrorKind> {
    let lower = media_url.to_ascii_lowercase();
    let parsed = Url::parse(media_url).ok();
    let path = parsed
        .as_ref()
        .map(|url| url.path().to_ascii_lowercase())
        .unwrap_or_else(|| lower.split(['?', '#']).next().unwrap_or_default().to_string());
    let host = parsed
        .as_ref()
        .and_then(|url| url.host_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    if path.ends_with(".m3u8") || path.ends_with(".mp4") || is_direct_hls_host(&host) {
        return Some(MirrorKind::DirectFile);
    }
    if lower.contains("streamtape") {
        return Some(MirrorKind::StreamTape);
    }
    if lower.contains("uperbox") {
        return Some(MirrorKind::UperBox);
    }
    if lower.contains("vcdnlare.com") {
        return Some(MirrorKind::VcdnGateway);
    }
    if lower.contains("vcdnx.com") || lower.contains("hls") {
        return Some(MirrorKind::HlsGateway);
    }
    None
}

// hlsN.vcdnx.com serves playlists directly
fn is_direct_hls_host(host: &str) -> bool {
    host.strip_suffix(".vcdnx.com")
        .and_then(|label| label.strip_prefix("hls"))
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}
