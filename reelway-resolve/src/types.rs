//! Data types for mirror resolution.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A page believed to host a video. Opaque input, never modified.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentReference {
    pub source_url: String,
}

impl ContentReference {
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
        }
    }
}

/// What a resolved stream points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamKind {
    /// A URL the player can open directly
    DirectMedia,
    /// A magnet link that needs a download session
    Magnet,
}

/// Result of a successful resolution. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedStream {
    pub kind: StreamKind,
    pub url: String,
}

impl ResolvedStream {
    pub fn direct(url: impl Into<String>) -> Self {
        Self {
            kind: StreamKind::DirectMedia,
            url: url.into(),
        }
    }

    pub fn magnet(url: impl Into<String>) -> Self {
        Self {
            kind: StreamKind::Magnet,
            url: url.into(),
        }
    }
}

/// Hosting flavour of an extracted media URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MirrorKind {
    /// Playable as-is (`.mp4`, `.m3u8`, direct HLS host)
    DirectFile,
    /// HLS player page that embeds the playlist URL
    HlsGateway,
    /// vcdn landing page that embeds the HLS host URL
    VcdnGateway,
    /// Recognized, not supported
    StreamTape,
    /// Recognized, not supported
    UperBox,
}

impl MirrorKind {
    /// Whether resolution can proceed for this kind.
    pub fn is_supported(self) -> bool {
        !matches!(self, Self::StreamTape | Self::UperBox)
    }

    /// Whether one more page fetch is needed to reach the media URL.
    pub fn is_gateway(self) -> bool {
        matches!(self, Self::HlsGateway | Self::VcdnGateway)
    }
}

impl fmt::Display for MirrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DirectFile => "direct-file",
            Self::HlsGateway => "hls-gateway",
            Self::VcdnGateway => "vcdn-gateway",
            Self::StreamTape => "streamtape",
            Self::UperBox => "uperbox",
        };
        f.write_str(name)
    }
}
