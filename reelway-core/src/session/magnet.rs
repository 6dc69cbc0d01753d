//! Magnet link parsing

use std::fmt;

use serde::{Serialize, Serializer};

use super::SessionError;

/// SHA-1 hash identifying the content of a magnet link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    /// Creates InfoHash from 20-byte SHA-1 hash.
    pub fn new(hash: [u8; 20]) -> Self {
        Self(hash)
    }

    /// Returns reference to underlying 20-byte hash.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl Serialize for InfoHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// A validated magnet link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagnetLink {
    /// The magnet URI exactly as supplied
    pub uri: String,
    pub info_hash: InfoHash,
    pub display_name: Option<String>,
    pub trackers: Vec<String>,
}

impl MagnetLink {
    /// Parses a magnet URI and extracts its `btih` info hash.
    ///
    /// Both the 40-character hex and the 32-character base32 forms of the
    /// info hash are accepted.
    ///
    /// # Errors
    /// - `SessionError::InvalidMagnet` - Malformed URI or missing/invalid info hash
    pub fn parse(uri: &str) -> Result<Self, SessionError> {
        let magnet = magnet_url::Magnet::new(uri).map_err(|e| SessionError::InvalidMagnet {
            reason: format!("{e}"),
        })?;

        let topic = uri
            .split_once('?')
            .map(|(_, query)| query)
            .unwrap_or_default()
            .split('&')
            .find_map(|param| param.strip_prefix("xt=urn:btih:"))
            .ok_or_else(|| SessionError::InvalidMagnet {
                reason: "missing xt=urn:btih parameter".to_string(),
            })?;

        Ok(Self {
            uri: uri.to_string(),
            info_hash: parse_info_hash(topic)?,
            display_name: magnet.display_name().map(|s| s.to_string()),
            trackers: magnet.trackers().to_vec(),
        })
    }
}

fn parse_info_hash(topic: &str) -> Result<InfoHash, SessionError> {
    let bytes = match topic.len() {
        40 => hex::decode(topic).map_err(|e| SessionError::InvalidMagnet {
            reason: format!("invalid hex info hash: {e}"),
        })?,
        32 => decode_base32(topic).ok_or_else(|| SessionError::InvalidMagnet {
            reason: format!("invalid base32 info hash: {topic}"),
        })?,
        other => {
            return Err(SessionError::InvalidMagnet {
                reason: format!("invalid info hash length: {other} (expected 40 or 32)"),
            });
        }
    };

    let hash: [u8; 20] = bytes
        .try_into()
        .map_err(|_| SessionError::InvalidMagnet {
            reason: "info hash is not 20 bytes".to_string(),
        })?;
    Ok(InfoHash::new(hash))
}

/// RFC 4648 base32 without padding, as used by older magnet links.
fn decode_base32(input: &str) -> Option<Vec<u8>> {
    let mut output = Vec::with_capacity(input.len() * 5 / 8);
    let mut buffer: u64 = 0;
    let mut bits = 0;

    for c in input.bytes() {
        let value = match c.to_ascii_uppercase() {
            b @ b'A'..=b'Z' => b - b'A',
            b @ b'2'..=b'7' => b - b'2' + 26,
            _ => return None,
        };
        buffer = (buffer << 5) | u64::from(value);
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            output.push((buffer >> bits) as u8);
            buffer &= (1 << bits) - 1;
        }
    }

    Some(output)
}
