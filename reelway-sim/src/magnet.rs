//! Synthetic magnet links for local files.

use std::io;
use std::path::Path;

use sha1::{Digest, Sha1};

/// Builds a stable magnet link identifying `path`.
///
/// The info hash is derived from the file name and size, so the same file
/// always maps to the same magnet without hashing its contents.
///
/// # Errors
/// - `io::Error` - The file metadata could not be read
pub fn magnet_for_file(path: &Path) -> Result<String, io::Error> {
    let size = std::fs::metadata(path)?.len();
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "reelway-sim".to_string());

    let mut hasher = Sha1::new();
    hasher.update(name.as_bytes());
    hasher.update(size.to_le_bytes());
    let hash = hasher.finalize();

    Ok(format!(
        "magnet:?xt=urn:btih:{}&dn={}",
        hex::encode(hash),
        urlencoding::encode(&name)
    ))
}
