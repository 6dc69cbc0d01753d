//! Shared fixtures for integration tests.

use std::path::Path;
use std::time::Duration;

use reelway_core::config::ServerConfig;

pub const MAGNET: &str = "magnet:?xt=urn:btih:c12fe1c06bba254a9dc9f519b335aa7c1367a88a&dn=Film";

/// Deterministic media bytes of `len` bytes.
pub fn media_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 251) as u8).collect()
}

pub fn write_media(dir: &Path, name: &str, len: usize) -> (std::path::PathBuf, Vec<u8>) {
    let data = media_bytes(len);
    let path = dir.join(name);
    std::fs::write(&path, &data).unwrap();
    (path, data)
}

pub fn server_config(availability_timeout: Duration) -> ServerConfig {
    ServerConfig {
        port: 0,
        availability_timeout,
        chunk_size: 4096,
        content_type_fallback: "video/mp4",
    }
}

/// HTTP client that never goes through a proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

pub fn header<'a>(response: &'a reqwest::Response, name: &str) -> &'a str {
    response.headers()[name].to_str().unwrap()
}
