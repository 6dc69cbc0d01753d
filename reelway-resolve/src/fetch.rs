//! Upstream page fetching.

use async_trait::async_trait;
use reelway_core::config::ResolverConfig;
use reqwest::header::REFERER;
use tracing::debug;
use url::Url;

use crate::errors::ResolveError;

/// Capability to fetch a page body.
///
/// Injected into the resolver so extraction can be exercised against
/// fixtures without network access.
#[async_trait]
pub trait PageFetcher: Send + Sync + std::fmt::Debug {
    /// Fetches `url` as text, sending `referer` as the `Referer` header.
    ///
    /// # Errors
    /// - `ResolveError::Network` - Transport failure or non-success status
    async fn fetch(&self, url: &str, referer: &str) -> Result<String, ResolveError>;
}

/// Production fetcher backed by reqwest.
///
/// Every request carries the configured desktop user agent; mirrors reject
/// anything that looks like a bot.
#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    client: reqwest::Client,
}

impl HttpPageFetcher {
    /// Builds the HTTP client from resolver configuration.
    ///
    /// # Errors
    /// - `reqwest::Error` - TLS backend or client construction failed
    pub fn new(config: &ResolverConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent)
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str, referer: &str) -> Result<String, ResolveError> {
        debug!("Fetching {} (referer {})", url, referer);

        let response = self
            .client
            .get(url)
            .header(REFERER, referer)
            .send()
            .await
            .map_err(|e| ResolveError::Network {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::Network {
                url: url.to_string(),
                reason: format!("HTTP {status}"),
            });
        }

        response.text().await.map_err(|e| ResolveError::Network {
            url: url.to_string(),
            reason: format!("failed to read body: {e}"),
        })
    }
}

/// Home page of the site hosting `source_url`, e.g. `https://site.example/`.
///
/// # Errors
/// - `ResolveError::InvalidUrl` - Not an absolute http(s) URL
pub fn home_page(source_url: &str) -> Result<String, ResolveError> {
    let invalid = |reason: &str| ResolveError::InvalidUrl {
        url: source_url.to_string(),
        reason: reason.to_string(),
    };

    let parsed = Url::parse(source_url).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid("only http and https pages can be resolved"));
    }
    if parsed.host_str().is_none() {
        return Err(invalid("missing host"));
    }

    Ok(format!("{}/", parsed.origin().ascii_serialization()))
}

/// Makes an extracted reference absolute against the page it came from.
///
/// Absolute http(s) URLs are returned untouched.
pub fn absolutize(page_url: &str, candidate: &str) -> String {
    if candidate.starts_with("http://") || candidate.starts_with("https://") {
        return candidate.to_string();
    }
    Url::parse(page_url)
        .and_then(|base| base.join(candidate))
        .map(|joined| joined.to_string())
        .unwrap_or_else(|_| candidate.to_string())
}
