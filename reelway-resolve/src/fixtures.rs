//! In-memory page fetcher for resolver tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::errors::ResolveError;
use crate::fetch::PageFetcher;

/// A fetch the fixture has served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRecord {
    pub url: String,
    pub referer: String,
}

/// Serves canned page bodies keyed by URL.
///
/// Unknown URLs fail with a 404 `Network` error. Every call is recorded,
/// including failed ones.
#[derive(Debug, Clone, Default)]
pub struct FixtureFetcher {
    pages: HashMap<String, String>,
    requests: Arc<Mutex<Vec<FetchRecord>>>,
}

impl FixtureFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a page body served for `url`.
    pub fn with_page(mut self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.pages.insert(url.into(), body.into());
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<FetchRecord> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl PageFetcher for FixtureFetcher {
    async fn fetch(&self, url: &str, referer: &str) -> Result<String, ResolveError> {
        self.requests.lock().push(FetchRecord {
            url: url.to_string(),
            referer: referer.to_string(),
        });
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| ResolveError::Network {
                url: url.to_string(),
                reason: "HTTP 404 Not Found".to_string(),
            })
    }
}
