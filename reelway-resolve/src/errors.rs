//! Error types for mirror resolution.

use thiserror::Error;

/// Errors that can occur while resolving a content reference.
///
/// Variants stay distinct so callers can tell a dead page from an
/// unsupported mirror and pick a different page or mirror accordingly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// No extraction rule matched the fetched page.
    #[error("No {what} found at {url}")]
    NotFound {
        /// Page that was searched
        url: String,
        /// What was being looked for
        what: &'static str,
    },

    /// The page could not be fetched.
    #[error("Network error fetching {url}: {reason}")]
    Network {
        /// Page that failed to load
        url: String,
        /// Transport or HTTP status failure
        reason: String,
    },

    /// The page links to a mirror that is recognized but not implemented.
    #[error("Unsupported mirror {mirror}: {url}")]
    UnsupportedMirror {
        /// Mirror kind, or "unknown" for unrecognized hosts
        mirror: String,
        /// The extracted mirror URL
        url: String,
    },

    /// The content reference is not an absolute http(s) URL.
    #[error("Invalid content reference {url}: {reason}")]
    InvalidUrl {
        /// The rejected reference
        url: String,
        /// Why it was rejected
        reason: String,
    },
}
