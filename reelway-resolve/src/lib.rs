//! Reelway Resolve - mirror page resolution
//!
//! Turns a page believed to host a video into either a direct media URL or
//! a magnet link, using ordered regex extraction rules and at most one
//! gateway hop.

pub mod errors;
pub mod fetch;
#[cfg(any(test, feature = "test-utils"))]
pub mod fixtures;
pub mod mirror;
pub mod resolver;
pub mod rules;
pub mod types;

pub use errors::ResolveError;
pub use fetch::{HttpPageFetcher, PageFetcher};
pub use mirror::classify;
pub use resolver::MirrorResolver;
pub use types::{ContentReference, MirrorKind, ResolvedStream, StreamKind};

impl ResolveError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            ResolveError::NotFound { .. } => {
                "No playable stream was found on this page".to_string()
            }
            ResolveError::Network { .. } => {
                "Could not reach the page. Check your connection and try again".to_string()
            }
            ResolveError::UnsupportedMirror { mirror, .. } => {
                format!("The {mirror} mirror is not supported, try another mirror")
            }
            ResolveError::InvalidUrl { .. } => "Invalid page URL".to_string(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(self, ResolveError::InvalidUrl { .. })
    }
}
