//! Reelway Core - download sessions and playback readiness
//!
//! This crate owns the single live download session: it drives an external
//! download engine, folds the engine's events into a consistent session
//! record, tracks how many bytes are safe to stream, and decides when the
//! player may start.

pub mod config;
pub mod readiness;
pub mod session;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use config::ReelwayConfig;
pub use readiness::{ReadinessDecision, ReadinessGate, ReadinessThreshold};
pub use session::{
    AvailabilityError, DownloadEngine, DownloadSession, SessionError, SessionManagerHandle,
    SessionState, spawn_session_manager,
};

/// Core errors that can bubble up from any Reelway subsystem.
#[derive(Debug, thiserror::Error)]
pub enum ReelwayError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Availability error: {0}")]
    Availability(#[from] AvailabilityError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReelwayError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            ReelwayError::Session(e) => match e {
                SessionError::InvalidMagnet { reason } => format!("Invalid magnet link: {reason}"),
                SessionError::Engine { reason } => format!("Download failed: {reason}"),
                SessionError::NoActiveSession => "No download is running".to_string(),
                _ => "Download error occurred".to_string(),
            },
            ReelwayError::Availability(AvailabilityError::Timeout { .. }) => {
                "Timed out waiting for the download to catch up".to_string()
            }
            ReelwayError::Availability(AvailabilityError::Cancelled) => {
                "Download was stopped".to_string()
            }
            ReelwayError::Configuration { .. } => "Configuration error occurred".to_string(),
            ReelwayError::Io(_) => "File system error occurred".to_string(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            ReelwayError::Configuration { .. }
                | ReelwayError::Session(SessionError::InvalidMagnet { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, ReelwayError>;
