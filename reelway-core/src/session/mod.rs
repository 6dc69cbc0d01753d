//! Download session management
//!
//! Owns at most one download session at a time, converts the external
//! engine's events into a documented state machine, and exposes how much of
//! the session file is safe to stream.

mod actor;
pub mod availability;
mod commands;
pub mod engine;
mod handle;
pub mod magnet;
mod record;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_mocks;

pub use actor::spawn_session_manager;
pub use availability::{
    Availability, AvailabilityError, AvailabilityWatch, DetachedBinder, FileBinding,
    PriorityRequester, StreamBinder,
};
pub use engine::{ByteRange, DownloadEngine, EngineEvent, EngineEventSender, EngineRequest};
pub use handle::{SessionHandle, SessionManagerHandle, SessionUpdates};
pub use magnet::{InfoHash, MagnetLink};
pub use record::{DownloadSession, SessionFile, SessionState};

/// Errors that can occur while managing a download session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Download engine failure: {reason}")]
    Engine { reason: String },

    #[error("Invalid magnet link: {reason}")]
    InvalidMagnet { reason: String },

    #[error("No active download session")]
    NoActiveSession,

    #[error("Session manager has shut down")]
    ManagerShutdown,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
