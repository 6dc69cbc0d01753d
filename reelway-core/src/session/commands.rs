//! Command definitions for the session manager actor.

use tokio::sync::oneshot;
use uuid::Uuid;

use super::SessionError;
use super::handle::SessionHandle;

/// Commands that can be sent to the session manager actor.
///
/// Each command carries a response channel; the actor processes them one at
/// a time on the same task that consumes engine events.
pub enum SessionCommand {
    /// Stop any active session, then start a new one for the magnet link.
    Start {
        magnet: String,
        responder: oneshot::Sender<Result<SessionHandle, SessionError>>,
    },
    /// Stop the active session and delete its files.
    Stop {
        responder: oneshot::Sender<Result<(), SessionError>>,
    },
    /// Stop the session only if `id` is still the current one.
    ///
    /// Answers whether a session was stopped.
    StopIfCurrent {
        id: Uuid,
        responder: oneshot::Sender<bool>,
    },
    /// Stop the active session and end the actor.
    Shutdown { responder: oneshot::Sender<()> },
}
