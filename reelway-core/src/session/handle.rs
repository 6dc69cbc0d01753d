//! Handles for communicating with the session manager actor.

use std::path::PathBuf;

use tokio::sync::{mpsc, oneshot, watch};
use uuid::Uuid;

use super::SessionError;
use super::commands::SessionCommand;
use super::magnet::InfoHash;
use super::record::DownloadSession;

/// Latest published session record, `None` before the first start.
pub type SessionUpdates = watch::Receiver<Option<DownloadSession>>;

/// Handle for communicating with the session manager actor.
///
/// Cheap to clone and safe to share. Reads go through the published
/// snapshot and never wait on the actor.
#[derive(Clone)]
pub struct SessionManagerHandle {
    sender: mpsc::Sender<SessionCommand>,
    snapshots: SessionUpdates,
}

impl SessionManagerHandle {
    pub(crate) fn new(sender: mpsc::Sender<SessionCommand>, snapshots: SessionUpdates) -> Self {
        Self { sender, snapshots }
    }

    /// Starts a download session for `magnet`.
    ///
    /// Any active session is fully stopped first.
    ///
    /// # Errors
    /// - `SessionError::InvalidMagnet` - Malformed magnet link
    /// - `SessionError::Engine` - The engine failed to start
    /// - `SessionError::Io` - The save directory could not be created
    /// - `SessionError::ManagerShutdown` - The actor is gone
    pub async fn start(&self, magnet: &str) -> Result<SessionHandle, SessionError> {
        let (responder, rx) = oneshot::channel();
        let cmd = SessionCommand::Start {
            magnet: magnet.to_string(),
            responder,
        };

        self.sender
            .send(cmd)
            .await
            .map_err(|_| SessionError::ManagerShutdown)?;

        rx.await.map_err(|_| SessionError::ManagerShutdown)?
    }

    /// Stops the active session, unbinds the server and deletes its files.
    ///
    /// Succeeds when there is nothing to stop.
    ///
    /// # Errors
    /// - `SessionError::ManagerShutdown` - The actor is gone
    pub async fn stop(&self) -> Result<(), SessionError> {
        let (responder, rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::Stop { responder })
            .await
            .map_err(|_| SessionError::ManagerShutdown)?;

        rx.await.map_err(|_| SessionError::ManagerShutdown)?
    }

    /// Stops session `id` if no other session has replaced it since.
    ///
    /// The check and the stop happen in one actor step, so a concurrent
    /// `start` is never torn down. Returns whether `id` was stopped.
    ///
    /// # Errors
    /// - `SessionError::ManagerShutdown` - The actor is gone
    pub async fn stop_if_current(&self, id: Uuid) -> Result<bool, SessionError> {
        let (responder, rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::StopIfCurrent { id, responder })
            .await
            .map_err(|_| SessionError::ManagerShutdown)?;

        rx.await.map_err(|_| SessionError::ManagerShutdown)
    }

    /// Stops the active session and terminates the actor.
    ///
    /// # Errors
    /// - `SessionError::ManagerShutdown` - The actor was already gone
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        let (responder, rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::Shutdown { responder })
            .await
            .map_err(|_| SessionError::ManagerShutdown)?;

        rx.await.map_err(|_| SessionError::ManagerShutdown)
    }

    /// Consistent snapshot of the current session record.
    pub fn current_state(&self) -> Option<DownloadSession> {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified after every change to the session record.
    pub fn subscribe(&self) -> SessionUpdates {
        self.snapshots.clone()
    }
}

/// Identity of one started session plus a subscription to its updates.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: Uuid,
    pub info_hash: InfoHash,
    pub save_dir: PathBuf,
    updates: SessionUpdates,
}

impl SessionHandle {
    pub(crate) fn new(session: &DownloadSession, updates: SessionUpdates) -> Self {
        Self {
            id: session.id,
            info_hash: session.info_hash,
            save_dir: session.save_dir.clone(),
            updates,
        }
    }

    /// Latest record of this session, `None` once another session replaced it.
    pub fn snapshot(&self) -> Option<DownloadSession> {
        self.updates
            .borrow()
            .as_ref()
            .filter(|session| session.id == self.id)
            .cloned()
    }

    /// Waits for the next published update.
    ///
    /// # Errors
    /// - `SessionError::ManagerShutdown` - The actor is gone
    pub async fn changed(&mut self) -> Result<(), SessionError> {
        self.updates
            .changed()
            .await
            .map_err(|_| SessionError::ManagerShutdown)
    }
}
