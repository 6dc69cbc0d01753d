//! Session manager actor.
//!
//! One task owns the live session. Commands from handles, prioritization
//! requests from the range server and events from the engine are all
//! consumed here, in order, so the published record is never half-updated.

use std::path::Path;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::availability::{
    Availability, AvailabilityWatch, FileBinding, PriorityRequester, StreamBinder,
};
use super::commands::SessionCommand;
use super::engine::{ByteRange, DownloadEngine, EngineEvent, EngineRequest};
use super::handle::{SessionHandle, SessionManagerHandle};
use super::magnet::MagnetLink;
use super::record::{DownloadSession, SessionState};
use super::SessionError;
use crate::config::SessionConfig;

/// Spawns the session manager actor and returns its handle.
///
/// The manager drives `engine` and hands the session file to `binder` once
/// the engine reports it ready for streaming.
///
/// # Examples
/// ```rust,no_run
/// # #[tokio::main]
/// # async fn main() {
/// use reelway_core::config::SessionConfig;
/// use reelway_core::session::{DetachedBinder, spawn_session_manager};
/// # fn engine() -> Box<dyn reelway_core::DownloadEngine> { unimplemented!() }
///
/// let handle = spawn_session_manager(SessionConfig::default(), engine(), DetachedBinder);
/// let session = handle.start("magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567").await;
/// # }
/// ```
pub fn spawn_session_manager<E, B>(config: SessionConfig, engine: E, binder: B) -> SessionManagerHandle
where
    E: DownloadEngine,
    B: StreamBinder + 'static,
{
    let (sender, receiver) = mpsc::channel(config.command_buffer);
    let (priority_sender, priority_receiver) = mpsc::channel(config.priority_buffer);
    let (snapshot_sender, snapshot_receiver) = watch::channel(None);

    let manager = SessionManager {
        config,
        engine,
        binder,
        current: None,
        snapshots: snapshot_sender,
        priorities: priority_sender,
    };

    tokio::spawn(async move {
        run_actor_loop(manager, receiver, priority_receiver).await;
    });

    SessionManagerHandle::new(sender, snapshot_receiver)
}

/// The session plus the channels that exist only while it lives.
struct ActiveSession {
    record: DownloadSession,
    availability: Option<(watch::Sender<Availability>, AvailabilityWatch)>,
    bound: bool,
}

impl ActiveSession {
    fn new(record: DownloadSession) -> Self {
        Self {
            record,
            availability: None,
            bound: false,
        }
    }

    /// Publishes the record's contiguous bytes to availability waiters.
    fn sync_availability(&mut self) {
        let Some(file) = self.record.file.as_ref() else {
            return;
        };

        let (sender, _) = self
            .availability
            .get_or_insert_with(|| AvailabilityWatch::channel(file.total_size_bytes));
        let contiguous = file.contiguous_available_bytes;
        sender.send_if_modified(|availability| {
            if availability.contiguous_bytes == contiguous {
                return false;
            }
            availability.contiguous_bytes = contiguous;
            true
        });
    }

    /// Wakes every waiter with a cancellation.
    fn close_availability(&mut self) {
        if let Some((sender, _)) = self.availability.take() {
            sender.send_modify(|availability| availability.closed = true);
        }
    }
}

struct SessionManager<E, B> {
    config: SessionConfig,
    engine: E,
    binder: B,
    current: Option<ActiveSession>,
    snapshots: watch::Sender<Option<DownloadSession>>,
    priorities: mpsc::Sender<ByteRange>,
}

/// Runs the main actor message processing loop.
async fn run_actor_loop<E, B>(
    mut manager: SessionManager<E, B>,
    mut commands: mpsc::Receiver<SessionCommand>,
    mut priorities: mpsc::Receiver<ByteRange>,
) where
    E: DownloadEngine,
    B: StreamBinder,
{
    debug!("Session manager actor started");
    let mut events: Option<mpsc::UnboundedReceiver<EngineEvent>> = None;

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else { break };
                if !manager.handle_command(command, &mut events).await {
                    break;
                }
            }
            Some(range) = priorities.recv() => manager.prioritize(range).await,
            event = next_event(&mut events) => match event {
                Some(event) => manager.apply_event(event),
                None => {
                    debug!("Engine event stream closed");
                    events = None;
                }
            },
        }
    }

    manager.stop_current().await;
    debug!("Session manager actor stopped");
}

async fn next_event(events: &mut Option<mpsc::UnboundedReceiver<EngineEvent>>) -> Option<EngineEvent> {
    match events {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

impl<E, B> SessionManager<E, B>
where
    E: DownloadEngine,
    B: StreamBinder,
{
    /// Handles a single command. Returns false to shut the actor down.
    async fn handle_command(
        &mut self,
        command: SessionCommand,
        events: &mut Option<mpsc::UnboundedReceiver<EngineEvent>>,
    ) -> bool {
        match command {
            SessionCommand::Start { magnet, responder } => {
                let result = self.start(&magnet, events).await;
                let _ = responder.send(result);
            }
            SessionCommand::Stop { responder } => {
                *events = None;
                self.stop_current().await;
                let _ = responder.send(Ok(()));
            }
            SessionCommand::StopIfCurrent { id, responder } => {
                let is_current = self
                    .current
                    .as_ref()
                    .is_some_and(|active| active.record.id == id);
                if is_current {
                    *events = None;
                    self.stop_current().await;
                } else {
                    debug!("Session {} is no longer current, leaving it alone", id);
                }
                let _ = responder.send(is_current);
            }
            SessionCommand::Shutdown { responder } => {
                debug!("Session manager shutting down");
                *events = None;
                self.stop_current().await;
                let _ = responder.send(());
                return false;
            }
        }
        true
    }

    async fn start(
        &mut self,
        magnet: &str,
        events: &mut Option<mpsc::UnboundedReceiver<EngineEvent>>,
    ) -> Result<SessionHandle, SessionError> {
        let magnet = MagnetLink::parse(magnet)?;

        *events = None;
        self.stop_current().await;

        let record = DownloadSession::new(&magnet, &self.config.download_root);
        tokio::fs::create_dir_all(&record.save_dir).await?;

        info!(
            "Starting session {} for {} in {}",
            record.id,
            magnet.info_hash,
            record.save_dir.display()
        );

        let request = EngineRequest {
            magnet,
            save_dir: record.save_dir.clone(),
            events: {
                let (sender, receiver) = mpsc::unbounded_channel();
                *events = Some(receiver);
                sender
            },
        };
        self.current = Some(ActiveSession::new(record));
        self.publish();

        if let Err(e) = self.engine.start(request).await {
            error!("Engine failed to start: {}", e);
            *events = None;
            if let Some(active) = self.current.as_mut() {
                active.record.mark_failed(e.to_string());
            }
            self.publish();
            return Err(e);
        }

        let active = self.current.as_ref().ok_or(SessionError::NoActiveSession)?;
        Ok(SessionHandle::new(&active.record, self.snapshots.subscribe()))
    }

    /// Tears down the current session: engine, server binding, files.
    async fn stop_current(&mut self) {
        let Some(active) = self.current.as_mut() else {
            return;
        };
        if active.record.state == SessionState::Stopped {
            return;
        }

        let id = active.record.id;
        info!("Stopping session {}", id);

        if let Err(e) = self.engine.stop().await {
            warn!("Engine teardown failed for session {}: {}", id, e);
        }
        self.binder.unbind();
        active.bound = false;
        active.close_availability();
        active.record.mark_stopped();

        remove_save_dir(&active.record.save_dir).await;
        self.publish();
    }

    async fn prioritize(&mut self, range: ByteRange) {
        let Some(active) = self.current.as_ref() else {
            return;
        };
        if !active.record.state.is_active() {
            return;
        }
        if range.end < active.record.contiguous_available_bytes() {
            return;
        }

        debug!(
            "Prioritizing bytes {}-{} for session {}",
            range.start, range.end, active.record.id
        );
        self.engine.prioritize(range).await;
    }

    fn apply_event(&mut self, event: EngineEvent) {
        let Some(active) = self.current.as_mut() else {
            return;
        };

        let before = active.record.state;
        active.record.apply(&event);
        active.sync_availability();
        let after = active.record.state;

        if before != after {
            debug!("Session {} moved {} -> {}", active.record.id, before, after);
        }

        if after == SessionState::Ready && !active.bound {
            if let (Some(file), Some((_, watch))) = (&active.record.file, &active.availability) {
                info!(
                    "Session {} ready, serving {} ({} bytes)",
                    active.record.id,
                    file.path.display(),
                    file.total_size_bytes
                );
                self.binder.bind(FileBinding {
                    path: file.path.clone(),
                    total_size: file.total_size_bytes,
                    availability: watch.clone(),
                    priorities: PriorityRequester::new(self.priorities.clone()),
                });
                active.bound = true;
            }
        }

        if after == SessionState::Error && before != SessionState::Error {
            error!(
                "Session {} failed: {}",
                active.record.id,
                active.record.last_error.as_deref().unwrap_or("unknown engine error")
            );
            if active.bound {
                self.binder.unbind();
                active.bound = false;
            }
            active.close_availability();
        }

        self.publish();
    }

    fn publish(&self) {
        self.snapshots
            .send_replace(self.current.as_ref().map(|active| active.record.clone()));
    }
}

/// Best-effort recursive delete; failures are logged, never returned.
async fn remove_save_dir(save_dir: &Path) {
    match tokio::fs::remove_dir_all(save_dir).await {
        Ok(()) => debug!("Removed {}", save_dir.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", save_dir.display(), e),
    }
}
