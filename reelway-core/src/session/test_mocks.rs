//! Mock collaborators for exercising the session manager.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::SessionError;
use super::availability::{FileBinding, StreamBinder};
use super::engine::{ByteRange, DownloadEngine, EngineEvent, EngineEventSender, EngineRequest};

/// Call recorded by [`ScriptedEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Start { magnet: String, save_dir: PathBuf },
    Stop,
    Prioritize(ByteRange),
}

#[derive(Default)]
struct ScriptedState {
    calls: Vec<EngineCall>,
    events: Option<EngineEventSender>,
    save_dir: Option<PathBuf>,
    fail_next_start: Option<String>,
}

/// Engine whose events are pushed by the test.
///
/// Clones share state, so a test keeps one clone and gives the other to the
/// manager.
#[derive(Clone, Default)]
pub struct ScriptedEngine {
    state: Arc<Mutex<ScriptedState>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call the manager made, in order.
    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().calls.clone()
    }

    pub fn stop_count(&self) -> usize {
        self.count(|call| matches!(call, EngineCall::Stop))
    }

    pub fn start_count(&self) -> usize {
        self.count(|call| matches!(call, EngineCall::Start { .. }))
    }

    /// Save directory of the most recent start.
    pub fn save_dir(&self) -> Option<PathBuf> {
        self.state.lock().save_dir.clone()
    }

    /// Delivers `event` to the running session. Returns false with no session.
    pub fn emit(&self, event: EngineEvent) -> bool {
        self.state
            .lock()
            .events
            .as_ref()
            .is_some_and(|sender| sender.send(event).is_ok())
    }

    /// Makes the next `start` fail with `reason`.
    pub fn fail_next_start(&self, reason: &str) {
        self.state.lock().fail_next_start = Some(reason.to_string());
    }

    fn count(&self, predicate: impl Fn(&EngineCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| predicate(c)).count()
    }
}

#[async_trait]
impl DownloadEngine for ScriptedEngine {
    async fn start(&mut self, request: EngineRequest) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::Start {
            magnet: request.magnet.uri.clone(),
            save_dir: request.save_dir.clone(),
        });
        if let Some(reason) = state.fail_next_start.take() {
            return Err(SessionError::Engine { reason });
        }
        state.save_dir = Some(request.save_dir);
        state.events = Some(request.events);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::Stop);
        state.events = None;
        Ok(())
    }

    async fn prioritize(&mut self, range: ByteRange) {
        self.state.lock().calls.push(EngineCall::Prioritize(range));
    }
}

#[derive(Default)]
struct RecordedBindings {
    current: Option<FileBinding>,
    binds: usize,
    unbinds: usize,
}

/// Binder that remembers what it was given.
#[derive(Clone, Default)]
pub struct RecordingBinder {
    state: Arc<Mutex<RecordedBindings>>,
}

impl RecordingBinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<FileBinding> {
        self.state.lock().current.clone()
    }

    pub fn bind_count(&self) -> usize {
        self.state.lock().binds
    }

    pub fn unbind_count(&self) -> usize {
        self.state.lock().unbinds
    }
}

impl StreamBinder for RecordingBinder {
    fn bind(&self, binding: FileBinding) {
        let mut state = self.state.lock();
        state.current = Some(binding);
        state.binds += 1;
    }

    fn unbind(&self) {
        let mut state = self.state.lock();
        state.current = None;
        state.unbinds += 1;
    }
}
