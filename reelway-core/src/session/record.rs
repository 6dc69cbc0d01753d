//! Session record and its state machine.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use super::engine::EngineEvent;
use super::magnet::{InfoHash, MagnetLink};

/// Lifecycle of a download session.
///
/// `Starting → MetadataReceived → Downloading → Ready`, with `Error`
/// reachable from every non-terminal state and `Stopped` from every state.
/// Engines may skip straight from `Starting` to `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Starting,
    MetadataReceived,
    Downloading,
    Ready,
    Error,
    Stopped,
}

impl SessionState {
    /// True while the engine is working on the session.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Starting | Self::MetadataReceived | Self::Downloading | Self::Ready
        )
    }

    /// True once no further engine event can change the session.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Error | Self::Stopped)
    }

    /// State after consuming `event`.
    pub fn advance(self, event: &EngineEvent) -> Self {
        if self.is_terminal() {
            return self;
        }
        match (self, event) {
            (_, EngineEvent::Error { .. }) => Self::Error,
            (_, EngineEvent::Ready { .. }) => Self::Ready,
            (Self::Starting, EngineEvent::MetadataReceived { .. }) => Self::MetadataReceived,
            (Self::MetadataReceived, EngineEvent::Progress { .. }) => Self::Downloading,
            (state, _) => state,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Starting => "starting",
            Self::MetadataReceived => "metadata-received",
            Self::Downloading => "downloading",
            Self::Ready => "ready",
            Self::Error => "error",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// The media file a session is downloading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionFile {
    pub path: PathBuf,
    /// Final size from metadata; never changes once known
    pub total_size_bytes: u64,
    /// Bytes from offset 0 that are on disk without gaps
    pub contiguous_available_bytes: u64,
}

impl SessionFile {
    pub fn is_complete(&self) -> bool {
        self.contiguous_available_bytes == self.total_size_bytes
    }
}

/// Snapshot of the one live download session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadSession {
    pub id: Uuid,
    pub magnet: String,
    pub info_hash: InfoHash,
    pub display_name: Option<String>,
    pub save_dir: PathBuf,
    pub state: SessionState,
    /// Clamped to `[0, 100]`, never decreases
    pub progress_percent: f32,
    pub download_rate_bps: u64,
    pub file: Option<SessionFile>,
    pub started_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl DownloadSession {
    pub(crate) fn new(magnet: &MagnetLink, save_root: &std::path::Path) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            magnet: magnet.uri.clone(),
            info_hash: magnet.info_hash,
            display_name: magnet.display_name.clone(),
            save_dir: save_root.join(id.to_string()),
            state: SessionState::Starting,
            progress_percent: 0.0,
            download_rate_bps: 0,
            file: None,
            started_at: Utc::now(),
            last_error: None,
        }
    }

    /// Contiguous bytes available, zero while the file is unknown.
    pub fn contiguous_available_bytes(&self) -> u64 {
        self.file
            .as_ref()
            .map_or(0, |file| file.contiguous_available_bytes)
    }

    /// Final file size if metadata has arrived.
    pub fn total_size_bytes(&self) -> Option<u64> {
        self.file.as_ref().map(|file| file.total_size_bytes)
    }

    /// Folds one engine event into the record.
    ///
    /// Events for a terminal session are ignored. Progress and availability
    /// only ever move forward.
    pub(crate) fn apply(&mut self, event: &EngineEvent) {
        if self.state.is_terminal() {
            return;
        }

        match event {
            EngineEvent::MetadataReceived {
                file_path,
                total_size,
            }
            | EngineEvent::Ready {
                file_path,
                total_size,
            } => self.learn_file(file_path, *total_size),
            EngineEvent::Progress {
                percent,
                download_rate_bps,
                contiguous_bytes,
            } => self.record_progress(*percent, *download_rate_bps, *contiguous_bytes),
            EngineEvent::Error { reason } => self.last_error = Some(reason.clone()),
        }

        self.state = self.state.advance(event);
    }

    /// Marks the session stopped and forgets the deleted file.
    pub(crate) fn mark_stopped(&mut self) {
        self.state = SessionState::Stopped;
        self.file = None;
        self.download_rate_bps = 0;
    }

    /// Marks the session failed outside of the event stream (e.g. start failure).
    pub(crate) fn mark_failed(&mut self, reason: String) {
        self.state = SessionState::Error;
        self.last_error = Some(reason);
    }

    fn learn_file(&mut self, path: &std::path::Path, total_size: u64) {
        match &self.file {
            None => {
                self.file = Some(SessionFile {
                    path: path.to_path_buf(),
                    total_size_bytes: total_size,
                    contiguous_available_bytes: 0,
                });
            }
            Some(file) if file.total_size_bytes != total_size || file.path != path => {
                warn!(
                    "Session {} ignoring changed file description {} ({} bytes), keeping {} ({} bytes)",
                    self.id,
                    path.display(),
                    total_size,
                    file.path.display(),
                    file.total_size_bytes
                );
            }
            Some(_) => {}
        }
    }

    fn record_progress(&mut self, percent: f32, download_rate_bps: u64, contiguous_bytes: u64) {
        if percent.is_finite() {
            self.progress_percent = self.progress_percent.max(percent.clamp(0.0, 100.0));
        }
        self.download_rate_bps = download_rate_bps;

        if let Some(file) = self.file.as_mut() {
            let capped = contiguous_bytes.min(file.total_size_bytes);
            file.contiguous_available_bytes = file.contiguous_available_bytes.max(capped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> DownloadSession {
        let magnet =
            MagnetLink::parse("magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567")
                .unwrap();
        DownloadSession::new(&magnet, std::path::Path::new("/tmp/reelway-test"))
    }

    fn metadata(total_size: u64) -> EngineEvent {
        EngineEvent::MetadataReceived {
            file_path: PathBuf::from("/tmp/reelway-test/movie.mp4"),
            total_size,
        }
    }

    fn progress(percent: f32, contiguous_bytes: u64) -> EngineEvent {
        EngineEvent::Progress {
            percent,
            download_rate_bps: 1000,
            contiguous_bytes,
        }
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut record = session();
        assert_eq!(record.state, SessionState::Starting);

        record.apply(&metadata(1000));
        assert_eq!(record.state, SessionState::MetadataReceived);

        record.apply(&progress(5.0, 50));
        assert_eq!(record.state, SessionState::Downloading);

        record.apply(&EngineEvent::Ready {
            file_path: PathBuf::from("/tmp/reelway-test/movie.mp4"),
            total_size: 1000,
        });
        assert_eq!(record.state, SessionState::Ready);

        record.apply(&progress(10.0, 100));
        assert_eq!(record.state, SessionState::Ready);
    }

    #[test]
    fn test_ready_accepted_directly_from_starting() {
        let mut record = session();
        record.apply(&EngineEvent::Ready {
            file_path: PathBuf::from("/tmp/reelway-test/movie.mp4"),
            total_size: 4096,
        });
        assert_eq!(record.state, SessionState::Ready);
        assert_eq!(record.total_size_bytes(), Some(4096));
    }

    #[test]
    fn test_progress_is_clamped_and_monotonic() {
        let mut record = session();
        record.apply(&metadata(1000));
        record.apply(&progress(40.0, 400));
        record.apply(&progress(20.0, 200));
        assert_eq!(record.progress_percent, 40.0);
        assert_eq!(record.contiguous_available_bytes(), 400);

        record.apply(&progress(250.0, 5000));
        assert_eq!(record.progress_percent, 100.0);
        assert_eq!(record.contiguous_available_bytes(), 1000);

        record.apply(&progress(f32::NAN, 0));
        assert_eq!(record.progress_percent, 100.0);
    }

    #[test]
    fn test_total_size_fixed_once_known() {
        let mut record = session();
        record.apply(&metadata(1000));
        record.apply(&metadata(2000));
        assert_eq!(record.total_size_bytes(), Some(1000));
    }

    #[test]
    fn test_error_is_terminal() {
        let mut record = session();
        record.apply(&metadata(1000));
        record.apply(&EngineEvent::Error {
            reason: "no peers".to_string(),
        });
        assert_eq!(record.state, SessionState::Error);
        assert_eq!(record.last_error.as_deref(), Some("no peers"));

        record.apply(&progress(50.0, 500));
        assert_eq!(record.state, SessionState::Error);
        assert_eq!(record.contiguous_available_bytes(), 0);
    }

    #[test]
    fn test_progress_before_metadata_keeps_starting() {
        let mut record = session();
        record.apply(&progress(3.0, 300));
        assert_eq!(record.state, SessionState::Starting);
        assert_eq!(record.progress_percent, 3.0);
        assert_eq!(record.contiguous_available_bytes(), 0);
    }

    #[test]
    fn test_stopped_clears_file() {
        let mut record = session();
        record.apply(&metadata(1000));
        record.mark_stopped();
        assert_eq!(record.state, SessionState::Stopped);
        assert!(record.file.is_none());
    }
}
