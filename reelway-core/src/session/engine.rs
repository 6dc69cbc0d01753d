//! Download engine capability.
//!
//! The peer-to-peer download itself is performed by an external engine. The
//! session manager drives it through [`DownloadEngine`] and observes it only
//! through the ordered [`EngineEvent`] stream handed over on start.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::SessionError;
use super::magnet::MagnetLink;

/// Byte range of the bound file, end inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Number of bytes covered by the range.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start) + 1
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

/// Events emitted by a download engine for the active session.
///
/// `Ready` may arrive without a preceding `MetadataReceived`, so it repeats
/// the file description.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The engine knows which file it is downloading and its final size.
    MetadataReceived { file_path: PathBuf, total_size: u64 },
    /// Periodic progress report.
    Progress {
        percent: f32,
        download_rate_bps: u64,
        contiguous_bytes: u64,
    },
    /// Enough of the file is present to begin streaming.
    Ready { file_path: PathBuf, total_size: u64 },
    /// Fatal failure; the session cannot continue.
    Error { reason: String },
}

/// Sender handed to the engine for a single session.
pub type EngineEventSender = mpsc::UnboundedSender<EngineEvent>;

/// Everything an engine needs to begin a session.
#[derive(Debug, Clone)]
pub struct EngineRequest {
    pub magnet: MagnetLink,
    pub save_dir: PathBuf,
    pub events: EngineEventSender,
}

/// External download engine supporting one active session at a time.
#[async_trait]
pub trait DownloadEngine: Send + 'static {
    /// Begin downloading into `request.save_dir`, reporting through `request.events`.
    ///
    /// # Errors
    /// - `SessionError::Engine` - The engine refused or failed to start
    async fn start(&mut self, request: EngineRequest) -> Result<(), SessionError>;

    /// Cancel the active session. Must be safe to call with no session.
    ///
    /// # Errors
    /// - `SessionError::Engine` - Teardown failed
    async fn stop(&mut self) -> Result<(), SessionError>;

    /// Ask the engine to fetch `range` as early as possible.
    async fn prioritize(&mut self, range: ByteRange);
}

#[async_trait]
impl DownloadEngine for Box<dyn DownloadEngine> {
    async fn start(&mut self, request: EngineRequest) -> Result<(), SessionError> {
        (**self).start(request).await
    }

    async fn stop(&mut self) -> Result<(), SessionError> {
        (**self).stop().await
    }

    async fn prioritize(&mut self, range: ByteRange) {
        (**self).prioritize(range).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_range_length_is_inclusive() {
        assert_eq!(ByteRange::new(0, 0).len(), 1);
        assert_eq!(ByteRange::new(100, 199).len(), 100);
    }
}
