//! Playback coordination
//!
//! Turns a content reference into a single URL the player can open: either
//! the direct media URL from the resolver, or the local range server once a
//! magnet download is far enough along.

use std::time::Duration;

use reelway_core::config::ReadinessConfig;
use reelway_core::session::{InfoHash, SessionError, SessionManagerHandle, SessionState};
use reelway_core::{ReadinessDecision, ReadinessGate};
use reelway_resolve::{ContentReference, MirrorResolver, PageFetcher, ResolveError, StreamKind};
use tracing::{info, warn};
use uuid::Uuid;

/// Where the player should point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackTarget {
    /// Upstream media URL, played without a download session
    Direct { url: String },
    /// Local range server backed by a download session
    Local {
        url: String,
        session_id: Uuid,
        info_hash: InfoHash,
        decision: ReadinessDecision,
    },
}

impl PlaybackTarget {
    pub fn url(&self) -> &str {
        match self {
            PlaybackTarget::Direct { url } | PlaybackTarget::Local { url, .. } => url,
        }
    }
}

/// Errors that prevent playback from starting.
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("Resolution failed: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Download session failed: {0}")]
    Session(#[from] SessionError),

    #[error("Download ended ({state}) before playback could start")]
    SessionEnded {
        state: SessionState,
        reason: Option<String>,
    },

    #[error("Download not playable after {0:?}")]
    Timeout(Duration),
}

impl PlaybackError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            PlaybackError::Resolve(e) => e.user_message(),
            PlaybackError::Session(SessionError::InvalidMagnet { .. }) => {
                "The page links to an invalid magnet".to_string()
            }
            PlaybackError::Session(_) => "The download could not be started".to_string(),
            PlaybackError::SessionEnded {
                reason: Some(reason),
                ..
            } => format!("Download failed: {reason}"),
            PlaybackError::SessionEnded { .. } => "Download was stopped".to_string(),
            PlaybackError::Timeout(_) => {
                "The download is too slow to start playback, try another mirror".to_string()
            }
        }
    }
}

/// Orchestrates resolver, session manager and readiness policy.
pub struct PlaybackCoordinator<F: PageFetcher> {
    resolver: MirrorResolver<F>,
    sessions: SessionManagerHandle,
    stream_url: String,
    readiness: ReadinessConfig,
}

impl<F: PageFetcher> PlaybackCoordinator<F> {
    /// `stream_url` is the address of the range server the manager binds to.
    pub fn new(
        resolver: MirrorResolver<F>,
        sessions: SessionManagerHandle,
        stream_url: impl Into<String>,
        readiness: ReadinessConfig,
    ) -> Self {
        Self {
            resolver,
            sessions,
            stream_url: stream_url.into(),
            readiness,
        }
    }

    /// Resolves `reference` and waits until it can be played.
    ///
    /// # Errors
    /// - `PlaybackError::Resolve` - The page could not be resolved
    /// - `PlaybackError::Session` - The download session could not start
    /// - `PlaybackError::SessionEnded` - The session failed or was stopped while waiting
    /// - `PlaybackError::Timeout` - Readiness was not reached in time
    pub async fn prepare(
        &self,
        reference: &ContentReference,
    ) -> Result<PlaybackTarget, PlaybackError> {
        let stream = self.resolver.resolve(reference).await?;
        match stream.kind {
            StreamKind::DirectMedia => {
                info!("Playing {} directly", stream.url);
                Ok(PlaybackTarget::Direct { url: stream.url })
            }
            StreamKind::Magnet => self.prepare_magnet(&stream.url).await,
        }
    }

    /// Starts a session for `magnet` and waits for the first readiness signal.
    ///
    /// A session that fails or times out is stopped so its files are removed.
    ///
    /// # Errors
    /// - `PlaybackError::Session` - The download session could not start
    /// - `PlaybackError::SessionEnded` - The session failed or was stopped while waiting
    /// - `PlaybackError::Timeout` - Readiness was not reached in time
    pub async fn prepare_magnet(&self, magnet: &str) -> Result<PlaybackTarget, PlaybackError> {
        let mut session = self.sessions.start(magnet).await?;
        let mut gate = ReadinessGate::new(self.readiness.threshold);

        let waited = tokio::time::timeout(self.readiness.wait_timeout, async {
            loop {
                let Some(snapshot) = session.snapshot() else {
                    return Err(PlaybackError::SessionEnded {
                        state: SessionState::Stopped,
                        reason: None,
                    });
                };
                if snapshot.state.is_terminal() {
                    return Err(PlaybackError::SessionEnded {
                        state: snapshot.state,
                        reason: snapshot.last_error,
                    });
                }
                if let Some(decision) = gate.observe_session(&snapshot) {
                    return Ok(decision);
                }
                session.changed().await?;
            }
        })
        .await;

        let outcome = match waited {
            Ok(outcome) => outcome,
            Err(_) => Err(PlaybackError::Timeout(self.readiness.wait_timeout)),
        };

        match outcome {
            Ok(decision) => {
                info!(
                    "Session {} is {:?}, handing {} to the player",
                    session.id, decision, self.stream_url
                );
                Ok(PlaybackTarget::Local {
                    url: self.stream_url.clone(),
                    session_id: session.id,
                    info_hash: session.info_hash,
                    decision,
                })
            }
            Err(e) => {
                warn!("Playback preparation for {} failed: {}", session.id, e);
                if let Err(stop_error) = self.sessions.stop_if_current(session.id).await {
                    warn!("Failed to stop session {}: {}", session.id, stop_error);
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use reelway_core::config::{ResolverConfig, SessionConfig};
    use reelway_core::session::EngineEvent;
    use reelway_core::session::test_mocks::ScriptedEngine;
    use reelway_core::{ReadinessThreshold, spawn_session_manager};
    use reelway_resolve::fixtures::FixtureFetcher;

    use super::*;
    use crate::server::RangeServer;

    const PAGE_URL: &str = "https://www.movies.example/film/";
    const MAGNET: &str = "magnet:?xt=urn:btih:c12fe1c06bba254a9dc9f519b335aa7c1367a88a&dn=Film";
    const STREAM_URL: &str = "http://127.0.0.1:8080/";

    struct Harness {
        coordinator: PlaybackCoordinator<FixtureFetcher>,
        engine: ScriptedEngine,
        sessions: SessionManagerHandle,
        server: RangeServer,
        _root: tempfile::TempDir,
    }

    fn harness(page: &str, wait_timeout: Duration) -> Harness {
        let root = tempfile::tempdir().unwrap();
        let engine = ScriptedEngine::new();
        let server = RangeServer::new(reelway_core::config::ServerConfig::default());
        let sessions = spawn_session_manager(
            SessionConfig {
                download_root: root.path().to_path_buf(),
                ..SessionConfig::default()
            },
            engine.clone(),
            server.clone(),
        );
        let resolver = MirrorResolver::new(
            FixtureFetcher::new().with_page(PAGE_URL, page),
            &ResolverConfig::default(),
        );
        let coordinator = PlaybackCoordinator::new(
            resolver,
            sessions.clone(),
            STREAM_URL,
            ReadinessConfig {
                threshold: ReadinessThreshold::Percent(2.0),
                wait_timeout,
            },
        );
        Harness {
            coordinator,
            engine,
            sessions,
            server,
            _root: root,
        }
    }

    fn magnet_page() -> String {
        format!(r#"<a href="{}">Download</a>"#, MAGNET.replace('&', "&amp;"))
    }

    async fn wait_for_start(engine: &ScriptedEngine) -> PathBuf {
        loop {
            if let Some(dir) = engine.save_dir() {
                return dir;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_direct_media_skips_session() {
        let harness = harness(
            r#"<source src="https://cdn.example/film.m3u8" type="application/x-mpegURL">"#,
            Duration::from_secs(1),
        );

        let target = harness
            .coordinator
            .prepare(&ContentReference::new(PAGE_URL))
            .await
            .unwrap();

        assert_eq!(
            target,
            PlaybackTarget::Direct {
                url: "https://cdn.example/film.m3u8".to_string()
            }
        );
        assert_eq!(harness.engine.start_count(), 0);
    }

    #[tokio::test]
    async fn test_magnet_waits_for_ready_to_start() {
        let harness = harness(&magnet_page(), Duration::from_secs(5));
        let engine = harness.engine.clone();

        let feeder = async {
            let save_dir = wait_for_start(&engine).await;
            let file_path = save_dir.join("film.mp4");
            engine.emit(EngineEvent::MetadataReceived {
                file_path: file_path.clone(),
                total_size: 1_000_000,
            });
            engine.emit(EngineEvent::Progress {
                percent: 1.0,
                download_rate_bps: 1000,
                contiguous_bytes: 10_000,
            });
            engine.emit(EngineEvent::Ready {
                file_path,
                total_size: 1_000_000,
            });
            engine.emit(EngineEvent::Progress {
                percent: 2.5,
                download_rate_bps: 1000,
                contiguous_bytes: 25_000,
            });
        };

        let reference = ContentReference::new(PAGE_URL);
        let (target, ()) = tokio::join!(harness.coordinator.prepare(&reference), feeder);
        let target = target.unwrap();

        assert_eq!(target.url(), STREAM_URL);
        match target {
            PlaybackTarget::Local { decision, .. } => {
                assert_eq!(decision, ReadinessDecision::ReadyToStart)
            }
            other => panic!("expected local target, got {other:?}"),
        }
        assert!(harness.server.current_binding().is_some());
    }

    #[tokio::test]
    async fn test_engine_error_fails_and_cleans_up() {
        let harness = harness(&magnet_page(), Duration::from_secs(5));
        let engine = harness.engine.clone();

        let feeder = async {
            wait_for_start(&engine).await;
            engine.emit(EngineEvent::Error {
                reason: "no peers".to_string(),
            });
        };

        let reference = ContentReference::new(PAGE_URL);
        let (result, ()) = tokio::join!(harness.coordinator.prepare(&reference), feeder);

        match result {
            Err(PlaybackError::SessionEnded { state, reason }) => {
                assert_eq!(state, SessionState::Error);
                assert_eq!(reason.as_deref(), Some("no peers"));
            }
            other => panic!("expected SessionEnded, got {other:?}"),
        }
        assert_eq!(harness.engine.stop_count(), 1);
        assert_eq!(
            harness.sessions.current_state().map(|s| s.state),
            Some(SessionState::Stopped)
        );
    }

    #[tokio::test]
    async fn test_replaced_session_is_left_running() {
        const OTHER_MAGNET: &str = "magnet:?xt=urn:btih:89abcdef0123456789abcdef0123456789abcdef";
        let harness = harness(&magnet_page(), Duration::from_secs(5));
        let engine = harness.engine.clone();
        let sessions = harness.sessions.clone();

        let replacer = async {
            wait_for_start(&engine).await;
            sessions.start(OTHER_MAGNET).await.unwrap()
        };

        let reference = ContentReference::new(PAGE_URL);
        let (result, replacement) =
            tokio::join!(harness.coordinator.prepare(&reference), replacer);

        assert!(matches!(
            result,
            Err(PlaybackError::SessionEnded {
                state: SessionState::Stopped,
                ..
            })
        ));
        // Only the restart stopped anything
        assert_eq!(harness.engine.stop_count(), 1);
        let current = harness.sessions.current_state().unwrap();
        assert_eq!(current.id, replacement.id);
        assert_eq!(current.state, SessionState::Starting);
    }

    #[tokio::test]
    async fn test_readiness_timeout() {
        let harness = harness(&magnet_page(), Duration::from_millis(50));

        let result = harness
            .coordinator
            .prepare(&ContentReference::new(PAGE_URL))
            .await;

        assert!(matches!(result, Err(PlaybackError::Timeout(_))));
        assert!(result.unwrap_err().user_message().contains("too slow"));
        assert_eq!(harness.engine.stop_count(), 1);
    }

    #[tokio::test]
    async fn test_resolution_failure_is_reported() {
        let harness = harness(
            r#"var locations = ["https://streamtape.com/e/1"];"#,
            Duration::from_secs(1),
        );

        let result = harness
            .coordinator
            .prepare(&ContentReference::new(PAGE_URL))
            .await;

        assert!(matches!(
            result,
            Err(PlaybackError::Resolve(ResolveError::UnsupportedMirror { .. }))
        ));
        assert_eq!(harness.engine.start_count(), 0);
    }
}
