//! Local file download simulation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use reelway_core::config::SimulationConfig;
use reelway_core::session::{
    ByteRange, DownloadEngine, EngineEvent, EngineEventSender, EngineRequest, SessionError,
};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Download engine that copies a local file into the save directory.
///
/// The copy is strictly sequential, so every copied byte is also
/// contiguous. Prioritization requests are recorded and logged only.
pub struct LocalFileEngine {
    source: PathBuf,
    config: SimulationConfig,
    task: Option<JoinHandle<()>>,
    prioritized: Arc<Mutex<Vec<ByteRange>>>,
}

impl LocalFileEngine {
    pub fn new(source: impl Into<PathBuf>, config: SimulationConfig) -> Self {
        Self {
            source: source.into(),
            config,
            task: None,
            prioritized: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Ranges the session manager asked to pull forward.
    pub fn prioritized(&self) -> Vec<ByteRange> {
        self.prioritized.lock().clone()
    }

    async fn cancel_transfer(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            // Wait for the task to drop its file handles
            let _ = task.await;
        }
    }
}

#[async_trait]
impl DownloadEngine for LocalFileEngine {
    async fn start(&mut self, request: EngineRequest) -> Result<(), SessionError> {
        self.cancel_transfer().await;

        let total_size = tokio::fs::metadata(&self.source)
            .await
            .map_err(|e| SessionError::Engine {
                reason: format!("cannot read {}: {e}", self.source.display()),
            })?
            .len();
        let target = target_path(&self.source, &request.save_dir).ok_or_else(|| {
            SessionError::Engine {
                reason: format!("{} has no file name", self.source.display()),
            }
        })?;

        let transfer = SimulatedTransfer {
            source: self.source.clone(),
            target,
            total_size,
            config: self.config.clone(),
            events: request.events,
        };

        info!(
            "Simulating download of {} ({} bytes) for {}",
            self.source.display(),
            total_size,
            request.magnet.info_hash
        );

        self.task = Some(tokio::spawn(async move {
            let events = transfer.events.clone();
            if let Err(e) = transfer.run().await {
                error!("Simulated download failed: {:#}", e);
                let _ = events.send(EngineEvent::Error {
                    reason: format!("{e:#}"),
                });
            }
        }));
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), SessionError> {
        self.cancel_transfer().await;
        Ok(())
    }

    async fn prioritize(&mut self, range: ByteRange) {
        debug!(
            "Simulated engine asked to prioritize bytes {}-{}",
            range.start, range.end
        );
        self.prioritized.lock().push(range);
    }
}

struct SimulatedTransfer {
    source: PathBuf,
    target: PathBuf,
    total_size: u64,
    config: SimulationConfig,
    events: EngineEventSender,
}

impl SimulatedTransfer {
    async fn run(self) -> anyhow::Result<()> {
        let mut source = File::open(&self.source)
            .await
            .with_context(|| format!("opening {}", self.source.display()))?;
        let mut target = File::create(&self.target)
            .await
            .with_context(|| format!("creating {}", self.target.display()))?;
        // Pre-allocated like a real engine; only the contiguous prefix is valid
        target.set_len(self.total_size).await?;

        if !self.emit(EngineEvent::MetadataReceived {
            file_path: self.target.clone(),
            total_size: self.total_size,
        }) {
            return Ok(());
        }

        let mut rng = match self.config.deterministic_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_rng(&mut rand::rng()),
        };
        let tick = self.config.tick.max(Duration::from_millis(1));
        let mut interval = tokio::time::interval(tick);
        let mut buffer = Vec::new();
        let mut copied = 0u64;
        let mut ready_sent = false;

        while copied < self.total_size {
            interval.tick().await;

            let chunk = chunk_for_tick(&mut rng, self.config.bytes_per_second, tick)
                .min(self.total_size - copied);
            buffer.resize(chunk as usize, 0);
            source.read_exact(&mut buffer).await?;
            target.write_all(&buffer).await?;
            target.flush().await?;
            copied += chunk;

            let percent = copied as f32 / self.total_size as f32 * 100.0;
            if !self.emit(EngineEvent::Progress {
                percent,
                download_rate_bps: (chunk as f64 / tick.as_secs_f64()) as u64,
                contiguous_bytes: copied,
            }) {
                return Ok(());
            }

            if !ready_sent && percent >= self.config.ready_after_percent {
                ready_sent = self.emit_ready();
            }
        }

        if !ready_sent {
            self.emit_ready();
        }
        info!("Simulated download of {} complete", self.target.display());
        Ok(())
    }

    fn emit_ready(&self) -> bool {
        self.emit(EngineEvent::Ready {
            file_path: self.target.clone(),
            total_size: self.total_size,
        })
    }

    /// False once the session has gone away.
    fn emit(&self, event: EngineEvent) -> bool {
        self.events.send(event).is_ok()
    }
}

/// Bytes to copy in one tick, jittered between half and one and a half times
/// the configured rate.
fn chunk_for_tick(rng: &mut ChaCha8Rng, bytes_per_second: u64, tick: Duration) -> u64 {
    let jitter: f64 = rng.random_range(0.5..1.5);
    ((bytes_per_second as f64 * tick.as_secs_f64() * jitter) as u64).max(1)
}

/// Path the engine writes for `source` inside `save_dir`.
pub fn target_path(source: &Path, save_dir: &Path) -> Option<PathBuf> {
    source.file_name().map(|name| save_dir.join(name))
}

#[cfg(test)]
mod tests {
    use reelway_core::session::MagnetLink;
    use tokio::sync::mpsc;

    use super::*;

    const MAGNET: &str = "magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567";

    fn source_file(dir: &Path, len: usize) -> (PathBuf, Vec<u8>) {
        let data: Vec<u8> = (0..len).map(|i| (i % 253) as u8).collect();
        let path = dir.join("movie.mp4");
        std::fs::write(&path, &data).unwrap();
        (path, data)
    }

    fn request(save_dir: &Path) -> (EngineRequest, mpsc::UnboundedReceiver<EngineEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        (
            EngineRequest {
                magnet: MagnetLink::parse(MAGNET).unwrap(),
                save_dir: save_dir.to_path_buf(),
                events,
            },
            receiver,
        )
    }

    async fn collect_until_complete(
        receiver: &mut mpsc::UnboundedReceiver<EngineEvent>,
        total: u64,
    ) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Some(event) = receiver.recv().await {
            let done = matches!(
                event,
                EngineEvent::Progress { contiguous_bytes, .. } if contiguous_bytes == total
            );
            events.push(event);
            if done {
                // Ready may follow the final progress report
                if let Ok(Some(next)) =
                    tokio::time::timeout(Duration::from_millis(100), receiver.recv()).await
                {
                    events.push(next);
                }
                break;
            }
        }
        events
    }

    #[tokio::test]
    async fn test_copies_file_and_reports_progress() {
        let source_dir = tempfile::tempdir().unwrap();
        let save_dir = tempfile::tempdir().unwrap();
        let (source, data) = source_file(source_dir.path(), 300_000);
        let mut engine = LocalFileEngine::new(&source, SimulationConfig::deterministic_testing());
        let (request, mut receiver) = request(save_dir.path());

        engine.start(request).await.unwrap();
        let events = collect_until_complete(&mut receiver, 300_000).await;

        let target = save_dir.path().join("movie.mp4");
        assert_eq!(
            events.first(),
            Some(&EngineEvent::MetadataReceived {
                file_path: target.clone(),
                total_size: 300_000,
            })
        );
        assert!(events.iter().any(|e| matches!(e, EngineEvent::Ready { .. })));

        let contiguous: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::Progress {
                    contiguous_bytes, ..
                } => Some(*contiguous_bytes),
                _ => None,
            })
            .collect();
        assert!(contiguous.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(contiguous.last(), Some(&300_000));
        assert_eq!(std::fs::read(&target).unwrap(), data);
    }

    #[tokio::test]
    async fn test_same_seed_same_schedule() {
        let source_dir = tempfile::tempdir().unwrap();
        let (source, _) = source_file(source_dir.path(), 200_000);

        let mut schedules = Vec::new();
        for _ in 0..2 {
            let save_dir = tempfile::tempdir().unwrap();
            let mut engine =
                LocalFileEngine::new(&source, SimulationConfig::deterministic_testing());
            let (request, mut receiver) = request(save_dir.path());
            engine.start(request).await.unwrap();
            let schedule: Vec<u64> = collect_until_complete(&mut receiver, 200_000)
                .await
                .into_iter()
                .filter_map(|e| match e {
                    EngineEvent::Progress {
                        contiguous_bytes, ..
                    } => Some(contiguous_bytes),
                    _ => None,
                })
                .collect();
            schedules.push(schedule);
        }

        assert_eq!(schedules[0], schedules[1]);
    }

    #[tokio::test]
    async fn test_stop_ends_event_stream() {
        let source_dir = tempfile::tempdir().unwrap();
        let save_dir = tempfile::tempdir().unwrap();
        let (source, _) = source_file(source_dir.path(), 1_000_000);
        let config = SimulationConfig {
            bytes_per_second: 10_000,
            tick: Duration::from_millis(10),
            deterministic_seed: Some(1),
            ready_after_percent: 1.0,
        };
        let mut engine = LocalFileEngine::new(&source, config);
        let (request, mut receiver) = request(save_dir.path());

        engine.start(request).await.unwrap();
        assert!(matches!(
            receiver.recv().await,
            Some(EngineEvent::MetadataReceived { .. })
        ));
        engine.stop().await.unwrap();

        let drained = tokio::time::timeout(Duration::from_secs(1), async {
            while receiver.recv().await.is_some() {}
        })
        .await;
        assert!(drained.is_ok(), "event stream should close after stop");
    }

    #[tokio::test]
    async fn test_missing_source_fails_start() {
        let save_dir = tempfile::tempdir().unwrap();
        let mut engine = LocalFileEngine::new(
            "/nonexistent/reelway/movie.mp4",
            SimulationConfig::deterministic_testing(),
        );
        let (request, _receiver) = request(save_dir.path());

        let result = engine.start(request).await;

        assert!(matches!(result, Err(SessionError::Engine { .. })));
    }

    #[tokio::test]
    async fn test_prioritize_is_recorded() {
        let mut engine = LocalFileEngine::new("movie.mp4", SimulationConfig::default());
        engine.prioritize(ByteRange::new(100, 199)).await;
        assert_eq!(engine.prioritized(), vec![ByteRange::new(100, 199)]);
    }

    #[test]
    fn test_target_path() {
        assert_eq!(
            target_path(Path::new("/media/film.mkv"), Path::new("/tmp/s1")),
            Some(PathBuf::from("/tmp/s1/film.mkv"))
        );
    }
}
