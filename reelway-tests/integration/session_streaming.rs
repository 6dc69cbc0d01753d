//! Session manager driving the range server, with a scripted engine.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use reelway_core::config::SessionConfig;
use reelway_core::session::test_mocks::{EngineCall, ScriptedEngine};
use reelway_core::session::{EngineEvent, SessionManagerHandle, SessionState};
use reelway_core::spawn_session_manager;
use reelway_web::{RangeServer, RunningServer};
use tempfile::TempDir;

use crate::common::{MAGNET, client, header, media_bytes, server_config};

const TOTAL: u64 = 64 * 1024;

struct Pipeline {
    engine: ScriptedEngine,
    sessions: SessionManagerHandle,
    running: RunningServer,
    _root: TempDir,
}

async fn pipeline(availability_timeout: Duration) -> Pipeline {
    let root = tempfile::tempdir().unwrap();
    let engine = ScriptedEngine::new();
    let server = RangeServer::new(server_config(availability_timeout));
    let running = server.spawn().await.unwrap();
    let sessions = spawn_session_manager(
        SessionConfig {
            download_root: root.path().to_path_buf(),
            ..SessionConfig::default()
        },
        engine.clone(),
        server,
    );
    Pipeline {
        engine,
        sessions,
        running,
        _root: root,
    }
}

/// Starts a session whose file is pre-allocated and holds `available` bytes.
async fn start_ready_session(pipeline: &Pipeline, available: u64) -> (PathBuf, Vec<u8>) {
    let handle = pipeline.sessions.start(MAGNET).await.unwrap();
    let data = media_bytes(TOTAL as usize);
    let file_path = handle.save_dir.join("film.mp4");

    let mut contents = data[..available as usize].to_vec();
    contents.resize(TOTAL as usize, 0);
    std::fs::write(&file_path, &contents).unwrap();

    pipeline.engine.emit(EngineEvent::MetadataReceived {
        file_path: file_path.clone(),
        total_size: TOTAL,
    });
    pipeline.engine.emit(EngineEvent::Ready {
        file_path: file_path.clone(),
        total_size: TOTAL,
    });
    report(pipeline, available);
    wait_for_contiguous(&pipeline.sessions, available).await;

    (file_path, data)
}

fn report(pipeline: &Pipeline, contiguous_bytes: u64) {
    pipeline.engine.emit(EngineEvent::Progress {
        percent: contiguous_bytes as f32 / TOTAL as f32 * 100.0,
        download_rate_bps: 1_000_000,
        contiguous_bytes,
    });
}

async fn wait_for_contiguous(sessions: &SessionManagerHandle, bytes: u64) {
    let mut updates = sessions.subscribe();
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let reached = updates
                .borrow_and_update()
                .as_ref()
                .is_some_and(|s| s.state == SessionState::Ready && s.contiguous_available_bytes() >= bytes);
            if reached {
                return;
            }
            updates.changed().await.unwrap();
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_available_range_served_immediately() {
    let pipeline = pipeline(Duration::from_millis(300)).await;
    let (_, data) = start_ready_session(&pipeline, 32 * 1024).await;

    let response = client()
        .get(pipeline.running.url())
        .header("Range", "bytes=0-16383")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 206);
    assert_eq!(header(&response, "content-range"), format!("bytes 0-16383/{TOTAL}"));
    assert_eq!(response.bytes().await.unwrap().as_ref(), &data[..16384]);
}

#[tokio::test]
async fn test_request_waits_for_download_to_catch_up() {
    let pipeline = pipeline(Duration::from_secs(5)).await;
    let (file_path, data) = start_ready_session(&pipeline, 8 * 1024).await;

    let request = client()
        .get(pipeline.running.url())
        .header("Range", "bytes=40000-49999")
        .send();
    let download = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(&file_path, &data).unwrap();
        report(&pipeline, TOTAL);
    };

    let (response, ()) = tokio::join!(request, download);
    let response = response.unwrap();

    assert_eq!(response.status(), 206);
    assert_eq!(response.bytes().await.unwrap().as_ref(), &data[40_000..50_000]);
    assert!(
        pipeline
            .engine
            .calls()
            .iter()
            .any(|call| matches!(call, EngineCall::Prioritize(range) if range.start == 40_000)),
        "missing range should be prioritized"
    );
}

#[tokio::test]
async fn test_unavailable_range_times_out_with_503() {
    let pipeline = pipeline(Duration::from_millis(300)).await;
    start_ready_session(&pipeline, 4096).await;

    let started = Instant::now();
    let response = client()
        .get(pipeline.running.url())
        .header("Range", "bytes=60000-")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 503);
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_stop_cancels_waiting_request() {
    let pipeline = pipeline(Duration::from_secs(10)).await;
    start_ready_session(&pipeline, 4096).await;

    let started = Instant::now();
    let request = client()
        .get(pipeline.running.url())
        .header("Range", "bytes=60000-")
        .send();
    let stop = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        pipeline.sessions.stop().await.unwrap();
    };

    let (response, ()) = tokio::join!(request, stop);

    assert_eq!(response.unwrap().status(), 503);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_stop_removes_files_and_unbinds() {
    let pipeline = pipeline(Duration::from_millis(300)).await;
    let (file_path, _) = start_ready_session(&pipeline, TOTAL).await;
    let save_dir = file_path.parent().unwrap().to_path_buf();

    let before = client().get(pipeline.running.url()).send().await.unwrap();
    assert_eq!(before.status(), 200);
    before.bytes().await.unwrap();

    pipeline.sessions.stop().await.unwrap();

    assert!(!save_dir.exists());
    let after = client().get(pipeline.running.url()).send().await.unwrap();
    assert_eq!(after.status(), 404);
    assert_eq!(
        pipeline.sessions.current_state().map(|s| s.state),
        Some(SessionState::Stopped)
    );
}

#[tokio::test]
async fn test_restart_stops_previous_session_once() {
    let pipeline = pipeline(Duration::from_millis(300)).await;
    let (first_file, _) = start_ready_session(&pipeline, TOTAL).await;

    let second = pipeline
        .sessions
        .start("magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567")
        .await
        .unwrap();

    let calls = pipeline.engine.calls();
    assert!(matches!(calls.first(), Some(EngineCall::Start { .. })));
    assert_eq!(calls.iter().filter(|c| matches!(c, EngineCall::Stop)).count(), 1);
    assert!(matches!(calls.last(), Some(EngineCall::Start { save_dir, .. }) if *save_dir == second.save_dir));
    assert!(!first_file.exists());

    let response = client().get(pipeline.running.url()).send().await.unwrap();
    assert_eq!(response.status(), 404);
}
