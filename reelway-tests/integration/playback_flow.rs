//! End-to-end flow: mirror page to playable local stream.

use std::time::Duration;

use reelway_core::config::{ReadinessConfig, ResolverConfig, SessionConfig, SimulationConfig};
use reelway_core::{ReadinessDecision, ReadinessThreshold, spawn_session_manager};
use reelway_resolve::fixtures::FixtureFetcher;
use reelway_resolve::{ContentReference, MirrorResolver};
use reelway_sim::{LocalFileEngine, magnet_for_file};
use reelway_web::{PlaybackCoordinator, PlaybackTarget, RangeServer};

use crate::common::{client, header, server_config, write_media};

const PAGE_URL: &str = "https://www.movies.example/film-2025/";
const TOTAL: usize = 512 * 1024;

#[tokio::test]
async fn test_magnet_page_to_local_stream() {
    let media_dir = tempfile::tempdir().unwrap();
    let download_root = tempfile::tempdir().unwrap();
    let (source, data) = write_media(media_dir.path(), "film.mp4", TOTAL);
    let magnet = magnet_for_file(&source).unwrap();
    let page = format!(
        r#"<a class="mv_button_css" href="{}">Magnet</a>"#,
        magnet.replace('&', "&amp;")
    );

    let server = RangeServer::new(server_config(Duration::from_secs(5)));
    let running = server.spawn().await.unwrap();
    let engine = LocalFileEngine::new(
        &source,
        SimulationConfig {
            bytes_per_second: 2 * 1024 * 1024,
            tick: Duration::from_millis(10),
            deterministic_seed: Some(7),
            ready_after_percent: 1.0,
        },
    );
    let sessions = spawn_session_manager(
        SessionConfig {
            download_root: download_root.path().to_path_buf(),
            ..SessionConfig::default()
        },
        engine,
        server,
    );
    let coordinator = PlaybackCoordinator::new(
        MirrorResolver::new(
            FixtureFetcher::new().with_page(PAGE_URL, page),
            &ResolverConfig::default(),
        ),
        sessions.clone(),
        running.url(),
        ReadinessConfig {
            threshold: ReadinessThreshold::Percent(2.0),
            wait_timeout: Duration::from_secs(10),
        },
    );

    let target = coordinator
        .prepare(&ContentReference::new(PAGE_URL))
        .await
        .unwrap();
    let PlaybackTarget::Local { url, decision, .. } = target else {
        panic!("magnet page should play through the local server");
    };
    assert_eq!(url, running.url());
    assert!(decision >= ReadinessDecision::ReadyToStart);

    // Seek near the end while the download is still running
    let tail = client()
        .get(&url)
        .header("Range", format!("bytes={}-", TOTAL - 1000))
        .send()
        .await
        .unwrap();
    assert_eq!(tail.status(), 206);
    assert_eq!(
        header(&tail, "content-range"),
        format!("bytes {}-{}/{}", TOTAL - 1000, TOTAL - 1, TOTAL)
    );
    assert_eq!(tail.bytes().await.unwrap().as_ref(), &data[TOTAL - 1000..]);

    let full = client().get(&url).send().await.unwrap();
    assert_eq!(full.status(), 200);
    assert_eq!(full.bytes().await.unwrap().as_ref(), data.as_slice());

    let save_dir = sessions.current_state().unwrap().save_dir;
    assert!(save_dir.exists());
    sessions.stop().await.unwrap();
    assert!(!save_dir.exists());
    assert_eq!(client().get(&url).send().await.unwrap().status(), 404);

    sessions.shutdown().await.unwrap();
    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_direct_media_page_needs_no_download() {
    let download_root = tempfile::tempdir().unwrap();
    let server = RangeServer::new(server_config(Duration::from_millis(200)));
    let sessions = spawn_session_manager(
        SessionConfig {
            download_root: download_root.path().to_path_buf(),
            ..SessionConfig::default()
        },
        LocalFileEngine::new("/nonexistent/film.mp4", SimulationConfig::default()),
        server,
    );
    let coordinator = PlaybackCoordinator::new(
        MirrorResolver::new(
            FixtureFetcher::new().with_page(
                PAGE_URL,
                r#"<video><source src="https://cdn.example/film/index.m3u8"></video>"#,
            ),
            &ResolverConfig::default(),
        ),
        sessions.clone(),
        "http://127.0.0.1:1/",
        ReadinessConfig::default(),
    );

    let target = coordinator
        .prepare(&ContentReference::new(PAGE_URL))
        .await
        .unwrap();

    assert_eq!(target.url(), "https://cdn.example/film/index.m3u8");
    assert!(sessions.current_state().is_none());
}
