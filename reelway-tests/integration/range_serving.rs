//! Range server HTTP contract over loopback.

use std::time::Duration;

use reelway_core::session::{FileBinding, StreamBinder};
use reelway_web::{RangeServer, RunningServer};

use crate::common::{client, header, server_config, write_media};

const TOTAL: usize = 100_000;

async fn serve_complete(dir: &std::path::Path) -> (RangeServer, RunningServer, Vec<u8>) {
    let (path, data) = write_media(dir, "film.mp4", TOTAL);
    let server = RangeServer::new(server_config(Duration::from_millis(200)));
    server.bind(FileBinding::complete(path, TOTAL as u64));
    let running = server.spawn().await.unwrap();
    (server, running, data)
}

#[tokio::test]
async fn test_full_request_returns_whole_file() {
    let dir = tempfile::tempdir().unwrap();
    let (_server, running, data) = serve_complete(dir.path()).await;

    let response = client().get(running.url()).send().await.unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(header(&response, "content-length"), TOTAL.to_string());
    assert_eq!(header(&response, "accept-ranges"), "bytes");
    assert_eq!(header(&response, "content-type"), "video/mp4");
    assert_eq!(response.bytes().await.unwrap().as_ref(), data.as_slice());

    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_partial_requests() {
    let dir = tempfile::tempdir().unwrap();
    let (_server, running, data) = serve_complete(dir.path()).await;
    let client = client();

    for (start, end) in [(0u64, 0u64), (0, 4095), (4096, 8191), (12_345, 67_890), (99_999, 99_999)] {
        let response = client
            .get(running.url())
            .header("Range", format!("bytes={start}-{end}"))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 206);
        assert_eq!(
            header(&response, "content-range"),
            format!("bytes {start}-{end}/{TOTAL}")
        );
        assert_eq!(header(&response, "content-length"), (end - start + 1).to_string());
        let body = response.bytes().await.unwrap();
        assert_eq!(body.as_ref(), &data[start as usize..=end as usize]);
    }

    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_range_beyond_file_is_416() {
    let dir = tempfile::tempdir().unwrap();
    let (_server, running, _) = serve_complete(dir.path()).await;

    let response = client()
        .get(running.url())
        .header("Range", format!("bytes={TOTAL}-"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 416);
    assert_eq!(header(&response, "content-range"), format!("bytes */{TOTAL}"));

    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_ranges_use_independent_handles() {
    let dir = tempfile::tempdir().unwrap();
    let (_server, running, data) = serve_complete(dir.path()).await;
    let client = client();
    let url = running.url();

    let requests = [(90_000u64, 99_999u64), (0, 9_999), (50_000, 59_999)].map(|(start, end)| {
        let request = client
            .get(&url)
            .header("Range", format!("bytes={start}-{end}"));
        async move {
            let body = request.send().await.unwrap().bytes().await.unwrap();
            (start, end, body)
        }
    });

    for (start, end, body) in futures::future::join_all(requests).await {
        assert_eq!(body.as_ref(), &data[start as usize..=end as usize]);
    }

    running.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unbound_server_returns_404() {
    let dir = tempfile::tempdir().unwrap();
    let (server, running, _) = serve_complete(dir.path()).await;
    server.unbind();

    let response = client().get(running.url()).send().await.unwrap();

    assert_eq!(response.status(), 404);
    running.shutdown().await.unwrap();
}
