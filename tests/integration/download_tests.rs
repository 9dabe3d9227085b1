use crate::test_fetcher;
use crawlgate::{CrawlError, DownloadOptions, SupervisorLimits, TaskSupervisor};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn image_server(body: &'static [u8]) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/large/photo.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_download_writes_file_named_after_url() {
    let server = image_server(b"jpeg bytes").await;
    let dir = TempDir::new().unwrap();
    let fetcher = test_fetcher(1, dir.path());

    let download = fetcher
        .download(
            &format!("{}/large/photo.jpg?size=2048", server.uri()),
            &DownloadOptions::new(),
        )
        .await
        .unwrap();

    assert!(download.written);
    assert_eq!(download.path, dir.path().join("photo.jpg"));
    assert_eq!(std::fs::read(&download.path).unwrap(), b"jpeg bytes");
    assert_eq!(fetcher.admission().in_flight(), 0);
}

#[tokio::test]
async fn test_download_creates_target_directory() {
    let server = image_server(b"jpeg bytes").await;
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("user").join("album");
    let fetcher = test_fetcher(1, dir.path());

    let options = DownloadOptions::new().dir(&nested).file_name("cover:1.jpg");
    let download = fetcher
        .download(&format!("{}/large/photo.jpg", server.uri()), &options)
        .await
        .unwrap();

    assert_eq!(download.path, nested.join("cover_1.jpg"));
    assert!(download.path.exists());
}

#[tokio::test]
async fn test_download_no_duplicate_skips_request() {
    let server = image_server(b"new bytes").await;
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("photo.jpg"), b"old bytes").unwrap();
    let fetcher = test_fetcher(1, dir.path());

    let download = fetcher
        .download(
            &format!("{}/large/photo.jpg", server.uri()),
            &DownloadOptions::new().no_duplicate(),
        )
        .await
        .unwrap();

    assert!(!download.written);
    assert_eq!(download.path, dir.path().join("photo.jpg"));
    assert_eq!(std::fs::read(&download.path).unwrap(), b"old bytes");
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_download_renames_when_target_exists() {
    let server = image_server(b"new bytes").await;
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("photo.jpg"), b"old bytes").unwrap();
    std::fs::write(dir.path().join("photo_.jpg"), b"older bytes").unwrap();
    let fetcher = test_fetcher(1, dir.path());

    let download = fetcher
        .download(&format!("{}/large/photo.jpg", server.uri()), &DownloadOptions::new())
        .await
        .unwrap();

    assert!(download.written);
    assert_eq!(download.path, dir.path().join("photo__.jpg"));
    assert_eq!(std::fs::read(&download.path).unwrap(), b"new bytes");
    assert_eq!(
        std::fs::read(dir.path().join("photo.jpg")).unwrap(),
        b"old bytes"
    );
}

#[tokio::test]
async fn test_failed_download_leaves_no_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let fetcher = test_fetcher(2, dir.path());

    let err = fetcher
        .download(&format!("{}/large/photo.jpg", server.uri()), &DownloadOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, CrawlError::Http { .. }));
    assert!(!dir.path().join("photo.jpg").exists());
    assert_eq!(server.received_requests().await.unwrap_or_default().len(), 2);
    assert_eq!(fetcher.admission().in_flight(), 0);
}

#[tokio::test]
async fn test_unusable_file_name_falls_back_to_url_name() {
    let server = image_server(b"jpeg bytes").await;
    let root = TempDir::new().unwrap();
    let deposit = root.path().join("deposit");
    let fetcher = test_fetcher(1, &deposit);
    let url = format!("{}/large/photo.jpg", server.uri());

    for name in ["", ".", ".."] {
        let download = fetcher
            .download(&url, &DownloadOptions::new().file_name(name).no_duplicate())
            .await
            .unwrap();
        assert_eq!(download.path, deposit.join("photo.jpg"), "name {:?}", name);
    }

    let download = fetcher
        .download(&url, &DownloadOptions::new().file_name(".."))
        .await
        .unwrap();
    assert!(download.written);
    assert_eq!(download.path, deposit.join("photo_.jpg"));

    let mut entries: Vec<_> = std::fs::read_dir(root.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    entries.sort();
    assert_eq!(entries, vec![std::ffi::OsString::from("deposit")]);
}

/// Serves headers promising a large body, sends a few bytes, then either
/// hangs up or keeps the connection open
async fn truncated_body_server(hang: bool) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = [0u8; 4096];
                let _ = socket.read(&mut request).await;
                let _ = socket
                    .write_all(
                        b"HTTP/1.1 200 OK\r\n\
                          Content-Type: image/jpeg\r\n\
                          Content-Length: 1048576\r\n\r\n\
                          partial bytes",
                    )
                    .await;
                let _ = socket.flush().await;
                if hang {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{}", addr)
}

async fn wait_for_file(path: &Path) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !path.exists() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("download never created its file");
}

#[tokio::test]
async fn test_body_error_mid_write_removes_partial_file() {
    let base = truncated_body_server(false).await;
    let dir = TempDir::new().unwrap();
    let fetcher = test_fetcher(3, dir.path());

    let err = fetcher
        .download(&format!("{}/large/photo.jpg", base), &DownloadOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, CrawlError::Http { .. }), "unexpected error: {err:?}");
    assert!(!dir.path().join("photo.jpg").exists());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    assert_eq!(fetcher.admission().in_flight(), 0);
}

#[tokio::test]
async fn test_cancelled_download_removes_partial_file() {
    let base = truncated_body_server(true).await;
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("photo.jpg");
    let fetcher = test_fetcher(1, dir.path());
    let supervisor = TaskSupervisor::new(SupervisorLimits::default());

    let handle = {
        let fetcher = fetcher.clone();
        let url = format!("{}/large/photo.jpg", base);
        supervisor.spawn(async move { fetcher.download(&url, &DownloadOptions::new()).await })
    };
    wait_for_file(&target).await;
    assert_eq!(fetcher.admission().in_flight(), 1);

    assert_eq!(supervisor.close(Some(Duration::from_secs(1))).await, 0);
    assert!(handle.join().await.unwrap_err().is_supervisor_shutdown());
    assert!(!target.exists());
    assert_eq!(fetcher.admission().in_flight(), 0);
}

#[tokio::test]
async fn test_client_timeout_bounds_download() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(&b"jpeg bytes"[..])
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let url = format!("{}/large/photo.jpg", server.uri());

    let impatient = reqwest::Client::builder()
        .timeout(Duration::from_millis(100))
        .build()
        .unwrap();
    let fetcher = test_fetcher(1, dir.path()).with_client(impatient);
    let err = fetcher
        .download(&url, &DownloadOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CrawlError::Http { .. }));
    assert!(!dir.path().join("photo.jpg").exists());

    let patient = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    let download = fetcher
        .with_client(patient)
        .download(&url, &DownloadOptions::new())
        .await
        .unwrap();
    assert_eq!(std::fs::read(&download.path).unwrap(), b"jpeg bytes");
}
