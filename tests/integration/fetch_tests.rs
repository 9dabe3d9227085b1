use crate::test_fetcher;
use crawlgate::{CrawlError, ErrorKind, JsonExpectations};
use crawlgate::fetch::ResponseState;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.unwrap_or_default().len()
}

#[tokio::test]
async fn test_fetch_bytes_retries_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let fetcher = test_fetcher(5, dir.path());
    let body = fetcher
        .fetch_bytes(&format!("{}/flaky", server.uri()), None)
        .await
        .unwrap();

    assert_eq!(body, b"hello");
    assert_eq!(request_count(&server).await, 3);
    assert_eq!(fetcher.admission().in_flight(), 0);
}

#[tokio::test]
async fn test_fetch_bytes_gives_up_after_all_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let fetcher = test_fetcher(3, dir.path());
    let err = fetcher
        .fetch_bytes(&format!("{}/down", server.uri()), None)
        .await
        .unwrap_err();

    assert!(matches!(err, CrawlError::Http { .. }));
    assert_eq!(err.kind(), ErrorKind::TransientNetwork);
    assert_eq!(request_count(&server).await, 3);
    assert_eq!(fetcher.admission().in_flight(), 0);
}

#[tokio::test]
async fn test_invalid_url_is_not_retried() {
    let dir = TempDir::new().unwrap();
    let fetcher = test_fetcher(3, dir.path());

    let err = fetcher.fetch_bytes("not a url", None).await.unwrap_err();
    assert!(matches!(err, CrawlError::Url(_)));
    assert_eq!(err.kind(), ErrorKind::Usage);
}

#[tokio::test]
async fn test_fetch_json_retries_failed_assertion() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/comments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": 0})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/comments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": 1, "data": [1, 2]})))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let fetcher = test_fetcher(3, dir.path());
    let expect = JsonExpectations::new().field("ok", 1);
    let value = fetcher
        .fetch_json(&format!("{}/api/comments", server.uri()), None, &expect)
        .await
        .unwrap();

    assert_eq!(value["data"], json!([1, 2]));
    assert_eq!(request_count(&server).await, 2);
}

#[tokio::test]
async fn test_fetch_json_exhausts_on_empty_results() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let fetcher = test_fetcher(2, dir.path());
    let err = fetcher
        .fetch_json(&format!("{}/api/empty", server.uri()), None, &JsonExpectations::new())
        .await
        .unwrap_err();

    assert!(matches!(err, CrawlError::MalformedJson { .. }));
    assert_eq!(request_count(&server).await, 2);
}

#[tokio::test]
async fn test_fetch_json_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(r#"{"ok":1}"#, "text/html"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let fetcher = test_fetcher(1, dir.path());
    let url = format!("{}/api/html", server.uri());

    let err = fetcher
        .fetch_json(&url, None, &JsonExpectations::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CrawlError::ContentType { .. }));

    let relaxed = JsonExpectations::new().any_content_type();
    let value = fetcher.fetch_json(&url, None, &relaxed).await.unwrap();
    assert_eq!(value, json!({"ok": 1}));
}

#[tokio::test]
async fn test_resolve_follows_redirects() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/short"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("Location", format!("{}/long", server.uri()).as_str()),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/long"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let fetcher = test_fetcher(1, dir.path());
    let resolved = fetcher
        .resolve(&format!("{}/short", server.uri()))
        .await
        .unwrap();

    assert_eq!(resolved.path(), "/long");
    assert_eq!(fetcher.admission().in_flight(), 0);
}

#[tokio::test]
async fn test_scoped_response_holds_permit_until_dropped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("body"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let fetcher = test_fetcher(1, dir.path());
    let mut response = fetcher
        .open(&format!("{}/page", server.uri()), None)
        .unwrap();
    assert_eq!(fetcher.admission().in_flight(), 0);

    response.start().await.unwrap();
    assert_eq!(response.state(), ResponseState::Started);
    assert_eq!(fetcher.admission().in_flight(), 1);

    let err = response.start().await.unwrap_err();
    assert!(matches!(err, CrawlError::Usage(_)));

    drop(response);
    assert_eq!(fetcher.admission().in_flight(), 0);
}

#[tokio::test]
async fn test_scoped_response_failure_releases_permit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let fetcher = test_fetcher(2, dir.path());
    let mut response = fetcher
        .open(&format!("{}/missing", server.uri()), None)
        .unwrap();

    assert!(response.start().await.is_err());
    assert_eq!(response.state(), ResponseState::Closed);
    assert_eq!(fetcher.admission().in_flight(), 0);
    assert!(!response.close());
}
