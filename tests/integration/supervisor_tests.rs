use crate::test_fetcher;
use crawlgate::{CrawlError, ShutdownReason, SupervisorLimits, TaskSupervisor};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_width_breach_cancels_fetches_and_returns_permits() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let fetcher = test_fetcher(1, dir.path());
    let supervisor = TaskSupervisor::new(SupervisorLimits {
        max_width: Some(2),
        ..Default::default()
    });

    let mut handles = Vec::new();
    for i in 0..2 {
        let fetcher = fetcher.clone();
        let url = format!("{}/slow/{}", server.uri(), i);
        handles.push(supervisor.spawn(async move { fetcher.fetch_bytes(&url, None).await }));
    }
    // Let both fetches take their permits.
    while fetcher.admission().in_flight() < 2 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let third = supervisor.spawn(async { Ok(Vec::<u8>::new()) });
    assert!(matches!(
        third.join().await,
        Err(CrawlError::SupervisorShutdown {
            reason: ShutdownReason::WidthExceeded
        })
    ));

    for handle in handles {
        let err = handle.join().await.unwrap_err();
        assert!(err.is_supervisor_shutdown());
    }
    supervisor.join(Some(Duration::from_secs(1))).await.unwrap();
    assert_eq!(fetcher.admission().in_flight(), 0);
}

#[tokio::test]
async fn test_supervised_fetch_failures_are_collected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let fetcher = test_fetcher(2, dir.path());
    let supervisor = TaskSupervisor::new(SupervisorLimits::default());

    for i in 0..3 {
        let fetcher = fetcher.clone();
        let url = format!("{}/broken/{}", server.uri(), i);
        supervisor.spawn(async move { fetcher.fetch_bytes(&url, None).await });
    }

    let failures = supervisor
        .join_failures(Some(Duration::from_secs(5)))
        .await
        .unwrap();
    assert_eq!(failures.len(), 3);
    assert!(failures
        .iter()
        .all(|f| f.kind == crawlgate::ErrorKind::TransientNetwork));
    assert!(!supervisor.is_closed());
    assert_eq!(supervisor.close(None).await, 0);
}
