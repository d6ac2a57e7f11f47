//! Integration tests for polling a Podman API
//!
//! These tests serve canned libpod responses from a mock HTTP server and
//! check what the poll cycle publishes into the metric store.

#[cfg(test)]
mod podman_api_tests {
    use crate::collector::{Collector, ContainerSource, PodmanClient};
    use crate::error::PollError;
    use crate::observability::ExporterMetrics;
    use std::sync::Arc;
    use std::time::Duration;

    const CONTAINERS_PATH: &str = "/v3.4.2/libpod/containers/json";

    fn collector_for(url: &str, timeout: Duration) -> Collector {
        let client = PodmanClient::new(url, timeout).unwrap();
        Collector::new(Arc::new(client), ExporterMetrics::new().unwrap())
    }

    async fn serve_listing(status: usize, body: &str) -> (mockito::ServerGuard, mockito::Mock) {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", CONTAINERS_PATH)
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await;
        (server, mock)
    }

    #[tokio::test]
    async fn test_mixed_listing_counts_nosana_containers() {
        let (server, mock) = serve_listing(
            200,
            r#"[{"Image":"docker.io/nosana/worker:latest"},{"Image":"docker.io/other/app:1.0"}]"#,
        )
        .await;
        let collector = collector_for(
            &format!("{}{}", server.url(), CONTAINERS_PATH),
            Duration::from_secs(5),
        );

        let outcome = collector.run_cycle().await;

        mock.assert_async().await;
        assert!(outcome.is_success());
        let metrics = collector.metrics();
        assert_eq!(metrics.running_jobs(), 1.0);
        assert_eq!(
            metrics.image_presence("docker.io/nosana/worker:latest"),
            Some(1.0)
        );
        assert_eq!(metrics.image_presence("docker.io/other/app:1.0"), None);

        let text = metrics.gather_text().unwrap();
        assert!(text.contains("Nosana_running_job 1"));
        assert!(text.contains(
            r#"Nosana_running_image{imageName="docker.io/nosana/worker:latest"} 1"#
        ));
        assert!(!text.contains("other/app"));
    }

    #[tokio::test]
    async fn test_realistic_libpod_listing() {
        let body = r#"[
            {
                "AutoRemove": false,
                "Command": ["/bin/sh", "-c", "run-job"],
                "Created": "2024-03-01T10:00:00Z",
                "Id": "6c2b0e0c9f1d",
                "Image": "docker.io/nosana/nosana-node:latest",
                "ImageID": "sha256:abc",
                "Labels": {"io.podman": "1"},
                "Names": ["nosana-node"],
                "Ports": null,
                "State": "running"
            },
            {
                "Id": "a81f7e6b2d44",
                "Image": "registry.hub.docker.com/nosana/frpc:0.1.0",
                "Names": ["frpc"],
                "State": "running"
            },
            {
                "Id": "0d9e4c3b1a22",
                "Image": "docker.io/library/postgres:16",
                "Names": ["db"],
                "State": "running"
            }
        ]"#;
        let (server, _mock) = serve_listing(200, body).await;
        let collector = collector_for(
            &format!("{}{}", server.url(), CONTAINERS_PATH),
            Duration::from_secs(5),
        );

        collector.run_cycle().await;

        assert_eq!(collector.metrics().running_jobs(), 2.0);
        assert_eq!(
            collector.metrics().tracked_images(),
            vec![
                "docker.io/nosana/nosana-node:latest",
                "registry.hub.docker.com/nosana/frpc:0.1.0"
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_listing() {
        let (server, _mock) = serve_listing(200, "[]").await;
        let collector = collector_for(
            &format!("{}{}", server.url(), CONTAINERS_PATH),
            Duration::from_secs(5),
        );

        let outcome = collector.run_cycle().await;

        assert!(outcome.is_success());
        assert_eq!(collector.metrics().running_jobs(), 0.0);
        assert!(collector.metrics().tracked_images().is_empty());
    }

    #[tokio::test]
    async fn test_service_unavailable() {
        let (server, mock) = serve_listing(503, r#"{"cause":"unavailable"}"#).await;
        let url = format!("{}{}", server.url(), CONTAINERS_PATH);
        let collector = collector_for(&url, Duration::from_secs(5));
        collector.metrics().set_running_jobs(4);

        let outcome = collector.run_cycle().await;

        mock.assert_async().await;
        assert_eq!(collector.metrics().running_jobs(), 0.0);
        assert!(collector.metrics().tracked_images().is_empty());
        assert_eq!(collector.metrics().poll_errors("unhealthy"), 1);
        match outcome {
            crate::collector::CycleOutcome::Failed(err) => {
                assert!(matches!(err, PollError::Unhealthy { status: 503, .. }));
                let message = err.to_string();
                assert!(message.contains(&url));
                assert!(message.contains("503"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let (server, _mock) = serve_listing(200, r#"{"message":"not a list"}"#).await;
        let collector = collector_for(
            &format!("{}{}", server.url(), CONTAINERS_PATH),
            Duration::from_secs(5),
        );
        collector.metrics().set_running_jobs(2);

        let outcome = collector.run_cycle().await;

        assert!(!outcome.is_success());
        assert_eq!(collector.metrics().running_jobs(), 0.0);
        assert_eq!(collector.metrics().poll_errors("malformed"), 1);
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let url = format!("http://127.0.0.1:{}{}", port, CONTAINERS_PATH);
        let client = PodmanClient::new(&url, Duration::from_secs(5)).unwrap();

        let err = client.list_containers().await.unwrap_err();
        assert!(matches!(err, PollError::Unreachable { .. }));
        assert!(err.to_string().contains(&url));

        let collector = collector_for(&url, Duration::from_secs(5));
        collector.metrics().set_running_jobs(1);
        collector.run_cycle().await;
        assert_eq!(collector.metrics().running_jobs(), 0.0);
        assert_eq!(collector.metrics().poll_errors("unreachable"), 1);
    }

    #[tokio::test]
    async fn test_hung_source_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hold = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let url = format!("http://{}{}", addr, CONTAINERS_PATH);
        let client = PodmanClient::new(&url, Duration::from_millis(200)).unwrap();

        let err = tokio::time::timeout(Duration::from_secs(5), client.list_containers())
            .await
            .expect("request outlived its timeout")
            .unwrap_err();

        match err {
            PollError::Unreachable { source, .. } => assert!(source.is_timeout()),
            other => panic!("expected timeout, got {:?}", other),
        }
        hold.abort();
    }
}

#[cfg(test)]
mod poll_failure_log_tests {
    use crate::collector::{Collector, PodmanClient};
    use crate::observability::ExporterMetrics;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tracing_subscriber::fmt::MakeWriter;

    const CONTAINERS_PATH: &str = "/v3.4.2/libpod/containers/json";

    /// In-memory sink for JSON log lines
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    impl CapturedLogs {
        /// Fields of every ERROR event tagged `poll_failed`
        fn poll_failures(&self) -> Vec<serde_json::Value> {
            let bytes = self.0.lock().unwrap().clone();
            String::from_utf8(bytes)
                .unwrap()
                .lines()
                .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
                .filter(|event| {
                    event["level"] == "ERROR" && event["fields"]["event"] == "poll_failed"
                })
                .map(|event| event["fields"].clone())
                .collect()
        }
    }

    async fn run_logged_cycle(url: &str) -> (Collector, CapturedLogs) {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_writer(logs.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let client = PodmanClient::new(url, Duration::from_secs(5)).unwrap();
        let collector = Collector::new(Arc::new(client), ExporterMetrics::new().unwrap());
        collector.run_cycle().await;

        (collector, logs)
    }

    #[tokio::test]
    async fn test_unavailable_source_logs_one_error_with_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", CONTAINERS_PATH)
            .with_status(503)
            .create_async()
            .await;
        let url = format!("{}{}", server.url(), CONTAINERS_PATH);

        let (collector, logs) = run_logged_cycle(&url).await;

        let failures = logs.poll_failures();
        assert_eq!(failures.len(), 1, "expected exactly one failure log line");
        let fields = &failures[0];
        assert_eq!(fields["url"], url.as_str());
        assert_eq!(fields["reason"], "unhealthy");
        let error = fields["error"].as_str().unwrap();
        assert!(error.contains(&url));
        assert!(error.contains("503"));
        assert_eq!(collector.metrics().running_jobs(), 0.0);
    }

    #[tokio::test]
    async fn test_refused_source_logs_one_error_with_cause() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let url = format!("http://127.0.0.1:{}{}", port, CONTAINERS_PATH);

        let (collector, logs) = run_logged_cycle(&url).await;

        let failures = logs.poll_failures();
        assert_eq!(failures.len(), 1, "expected exactly one failure log line");
        let fields = &failures[0];
        assert_eq!(fields["url"], url.as_str());
        assert_eq!(fields["reason"], "unreachable");
        let error = fields["error"].as_str().unwrap();
        assert!(error.contains(&url));
        assert!(
            error.to_lowercase().contains("connection refused"),
            "connection error missing from {error}"
        );
        assert_eq!(collector.metrics().running_jobs(), 0.0);
    }

    #[tokio::test]
    async fn test_successful_cycle_logs_no_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", CONTAINERS_PATH)
            .with_status(200)
            .with_body(r#"[{"Image":"docker.io/nosana/worker:latest"}]"#)
            .create_async()
            .await;

        let (_, logs) = run_logged_cycle(&format!("{}{}", server.url(), CONTAINERS_PATH)).await;

        assert!(logs.poll_failures().is_empty());
    }
}
