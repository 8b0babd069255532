//! Integration tests for HTTP probing and header classification

mod common;

use common::{closed_port_url, hardened_response, test_config};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use vigil::http::HttpClient;
use vigil::models::{SchemeFallback, Severity};
use vigil::scanner::probe::{HttpProber, Prober};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn prober(config: &vigil::models::ScanConfig) -> HttpProber {
    HttpProber::new(HttpClient::from_config(config).expect("Failed to create client"))
}

#[tokio::test]
async fn test_only_missing_frame_options() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Security-Policy", "default-src 'self'")
                .insert_header("X-Content-Type-Options", "nosniff")
                .insert_header("Cache-Control", "no-store"),
        )
        .mount(&mock_server)
        .await;

    let target = format!("{}/", mock_server.uri());
    let config = test_config(&[&target]);
    let result = prober(&config).probe(&target).await;

    assert_eq!(result.status, Some(200));
    assert_eq!(result.issues, vec!["missing X-Frame-Options"]);
    assert_eq!(result.severity, Severity::Medium);
    assert!(result.error.is_none());
    assert_eq!(
        result.security_headers.get("X-Frame-Options"),
        Some(&None),
        "absent headers are recorded as null"
    );
    assert_eq!(
        result
            .security_headers
            .get("Content-Security-Policy")
            .cloned()
            .flatten()
            .as_deref(),
        Some("default-src 'self'")
    );
}

#[tokio::test]
async fn test_connection_refused_is_error() {
    let target = closed_port_url().await;
    let config = test_config(&[&target]);
    let result = prober(&config).probe(&target).await;

    assert_eq!(result.severity, Severity::Error);
    assert!(result.error.is_some());
    assert_eq!(result.status, None);
    assert!(result.security_headers.is_empty());
    assert_eq!(result.issues.len(), 1);
    assert!(result.issues[0].starts_with("request failed"));
}

#[tokio::test]
async fn test_missing_security_headers() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let target = format!("{}/api/users", mock_server.uri());
    let config = test_config(&[&target]);
    let result = prober(&config).probe(&target).await;

    assert_eq!(
        result.issues,
        vec![
            "missing X-Frame-Options",
            "missing Content-Security-Policy",
            "missing X-Content-Type-Options",
            "missing Content-Type",
            "missing Cache-Control",
        ]
    );
    assert_eq!(result.severity, Severity::Medium);
}

#[tokio::test]
async fn test_permissive_cors_and_fingerprinting() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            hardened_response(200)
                .insert_header("Access-Control-Allow-Origin", "*")
                .insert_header("Server", "Apache/2.4.51 (Ubuntu)")
                .insert_header("X-Powered-By", "PHP/8.1.2"),
        )
        .mount(&mock_server)
        .await;

    let target = mock_server.uri();
    let config = test_config(&[&target]);
    let result = prober(&config).probe(&target).await;

    assert_eq!(
        result.issues,
        vec!["overly permissive CORS", "server fingerprinting leak"]
    );
    assert_eq!(result.severity, Severity::High);
}

#[tokio::test]
async fn test_server_error_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(hardened_response(503))
        .mount(&mock_server)
        .await;

    let target = mock_server.uri();
    let config = test_config(&[&target]);
    let result = prober(&config).probe(&target).await;

    assert_eq!(result.status, Some(503));
    assert_eq!(result.issues, vec!["unexpected status code"]);
    assert_eq!(result.severity, Severity::Medium);
}

#[tokio::test]
async fn test_authorization_header_is_sent() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/private"))
        .and(header("authorization", "Bearer abc123"))
        .respond_with(hardened_response(200))
        .mount(&mock_server)
        .await;

    let target = format!("{}/private", mock_server.uri());
    let mut config = test_config(&[&target]);
    config.auth_header = Some("Bearer abc123".to_string());
    let result = prober(&config).probe(&target).await;

    assert_eq!(result.status, Some(200), "issues: {:?}", result.issues);
}

#[tokio::test]
async fn test_https_falls_back_to_http() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(hardened_response(200))
        .mount(&mock_server)
        .await;

    // The mock server speaks plain HTTP, so the TLS attempt fails first
    let address = mock_server.address();
    let target = format!("https://{address}/");
    let mut config = test_config(&[&target]);
    config.scheme_fallback = SchemeFallback::HttpsToHttp;

    let prober = prober(&config);
    let result = prober.probe(&target).await;

    assert_eq!(result.status, Some(200), "error: {:?}", result.error);
    assert_eq!(result.url, target);
    assert_eq!(prober.client().request_count(), 2);
}

#[tokio::test]
async fn test_no_fallback_without_policy() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(hardened_response(200))
        .mount(&mock_server)
        .await;

    let target = format!("https://{}/", mock_server.address());
    let config = test_config(&[&target]);

    let prober = prober(&config);
    let result = prober.probe(&target).await;

    assert_eq!(result.severity, Severity::Error);
    assert_eq!(prober.client().request_count(), 1);
}

#[tokio::test]
async fn test_response_time_covers_only_the_answering_attempt() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    tokio::spawn(async move {
        // The TLS attempt connects first and is never answered
        let (stalled, _) = listener.accept().await.unwrap();
        let (mut plain, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 2048];
        let _ = plain.read(&mut buf).await;
        plain
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
            .await
            .unwrap();
        drop(stalled);
    });

    let target = format!("https://{address}/");
    let mut config = test_config(&[&target]);
    config.timeout_secs = 1;
    config.scheme_fallback = SchemeFallback::HttpsToHttp;

    let started = std::time::Instant::now();
    let result = prober(&config).probe(&target).await;

    assert_eq!(result.status, Some(200), "error: {:?}", result.error);
    assert!(started.elapsed() >= std::time::Duration::from_secs(1));
    assert!(
        result.response_time_ms < 900.0,
        "response time {}ms includes the failed attempt",
        result.response_time_ms
    );
}
