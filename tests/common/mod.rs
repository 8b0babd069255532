//! Common test utilities

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vigil::models::{ProbeResult, Report, ScanConfig, SecurityHeaders};
use vigil::scanner::probe::{probe_failure, probe_success, Prober};
use wiremock::ResponseTemplate;

/// Creates a test ScanConfig pointing at the given targets
pub fn test_config(targets: &[&str]) -> ScanConfig {
    ScanConfig {
        targets: targets.iter().map(|t| t.to_string()).collect(),
        timeout_secs: 5,
        concurrency: 4,
        user_agent: "vigil-test/0.1.0".to_string(),
        ..ScanConfig::default()
    }
}

/// A response carrying every recommended header except HSTS
pub fn hardened_response(status: u16) -> ResponseTemplate {
    ResponseTemplate::new(status)
        .insert_header("X-Frame-Options", "DENY")
        .insert_header("Content-Security-Policy", "default-src 'self'")
        .insert_header("X-Content-Type-Options", "nosniff")
        .insert_header("Cache-Control", "no-store")
        .insert_header("Content-Type", "application/json")
}

/// An address nothing listens on
pub async fn closed_port_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    format!("http://{addr}/")
}

/// A small report for store and pipeline tests
pub fn sample_report(scan_id: &str) -> Report {
    Report {
        scan_id: scan_id.to_string(),
        timestamp: "2026-10-18T12:00:00.000Z".to_string(),
        duration_seconds: 0.1,
        total_targets: 1,
        results: vec![probe_success(
            "http://a.test/",
            200,
            SecurityHeaders::new(),
            3.0,
        )],
    }
}

/// Waits until `check` passes or the timeout expires
pub async fn wait_for<F: Fn() -> bool>(check: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Prober that answers from a script instead of the network
pub struct ScriptedProber {
    pub calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    pub max_in_flight: Arc<AtomicUsize>,
    delay: Duration,
    failing: HashSet<String>,
}

impl ScriptedProber {
    pub fn new(delay: Duration) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            delay,
            failing: HashSet::new(),
        }
    }

    pub fn failing(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, url: &str) -> ProbeResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(url) {
            probe_failure(url, "connection refused")
        } else {
            probe_success(url, 200, SecurityHeaders::new(), 1.0)
        }
    }
}
