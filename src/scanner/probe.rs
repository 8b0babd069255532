//! Per-target probes

use super::headers::{classify, extract_security_headers};
use crate::error::VigilError;
use crate::http::HttpClient;
use crate::models::{iso_timestamp, ProbeResult, SecurityHeaders};
use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

/// Checks a single target and reports the outcome.
///
/// Implementations never fail: transport problems are recorded on the
/// returned result so one bad target cannot abort a run.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, url: &str) -> ProbeResult;
}

/// Probes targets over HTTP(S)
#[derive(Clone)]
pub struct HttpProber {
    client: HttpClient,
}

impl HttpProber {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, url: &str) -> ProbeResult {
        match self.client.get(url).await {
            Ok((response, elapsed)) => {
                let status = response.status().as_u16();
                let headers = extract_security_headers(response.headers());
                debug!("✓ {url} [{status}] {}ms", elapsed.as_millis());
                probe_success(url, status, headers, elapsed.as_secs_f64() * 1000.0)
            }
            Err(e) => {
                let reason = error_chain(&e);
                debug!("✗ {url} failed: {reason}");
                probe_failure(url, &reason)
            }
        }
    }
}

/// Builds the result for a target that answered
pub fn probe_success(
    url: &str,
    status: u16,
    security_headers: SecurityHeaders,
    response_time_ms: f64,
) -> ProbeResult {
    let classification = classify(url, Some(status), &security_headers, None);
    ProbeResult {
        url: url.to_string(),
        status: Some(status),
        security_headers,
        issues: classification.issues,
        severity: classification.severity,
        error: None,
        response_time_ms: round_ms(response_time_ms),
        timestamp: iso_timestamp(Utc::now()),
    }
}

/// Builds the result for a target that could not be reached
pub fn probe_failure(url: &str, error: &str) -> ProbeResult {
    let security_headers = SecurityHeaders::new();
    let classification = classify(url, None, &security_headers, Some(error));
    ProbeResult {
        url: url.to_string(),
        status: None,
        security_headers,
        issues: classification.issues,
        severity: classification.severity,
        error: Some(error.to_string()),
        response_time_ms: 0.0,
        timestamp: iso_timestamp(Utc::now()),
    }
}

/// Joins an error with its sources, so "connection refused" survives the
/// generic "error sending request" wrapper
fn error_chain(err: &VigilError) -> String {
    let mut out = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        let text = cause.to_string();
        if !out.contains(&text) {
            out.push_str(": ");
            out.push_str(&text);
        }
        source = cause.source();
    }
    out
}

fn round_ms(ms: f64) -> f64 {
    (ms * 100.0).round() / 100.0
}
