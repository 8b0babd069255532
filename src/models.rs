//! Core data models for vigil

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Severity of one probe outcome.
///
/// Ordered so that the highest classification floor wins with `max`.
/// `Error` only ever comes from a transport failure, never from a rule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Medium,
    High,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Error => write!(f, "error"),
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "error" => Ok(Severity::Error),
            other => Err(format!(
                "unknown severity '{other}' (expected info, medium, high or error)"
            )),
        }
    }
}

/// Observed value of each inspected header; `None` means the header was absent
pub type SecurityHeaders = BTreeMap<String, Option<String>>;

/// One target's outcome for one scan run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeResult {
    /// Configured target URL
    pub url: String,
    /// HTTP status, absent on transport failure
    pub status: Option<u16>,
    pub security_headers: SecurityHeaders,
    /// Human-readable findings in rule order
    pub issues: Vec<String>,
    pub severity: Severity,
    /// Transport or timeout failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub response_time_ms: f64,
    /// ISO-8601 UTC
    pub timestamp: String,
}

/// One completed scan run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub scan_id: String,
    pub timestamp: String,
    pub duration_seconds: f64,
    pub total_targets: usize,
    pub results: Vec<ProbeResult>,
}

impl Report {
    /// Returns count of results with the given severity
    pub fn count_by_severity(&self, severity: Severity) -> usize {
        self.results
            .iter()
            .filter(|r| r.severity == severity)
            .count()
    }

    /// Per-severity counts, in the order the summary is logged
    pub fn summary(&self) -> SeveritySummary {
        SeveritySummary {
            high: self.count_by_severity(Severity::High),
            medium: self.count_by_severity(Severity::Medium),
            info: self.count_by_severity(Severity::Info),
            error: self.count_by_severity(Severity::Error),
        }
    }

    /// True if any result is at or above `threshold`
    pub fn has_severity_at_least(&self, threshold: Severity) -> bool {
        self.results.iter().any(|r| r.severity >= threshold)
    }
}

/// Count of results per severity for one report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeveritySummary {
    pub high: usize,
    pub medium: usize,
    pub info: usize,
    pub error: usize,
}

/// Generates a scan identifier: UTC start time to the millisecond plus a random suffix
pub fn generate_scan_id(started_at: DateTime<Utc>) -> String {
    let suffix = format!("{:x}", uuid::Uuid::new_v4().as_u128());
    format!("{}_{}", started_at.format("%Y%m%d_%H%M%S%.3f"), &suffix[..8])
}

/// ISO-8601 timestamp used on reports and probe results
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// What to do when the configured scheme fails at the transport level
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SchemeFallback {
    #[default]
    None,
    HttpsToHttp,
    HttpToHttps,
}

impl FromStr for SchemeFallback {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "none" => Ok(SchemeFallback::None),
            "https_to_http" => Ok(SchemeFallback::HttpsToHttp),
            "http_to_https" => Ok(SchemeFallback::HttpToHttps),
            other => Err(format!(
                "unknown scheme fallback '{other}' (expected none, https_to_http or http_to_https)"
            )),
        }
    }
}

/// Configuration for the scan loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Deduplicated target URLs, in configured order
    pub targets: Vec<String>,
    /// Seconds between the starts of consecutive runs
    pub interval_secs: u64,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Maximum probes in flight at once
    pub concurrency: usize,
    /// User-Agent header value
    pub user_agent: String,
    /// Value sent as the Authorization header, if any
    #[serde(default)]
    pub auth_header: Option<String>,
    #[serde(default)]
    pub scheme_fallback: SchemeFallback,
    /// Whether to follow HTTP redirects
    pub follow_redirects: bool,
    /// Where the latest report is persisted
    pub report_path: PathBuf,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            targets: vec![
                "https://example.com".to_string(),
                "https://httpbin.org/get".to_string(),
            ],
            interval_secs: 30,
            timeout_secs: 10,
            concurrency: 5,
            user_agent: "vigil/0.1.0".to_string(),
            auth_header: None,
            scheme_fallback: SchemeFallback::None,
            follow_redirects: true,
            report_path: PathBuf::from("./reports/report.json"),
        }
    }
}

/// Configuration for the live-update gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Socket address to listen on
    pub bind: String,
    /// How often the report marker is checked
    pub poll_interval_ms: u64,
    /// Report file the gateway reads and watches
    pub report_path: PathBuf,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8081".to_string(),
            poll_interval_ms: 500,
            report_path: PathBuf::from("./reports/report.json"),
        }
    }
}
