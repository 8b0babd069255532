//! Configuration management for vigil
//!
//! Layering, lowest to highest: defaults, TOML file, environment, CLI flags.

use crate::error::{Result, VigilError};
use crate::models::{GatewayConfig, ScanConfig, SchemeFallback};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use url::Url;

/// Everything the binary needs, scan side and gateway side
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub scan: ScanConfig,
    pub gateway: GatewayConfig,
}

/// File-based configuration structure matching vigil.toml
#[derive(Debug, Deserialize)]
struct FileConfig {
    scan: Option<ScanSection>,
    report: Option<ReportSection>,
    gateway: Option<GatewaySection>,
}

#[derive(Debug, Deserialize)]
struct ScanSection {
    targets: Option<Vec<String>>,
    interval_secs: Option<u64>,
    timeout_secs: Option<u64>,
    concurrency: Option<usize>,
    user_agent: Option<String>,
    auth_header: Option<String>,
    scheme_fallback: Option<SchemeFallback>,
    follow_redirects: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ReportSection {
    path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct GatewaySection {
    bind: Option<String>,
    poll_interval_ms: Option<u64>,
}

/// Loads configuration from a TOML file and merges with defaults
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(VigilError::IoError)?;
    parse_config(&content)
}

/// Parses TOML configuration text and merges with defaults
pub fn parse_config(content: &str) -> Result<AppConfig> {
    let file_config: FileConfig = toml::from_str(content)?;

    let mut config = AppConfig::default();

    if let Some(scan) = file_config.scan {
        if let Some(targets) = scan.targets {
            config.scan.targets = targets;
        }
        if let Some(interval) = scan.interval_secs {
            config.scan.interval_secs = interval;
        }
        if let Some(timeout) = scan.timeout_secs {
            config.scan.timeout_secs = timeout;
        }
        if let Some(concurrency) = scan.concurrency {
            config.scan.concurrency = concurrency;
        }
        if let Some(ua) = scan.user_agent {
            config.scan.user_agent = ua;
        }
        if let Some(auth) = scan.auth_header {
            config.scan.auth_header = Some(auth);
        }
        if let Some(fallback) = scan.scheme_fallback {
            config.scan.scheme_fallback = fallback;
        }
        if let Some(follow) = scan.follow_redirects {
            config.scan.follow_redirects = follow;
        }
    }

    if let Some(report) = file_config.report {
        if let Some(path) = report.path {
            config.scan.report_path = path;
        }
    }

    if let Some(gateway) = file_config.gateway {
        if let Some(bind) = gateway.bind {
            config.gateway.bind = bind;
        }
        if let Some(poll) = gateway.poll_interval_ms {
            config.gateway.poll_interval_ms = poll;
        }
    }

    config.gateway.report_path = config.scan.report_path.clone();
    Ok(config)
}

/// Applies environment overrides through `lookup`, so tests can supply their own
pub fn apply_env<F>(config: &mut AppConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(targets) = lookup("SCANNER_TARGETS") {
        config.scan.targets = split_targets(&targets);
    }
    if let Some(v) = lookup("SCAN_INTERVAL") {
        config.scan.interval_secs = parse_number("SCAN_INTERVAL", &v)?;
    }
    if let Some(v) = lookup("SCANNER_TIMEOUT") {
        config.scan.timeout_secs = parse_number("SCANNER_TIMEOUT", &v)?;
    }
    if let Some(v) = lookup("SCANNER_CONCURRENCY") {
        config.scan.concurrency = parse_number("SCANNER_CONCURRENCY", &v)?;
    }
    if let Some(v) = lookup("SCANNER_AUTH_HEADER") {
        if !v.trim().is_empty() {
            config.scan.auth_header = Some(v);
        }
    }
    if let Some(v) = lookup("REPORT_PATH") {
        config.scan.report_path = PathBuf::from(v);
    }
    if let Some(v) = lookup("GATEWAY_BIND") {
        config.gateway.bind = v;
    }

    config.gateway.report_path = config.scan.report_path.clone();
    Ok(())
}

/// CLI overrides; every field is optional and only set values win
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub targets: Option<Vec<String>>,
    pub interval_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub concurrency: Option<usize>,
    pub report_path: Option<PathBuf>,
    pub bind: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub scheme_fallback: Option<SchemeFallback>,
}

/// Merges CLI arguments into an existing AppConfig
pub fn merge_cli_args(config: &mut AppConfig, cli: CliOverrides) {
    if let Some(targets) = cli.targets {
        config.scan.targets = targets
            .iter()
            .flat_map(|t| split_targets(t))
            .collect();
    }
    if let Some(i) = cli.interval_secs {
        config.scan.interval_secs = i;
    }
    if let Some(t) = cli.timeout_secs {
        config.scan.timeout_secs = t;
    }
    if let Some(c) = cli.concurrency {
        config.scan.concurrency = c;
    }
    if let Some(p) = cli.report_path {
        config.scan.report_path = p;
    }
    if let Some(b) = cli.bind {
        config.gateway.bind = b;
    }
    if let Some(p) = cli.poll_interval_ms {
        config.gateway.poll_interval_ms = p;
    }
    if let Some(f) = cli.scheme_fallback {
        config.scan.scheme_fallback = f;
    }
    config.gateway.report_path = config.scan.report_path.clone();
}

/// Validates the merged configuration and deduplicates targets in place
pub fn validate(config: &mut AppConfig) -> Result<()> {
    config.scan.targets = dedupe_targets(&config.scan.targets)?;

    if config.scan.interval_secs == 0 {
        return Err(VigilError::ConfigError(
            "scan interval must be at least 1 second".to_string(),
        ));
    }
    if config.scan.timeout_secs == 0 {
        return Err(VigilError::ConfigError(
            "request timeout must be at least 1 second".to_string(),
        ));
    }
    if config.scan.concurrency == 0 {
        return Err(VigilError::ConfigError(
            "concurrency must be at least 1".to_string(),
        ));
    }
    if config.gateway.poll_interval_ms == 0 {
        return Err(VigilError::ConfigError(
            "poll interval must be at least 1 ms".to_string(),
        ));
    }
    Ok(())
}

/// Splits a comma-separated target list, dropping blanks
pub fn split_targets(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Validates each target as an absolute http(s) URL and removes duplicates,
/// keeping the first occurrence
pub fn dedupe_targets(targets: &[String]) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(targets.len());

    for raw in targets {
        let target = raw.trim();
        if target.is_empty() {
            continue;
        }
        let url = Url::parse(target)
            .map_err(|e| VigilError::ConfigError(format!("invalid target '{target}': {e}")))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(VigilError::ConfigError(format!(
                "target '{target}' must use http or https"
            )));
        }
        if url.host_str().is_none() {
            return Err(VigilError::ConfigError(format!(
                "target '{target}' has no host"
            )));
        }
        if seen.insert(url.as_str().to_string()) {
            out.push(target.to_string());
        }
    }

    if out.is_empty() {
        return Err(VigilError::ConfigError(
            "at least one target is required".to_string(),
        ));
    }
    Ok(out)
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| VigilError::ConfigError(format!("{name} must be a number, got '{value}'")))
}
