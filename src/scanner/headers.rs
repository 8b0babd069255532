//! Security header classification
//!
//! Turns one probe outcome into an ordered list of issues and a severity.
//! Every rule contributes a severity floor; the result is the highest floor
//! triggered, or `info` when nothing fires. Classification is a pure function
//! of the URL, status, observed headers and transport error.

use crate::models::{SecurityHeaders, Severity};
use reqwest::header::HeaderMap;
use url::Url;

/// Every header the rules below look at, recorded on each successful probe
pub const INSPECTED_HEADERS: &[&str] = &[
    "X-Frame-Options",
    "Content-Security-Policy",
    "X-Content-Type-Options",
    "Strict-Transport-Security",
    "Access-Control-Allow-Origin",
    "Content-Type",
    "Cache-Control",
    "Server",
    "X-Powered-By",
];

/// Issues and severity for one probe outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub issues: Vec<String>,
    pub severity: Severity,
}

struct RuleInput<'a> {
    url: &'a str,
    status: Option<u16>,
    headers: &'a SecurityHeaders,
}

impl RuleInput<'_> {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.as_deref())
    }

    fn missing(&self, name: &str) -> bool {
        self.header(name).is_none()
    }
}

struct HeaderRule {
    issue: &'static str,
    floor: Severity,
    triggered: fn(&RuleInput<'_>) -> bool,
}

fn missing_frame_options(r: &RuleInput<'_>) -> bool {
    r.missing("X-Frame-Options")
}

fn missing_csp(r: &RuleInput<'_>) -> bool {
    r.missing("Content-Security-Policy")
}

fn missing_content_type_options(r: &RuleInput<'_>) -> bool {
    r.missing("X-Content-Type-Options")
}

fn missing_hsts(r: &RuleInput<'_>) -> bool {
    is_https(r.url) && r.missing("Strict-Transport-Security")
}

fn wildcard_cors(r: &RuleInput<'_>) -> bool {
    r.header("Access-Control-Allow-Origin").map(str::trim) == Some("*")
}

fn api_missing_content_type(r: &RuleInput<'_>) -> bool {
    looks_like_api(r.url) && r.missing("Content-Type")
}

fn missing_cache_control(r: &RuleInput<'_>) -> bool {
    r.missing("Cache-Control")
}

fn fingerprinting(r: &RuleInput<'_>) -> bool {
    r.header("Server").is_some() || r.header("X-Powered-By").is_some()
}

fn error_status(r: &RuleInput<'_>) -> bool {
    matches!(r.status, Some(400..=599))
}

const RULES: &[HeaderRule] = &[
    HeaderRule {
        issue: "missing X-Frame-Options",
        floor: Severity::Medium,
        triggered: missing_frame_options,
    },
    HeaderRule {
        issue: "missing Content-Security-Policy",
        floor: Severity::Medium,
        triggered: missing_csp,
    },
    HeaderRule {
        issue: "missing X-Content-Type-Options",
        floor: Severity::Medium,
        triggered: missing_content_type_options,
    },
    HeaderRule {
        issue: "missing Strict-Transport-Security",
        floor: Severity::High,
        triggered: missing_hsts,
    },
    HeaderRule {
        issue: "overly permissive CORS",
        floor: Severity::High,
        triggered: wildcard_cors,
    },
    HeaderRule {
        issue: "missing Content-Type",
        floor: Severity::Medium,
        triggered: api_missing_content_type,
    },
    HeaderRule {
        issue: "missing Cache-Control",
        floor: Severity::Info,
        triggered: missing_cache_control,
    },
    HeaderRule {
        issue: "server fingerprinting leak",
        floor: Severity::Medium,
        triggered: fingerprinting,
    },
    HeaderRule {
        issue: "unexpected status code",
        floor: Severity::Medium,
        triggered: error_status,
    },
];

/// Classifies one probe outcome.
///
/// A transport error always yields `error` severity with a single
/// "request failed" issue; the header rules only run on responses.
pub fn classify(
    url: &str,
    status: Option<u16>,
    headers: &SecurityHeaders,
    error: Option<&str>,
) -> Classification {
    if let Some(err) = error {
        return Classification {
            issues: vec![format!("request failed: {err}")],
            severity: Severity::Error,
        };
    }

    let input = RuleInput {
        url,
        status,
        headers,
    };

    let mut issues = Vec::new();
    let mut severity = Severity::Info;
    for rule in RULES {
        if (rule.triggered)(&input) {
            issues.push(rule.issue.to_string());
            severity = severity.max(rule.floor);
        }
    }

    Classification { issues, severity }
}

/// Records the value of each inspected header, `None` when absent
pub fn extract_security_headers(headers: &HeaderMap) -> SecurityHeaders {
    INSPECTED_HEADERS
        .iter()
        .map(|name| {
            let value = headers
                .get(*name)
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());
            (name.to_string(), value)
        })
        .collect()
}

fn is_https(url: &str) -> bool {
    Url::parse(url)
        .map(|u| u.scheme() == "https")
        .unwrap_or(false)
}

/// API-looking endpoints: the path mentions `/api` or `/v1`
pub fn looks_like_api(url: &str) -> bool {
    let path = Url::parse(url)
        .map(|u| u.path().to_lowercase())
        .unwrap_or_default();
    path.contains("/api") || path.contains("/v1")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(present: &[(&str, &str)]) -> SecurityHeaders {
        let mut map: SecurityHeaders = INSPECTED_HEADERS
            .iter()
            .map(|h| (h.to_string(), None))
            .collect();
        for (k, v) in present {
            map.insert(k.to_string(), Some(v.to_string()));
        }
        map
    }

    fn hardened() -> Vec<(&'static str, &'static str)> {
        vec![
            ("X-Frame-Options", "DENY"),
            ("Content-Security-Policy", "default-src 'self'"),
            ("X-Content-Type-Options", "nosniff"),
            ("Strict-Transport-Security", "max-age=31536000"),
            ("Content-Type", "application/json"),
            ("Cache-Control", "no-store"),
        ]
    }

    #[test]
    fn test_hardened_response_is_info() {
        let c = classify("https://a.test/", Some(200), &headers(&hardened()), None);
        assert!(c.issues.is_empty(), "{:?}", c.issues);
        assert_eq!(c.severity, Severity::Info);
    }

    #[test]
    fn test_only_x_frame_options_missing() {
        let present: Vec<_> = hardened()
            .into_iter()
            .filter(|(k, _)| *k != "X-Frame-Options")
            .collect();
        let c = classify("http://a.test/", Some(200), &headers(&present), None);
        assert_eq!(c.issues, vec!["missing X-Frame-Options"]);
        assert_eq!(c.severity, Severity::Medium);
    }

    #[test]
    fn test_hsts_only_required_on_https() {
        let present: Vec<_> = hardened()
            .into_iter()
            .filter(|(k, _)| *k != "Strict-Transport-Security")
            .collect();
        let plain = classify("http://a.test/", Some(200), &headers(&present), None);
        assert!(plain.issues.is_empty());

        let tls = classify("https://a.test/", Some(200), &headers(&present), None);
        assert_eq!(tls.issues, vec!["missing Strict-Transport-Security"]);
        assert_eq!(tls.severity, Severity::High);
    }

    #[test]
    fn test_wildcard_cors_is_high() {
        let mut present = hardened();
        present.push(("Access-Control-Allow-Origin", "*"));
        let c = classify("https://a.test/", Some(200), &headers(&present), None);
        assert_eq!(c.issues, vec!["overly permissive CORS"]);
        assert_eq!(c.severity, Severity::High);

        let mut specific = hardened();
        specific.push(("Access-Control-Allow-Origin", "https://app.a.test"));
        let c = classify("https://a.test/", Some(200), &headers(&specific), None);
        assert!(c.issues.is_empty());
    }

    #[test]
    fn test_missing_content_type_only_matters_for_apis() {
        let present: Vec<_> = hardened()
            .into_iter()
            .filter(|(k, _)| *k != "Content-Type")
            .collect();
        let page = classify("https://a.test/index", Some(200), &headers(&present), None);
        assert!(page.issues.is_empty());

        let api = classify("https://a.test/api/users", Some(200), &headers(&present), None);
        assert_eq!(api.issues, vec!["missing Content-Type"]);
        assert_eq!(api.severity, Severity::Medium);
    }

    #[test]
    fn test_missing_cache_control_does_not_raise_severity() {
        let present: Vec<_> = hardened()
            .into_iter()
            .filter(|(k, _)| *k != "Cache-Control")
            .collect();
        let c = classify("https://a.test/", Some(200), &headers(&present), None);
        assert_eq!(c.issues, vec!["missing Cache-Control"]);
        assert_eq!(c.severity, Severity::Info);
    }

    #[test]
    fn test_fingerprinting_reported_once() {
        let mut present = hardened();
        present.push(("Server", "nginx/1.25"));
        present.push(("X-Powered-By", "Express"));
        let c = classify("https://a.test/", Some(200), &headers(&present), None);
        assert_eq!(c.issues, vec!["server fingerprinting leak"]);
        assert_eq!(c.severity, Severity::Medium);
    }

    #[test]
    fn test_error_status_codes() {
        for status in [400u16, 404, 500, 503] {
            let c = classify("https://a.test/", Some(status), &headers(&hardened()), None);
            assert_eq!(c.issues, vec!["unexpected status code"], "status {status}");
            assert_eq!(c.severity, Severity::Medium);
        }
        let ok = classify("https://a.test/", Some(302), &headers(&hardened()), None);
        assert!(ok.issues.is_empty());
    }

    #[test]
    fn test_issues_follow_rule_order() {
        let c = classify("https://a.test/api", Some(500), &headers(&[]), None);
        assert_eq!(
            c.issues,
            vec![
                "missing X-Frame-Options",
                "missing Content-Security-Policy",
                "missing X-Content-Type-Options",
                "missing Strict-Transport-Security",
                "missing Content-Type",
                "missing Cache-Control",
                "unexpected status code",
            ]
        );
        assert_eq!(c.severity, Severity::High);
    }

    #[test]
    fn test_transport_error_wins() {
        let c = classify(
            "https://a.test/",
            None,
            &SecurityHeaders::new(),
            Some("connection refused"),
        );
        assert_eq!(c.severity, Severity::Error);
        assert_eq!(c.issues, vec!["request failed: connection refused"]);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let h = headers(&[("Server", "Apache")]);
        let first = classify("https://a.test/v1/x", Some(404), &h, None);
        for _ in 0..10 {
            assert_eq!(classify("https://a.test/v1/x", Some(404), &h, None), first);
        }
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        let mut h = headers(&hardened());
        h.remove("X-Frame-Options");
        h.insert("x-frame-options".to_string(), Some("DENY".to_string()));
        let c = classify("https://a.test/", Some(200), &h, None);
        assert!(c.issues.is_empty(), "{:?}", c.issues);
    }

    #[test]
    fn test_extract_security_headers_records_absence() {
        let mut map = HeaderMap::new();
        map.insert("x-frame-options", "DENY".parse().unwrap());
        let extracted = extract_security_headers(&map);
        assert_eq!(extracted.len(), INSPECTED_HEADERS.len());
        assert_eq!(
            extracted.get("X-Frame-Options"),
            Some(&Some("DENY".to_string()))
        );
        assert_eq!(extracted.get("Server"), Some(&None));
    }
}
