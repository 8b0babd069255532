//! HTTP client wrapper with scheme fallback and request counting

use crate::error::{Result, VigilError};
use crate::models::{ScanConfig, SchemeFallback};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, Response};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

/// HTTP client used by the probes. Cheap to clone; clones share the counter.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    request_count: Arc<AtomicU64>,
    fallback: SchemeFallback,
}

impl HttpClient {
    /// Creates a new HttpClient from scan configuration
    pub fn from_config(config: &ScanConfig) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        if let Some(ref auth) = config.auth_header {
            let value = HeaderValue::from_str(auth).map_err(|e| {
                VigilError::ConfigError(format!("Invalid Authorization header value: {e}"))
            })?;
            default_headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(&config.user_agent)
            .default_headers(default_headers)
            .redirect(if config.follow_redirects {
                reqwest::redirect::Policy::limited(10)
            } else {
                reqwest::redirect::Policy::none()
            })
            .build()?;

        Ok(Self {
            client,
            request_count: Arc::new(AtomicU64::new(0)),
            fallback: config.scheme_fallback,
        })
    }

    /// Sends a GET request. On a transport failure, retries once on the
    /// alternate scheme when the configured fallback applies to this URL.
    ///
    /// Also returns how long the attempt that produced the response took.
    pub async fn get(&self, url: &str) -> Result<(Response, Duration)> {
        match self.send_get(url).await {
            Ok(answered) => Ok(answered),
            Err(first) => match fallback_url(url, self.fallback) {
                Some(alternate) => {
                    debug!("Request to {url} failed ({first}), falling back to {alternate}");
                    self.send_get(&alternate).await
                }
                None => Err(first),
            },
        }
    }

    /// Returns the total number of requests made
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    async fn send_get(&self, url: &str) -> Result<(Response, Duration)> {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();
        let response = self.client.get(url).send().await?;
        let elapsed = started.elapsed();
        debug!("Response: {} for {}", response.status(), response.url());
        Ok((response, elapsed))
    }
}

/// The same URL on the alternate scheme, if `policy` allows switching from this one
pub fn fallback_url(url: &str, policy: SchemeFallback) -> Option<String> {
    let (from, to) = match policy {
        SchemeFallback::None => return None,
        SchemeFallback::HttpsToHttp => ("https", "http"),
        SchemeFallback::HttpToHttps => ("http", "https"),
    };

    let mut parsed = Url::parse(url).ok()?;
    if parsed.scheme() != from {
        return None;
    }
    parsed.set_scheme(to).ok()?;
    Some(parsed.to_string())
}
