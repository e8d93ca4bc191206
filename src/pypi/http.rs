//! HTTP client wrapper
//!
//! Every upstream call goes through [`HttpClient`]: it consults the response
//! cache, revalidates with ETags, rate limits outgoing requests, and retries
//! transient failures with exponential backoff and jitter.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::Rng;
use reqwest::header::{CONTENT_TYPE, ETAG, IF_NONE_MATCH, RETRY_AFTER, USER_AGENT};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::cache::HybridCache;
use crate::config::Config;
use crate::error::{PypiError, PypiMcpError, Result};

/// Upper bound for any single backoff sleep
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Revalidation records outlive fresh entries by this factor
const ETAG_TTL_FACTOR: u32 = 24;

/// A response body, decoded according to its content type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum Body {
    Json(Value),
    Text(String),
}

impl Body {
    /// Interpret the body as JSON, parsing text bodies if needed
    pub fn into_json(self, url: &str) -> Result<Value> {
        match self {
            Body::Json(value) => Ok(value),
            Body::Text(text) => serde_json::from_str(&text).map_err(|e| {
                PypiMcpError::Pypi(PypiError::BadResponse {
                    url: url.to_string(),
                    message: format!("invalid JSON: {}", e),
                })
            }),
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Body::Json(value) => value.to_string(),
            Body::Text(text) => text,
        }
    }
}

/// Stored alongside fresh entries so stale responses can be revalidated
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Revalidation {
    etag: String,
    body: Body,
}

/// Retry and rate-limit tuning
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub user_agent: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub min_request_interval: Duration,
}

impl From<&Config> for HttpSettings {
    fn from(config: &Config) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            timeout: config.timeout,
            max_retries: config.max_retries.max(1),
            retry_delay: config.retry_delay,
            min_request_interval: config.min_request_interval,
        }
    }
}

/// Cached, rate-limited, retrying HTTP client
pub struct HttpClient {
    http_client: reqwest::Client,
    cache: Arc<HybridCache>,
    settings: HttpSettings,
    last_request: tokio::sync::Mutex<Option<Instant>>,
    rate_limit_delay: Mutex<Duration>,
}

impl HttpClient {
    /// Create a new HTTP client backed by the given cache
    pub fn new(settings: HttpSettings, cache: Arc<HybridCache>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;

        Ok(Self {
            http_client,
            cache,
            rate_limit_delay: Mutex::new(settings.min_request_interval),
            settings,
            last_request: tokio::sync::Mutex::new(None),
        })
    }

    pub fn cache(&self) -> &Arc<HybridCache> {
        &self.cache
    }

    /// GET a URL
    pub async fn get(&self, url: &str) -> Result<Body> {
        self.execute(url, url, || self.http_client.get(url)).await
    }

    /// GET a URL and decode it as JSON
    pub async fn get_json(&self, url: &str) -> Result<Value> {
        self.get(url).await?.into_json(url)
    }

    /// GET a URL as text
    pub async fn get_text(&self, url: &str) -> Result<String> {
        Ok(self.get(url).await?.into_text())
    }

    /// POST a JSON document and decode the JSON response.
    /// Responses are cached per (url, request body).
    pub async fn post_json(&self, url: &str, payload: &Value) -> Result<Value> {
        let encoded = serde_json::to_vec(payload)?;
        let key = format!("{}#{}", url, hex::encode(Sha256::digest(&encoded)));

        self.execute(&key, url, || {
            self.http_client
                .post(url)
                .header(CONTENT_TYPE, "application/json")
                .body(encoded.clone())
        })
        .await?
        .into_json(url)
    }

    async fn execute<F>(&self, key: &str, url: &str, build: F) -> Result<Body>
    where
        F: Fn() -> RequestBuilder,
    {
        if let Some(body) = self.cached_body(key) {
            tracing::debug!("Cache hit for {}", url);
            return Ok(body);
        }

        let etag_key = format!("etag:{}", key);
        let revalidation: Option<Revalidation> = self
            .cache
            .get(&etag_key)
            .and_then(|v| serde_json::from_value(v).ok());

        let attempts = self.settings.max_retries;
        let mut retry_delay = self.settings.retry_delay;
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=attempts {
            self.apply_rate_limit().await;

            let mut request = build().header(USER_AGENT, &self.settings.user_agent);
            if let Some(r) = &revalidation {
                request = request.header(IF_NONE_MATCH, &r.etag);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!("Request error for {} (attempt {}/{}): {}", url, attempt, attempts, e);
                    last_error = e.to_string();
                    if attempt < attempts {
                        retry_delay = next_retry_delay(retry_delay);
                        tokio::time::sleep(retry_delay).await;
                    }
                    continue;
                }
            };

            let status = response.status();

            if status == StatusCode::NOT_MODIFIED {
                if let Some(r) = &revalidation {
                    tracing::debug!("Not modified (304) for {}, reusing cached body", url);
                    self.store(key, &etag_key, &r.body, Some(&r.etag));
                    return Ok(r.body.clone());
                }
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let wait = self.rate_limited_delay(&response);
                tracing::warn!("Rate limited by {}, retrying after {:.2}s", url, wait.as_secs_f64());
                last_error = format!("rate limited ({})", status);
                if attempt == attempts {
                    return Err(PypiError::RateLimited {
                        retry_after_secs: wait.as_secs(),
                    }
                    .into());
                }
                tokio::time::sleep(wait).await;
                continue;
            }

            if status == StatusCode::NOT_FOUND {
                return Err(PypiError::NotFound {
                    resource: url.to_string(),
                }
                .into());
            }

            if status.is_server_error() {
                last_error = format!("HTTP error {}", status);
                if attempt < attempts {
                    retry_delay = next_retry_delay(retry_delay);
                    tracing::warn!(
                        "Server error {} for {}, retrying in {:.2}s ({} retries left)",
                        status,
                        url,
                        retry_delay.as_secs_f64(),
                        attempts - attempt
                    );
                    tokio::time::sleep(retry_delay).await;
                }
                continue;
            }

            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                let snippet: String = text.chars().take(200).collect();
                return Err(PypiError::RequestFailed {
                    message: format!("HTTP error {} for {}: {}", status, url, snippet),
                }
                .into());
            }

            let etag = response
                .headers()
                .get(ETAG)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = read_body(response, url).await?;

            self.store(key, &etag_key, &body, etag.as_deref());
            return Ok(body);
        }

        Err(PypiError::RetriesExhausted {
            url: url.to_string(),
            attempts,
            message: last_error,
        }
        .into())
    }

    fn cached_body(&self, key: &str) -> Option<Body> {
        self.cache
            .get(key)
            .and_then(|v| serde_json::from_value(v).ok())
    }

    fn store(&self, key: &str, etag_key: &str, body: &Body, etag: Option<&str>) {
        let Ok(value) = serde_json::to_value(body) else {
            return;
        };
        self.cache.set(key, value, None);

        if let Some(etag) = etag {
            let record = Revalidation {
                etag: etag.to_string(),
                body: body.clone(),
            };
            if let Ok(value) = serde_json::to_value(record) {
                let ttl = self.cache.default_ttl().saturating_mul(ETAG_TTL_FACTOR);
                self.cache.set(etag_key, value, Some(ttl));
            }
        }
    }

    /// Space outgoing requests by the current rate-limit delay
    async fn apply_rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        let delay = *self.rate_limit_delay.lock();

        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < delay {
                let wait = delay - elapsed;
                tracing::debug!("Rate limiting: sleeping for {:.2}s", wait.as_secs_f64());
                tokio::time::sleep(wait).await;
            }
        }

        *last = Some(Instant::now());
    }

    /// Work out how long to back off after a 429 and widen the request spacing
    fn rate_limited_delay(&self, response: &Response) -> Duration {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        let mut delay = self.rate_limit_delay.lock();
        *delay = match retry_after {
            Some(wait) => wait.min(MAX_BACKOFF),
            None => {
                let jitter = Duration::from_secs_f64(rand::thread_rng().gen_range(0.0..1.0));
                delay.saturating_mul(2).min(MAX_BACKOFF) + jitter
            }
        };
        *delay
    }
}

async fn read_body(response: Response, url: &str) -> Result<Body> {
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    let text = response.text().await?;

    if content_type.contains("json") {
        let value = serde_json::from_str(&text).map_err(|e| PypiError::BadResponse {
            url: url.to_string(),
            message: format!("invalid JSON: {}", e),
        })?;
        Ok(Body::Json(value))
    } else {
        Ok(Body::Text(text))
    }
}

/// Exponential backoff with jitter: `min(60s, 2 * current) * U(0.5, 1.0)`
pub fn next_retry_delay(current: Duration) -> Duration {
    let doubled = current.saturating_mul(2).min(MAX_BACKOFF);
    doubled.mul_f64(rand::thread_rng().gen_range(0.5..=1.0))
}
