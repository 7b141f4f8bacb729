//! HTTP utilities for connectors.
//!
//! Wraps `reqwest` with authentication, optional rate limiting, retries on
//! retryable failures, and status-to-error mapping.

use crate::traits::{AuthConfig, ConnectorConfig, ConnectorError, ConnectorResult};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorRateLimiter,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

type RateLimiterType = GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Longest a `Retry-After` header is allowed to stall a retry.
const MAX_RETRY_AFTER_SECS: u64 = 300;

/// HTTP client with auth, retry and rate limiting support.
pub struct HttpClient {
    client: Client,
    config: ConnectorConfig,
    rate_limiter: Option<RateLimiterType>,
}

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per period.
    pub max_requests: u32,
    /// Period duration.
    pub period: Duration,
    /// Maximum burst size.
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            period: Duration::from_secs(60),
            burst_size: 10,
        }
    }
}

impl RateLimitConfig {
    /// Limits to `requests` per minute with a burst of a tenth of that.
    pub fn per_minute(requests: u32) -> Self {
        Self {
            max_requests: requests.max(1),
            period: Duration::from_secs(60),
            burst_size: (requests / 10).max(1),
        }
    }
}

impl HttpClient {
    /// Creates a new HTTP client from connector configuration.
    pub fn new(config: ConnectorConfig) -> ConnectorResult<Self> {
        Self::with_rate_limit(config, None)
    }

    /// Creates a new HTTP client with rate limiting.
    pub fn with_rate_limit(
        config: ConnectorConfig,
        rate_limit: Option<RateLimitConfig>,
    ) -> ConnectorResult<Self> {
        // TLS verification can only be switched off in debug builds
        let verify_tls = if config.verify_tls {
            true
        } else if can_disable_tls_verification() {
            warn!(
                base_url = %config.base_url,
                connector_name = %config.name,
                "TLS certificate verification DISABLED in development mode"
            );
            false
        } else {
            warn!(
                base_url = %config.base_url,
                connector_name = %config.name,
                "Ignoring request to disable TLS verification in a release build"
            );
            true
        };

        let mut headers = reqwest::header::HeaderMap::new();
        for (key, value) in &config.headers {
            match (
                reqwest::header::HeaderName::try_from(key.as_str()),
                reqwest::header::HeaderValue::try_from(value.as_str()),
            ) {
                (Ok(name), Ok(val)) => {
                    headers.insert(name, val);
                }
                _ => warn!(header = %key, "Skipping invalid default header"),
            }
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(!verify_tls)
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .default_headers(headers)
            .build()
            .map_err(|e| ConnectorError::ConfigError(e.to_string()))?;

        let rate_limiter = match rate_limit {
            Some(rl) => Some(build_rate_limiter(&rl)?),
            None => None,
        };

        Ok(Self {
            client,
            config,
            rate_limiter,
        })
    }

    /// Builds a URL from a path.
    pub fn build_url(&self, path: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{}/{}", base, path)
    }

    /// Gets the base URL.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Executes a GET request with retry logic.
    pub async fn get(&self, path: &str) -> ConnectorResult<Response> {
        let request = self.client.get(self.build_url(path));
        self.execute_with_retry(request).await
    }

    /// Executes a GET request and deserializes the JSON response.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ConnectorResult<T> {
        let response = self.get(path).await?;
        parse_json_response(response).await
    }

    /// Executes a GET request with query parameters and deserializes the JSON response.
    pub async fn get_json_with_query<T, Q>(&self, path: &str, query: &Q) -> ConnectorResult<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let request = self.client.get(self.build_url(path)).query(query);
        let response = self.execute_with_retry(request).await?;
        parse_json_response(response).await
    }

    /// Sends a request, retrying retryable failures up to `max_retries` times.
    async fn execute_with_retry(&self, request: RequestBuilder) -> ConnectorResult<Response> {
        let request = self.add_auth(request);

        let mut delay = Duration::from_millis(100);
        let mut attempt = 0;

        loop {
            if let Some(limiter) = &self.rate_limiter {
                limiter.until_ready().await;
            }

            let request_clone = request
                .try_clone()
                .ok_or_else(|| ConnectorError::Internal("Failed to clone request".to_string()))?;

            let result = match request_clone.send().await {
                Ok(response) => check_status(response).await,
                Err(e) => Err(map_transport_error(e)),
            };

            let error = match result {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => e,
                Err(e) => return Err(e),
            };

            attempt += 1;
            let wait = match &error {
                ConnectorError::RateLimited(secs) => {
                    Duration::from_secs((*secs).min(MAX_RETRY_AFTER_SECS))
                }
                _ => {
                    let current = delay;
                    delay = std::cmp::min(delay * 2 + rand_jitter(), Duration::from_secs(30));
                    current
                }
            };
            warn!(
                connector_name = %self.config.name,
                attempt,
                error = %error,
                "Request failed, retrying in {:?}",
                wait
            );
            sleep(wait).await;
        }
    }

    fn add_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.auth {
            AuthConfig::None => request,
            AuthConfig::BearerToken { token } => request.bearer_auth(token.expose_secret()),
        }
    }
}

fn build_rate_limiter(rl: &RateLimitConfig) -> ConnectorResult<RateLimiterType> {
    let per_request = rl.period / rl.max_requests.max(1);
    let quota = Quota::with_period(per_request)
        .ok_or_else(|| ConnectorError::ConfigError("Rate limit period must be non-zero".into()))?
        .allow_burst(NonZeroU32::new(rl.burst_size).unwrap_or(NonZeroU32::MIN));
    Ok(GovernorRateLimiter::direct(quota))
}

/// Maps non-success statuses to typed errors.
async fn check_status(response: Response) -> ConnectorResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(60);
        return Err(ConnectorError::RateLimited(retry_after));
    }

    if status.is_server_error() {
        return Err(ConnectorError::ServerError(status.to_string()));
    }

    match status {
        StatusCode::UNAUTHORIZED => Err(ConnectorError::AuthenticationFailed(
            "Unauthorized".into(),
        )),
        StatusCode::FORBIDDEN => Err(ConnectorError::AuthorizationDenied("Forbidden".into())),
        StatusCode::NOT_FOUND => Err(ConnectorError::NotFound("Resource not found".into())),
        StatusCode::BAD_REQUEST => {
            let body = response.text().await.unwrap_or_default();
            Err(ConnectorError::RequestFailed(format!(
                "Bad request: {}",
                truncate(&body)
            )))
        }
        _ => Err(ConnectorError::RequestFailed(format!(
            "Request failed with status: {}",
            status
        ))),
    }
}

fn map_transport_error(e: reqwest::Error) -> ConnectorError {
    if e.is_timeout() {
        ConnectorError::Timeout(e.to_string())
    } else if e.is_connect() {
        ConnectorError::ConnectionFailed(e.to_string())
    } else {
        ConnectorError::RequestFailed(e.to_string())
    }
}

async fn parse_json_response<T: DeserializeOwned>(response: Response) -> ConnectorResult<T> {
    let status = response.status();
    let text = response.text().await.map_err(map_transport_error)?;
    debug!(%status, bytes = text.len(), "Received response body");

    serde_json::from_str(&text).map_err(|e| {
        ConnectorError::InvalidResponse(format!(
            "Failed to parse response (status {}): {} - Body: {}",
            status,
            e,
            truncate(&text)
        ))
    })
}

fn truncate(body: &str) -> String {
    body.chars().take(500).collect()
}

/// Generate a small random jitter for exponential backoff.
fn rand_jitter() -> Duration {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    std::time::Instant::now().hash(&mut hasher);
    Duration::from_millis(hasher.finish() % 100)
}

/// Whether TLS verification may be disabled. Always false in release builds.
#[inline]
pub fn can_disable_tls_verification() -> bool {
    cfg!(debug_assertions)
}
