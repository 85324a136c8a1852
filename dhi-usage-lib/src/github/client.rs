//! GitHub API client
//!
//! Minimal client for the code-search, repository and commit-history endpoints. Every call
//! carries bearer-token auth and the API version header. Throttling responses are reported
//! as [`ApiError::RateLimited`] so callers can apply the long cooldown instead of failing.

use chrono::{DateTime, Utc};
use core::fmt;
use core::time::Duration;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, LINK};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

const LOG_TARGET: &str = "    client";

/// Default base URL for the public GitHub API
pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";

/// API version pinned through the `X-GitHub-Api-Version` header
pub const DEFAULT_API_VERSION: &str = "2022-11-28";

const API_VERSION_HEADER: &str = "x-github-api-version";
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Rate limit information from response headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub remaining: usize,
    pub reset_at: DateTime<Utc>,
}

/// Failure modes of a single API call
#[derive(Debug)]
pub enum ApiError {
    /// The provider throttled the request (403 or 429)
    RateLimited {
        rate_limit: Option<RateLimitInfo>,
        message: String,
    },

    /// Any other non-success status
    Status { status: StatusCode, message: String },

    /// The request never produced a response (DNS, connect, timeout, body read)
    Transport(reqwest::Error),

    /// The response body did not match the expected shape
    Malformed(serde_json::Error),
}

impl ApiError {
    /// Returns `true` if this error is a throttling signal.
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited { message, .. } => write!(f, "rate limited: {message}"),
            Self::Status { status, message } => write!(f, "API error {}: {message}", status.as_u16()),
            Self::Transport(e) => write!(f, "request failed: {e}"),
            Self::Malformed(e) => write!(f, "malformed API response: {e}"),
        }
    }
}

impl core::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            Self::Malformed(e) => Some(e),
            Self::RateLimited { .. } | Self::Status { .. } => None,
        }
    }
}

/// A successful API response
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub body: Vec<u8>,

    /// Whether the `Link` header advertises a further page
    pub has_next_page: bool,

    pub rate_limit: Option<RateLimitInfo>,
}

impl ApiResponse {
    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body).map_err(ApiError::Malformed)
    }
}

/// GitHub API client
#[derive(Debug, Clone)]
#[expect(clippy::struct_field_names, reason = "client field stores the underlying HTTP client")]
pub struct Client {
    client: reqwest::Client,
    base_url: Url,
    rate_limit_cooldown: Duration,
}

impl Client {
    /// Create a new client
    ///
    /// `rate_limit_cooldown` is how long [`Client::get_json_retrying`] waits before its single retry.
    pub fn new(
        token: &str,
        base_url: &str,
        api_version: &str,
        request_timeout: Duration,
        rate_limit_cooldown: Duration,
    ) -> crate::Result<Self> {
        let mut auth_val = HeaderValue::from_str(&format!("Bearer {token}"))?;
        auth_val.set_sensitive(true);

        let mut headers = HeaderMap::new();
        let _ = headers.insert(AUTHORIZATION, auth_val);
        let _ = headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        let _ = headers.insert(API_VERSION_HEADER, HeaderValue::from_str(api_version)?);

        let client = reqwest::Client::builder()
            .user_agent("dhi-usage")
            .default_headers(headers)
            .timeout(request_timeout)
            .build()?;

        // A trailing slash makes `Url::join` append to the base path instead of replacing it
        let base_url = if base_url.ends_with('/') {
            Url::parse(base_url)?
        } else {
            Url::parse(&format!("{base_url}/"))?
        };

        Ok(Self {
            client,
            base_url,
            rate_limit_cooldown,
        })
    }

    /// Get the base URL for this client
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The cooldown applied after a throttling response
    #[must_use]
    pub const fn rate_limit_cooldown(&self) -> Duration {
        self.rate_limit_cooldown
    }

    /// Build an absolute URL from an API path and query pairs
    fn url_for(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, ApiError> {
        let mut url = self.base_url.join(path.trim_start_matches('/')).map_err(|e| ApiError::Status {
            status: StatusCode::BAD_REQUEST,
            message: format!("invalid API path '{path}': {e}"),
        })?;

        if !query.is_empty() {
            let _ = url.query_pairs_mut().extend_pairs(query);
        }

        Ok(url)
    }

    /// Issue one request and classify the result
    pub async fn request(&self, method: Method, path: &str, query: &[(&str, &str)]) -> Result<ApiResponse, ApiError> {
        let url = self.url_for(path, query)?;
        log::trace!(target: LOG_TARGET, "{method} {url}");

        let resp = self.client.request(method, url).send().await.map_err(ApiError::Transport)?;

        // Extract rate limit info from response headers before checking status
        let rate_limit = extract_rate_limit_from_headers(resp.headers());
        if let Some(rl) = &rate_limit {
            log::debug!(target: LOG_TARGET, "{} requests remaining, window resets at {}", rl.remaining, rl.reset_at);
        }

        let has_next_page = resp
            .headers()
            .get(LINK)
            .and_then(|h| h.to_str().ok())
            .is_some_and(|link_str| link_str.contains(r#"rel="next""#));

        let status = resp.status();
        let body = resp.bytes().await.map_err(ApiError::Transport)?.to_vec();

        if status.is_success() {
            return Ok(ApiResponse {
                body,
                has_next_page,
                rate_limit,
            });
        }

        let message = truncate_body(&body);

        // Both primary and secondary rate limits surface as 403; some proxies use 429
        if matches!(status, StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS) {
            return Err(ApiError::RateLimited { rate_limit, message });
        }

        Err(ApiError::Status { status, message })
    }

    /// GET a path and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, ApiError> {
        self.request(Method::GET, path, query).await?.json()
    }

    /// GET a path and decode the JSON body, retrying exactly once after the cooldown if throttled.
    ///
    /// Used for single-shot lookups. Paginated callers handle throttling themselves.
    pub async fn get_json_retrying<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, ApiError> {
        self.get_retrying(path, query).await?.json()
    }

    /// GET a path, retrying exactly once after the cooldown if throttled
    pub async fn get_retrying(&self, path: &str, query: &[(&str, &str)]) -> Result<ApiResponse, ApiError> {
        match self.request(Method::GET, path, query).await {
            Err(e) if e.is_rate_limited() => {
                log::warn!(
                    target: LOG_TARGET,
                    "Rate limited on '{path}', waiting {}s before retrying",
                    self.rate_limit_cooldown.as_secs()
                );
                tokio::time::sleep(self.rate_limit_cooldown).await;
                self.request(Method::GET, path, query).await
            }
            other => other,
        }
    }
}

/// Extract rate limit information from API response headers
fn extract_rate_limit_from_headers(headers: &HeaderMap) -> Option<RateLimitInfo> {
    let remaining = headers.get("x-ratelimit-remaining")?.to_str().ok()?.parse::<usize>().ok()?;

    let reset_timestamp = headers.get("x-ratelimit-reset")?.to_str().ok()?.parse::<i64>().ok()?;

    let reset_at = DateTime::from_timestamp(reset_timestamp, 0)?;

    Some(RateLimitInfo { remaining, reset_at })
}

fn truncate_body(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.chars().count() > MAX_ERROR_BODY_CHARS {
        let mut truncated: String = text.chars().take(MAX_ERROR_BODY_CHARS).collect();
        truncated.push_str("...");
        truncated
    } else {
        text.into_owned()
    }
}
