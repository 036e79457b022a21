use crate::error::{Result, WrappedError};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_API_URL: &str = "https://api.github.com/";
const PER_PAGE: &str = "100";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct GitHubClient {
    client: Client,
    base_url: Url,
}

/// A failed API call, kept raw so each caller can apply its own
/// fatal/non-fatal policy.
#[derive(Debug)]
pub enum ApiFailure {
    Status {
        status: StatusCode,
        rate_limited: bool,
        reset: Option<DateTime<Utc>>,
        body: String,
    },
    Transport(reqwest::Error),
    Decode(serde_json::Error),
}

impl std::fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiFailure::Status { status, body, .. } => write!(f, "{status}: {body}"),
            ApiFailure::Transport(e) => write!(f, "request failed: {e}"),
            ApiFailure::Decode(e) => write!(f, "unexpected response body: {e}"),
        }
    }
}

impl ApiFailure {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiFailure::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Bad credentials and rate limiting affect every request, so no
    /// caller may absorb them.
    pub fn is_cross_cutting(&self) -> bool {
        match self {
            ApiFailure::Status { rate_limited: true, .. } => true,
            ApiFailure::Status { status, .. } => *status == StatusCode::UNAUTHORIZED,
            _ => false,
        }
    }

    /// Mapping used by calls where no partial result is possible.
    pub fn into_fatal(self, context: &str) -> WrappedError {
        match self {
            ApiFailure::Status { rate_limited: true, reset, .. } => WrappedError::RateLimit { reset },
            ApiFailure::Status { status, .. } if status == StatusCode::UNAUTHORIZED => {
                WrappedError::Authentication(format!("{context} returned 401"))
            }
            ApiFailure::Status { status, .. } if status == StatusCode::FORBIDDEN => {
                WrappedError::Authorization(format!("{context} returned 403"))
            }
            ApiFailure::Status { status, .. } => WrappedError::Api {
                status: status.as_u16(),
                context: context.to_string(),
            },
            ApiFailure::Transport(e) => WrappedError::Http(e),
            ApiFailure::Decode(e) => WrappedError::Serde(e),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AuthenticatedUser {
    login: String,
}

impl GitHubClient {
    pub fn with_base_url(base_url: Url, token: &str) -> Result<Self> {
        Self::with_timeout(base_url, token, REQUEST_TIMEOUT)
    }

    /// `timeout` bounds each request, body included; a stalled request
    /// surfaces as a transport failure.
    pub fn with_timeout(base_url: Url, token: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        let auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| WrappedError::Validation("Token contains invalid characters".to_string()))?;
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .user_agent(concat!("ghwrapped/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self { client, base_url })
    }

    /// Login of the principal the token belongs to.
    pub async fn authenticated_login(&self) -> Result<String> {
        let url = self
            .base_url
            .join("user")
            .map_err(|e| WrappedError::Validation(format!("Invalid API URL: {e}")))?;
        debug!(%url, "GET");
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(status_failure(status, &headers, body).into_fatal("fetch authenticated user"));
        }
        let user: AuthenticatedUser = serde_json::from_str(&body)?;
        Ok(user.login)
    }

    pub(crate) async fn get_one<T: DeserializeOwned>(&self, path: &str) -> std::result::Result<T, ApiFailure> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| ApiFailure::Status {
                status: StatusCode::BAD_REQUEST,
                rate_limited: false,
                reset: None,
                body: e.to_string(),
            })?;
        debug!(%url, "GET");
        let resp = self.client.get(url).send().await.map_err(ApiFailure::Transport)?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(status_failure(status, &headers, body));
        }
        serde_json::from_str(&body).map_err(ApiFailure::Decode)
    }

    /// Follows `Link: rel="next"` until the listing is exhausted.
    pub(crate) async fn get_all<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> std::result::Result<Vec<T>, ApiFailure> {
        let mut all = Vec::new();
        let mut page = 1usize;
        loop {
            let url = self.page_url(path, params, page)?;
            debug!(%url, page, "GET");
            let resp = self.client.get(url).send().await.map_err(ApiFailure::Transport)?;
            let status = resp.status();
            let headers = resp.headers().clone();
            let has_next = has_next_link(&headers);
            let body = resp.text().await.unwrap_or_default();
            if !status.is_success() {
                return Err(status_failure(status, &headers, body));
            }
            let mut items: Vec<T> = serde_json::from_str(&body).map_err(ApiFailure::Decode)?;
            let page_len = items.len();
            all.append(&mut items);
            if !has_next || page_len == 0 {
                break;
            }
            page += 1;
        }
        Ok(all)
    }

    fn page_url(
        &self,
        path: &str,
        params: &[(&str, String)],
        page: usize,
    ) -> std::result::Result<Url, ApiFailure> {
        let mut url = self.base_url.join(path).map_err(|e| ApiFailure::Status {
            status: StatusCode::BAD_REQUEST,
            rate_limited: false,
            reset: None,
            body: e.to_string(),
        })?;
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
            pairs.append_pair("per_page", PER_PAGE);
            pairs.append_pair("page", &page.to_string());
        }
        Ok(url)
    }
}

fn status_failure(status: StatusCode, headers: &HeaderMap, body: String) -> ApiFailure {
    status_failure_at(status, headers, body, Utc::now())
}

/// Primary limit: 429, or 403 with an exhausted quota. Secondary limit:
/// 403 or 429 carrying `retry-after`, whatever the remaining quota says.
fn status_failure_at(status: StatusCode, headers: &HeaderMap, body: String, now: DateTime<Utc>) -> ApiFailure {
    let remaining = header_i64(headers, "x-ratelimit-remaining");
    let retry_after = header_i64(headers, "retry-after").filter(|s| *s >= 0);
    let limit_status = status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS;
    let rate_limited = status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN && remaining == Some(0))
        || (limit_status && retry_after.is_some());
    let reset = header_i64(headers, "x-ratelimit-reset")
        .and_then(|s| DateTime::from_timestamp(s, 0))
        .or_else(|| {
            retry_after
                .filter(|_| rate_limited)
                .map(|secs| now + ChronoDuration::seconds(secs))
        });
    ApiFailure::Status {
        status,
        rate_limited,
        reset,
        body,
    }
}

fn header_i64(headers: &HeaderMap, name: &str) -> Option<i64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<i64>().ok())
}

fn has_next_link(headers: &HeaderMap) -> bool {
    headers
        .get("link")
        .and_then(|value| value.to_str().ok())
        .map(|links| links.split(',').any(|part| part.contains("rel=\"next\"")))
        .unwrap_or(false)
}
