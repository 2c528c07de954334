//! Authenticated JSON transport for the PagerDuty REST API.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::error::{ApiError, ApiResult};

/// Public PagerDuty REST endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.pagerduty.com";

/// Environment variable holding the access token.
pub const ENV_TOKEN: &str = "PD_TOKEN";

/// Environment variable overriding the base URL.
pub const ENV_BASE_URL: &str = "PD_BASE_URL";

const ACCEPT_V2: &str = "application/vnd.pagerduty+json;version=2";

/// Connection settings for [`ApiClient`].
#[derive(Clone)]
pub struct ApiConfig {
    /// REST base URL, without trailing slash.
    pub base_url: String,
    /// Access token sent as a bearer credential.
    pub token: String,
}

impl ApiConfig {
    /// Settings for the public endpoint with the given token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: token.into(),
        }
    }

    /// Read `PD_TOKEN` and `PD_BASE_URL`.
    ///
    /// A missing token is not an error here; the API rejects the first call.
    #[must_use]
    pub fn from_env() -> Self {
        let token = std::env::var(ENV_TOKEN).unwrap_or_default();
        let base_url = std::env::var(ENV_BASE_URL)
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Self { base_url, token }
    }

    /// Point the client at a different endpoint (tests, proxies).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Low-level PagerDuty client shared by every entity client.
///
/// Requests race the cancellation token: once it fires, in-flight calls
/// resolve to [`ApiError::Cancelled`] and new calls fail without touching the
/// network. There are no retries.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    cancel: CancellationToken,
}

impl ApiClient {
    /// Build a client with its own, never-cancelled token.
    pub fn new(config: &ApiConfig) -> ApiResult<Self> {
        Self::with_cancellation(config, CancellationToken::new())
    }

    /// Build a client bound to an externally owned cancellation token.
    pub fn with_cancellation(config: &ApiConfig, cancel: CancellationToken) -> ApiResult<Self> {
        let base = Url::parse(&config.base_url).map_err(|e| {
            ApiError::Config(format!("invalid base URL '{}': {e}", config.base_url))
        })?;
        if base.cannot_be_a_base() {
            return Err(ApiError::Config(format!(
                "base URL '{}' cannot carry paths",
                config.base_url
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", config.token))
                .map_err(|_| ApiError::Config("access token is not a valid header value".into()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_V2));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .user_agent(concat!("pd-manager/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(|e| ApiError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base.as_str().trim_end_matches('/').to_string(),
            cancel,
        })
    }

    /// Base URL requests are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `path` with query parameters and decode the JSON body.
    pub async fn get<T>(&self, path: &str, query: &[(&str, &str)]) -> ApiResult<T>
    where
        T: DeserializeOwned,
    {
        let request = self.http.get(self.url(path)).query(query);
        let body = self.execute("GET", path, request).await?;
        decode(path, &body)
    }

    /// POST a JSON body to `path` and decode the JSON response.
    pub async fn post<B, T>(&self, path: &str, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.http.post(self.url(path)).json(body);
        let body = self.execute("POST", path, request).await?;
        decode(path, &body)
    }

    /// PUT a JSON body to `path`; the response body is ignored.
    pub async fn put<B>(&self, path: &str, body: &B) -> ApiResult<()>
    where
        B: Serialize + ?Sized,
    {
        let request = self.http.put(self.url(path)).json(body);
        self.execute("PUT", path, request).await?;
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn execute(
        &self,
        method: &'static str,
        path: &str,
        request: RequestBuilder,
    ) -> ApiResult<String> {
        if self.cancel.is_cancelled() {
            return Err(ApiError::Cancelled {
                path: path.to_string(),
            });
        }

        debug!(method, path, "Sending PagerDuty API request");

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(ApiError::Cancelled { path: path.to_string() }),
            result = exchange(method, path, request) => result,
        }
    }
}

async fn exchange(method: &'static str, path: &str, request: RequestBuilder) -> ApiResult<String> {
    let response = request.send().await.map_err(|source| ApiError::Request {
        method,
        path: path.to_string(),
        source,
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(method, path, status = %status, body = %body, "PagerDuty API request failed");
        return Err(ApiError::Status {
            method,
            path: path.to_string(),
            status: status.as_u16(),
            body,
        });
    }

    response.text().await.map_err(|source| ApiError::Request {
        method,
        path: path.to_string(),
        source,
    })
}

fn decode<T: DeserializeOwned>(path: &str, body: &str) -> ApiResult<T> {
    serde_json::from_str(body).map_err(|source| ApiError::Decode {
        path: path.to_string(),
        source,
    })
}
