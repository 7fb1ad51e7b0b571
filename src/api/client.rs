//! HTTP transport for the payments API
//!
//! Every endpoint goes through [`ApiClient`], which owns the `reqwest` client
//! and applies the response convention used across the platform:
//!
//! - `2xx` → typed success payload
//! - `4xx` → list of field-level validation errors
//! - `5xx` → single structured error object

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ApiConfig;
use crate::types::{ApiErrorBody, AppError, AppResult, FieldError};

const USER_AGENT: &str = concat!("payportal/", env!("CARGO_PKG_VERSION"));

/// Client for the payments REST API
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

/// 4xx body carrying a list of field errors
#[derive(Deserialize)]
struct ValidationBody {
    errors: Vec<FieldError>,
}

/// 4xx body carrying a single message
#[derive(Deserialize)]
struct MessageBody {
    message: String,
}

impl ApiClient {
    /// Create a client with the default timeout
    pub fn new(base_url: &str) -> AppResult<Self> {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    /// Create a client from the `api` section of the configuration
    pub fn from_config(config: &ApiConfig) -> AppResult<Self> {
        Self::with_timeout(&config.base_url, config.timeout())
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> AppResult<Self> {
        reqwest::Url::parse(base_url)
            .map_err(|e| AppError::InvalidInput(format!("invalid API base URL '{}': {}", base_url, e)))?;

        let http = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Base URL with each segment appended percent-encoded, so ids cannot
    /// reach into other paths or add a query
    pub(crate) fn segment_url(&self, segments: &[&str]) -> AppResult<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| AppError::InvalidInput(format!("invalid API base URL '{}': {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| AppError::InvalidInput(format!("API base URL '{}' cannot take a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(req: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        match token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        token: Option<&str>,
    ) -> AppResult<T> {
        debug!(path = %path, "GET");
        let req = Self::authorize(self.http.get(self.url(path)).query(query), token);
        self.send(req).await
    }

    pub(crate) async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        token: Option<&str>,
        headers: &[(&str, String)],
    ) -> AppResult<T> {
        debug!(path = %path, "POST");
        let mut req = Self::authorize(self.http.post(self.url(path)).json(body), token);
        for (name, value) in headers {
            req = req.header(*name, value);
        }
        self.send(req).await
    }

    pub(crate) async fn delete(&self, segments: &[&str], token: Option<&str>) -> AppResult<()> {
        let url = self.segment_url(segments)?;
        debug!(path = %url.path(), "DELETE");
        let req = Self::authorize(self.http.delete(url), token);
        let response = req.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            return Ok(());
        }
        classify::<serde::de::IgnoredAny>(status, &body).map(|_| ())
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> AppResult<T> {
        let response = req.send().await?;
        let status = response.status();
        let body = response.text().await?;
        classify(status, &body)
    }
}

/// Map a status code and raw body onto the typed result
pub(crate) fn classify<T: DeserializeOwned>(status: StatusCode, body: &str) -> AppResult<T> {
    if status.is_success() {
        return serde_json::from_str(body).map_err(|e| {
            warn!(status = %status, error = %e, "Response did not match the expected contract");
            AppError::Decode(e.to_string())
        });
    }

    if status.is_client_error() {
        let errors = if let Ok(parsed) = serde_json::from_str::<ValidationBody>(body) {
            parsed.errors
        } else if let Ok(parsed) = serde_json::from_str::<MessageBody>(body) {
            vec![FieldError { field: None, message: parsed.message }]
        } else {
            vec![FieldError { field: None, message: fallback_message(status, body) }]
        };
        warn!(status = %status, count = errors.len(), "Request rejected by the API");
        return Err(AppError::Validation(errors));
    }

    if status.is_server_error() {
        let error = serde_json::from_str::<ApiErrorBody>(body).unwrap_or_else(|_| ApiErrorBody {
            message: fallback_message(status, body),
            code: None,
        });
        warn!(status = %status, message = %error.message, "API server error");
        return Err(AppError::Server(error));
    }

    Err(AppError::Decode(format!("unexpected status {}", status)))
}

fn fallback_message(status: StatusCode, body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed.len() > 200 {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        trimmed.to_string()
    }
}
