// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP dispatcher for the pull channel.
//!
//! Provides [`HttpDispatcher`] which builds requests from the
//! [`PullRequest`] catalogue, attaches the bearer credential, and maps the
//! console's 401 variants onto the credential error taxonomy.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde_json::Value;
use switchboard_config::SwitchboardConfig;
use switchboard_core::{AuthorizedRequest, PullMethod, RequestDispatcher, SwitchboardError};
use tracing::debug;

/// `reqwest`-backed [`RequestDispatcher`].
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpDispatcher {
    /// Creates a dispatcher rooted at `api_url`.
    pub fn new(api_url: &str, timeout: Duration) -> Result<Self, SwitchboardError> {
        let mut headers = HeaderMap::new();
        headers.insert("accept", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| SwitchboardError::Pull {
                status: None,
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: api_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn from_config(config: &SwitchboardConfig) -> Result<Self, SwitchboardError> {
        Self::new(&config.server.api_url, config.server.request_timeout())
    }

    /// Overrides the base URL (for testing with wiremock).
    #[cfg(test)]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }
}

#[async_trait]
impl RequestDispatcher for HttpDispatcher {
    async fn dispatch(&self, request: &AuthorizedRequest) -> Result<Value, SwitchboardError> {
        let name = request.request.name();
        let url = self.url(&request.request.path());

        let mut builder = match request.request.method() {
            PullMethod::Get => self.client.get(&url),
            PullMethod::Post => self.client.post(&url),
        };
        if let Some(token) = &request.credential {
            builder = builder.bearer_auth(token.expose_secret());
        }
        if let Some(body) = request.request.body() {
            builder = builder.json(&body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                SwitchboardError::Timeout {
                    duration: self.timeout,
                }
            } else {
                SwitchboardError::Pull {
                    status: None,
                    message: format!("{name} failed: {e}"),
                    source: Some(Box::new(e)),
                }
            }
        })?;

        let status = response.status();
        debug!(request = name, status = %status, "pull response received");

        let body = response.text().await.map_err(|e| SwitchboardError::Pull {
            status: Some(status.as_u16()),
            message: format!("failed to read {name} response body: {e}"),
            source: Some(Box::new(e)),
        })?;

        if status == StatusCode::UNAUTHORIZED {
            return Err(classify_unauthorized(&body));
        }
        if !status.is_success() {
            return Err(SwitchboardError::pull(
                Some(status.as_u16()),
                format!("{name} returned {status}: {body}"),
            ));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| SwitchboardError::Pull {
            status: Some(status.as_u16()),
            message: format!("failed to parse {name} response: {e}"),
            source: Some(Box::new(e)),
        })
    }
}

/// A 401 whose body says `"expired": true` is refreshable; anything else is not.
fn classify_unauthorized(body: &str) -> SwitchboardError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let expired = parsed
        .as_ref()
        .and_then(|v| v.get("expired"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if expired {
        return SwitchboardError::CredentialExpired;
    }
    let reason = parsed
        .as_ref()
        .and_then(|v| v.get("message").or_else(|| v.get("error")))
        .and_then(Value::as_str)
        .unwrap_or("unauthorized");
    SwitchboardError::CredentialInvalid(reason.to_string())
}
