//! HTTP transport for the console API.
//!
//! Keeps request construction, timeouts, and error mapping in one place so
//! every feature client shares the same behavior. `send` returns the status
//! and decoded JSON body for all HTTP statuses; callers branch on the status
//! themselves (the interception policy needs failure bodies to classify
//! step-up conditions, so non-2xx is not an error at this layer).

use std::time::Duration;

use http::StatusCode;
use serde_json::Value;
use tracing::{Instrument, debug, info_span};
use url::Url;

use crate::descriptor::RequestDescriptor;
use crate::errors::ClientError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Maximum number of error body characters surfaced to callers.
const MAX_ERROR_CHARS: usize = 200;

/// Validated console API base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleTarget {
    base_url: String,
}

impl ConsoleTarget {
    /// Parse and validate a base URL.
    ///
    /// # Errors
    /// Returns `ClientError::Config` if the value is not an absolute
    /// http(s) URL with a host.
    pub fn parse(raw: &str) -> Result<Self, ClientError> {
        let trimmed = raw.trim();
        let url = Url::parse(trimmed)
            .map_err(|err| ClientError::Config(format!("invalid console URL: {err}")))?;

        match url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(ClientError::Config(format!(
                    "invalid console URL: unsupported scheme {scheme}"
                )));
            }
        }
        if url.host_str().is_none() {
            return Err(ClientError::Config(
                "invalid console URL: no host specified".to_string(),
            ));
        }

        Ok(Self {
            base_url: trimmed.trim_end_matches('/').to_string(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Join a request path onto the base URL.
    #[must_use]
    pub fn join(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim().trim_start_matches('/'))
    }
}

/// Status plus decoded JSON body of a console response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl ApiResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Convert into the caller-facing result: the body on success, a
    /// sanitized `ClientError::Http` otherwise.
    ///
    /// # Errors
    /// Returns `ClientError::Http` for any non-2xx status.
    pub fn into_result(self) -> Result<Value, ClientError> {
        if self.status.is_success() {
            Ok(self.body)
        } else {
            Err(ClientError::Http {
                status: self.status.as_u16(),
                message: sanitize_body(&self.body),
            })
        }
    }
}

/// Shared HTTP client for the console API.
#[derive(Debug, Clone)]
pub struct ConsoleTransport {
    client: reqwest::Client,
    target: ConsoleTarget,
}

impl ConsoleTransport {
    /// Build a transport with the shared timeout and user-agent policy.
    ///
    /// # Errors
    /// Returns `ClientError::Config` if the HTTP client cannot be built.
    pub fn new(user_agent: &str, target: ConsoleTarget) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| ClientError::Config(format!("failed to build HTTP client: {err}")))?;

        Ok(Self { client, target })
    }

    #[must_use]
    pub fn target(&self) -> &ConsoleTarget {
        &self.target
    }

    /// Execute a descriptor and return status plus decoded body.
    ///
    /// # Errors
    /// Returns `ClientError::Network`/`Timeout` when the server cannot be
    /// reached, `ClientError::Parse` when a success body is not valid JSON.
    pub async fn send(&self, descriptor: &RequestDescriptor) -> Result<ApiResponse, ClientError> {
        let method = descriptor.method()?;
        let url = self.target.join(descriptor.path());
        let span = info_span!(
            "console.request",
            http.method = %method,
            url = %url
        );

        let mut request = self.client.request(method, url.as_str());
        for (name, value) in descriptor.headers() {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = descriptor.body() {
            request = request.json(body);
        }

        let response = request
            .send()
            .instrument(span)
            .await
            .map_err(map_request_error)?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| ClientError::Parse(format!("failed to read response: {err}")))?;
        debug!(status = status.as_u16(), "console response");

        Ok(ApiResponse {
            status,
            body: parse_body(status, &text)?,
        })
    }
}

fn parse_body(status: StatusCode, text: &str) -> Result<Value, ClientError> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    match serde_json::from_str(text) {
        Ok(value) => Ok(value),
        // Error pages are not always JSON; keep the sanitized text.
        Err(_) if !status.is_success() => Ok(Value::String(sanitize_text(text))),
        Err(err) => Err(ClientError::Parse(format!(
            "failed to decode response: {err}"
        ))),
    }
}

fn map_request_error(err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout("request timed out, please try again".to_string())
    } else {
        ClientError::Network(format!("unable to reach the server: {err}"))
    }
}

/// Sanitize an error body for user-facing messages.
pub(crate) fn sanitize_body(body: &Value) -> String {
    let text = match body {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other
            .get("error")
            .and_then(Value::as_str)
            .map_or_else(|| other.to_string(), str::to_string),
    };
    sanitize_text(&text)
}

fn sanitize_text(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        "request failed".to_string()
    } else {
        trimmed.chars().take(MAX_ERROR_CHARS).collect()
    }
}
