//! HTTP transport seam
//!
//! The gateway talks to the backend through [`HttpTransport`] so it can run
//! against the real `reqwest` client or a scripted backend in tests.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::redirect::Policy;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// User-Agent header sent with every request
const USER_AGENT: &str = concat!("toptracks/", env!("CARGO_PKG_VERSION"));

/// Fully resolved request ready for the wire
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    /// Absolute URL including the query string
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

/// Classification of a backend response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// 2xx, or 3xx (the authorize endpoint answers 307 with a JSON body)
    Success,
    /// 401
    Unauthorized,
    /// Any other status
    OtherFailure,
}

/// Status code plus decoded body of a backend response
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Option<Value>,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: Option<Value>) -> Self {
        Self { status, body }
    }

    /// Build a response from raw wire bytes
    pub fn from_bytes(status: StatusCode, bytes: &[u8]) -> Self {
        Self {
            status,
            body: decode_body(bytes),
        }
    }

    pub fn classify(&self) -> ResponseClass {
        if self.status == StatusCode::UNAUTHORIZED {
            ResponseClass::Unauthorized
        } else if self.status.is_success() || self.status.is_redirection() {
            ResponseClass::Success
        } else {
            ResponseClass::OtherFailure
        }
    }

    pub fn is_success(&self) -> bool {
        self.classify() == ResponseClass::Success
    }

    pub fn is_unauthorized(&self) -> bool {
        self.classify() == ResponseClass::Unauthorized
    }

    /// Deserialize the body; an absent body deserializes from `null`
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match self.body {
            Some(ref body) => T::deserialize(body),
            None => T::deserialize(&Value::Null),
        }
    }

    /// Human-readable message for error reporting
    pub fn message(&self) -> String {
        match self.body {
            Some(Value::String(ref text)) => text.clone(),
            Some(Value::Object(ref map)) => map
                .get("message")
                .or_else(|| map.get("msg"))
                .or_else(|| map.get("error"))
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| Value::Object(map.clone()).to_string()),
            Some(ref other) => other.to_string(),
            None => self
                .status
                .canonical_reason()
                .unwrap_or("no response body")
                .to_string(),
        }
    }
}

/// Decode a response body: JSON when possible, otherwise the text as a JSON
/// string, and nothing for an empty body
pub fn decode_body(bytes: &[u8]) -> Option<Value> {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return None;
    }
    match serde_json::from_slice(bytes) {
        Ok(value) => Some(value),
        Err(_) => Some(Value::String(
            String::from_utf8_lossy(bytes).trim().to_string(),
        )),
    }
}

/// Transport-level failure (no HTTP response was obtained)
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Request timed out
    #[error("Request to {url} timed out")]
    Timeout { url: String },

    /// Connection, DNS or protocol failure
    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },

    /// HTTP client could not be constructed
    #[error("HTTP client setup failed: {0}")]
    Setup(String),
}

/// Executes prepared requests
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: PreparedRequest) -> Result<ApiResponse, TransportError>;
}

/// [`HttpTransport`] backed by `reqwest`
///
/// Keeps a cookie jar for cookie-based auth and never follows redirects, so
/// 3xx bodies reach the caller.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .redirect(Policy::none())
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TransportError::Setup(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: PreparedRequest) -> Result<ApiResponse, TransportError> {
        let PreparedRequest {
            method,
            url,
            headers,
            body,
        } = request;

        debug!(method = %method, url = %url, "Sending request");

        let mut builder = self.client.request(method, &url).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| to_transport_error(&url, e))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| to_transport_error(&url, e))?;

        debug!(url = %url, status = status.as_u16(), "Received response");

        Ok(ApiResponse::from_bytes(status, &bytes))
    }
}

fn to_transport_error(url: &str, err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout {
            url: url.to_string(),
        }
    } else {
        TransportError::Request {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}
