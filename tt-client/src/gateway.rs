//! Authenticated request gateway
//!
//! Attaches credentials to outgoing API requests and recovers from
//! access-token expiry with a single refresh-and-retry cycle:
//!
//! ```text
//! attempt ──non-401──────────────────────────────► return response
//!    │
//!    └─401─► refresh ──failure─────────────────────► return refresh response
//!                │
//!                └─success─► retry once ──any────► return retry response
//! ```
//!
//! The gateway never stores tokens. It reads them from an injected
//! [`CredentialSource`] on every attempt and hands successful refresh
//! responses to an injected [`RefreshObserver`], which owns persistence.
//!
//! # Refresh coalescing
//!
//! With coalescing enabled, every completed refresh bumps a credential
//! generation. A request rejected with credentials from an older generation
//! reuses the outcome of the refresh that already happened instead of
//! issuing another one, so a burst of concurrent 401s costs one refresh call.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Url};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use tt_common::api::AuthMethod;
use tt_common::config::ClientConfig;

use crate::error::{ClientError, ClientResult};
use crate::transport::{ApiResponse, HttpTransport, PreparedRequest, ResponseClass};

/// Fixed endpoint minting a new access token from the refresh credential
pub const REFRESH_PATH: &str = "/api/refresh";

/// Header selecting cookie-based auth on login and refresh
pub const AUTH_METHOD_HEADER: &str = "X-Auth-Method";

/// Generic request descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the backend origin, e.g. `/api/tracks`
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_query_pairs(mut self, pairs: Vec<(String, String)>) -> Self {
        self.query.extend(pairs);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Attach a serializable JSON body
    pub fn with_json<T: Serialize>(self, body: &T) -> ClientResult<Self> {
        Ok(self.with_body(serde_json::to_value(body)?))
    }
}

/// Read-only access to the caller's stored credentials
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Current access token, `None` when absent or expired
    async fn access_token(&self) -> Option<String>;

    /// Refresh credential for bearer-mode refresh calls
    async fn refresh_token(&self) -> Option<String>;
}

/// Credential source for cookie-only sessions and anonymous use
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCredentials;

#[async_trait]
impl CredentialSource for NoCredentials {
    async fn access_token(&self) -> Option<String> {
        None
    }

    async fn refresh_token(&self) -> Option<String> {
        None
    }
}

/// Receives successful refresh responses so the caller can persist renewed
/// credentials before the retry is issued
#[async_trait]
pub trait RefreshObserver: Send + Sync {
    async fn refreshed(&self, response: &ApiResponse);
}

struct RefreshCoalescer {
    generation: AtomicU64,
    last_outcome: Mutex<Option<ApiResponse>>,
}

/// Authenticated Request Gateway
pub struct Gateway {
    base_url: String,
    auth_method: AuthMethod,
    transport: Arc<dyn HttpTransport>,
    credentials: Arc<dyn CredentialSource>,
    observer: Option<Arc<dyn RefreshObserver>>,
    coalescer: Option<RefreshCoalescer>,
}

impl Gateway {
    pub fn new(
        config: &ClientConfig,
        transport: Arc<dyn HttpTransport>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        let coalescer = config.coalesce_refresh.then(|| RefreshCoalescer {
            generation: AtomicU64::new(0),
            last_outcome: Mutex::new(None),
        });

        Self {
            base_url: config.base_url.clone(),
            auth_method: config.auth_method,
            transport,
            credentials,
            observer: None,
            coalescer,
        }
    }

    pub fn with_refresh_observer(mut self, observer: Arc<dyn RefreshObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn auth_method(&self) -> AuthMethod {
        self.auth_method
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send with credentials, refreshing and retrying once on 401
    ///
    /// Returns the first response when it is not a 401, the refresh
    /// response when the refresh fails, and otherwise the retry's response.
    /// Transport errors propagate without retry.
    pub async fn send(&self, request: &ApiRequest) -> ClientResult<ApiResponse> {
        let generation = self.current_generation();

        let response = self.dispatch(request).await?;
        if response.classify() != ResponseClass::Unauthorized {
            return Ok(response);
        }

        debug!(
            method = %request.method,
            path = %request.path,
            "Request rejected with 401, attempting credential refresh"
        );

        let refresh = self.renew(generation).await?;
        if !refresh.is_success() {
            warn!(
                path = %request.path,
                status = refresh.status.as_u16(),
                "Credential refresh rejected"
            );
            return Ok(refresh);
        }

        debug!(method = %request.method, path = %request.path, "Retrying request after refresh");
        self.dispatch(request).await
    }

    /// Send with credentials attached but without refresh handling
    pub async fn send_once(&self, request: &ApiRequest) -> ClientResult<ApiResponse> {
        self.dispatch(request).await
    }

    /// Issue one refresh call, notifying the observer on success
    pub async fn refresh(&self) -> ClientResult<ApiResponse> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        match self.auth_method {
            AuthMethod::Cookie => {
                headers.insert(
                    HeaderName::from_static("x-auth-method"),
                    HeaderValue::from_static("Cookie"),
                );
            }
            AuthMethod::Bearer => {
                if let Some(token) = self.credentials.refresh_token().await {
                    headers.insert(AUTHORIZATION, bearer_value(&token)?);
                }
            }
        }

        let prepared = PreparedRequest {
            method: Method::POST,
            url: self.url_for(REFRESH_PATH),
            headers,
            body: None,
        };

        let response = self.transport.execute(prepared).await?;

        if response.is_success() {
            info!("Access credentials refreshed");
            if let Some(ref observer) = self.observer {
                observer.refreshed(&response).await;
            }
        }

        Ok(response)
    }

    fn current_generation(&self) -> u64 {
        self.coalescer
            .as_ref()
            .map(|c| c.generation.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    /// Refresh on behalf of a request that observed `generation` when it was
    /// dispatched
    async fn renew(&self, generation: u64) -> ClientResult<ApiResponse> {
        let Some(ref coalescer) = self.coalescer else {
            return self.refresh().await;
        };

        let mut last_outcome = coalescer.last_outcome.lock().await;

        if coalescer.generation.load(Ordering::Acquire) != generation {
            if let Some(ref outcome) = *last_outcome {
                debug!("Reusing refresh completed by a concurrent request");
                return Ok(outcome.clone());
            }
        }

        let outcome = self.refresh().await?;
        *last_outcome = Some(outcome.clone());
        coalescer.generation.fetch_add(1, Ordering::AcqRel);

        Ok(outcome)
    }

    async fn dispatch(&self, request: &ApiRequest) -> ClientResult<ApiResponse> {
        let prepared = self.prepare(request).await?;
        Ok(self.transport.execute(prepared).await?)
    }

    /// Resolve URL and headers: caller headers, then `Content-Type`, then the
    /// credential header for the configured auth method
    async fn prepare(&self, request: &ApiRequest) -> ClientResult<PreparedRequest> {
        let base = self.url_for(&request.path);
        let url = if request.query.is_empty() {
            Url::parse(&base)
        } else {
            Url::parse_with_params(&base, &request.query)
        }
        .map_err(|e| ClientError::InvalidRequest(format!("{}: {}", base, e)))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ClientError::InvalidRequest(format!("header '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ClientError::InvalidRequest(format!("header '{}': {}", name, e)))?;
            headers.insert(name, value);
        }

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if self.auth_method == AuthMethod::Bearer {
            if let Some(token) = self.credentials.access_token().await {
                headers.insert(AUTHORIZATION, bearer_value(&token)?);
            }
        }

        let body = match request.body {
            Some(ref body) => Some(serde_json::to_vec(body)?),
            None => None,
        };

        Ok(PreparedRequest {
            method: request.method.clone(),
            url: url.to_string(),
            headers,
            body,
        })
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

fn bearer_value(token: &str) -> ClientResult<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|_| ClientError::InvalidRequest("token contains invalid characters".to_string()))?;
    value.set_sensitive(true);
    Ok(value)
}
