//! Scripted backend for unit tests

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{StatusCode, Url};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Barrier;

use crate::gateway::CredentialSource;
use crate::transport::{ApiResponse, HttpTransport, PreparedRequest, TransportError};

/// Request as seen by the scripted backend
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

type Route = (String, String);

/// Backend answering each (method, path) from a queue of scripted outcomes
///
/// Unscripted routes answer 404. With `hold_unauthorized`, every 401 waits
/// on the barrier before it is delivered, which lines up concurrent
/// rejections.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<HashMap<Route, VecDeque<Result<ApiResponse, TransportError>>>>,
    calls: Mutex<Vec<RecordedCall>>,
    unauthorized_barrier: Option<Arc<Barrier>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hold_unauthorized(mut self, barrier: Arc<Barrier>) -> Self {
        self.unauthorized_barrier = Some(barrier);
        self
    }

    pub fn respond(&self, method: &str, path: &str, response: ApiResponse) {
        self.push(method, path, Ok(response));
    }

    pub fn fail(&self, method: &str, path: &str, error: TransportError) {
        self.push(method, path, Err(error));
    }

    fn push(&self, method: &str, path: &str, outcome: Result<ApiResponse, TransportError>) {
        self.script
            .lock()
            .unwrap()
            .entry((method.to_string(), path.to_string()))
            .or_default()
            .push_back(outcome);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, method: &str, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.method == method && c.path == path)
            .count()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(&self, request: PreparedRequest) -> Result<ApiResponse, TransportError> {
        let url = Url::parse(&request.url).unwrap();
        let call = RecordedCall {
            method: request.method.as_str().to_string(),
            path: url.path().to_string(),
            query: url.query().map(str::to_string),
            headers: request.headers.clone(),
            body: request.body.clone(),
        };

        let outcome = self
            .script
            .lock()
            .unwrap()
            .get_mut(&(call.method.clone(), call.path.clone()))
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| Ok(ApiResponse::new(StatusCode::NOT_FOUND, None)));

        self.calls.lock().unwrap().push(call);

        if let (Ok(response), Some(barrier)) = (&outcome, &self.unauthorized_barrier) {
            if response.status == StatusCode::UNAUTHORIZED {
                barrier.wait().await;
            }
        }

        outcome
    }
}

/// Mutable in-memory credentials
pub struct StaticCredentials {
    access: Mutex<Option<String>>,
    refresh: Mutex<Option<String>>,
}

impl StaticCredentials {
    pub fn new(access: &str, refresh: &str) -> Self {
        Self {
            access: Mutex::new(Some(access.to_string())),
            refresh: Mutex::new(Some(refresh.to_string())),
        }
    }

    pub fn set_access(&self, token: &str) {
        *self.access.lock().unwrap() = Some(token.to_string());
    }
}

#[async_trait]
impl CredentialSource for StaticCredentials {
    async fn access_token(&self) -> Option<String> {
        self.access.lock().unwrap().clone()
    }

    async fn refresh_token(&self) -> Option<String> {
        self.refresh.lock().unwrap().clone()
    }
}
