//! Session credential store
//!
//! Owns the tokens the gateway only reads. Login and refresh responses are
//! absorbed here; with a backing file the state survives between runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use tt_common::api::{LoginResponse, RefreshResponse};
use tt_common::config::write_private_file;
use tt_common::Result;

use crate::gateway::{CredentialSource, RefreshObserver};
use crate::transport::ApiResponse;

/// Persisted session state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub logged_in: bool,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub access_expires_at: Option<DateTime<Utc>>,
}

impl SessionState {
    /// Access token if present and not past its expiry
    pub fn valid_access_token(&self, now: DateTime<Utc>) -> Option<&str> {
        let token = self.access_token.as_deref()?;
        match self.access_expires_at {
            Some(expires) if now >= expires => None,
            _ => Some(token),
        }
    }
}

/// Notified when the backend has definitively rejected the session
///
/// Replaces a global navigator: callers inject whatever "go back to login"
/// means for them.
pub trait SessionEvents: Send + Sync {
    fn session_expired(&self);
}

impl<F> SessionEvents for F
where
    F: Fn() + Send + Sync,
{
    fn session_expired(&self) {
        self()
    }
}

/// Session store shared between the gateway (as credential source and
/// refresh observer) and the login/logout handlers
pub struct Session {
    state: RwLock<SessionState>,
    file: Option<PathBuf>,
    access_ttl: chrono::Duration,
}

impl Session {
    /// Session kept only in memory
    pub fn in_memory(access_ttl: Duration) -> Self {
        Self {
            state: RwLock::new(SessionState::default()),
            file: None,
            access_ttl: to_chrono(access_ttl),
        }
    }

    /// Session backed by `path`
    ///
    /// A missing file starts an empty session. An unreadable or corrupt file
    /// is logged and replaced on the next write.
    pub fn load(path: &Path, access_ttl: Duration) -> Self {
        let state = match std::fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<SessionState>(&bytes) {
                Ok(state) => {
                    debug!("Loaded session from {}", path.display());
                    state
                }
                Err(e) => {
                    warn!("Ignoring corrupt session file {}: {}", path.display(), e);
                    SessionState::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SessionState::default(),
            Err(e) => {
                warn!("Could not read session file {}: {}", path.display(), e);
                SessionState::default()
            }
        };

        Self {
            state: RwLock::new(state),
            file: Some(path.to_path_buf()),
            access_ttl: to_chrono(access_ttl),
        }
    }

    pub async fn snapshot(&self) -> SessionState {
        self.state.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.logged_in
    }

    pub async fn user_name(&self) -> Option<String> {
        self.state.read().await.user_name.clone()
    }

    /// Record a successful login
    pub async fn absorb_login(&self, response: &LoginResponse) -> Result<()> {
        let mut state = self.state.write().await;
        *state = SessionState {
            logged_in: true,
            user_name: response.name.clone(),
            access_expires_at: response
                .access_token
                .as_ref()
                .map(|_| Utc::now() + self.access_ttl),
            access_token: response.access_token.clone(),
            refresh_token: response.refresh_token.clone(),
        };
        info!(user = ?state.user_name, "Session started");
        self.persist(&state)
    }

    /// Record a successful refresh response
    ///
    /// Cookie-mode refreshes carry no token and only keep the session alive.
    pub async fn absorb_refresh(&self, response: &RefreshResponse) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(ref token) = response.access_token {
            state.access_token = Some(token.clone());
            state.access_expires_at = Some(Utc::now() + self.access_ttl);
        }
        state.logged_in = true;
        debug!("Session credentials renewed");
        self.persist(&state)
    }

    /// Forget all credentials and delete the backing file
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.write().await;
        *state = SessionState::default();
        if let Some(ref path) = self.file {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        info!("Session cleared");
        Ok(())
    }

    fn persist(&self, state: &SessionState) -> Result<()> {
        let Some(ref path) = self.file else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(state)?;
        write_private_file(path, &bytes)
    }
}

#[async_trait]
impl CredentialSource for Session {
    async fn access_token(&self) -> Option<String> {
        self.state
            .read()
            .await
            .valid_access_token(Utc::now())
            .map(str::to_string)
    }

    async fn refresh_token(&self) -> Option<String> {
        self.state.read().await.refresh_token.clone()
    }
}

#[async_trait]
impl RefreshObserver for Session {
    async fn refreshed(&self, response: &ApiResponse) {
        let refresh: RefreshResponse = match response.json::<Option<RefreshResponse>>() {
            Ok(body) => body.unwrap_or_default(),
            Err(e) => {
                warn!("Unrecognized refresh response body: {}", e);
                RefreshResponse::default()
            }
        };

        if let Err(e) = self.absorb_refresh(&refresh).await {
            warn!("Failed to persist refreshed session: {}", e);
        }
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::seconds(600))
}
