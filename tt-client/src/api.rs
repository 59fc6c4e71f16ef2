//! Typed backend API
//!
//! Every page-level data fetch goes through one [`Gateway`]. Authentication
//! endpoints that must not trigger a refresh (login, signup, token check)
//! use `send_once`.
//!
//! After the gateway has done its single refresh-and-retry, a 401 means the
//! session is over: the injected [`SessionEvents`] is notified and
//! [`ClientError::SessionExpired`] is returned.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tt_common::api::{
    AuthMethod, AuthorizationStatus, AuthorizeRedirect, LoginRequest, LoginResponse, PersonalizationType,
    Playlist, PlaylistAddResults, PlaylistTracksRequest, SignupRequest, SpotifyTrack,
    SpotifyTrackIdRequest, TimePeriod, Track, TrackLookup, TrackQuery, UpdateTracksRequest,
    UpdateTracksResponse,
};
use tt_common::config::ClientConfig;

use crate::error::{ClientError, ClientResult};
use crate::gateway::{ApiRequest, Gateway, AUTH_METHOD_HEADER};
use crate::session::{Session, SessionEvents};
use crate::transport::{ApiResponse, HttpTransport, ReqwestTransport, ResponseClass};

/// Length of the code mailed by `/api/signup`
const VERIFICATION_CODE_LEN: usize = 32;

/// Typed client for the Top Tracks backend
pub struct BackendApi {
    gateway: Gateway,
    session: Arc<Session>,
    events: Arc<dyn SessionEvents>,
}

impl BackendApi {
    /// Wire a gateway over `transport` with `session` as credential source
    /// and refresh observer
    pub fn new(
        config: &ClientConfig,
        transport: Arc<dyn HttpTransport>,
        session: Arc<Session>,
        events: Arc<dyn SessionEvents>,
    ) -> Self {
        let gateway = Gateway::new(config, transport, session.clone())
            .with_refresh_observer(session.clone());

        Self {
            gateway,
            session,
            events,
        }
    }

    /// Client over a real `reqwest` transport
    pub fn connect(
        config: &ClientConfig,
        session: Arc<Session>,
        events: Arc<dyn SessionEvents>,
    ) -> ClientResult<Self> {
        let transport = ReqwestTransport::new(config.request_timeout)?;
        Ok(Self::new(config, Arc::new(transport), session, events))
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    // ========================================
    // Authentication
    // ========================================

    /// Log in and store the returned credentials; returns the user's name
    pub async fn login(&self, email: &str, password: &str) -> ClientResult<Option<String>> {
        let body = LoginRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        let request = self.with_auth_method(ApiRequest::post("/api/login").with_json(&body)?);

        let response = self.gateway.send_once(&request).await?;
        if !response.is_success() {
            info!(status = response.status.as_u16(), "Login rejected");
            return Err(api_error(&response));
        }

        let login: LoginResponse = response.json()?;
        if self.gateway.auth_method() == AuthMethod::Bearer && login.access_token.is_none() {
            return Err(ClientError::UnexpectedResponse(
                "login succeeded but no access token was returned".to_string(),
            ));
        }

        self.session.absorb_login(&login).await?;
        Ok(login.name)
    }

    /// Register a new account; the backend mails a verification link
    pub async fn signup(&self, email: &str, password: &str, name: &str) -> ClientResult<()> {
        let body = SignupRequest::new(email, password, name)?;
        let request = ApiRequest::post("/api/signup").with_json(&body)?;

        let response = self.gateway.send_once(&request).await?;
        expect_success(&response)?;
        Ok(())
    }

    /// Confirm an account with the mailed verification code
    pub async fn verify_account(&self, code: &str) -> ClientResult<String> {
        let code = code.trim();
        if code.chars().count() != VERIFICATION_CODE_LEN {
            return Err(tt_common::Error::InvalidInput(format!(
                "Verification code must be {} characters",
                VERIFICATION_CODE_LEN
            ))
            .into());
        }

        let request = ApiRequest::get("/api/verify-account").with_query("code", code);
        let response = self.gateway.send_once(&request).await?;
        expect_success(&response)?;
        Ok(response.message())
    }

    /// End the session on the backend and locally
    ///
    /// Local credentials are cleared even when the backend call fails.
    pub async fn logout(&self) -> ClientResult<()> {
        let result = self.gateway.send_once(&ApiRequest::post("/api/logout")).await;
        self.session.clear().await?;

        match result {
            Ok(response) if !response.is_success() => {
                warn!(status = response.status.as_u16(), "Backend logout failed");
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Whether the current access credential is accepted (no refresh)
    pub async fn token_is_valid(&self) -> ClientResult<bool> {
        let response = self
            .gateway
            .send_once(&ApiRequest::get("/api/token-is-valid"))
            .await?;

        match response.classify() {
            ResponseClass::Success => Ok(true),
            ResponseClass::Unauthorized => Ok(false),
            ResponseClass::OtherFailure => Err(api_error(&response)),
        }
    }

    /// Whether the session is usable, refreshing once if the token is stale
    ///
    /// Does not notify [`SessionEvents`]; callers decide whether an invalid
    /// session warrants redirecting.
    pub async fn check_token(&self) -> ClientResult<bool> {
        if self.token_is_valid().await? {
            return Ok(true);
        }

        let refresh = self.gateway.refresh().await?;
        Ok(refresh.status == StatusCode::OK)
    }

    // ========================================
    // Streaming Account Linkage
    // ========================================

    pub async fn account_is_authorized(&self) -> ClientResult<bool> {
        let status: AuthorizationStatus = self
            .fetch_json(ApiRequest::get("/api/account-is-authorized"))
            .await?;
        Ok(status.authorized)
    }

    /// Start linking the streaming account
    ///
    /// Returns the streaming service's consent URL when the backend answers
    /// 307, `None` for any other success status.
    pub async fn authorize_account(&self) -> ClientResult<Option<String>> {
        let response = self.execute(ApiRequest::post("/api/authorize")).await?;
        if response.status != StatusCode::TEMPORARY_REDIRECT {
            debug!(status = response.status.as_u16(), "Authorize did not redirect");
            return Ok(None);
        }

        let redirect: AuthorizeRedirect = response.json()?;
        Ok(Some(redirect.redirect_url))
    }

    /// Unlink the streaming account; `false` when no link existed
    pub async fn unauthorize_account(&self) -> ClientResult<bool> {
        match self.execute(ApiRequest::post("/api/unauthorize")).await {
            Ok(_) => Ok(true),
            Err(ClientError::Api { status: 400, message }) => {
                debug!("Unauthorize refused: {}", message);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Top tracks or artists of the linked account for a time period
    pub async fn user_top_content(
        &self,
        time_period: TimePeriod,
        personalization_type: PersonalizationType,
    ) -> ClientResult<Vec<Value>> {
        let request = ApiRequest::get("/api/personalization")
            .with_query("time-period", time_period.as_str())
            .with_query("personalization-type", personalization_type.as_str());
        self.fetch_json(request).await
    }

    // ========================================
    // Tracks
    // ========================================

    pub async fn tracks(&self, query: &TrackQuery) -> ClientResult<Vec<Track>> {
        let request = ApiRequest::get("/api/tracks").with_query_pairs(query.to_query_pairs());
        self.fetch_json(request).await
    }

    pub async fn load_track(&self, track_id: &str) -> ClientResult<Option<Track>> {
        let request = ApiRequest::get("/api/tracks").with_query("song-id", track_id);
        let lookup: TrackLookup = self.fetch_json(request).await?;
        Ok(lookup.into_option())
    }

    /// Search the streaming service for candidates matching a track
    pub async fn search_spotify_tracks(
        &self,
        track_name: &str,
        artists: &[String],
    ) -> ClientResult<Vec<SpotifyTrack>> {
        if track_name.trim().is_empty() {
            return Err(tt_common::Error::InvalidInput("Track name must not be empty".to_string()).into());
        }

        let request = ApiRequest::get("/api/spotify-tracks")
            .with_query("song-name", track_name)
            .with_query("artists", artists.join(","));
        self.fetch_json(request).await
    }

    /// Link a recommended track to a streaming-service track id
    pub async fn add_spotify_track_id(&self, track_id: &str, spotify_track_id: &str) -> ClientResult<()> {
        let body = SpotifyTrackIdRequest {
            song_id: track_id.to_string(),
            spotify_track_id: spotify_track_id.to_string(),
        };
        let request = ApiRequest::patch("/api/spotify-track-id").with_json(&body)?;
        self.execute(request).await?;
        Ok(())
    }

    // ========================================
    // Playlists
    // ========================================

    /// Candidate playlists of the linked account
    ///
    /// The backend reports "no playlists found" as 400; that maps to an
    /// empty list.
    pub async fn playlists(&self) -> ClientResult<Vec<Playlist>> {
        match self.fetch_json(ApiRequest::get("/api/playlists")).await {
            Ok(playlists) => Ok(playlists),
            Err(ClientError::Api { status: 400, message }) => {
                debug!("No playlists: {}", message);
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Bulk-add tracks to a playlist
    pub async fn add_tracks_to_playlist(
        &self,
        track_ids: &[String],
        playlist_id: &str,
    ) -> ClientResult<PlaylistAddResults> {
        let body = PlaylistTracksRequest::new(track_ids.iter().cloned(), playlist_id)?;
        let request = ApiRequest::post("/api/playlist-tracks").with_json(&body)?;
        let results: PlaylistAddResults = self.fetch_json(request).await?;

        info!(
            added = results.success.len(),
            failed = results.failure.len(),
            duplicates = results.duplicate.len(),
            "Playlist updated"
        );
        Ok(results)
    }

    /// Ask the backend to scrape the review site for new tracks
    pub async fn update_tracks(&self, max_page_num: Option<u32>) -> ClientResult<u64> {
        let body = UpdateTracksRequest::new(max_page_num)?;
        let request = ApiRequest::post("/api/pitchfork-tracks").with_json(&body)?;
        let response: UpdateTracksResponse = self.fetch_json(request).await?;
        Ok(response.num_new_tracks)
    }

    // ========================================
    // Helpers
    // ========================================

    /// Send through the gateway and map terminal failures to errors
    async fn execute(&self, request: ApiRequest) -> ClientResult<ApiResponse> {
        let response = self.gateway.send(&request).await?;

        match response.classify() {
            ResponseClass::Success => Ok(response),
            ResponseClass::Unauthorized => {
                warn!(path = %request.path, "Session expired");
                self.events.session_expired();
                Err(ClientError::SessionExpired)
            }
            ResponseClass::OtherFailure => Err(api_error(&response)),
        }
    }

    async fn fetch_json<T: DeserializeOwned>(&self, request: ApiRequest) -> ClientResult<T> {
        let response = self.execute(request).await?;
        Ok(response.json()?)
    }

    fn with_auth_method(&self, request: ApiRequest) -> ApiRequest {
        match self.gateway.auth_method().header_value() {
            Some(value) => request.with_header(AUTH_METHOD_HEADER, value),
            None => request,
        }
    }
}

fn api_error(response: &ApiResponse) -> ClientError {
    ClientError::Api {
        status: response.status.as_u16(),
        message: response.message(),
    }
}

fn expect_success(response: &ApiResponse) -> ClientResult<()> {
    if response.is_success() {
        Ok(())
    } else {
        Err(api_error(response))
    }
}
