//! Mock Top Tracks backend for integration tests
//!
//! Serves the subset of the backend API the client uses on an ephemeral
//! port. Access tokens are accepted while they are in the issued set; tests
//! call `expire_access_tokens` to force the next request into a 401.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{AppendHeaders, IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::task::JoinHandle;

pub const PASSWORD: &str = "secret1";
pub const REFRESH_TOKEN: &str = "refresh-token";

const ACCESS_COOKIE: &str = "access_token_cookie";
const REFRESH_COOKIE: &str = "refresh_token_cookie";

/// Backend state observable by tests
pub struct BackendState {
    issued: AtomicUsize,
    valid_access: Mutex<HashSet<String>>,
    pub refresh_allowed: AtomicBool,
    pub refresh_delay: Mutex<Option<Duration>>,
    pub refresh_calls: AtomicUsize,
    pub protected_calls: AtomicUsize,
    pub linked: AtomicBool,
    pub last_refresh_headers: Mutex<Option<HeaderMap>>,
}

impl BackendState {
    fn new() -> Self {
        Self {
            issued: AtomicUsize::new(0),
            valid_access: Mutex::new(HashSet::new()),
            refresh_allowed: AtomicBool::new(true),
            refresh_delay: Mutex::new(None),
            refresh_calls: AtomicUsize::new(0),
            protected_calls: AtomicUsize::new(0),
            linked: AtomicBool::new(false),
            last_refresh_headers: Mutex::new(None),
        }
    }

    fn issue_access_token(&self) -> String {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let token = format!("access-{}", n);
        self.valid_access.lock().unwrap().insert(token.clone());
        token
    }

    /// Reject every access token issued so far
    pub fn expire_access_tokens(&self) {
        self.valid_access.lock().unwrap().clear();
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn protected_calls(&self) -> usize {
        self.protected_calls.load(Ordering::SeqCst)
    }

    fn is_authorized(&self, headers: &HeaderMap) -> bool {
        let valid = self.valid_access.lock().unwrap();

        let bearer = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if let Some(token) = bearer {
            return valid.contains(token);
        }

        cookie(headers, ACCESS_COOKIE).is_some_and(|token| valid.contains(&token))
    }
}

/// Running mock backend; the server task stops when this is dropped
pub struct MockBackend {
    pub base_url: String,
    pub state: Arc<BackendState>,
    handle: JoinHandle<()>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state = Arc::new(BackendState::new());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Should bind ephemeral port");
        let addr = listener.local_addr().expect("Should have local address");

        let app = router(state.clone());
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Mock backend failed");
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
            handle,
        }
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn router(state: Arc<BackendState>) -> Router {
    Router::new()
        .route("/api/login", post(login))
        .route("/api/logout", post(logout))
        .route("/api/refresh", post(refresh))
        .route("/api/token-is-valid", get(token_is_valid))
        .route("/api/account-is-authorized", get(account_is_authorized))
        .route("/api/authorize", post(authorize))
        .route("/api/unauthorize", post(unauthorize))
        .route("/api/tracks", get(tracks))
        .route("/api/spotify-track-id", patch(spotify_track_id))
        .route("/api/playlists", get(playlists))
        .route("/api/playlist-tracks", post(playlist_tracks))
        .with_state(state)
}

fn cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

fn wants_cookies(headers: &HeaderMap) -> bool {
    headers
        .get("x-auth-method")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "Cookie")
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({"msg": "Token has expired"}))).into_response()
}

/// Count and authorize a protected call
fn guard(state: &BackendState, headers: &HeaderMap) -> Option<Response> {
    state.protected_calls.fetch_add(1, Ordering::SeqCst);
    (!state.is_authorized(headers)).then(unauthorized)
}

async fn login(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if body["password"] != PASSWORD {
        return (StatusCode::BAD_REQUEST, Json(json!("incorrect password"))).into_response();
    }

    let access = state.issue_access_token();
    if wants_cookies(&headers) {
        return (
            AppendHeaders([
                (header::SET_COOKIE, format!("{}={}; Path=/; HttpOnly", ACCESS_COOKIE, access)),
                (header::SET_COOKIE, format!("{}={}; Path=/; HttpOnly", REFRESH_COOKIE, REFRESH_TOKEN)),
            ]),
            Json(json!({"login": true, "name": "Sam"})),
        )
            .into_response();
    }

    Json(json!({
        "access_token": access,
        "refresh_token": REFRESH_TOKEN,
        "name": "Sam"
    }))
    .into_response()
}

async fn logout() -> Response {
    Json(json!({"logout": true})).into_response()
}

async fn refresh(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);
    *state.last_refresh_headers.lock().unwrap() = Some(headers.clone());

    let delay = *state.refresh_delay.lock().unwrap();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    if !state.refresh_allowed.load(Ordering::SeqCst) {
        return unauthorized();
    }

    let cookie_mode = wants_cookies(&headers);
    let presented = if cookie_mode {
        cookie(&headers, REFRESH_COOKIE)
    } else {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_string)
    };
    if presented.as_deref() != Some(REFRESH_TOKEN) {
        return unauthorized();
    }

    let access = state.issue_access_token();
    if cookie_mode {
        return (
            AppendHeaders([(
                header::SET_COOKIE,
                format!("{}={}; Path=/; HttpOnly", ACCESS_COOKIE, access),
            )]),
            Json(json!({"token_refreshed": true})),
        )
            .into_response();
    }

    Json(json!({"access_token": access})).into_response()
}

async fn token_is_valid(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    if !state.is_authorized(&headers) {
        return unauthorized();
    }
    Json(json!({"valid": true})).into_response()
}

async fn account_is_authorized(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
) -> Response {
    if let Some(rejection) = guard(&state, &headers) {
        return rejection;
    }
    Json(json!({"authorized": state.linked.load(Ordering::SeqCst)})).into_response()
}

async fn authorize(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    if let Some(rejection) = guard(&state, &headers) {
        return rejection;
    }
    if state.linked.load(Ordering::SeqCst) {
        return (StatusCode::BAD_REQUEST, Json(json!("account already authorized"))).into_response();
    }
    (
        StatusCode::TEMPORARY_REDIRECT,
        Json(json!({"redirect_url": "https://accounts.example.com/authorize?state=abc"})),
    )
        .into_response()
}

async fn unauthorize(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    if let Some(rejection) = guard(&state, &headers) {
        return rejection;
    }
    if !state.linked.swap(false, Ordering::SeqCst) {
        return (StatusCode::BAD_REQUEST, Json(json!("account authorization not found")))
            .into_response();
    }
    StatusCode::OK.into_response()
}

fn catalog() -> Vec<Value> {
    vec![
        json!({
            "id": 1,
            "name": "Opening",
            "artists": ["Alpha"],
            "genres": ["Rock"],
            "site_name": "pitchfork",
            "link": "https://pitchfork.com/reviews/tracks/1",
            "date_published": "2023-04-01",
            "spotify_track_id": null,
            "preview_url": null
        }),
        json!({
            "id": 2,
            "name": "Closer",
            "artists": ["Beta", "Gamma"],
            "genres": ["Jazz", "Rock"],
            "site_name": "pitchfork",
            "link": "https://pitchfork.com/reviews/tracks/2",
            "date_published": "2023-03-15",
            "spotify_track_id": "sp2",
            "preview_url": "https://p.example.com/2.mp3"
        }),
    ]
}

async fn tracks(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if let Some(rejection) = guard(&state, &headers) {
        return rejection;
    }

    if let Some(id) = params.get("song-id") {
        return match catalog().into_iter().find(|t| t["id"].to_string() == *id) {
            Some(track) => Json(track).into_response(),
            None => Json(json!([])).into_response(),
        };
    }

    let mut rows = catalog();
    if let Some(genres) = params.get("genres") {
        let wanted: Vec<&str> = genres.split(',').collect();
        rows.retain(|t| {
            t["genres"]
                .as_array()
                .is_some_and(|g| g.iter().any(|v| v.as_str().is_some_and(|v| wanted.contains(&v))))
        });
    }
    if let Some(limit) = params.get("limit").and_then(|l| l.parse::<usize>().ok()) {
        rows.truncate(limit);
    }
    Json(Value::Array(rows)).into_response()
}

async fn spotify_track_id(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(rejection) = guard(&state, &headers) {
        return rejection;
    }
    if body.get("song-id").is_none() || body.get("spotify-track-id").is_none() {
        return (StatusCode::BAD_REQUEST, Json(json!("missing field"))).into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn playlists(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    if let Some(rejection) = guard(&state, &headers) {
        return rejection;
    }
    Json(json!([
        {"id": "pl1", "name": "Morning"},
        {"id": "pl2", "name": "Evening"}
    ]))
    .into_response()
}

async fn playlist_tracks(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(rejection) = guard(&state, &headers) {
        return rejection;
    }

    let mut success = Vec::new();
    let mut duplicate = Vec::new();
    for id in body["spotify-track-ids"].as_array().into_iter().flatten() {
        let Some(id) = id.as_str() else { continue };
        if id.starts_with("dup") {
            duplicate.push(id);
        } else {
            success.push(id);
        }
    }

    Json(json!({"success": success, "failure": [], "duplicate": duplicate})).into_response()
}
