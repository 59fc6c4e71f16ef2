//! Backend request/response types
//!
//! Field names follow the backend's JSON exactly: request bodies and query
//! parameters use kebab-case keys, response bodies use snake_case.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Minimum password length accepted by `/api/signup`
pub const PASSWORD_MIN_LEN: usize = 6;

/// Maximum password length accepted by `/api/signup`
pub const PASSWORD_MAX_LEN: usize = 35;

/// Highest review-site page the backend will scrape in one update
pub const MAX_SCRAPE_PAGES: u32 = 257;

// ========================================
// Authentication Types
// ========================================

/// How credentials travel between client and backend
///
/// - `Cookie`: login and refresh send `X-Auth-Method: Cookie`; the backend
///   answers with access/refresh cookies that the HTTP client replays.
/// - `Bearer`: tokens come back in the JSON body and are attached as
///   `Authorization: Bearer <token>` headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    Cookie,
    #[default]
    Bearer,
}

impl AuthMethod {
    /// Value of the `X-Auth-Method` header, if this method sends one
    pub fn header_value(self) -> Option<&'static str> {
        match self {
            AuthMethod::Cookie => Some("Cookie"),
            AuthMethod::Bearer => None,
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::Cookie => write!(f, "cookie"),
            AuthMethod::Bearer => write!(f, "bearer"),
        }
    }
}

impl FromStr for AuthMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cookie" => Ok(AuthMethod::Cookie),
            "bearer" => Ok(AuthMethod::Bearer),
            other => Err(Error::InvalidInput(format!(
                "Unknown auth method '{}' (expected 'cookie' or 'bearer')",
                other
            ))),
        }
    }
}

/// `POST /api/login` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// `POST /api/login` success body
///
/// Bearer logins carry both tokens; cookie logins carry `login: true` and
/// set the tokens as cookies instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub login: Option<bool>,
}

/// `POST /api/refresh` success body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefreshResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_refreshed: Option<bool>,
}

/// `POST /api/signup` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

impl SignupRequest {
    /// Build a signup request, applying the backend's field rules locally
    pub fn new(email: &str, password: &str, name: &str) -> Result<Self> {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(Error::InvalidInput(format!("Invalid email address: '{}'", email)));
        }

        let password_len = password.chars().count();
        if !(PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN).contains(&password_len) {
            return Err(Error::InvalidInput(format!(
                "Password must be between {} and {} characters",
                PASSWORD_MIN_LEN, PASSWORD_MAX_LEN
            )));
        }

        if name.trim().is_empty() {
            return Err(Error::InvalidInput("Name must not be empty".to_string()));
        }

        Ok(Self {
            email: email.to_string(),
            password: password.to_string(),
            name: name.trim().to_string(),
        })
    }
}

// ========================================
// Streaming Account Linkage
// ========================================

/// `GET /api/account-is-authorized` body
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AuthorizationStatus {
    #[serde(default)]
    pub authorized: bool,
}

/// `POST /api/authorize` body, returned with status 307
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizeRedirect {
    pub redirect_url: String,
}

// ========================================
// Track Types
// ========================================

/// A recommended track as stored by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub site_name: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub date_published: Option<NaiveDate>,
    #[serde(default)]
    pub spotify_track_id: Option<String>,
    #[serde(default)]
    pub preview_url: Option<String>,
}

impl Track {
    /// Whether the track can be added to a streaming playlist
    pub fn is_linked(&self) -> bool {
        self.spotify_track_id
            .as_deref()
            .map(|id| !id.is_empty())
            .unwrap_or(false)
    }
}

/// `GET /api/tracks?song-id=...` body
///
/// The backend answers with the track object, or an empty array when the
/// id is unknown.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TrackLookup {
    Found(Track),
    Missing(Vec<Value>),
}

impl TrackLookup {
    pub fn into_option(self) -> Option<Track> {
        match self {
            TrackLookup::Found(track) => Some(track),
            TrackLookup::Missing(_) => None,
        }
    }
}

/// Filters for `GET /api/tracks`
///
/// List filters are sent comma-delimited; every artist and genre given must
/// match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackQuery {
    pub song_id: Option<String>,
    pub site_name: Option<String>,
    pub song_name: Option<String>,
    pub artists: Vec<String>,
    pub genres: Vec<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl TrackQuery {
    /// Query parameters in backend key order
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();

        if let Some(ref song_id) = self.song_id {
            pairs.push(("song-id".to_string(), song_id.clone()));
        }
        if let Some(ref site_name) = self.site_name {
            pairs.push(("site-name".to_string(), site_name.clone()));
        }
        if let Some(ref song_name) = self.song_name {
            pairs.push(("song-name".to_string(), song_name.clone()));
        }
        if !self.artists.is_empty() {
            pairs.push(("artists".to_string(), self.artists.join(",")));
        }
        if !self.genres.is_empty() {
            pairs.push(("genres".to_string(), self.genres.join(",")));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(offset) = self.offset {
            pairs.push(("offset".to_string(), offset.to_string()));
        }

        pairs
    }
}

/// Artist entry inside a streaming-service track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotifyArtist {
    pub name: String,
    #[serde(default)]
    pub id: Option<String>,
}

/// Track returned by `GET /api/spotify-tracks`
///
/// Only the fields the client acts on are typed; the rest of the streaming
/// service's track object is kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotifyTrack {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<SpotifyArtist>,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SpotifyTrack {
    pub fn artist_names(&self) -> Vec<&str> {
        self.artists.iter().map(|a| a.name.as_str()).collect()
    }
}

/// `PATCH /api/spotify-track-id` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyTrackIdRequest {
    #[serde(rename = "song-id")]
    pub song_id: String,
    #[serde(rename = "spotify-track-id")]
    pub spotify_track_id: String,
}

// ========================================
// Playlist Types
// ========================================

/// Playlist entry from `GET /api/playlists`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
}

/// `POST /api/playlist-tracks` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistTracksRequest {
    #[serde(rename = "spotify-track-ids")]
    pub spotify_track_ids: Vec<String>,
    #[serde(rename = "spotify-playlist-id")]
    pub spotify_playlist_id: String,
}

impl PlaylistTracksRequest {
    /// Build the request, dropping blank and repeated ids (first occurrence wins)
    pub fn new<I, S>(track_ids: I, playlist_id: &str) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if playlist_id.trim().is_empty() {
            return Err(Error::InvalidInput("Playlist id must not be empty".to_string()));
        }

        let mut ids: Vec<String> = Vec::new();
        for id in track_ids {
            let id: String = id.into();
            let id = id.trim().to_string();
            if !id.is_empty() && !ids.contains(&id) {
                ids.push(id);
            }
        }

        if ids.is_empty() {
            return Err(Error::InvalidInput("No track ids selected".to_string()));
        }

        Ok(Self {
            spotify_track_ids: ids,
            spotify_playlist_id: playlist_id.trim().to_string(),
        })
    }
}

/// Per-track outcome of a bulk playlist add
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistAddResults {
    #[serde(default)]
    pub success: Vec<String>,
    #[serde(default)]
    pub failure: Vec<String>,
    #[serde(default)]
    pub duplicate: Vec<String>,
}

impl PlaylistAddResults {
    pub fn all_added(&self) -> bool {
        self.failure.is_empty()
    }
}

// ========================================
// Personalization Types
// ========================================

/// Listening-history window for personalization data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimePeriod {
    ShortTerm,
    #[default]
    MediumTerm,
    LongTerm,
}

impl TimePeriod {
    pub fn as_str(self) -> &'static str {
        match self {
            TimePeriod::ShortTerm => "short_term",
            TimePeriod::MediumTerm => "medium_term",
            TimePeriod::LongTerm => "long_term",
        }
    }
}

impl FromStr for TimePeriod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "short_term" | "short" => Ok(TimePeriod::ShortTerm),
            "medium_term" | "medium" => Ok(TimePeriod::MediumTerm),
            "long_term" | "long" => Ok(TimePeriod::LongTerm),
            other => Err(Error::InvalidInput(format!("Unknown time period '{}'", other))),
        }
    }
}

/// Kind of personalization data requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonalizationType {
    Tracks,
    Artists,
}

impl PersonalizationType {
    pub fn as_str(self) -> &'static str {
        match self {
            PersonalizationType::Tracks => "tracks",
            PersonalizationType::Artists => "artists",
        }
    }
}

impl FromStr for PersonalizationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tracks" => Ok(PersonalizationType::Tracks),
            "artists" => Ok(PersonalizationType::Artists),
            other => Err(Error::InvalidInput(format!(
                "Unknown personalization type '{}' (expected 'tracks' or 'artists')",
                other
            ))),
        }
    }
}

// ========================================
// Track Database Updates
// ========================================

/// `POST /api/pitchfork-tracks` body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTracksRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_page_num: Option<u32>,
}

impl UpdateTracksRequest {
    pub fn new(max_page_num: Option<u32>) -> Result<Self> {
        if let Some(pages) = max_page_num {
            if !(1..=MAX_SCRAPE_PAGES).contains(&pages) {
                return Err(Error::InvalidInput(format!(
                    "max_page_num must be between 1 and {}, got {}",
                    MAX_SCRAPE_PAGES, pages
                )));
            }
        }
        Ok(Self { max_page_num })
    }
}

/// `POST /api/pitchfork-tracks` body
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UpdateTracksResponse {
    pub num_new_tracks: u64,
}

// ========================================
// Tests
// ========================================
