//! Backend API wire types
//!
//! Request and response shapes of the Top Tracks backend REST API.
//!
//! # Design Principle
//!
//! This module contains ONLY serde types and their validation helpers.
//! No HTTP client dependencies; the transport lives in `tt-client`.

pub mod types;

pub use types::{
    AuthMethod, AuthorizationStatus, AuthorizeRedirect, LoginRequest, LoginResponse,
    PersonalizationType, Playlist, PlaylistAddResults, PlaylistTracksRequest, RefreshResponse,
    SignupRequest, SpotifyArtist, SpotifyTrack, SpotifyTrackIdRequest, TimePeriod, Track,
    TrackLookup, TrackQuery, UpdateTracksRequest, UpdateTracksResponse,
};
