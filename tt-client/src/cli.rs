//! `toptracks` subcommands

use clap::Subcommand;
use serde_json::Value;
use tt_common::api::{PersonalizationType, SpotifyTrack, TimePeriod, Track, TrackQuery};
use tt_client::{BackendApi, ClientError, ClientResult};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sign in and store the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "TOPTRACKS_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Create an account (a verification link is mailed)
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long, env = "TOPTRACKS_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        name: String,
    },

    /// Confirm an account with the mailed verification code
    Verify { code: String },

    /// Sign out and forget the stored session
    Logout,

    /// Show session and streaming account status
    Status,

    /// Link the streaming account (prints the consent URL)
    Authorize,

    /// Unlink the streaming account
    Unauthorize,

    /// List recommended tracks
    Tracks {
        #[arg(long)]
        site: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long = "artist", value_delimiter = ',')]
        artists: Vec<String>,
        #[arg(long = "genre", value_delimiter = ',')]
        genres: Vec<String>,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        offset: Option<u32>,
    },

    /// Show one recommended track
    Track { id: String },

    /// Search the streaming service for a recommended track
    Search {
        /// Recommended track id to search for
        #[arg(long, conflicts_with = "name")]
        track: Option<String>,
        /// Track name to search for
        #[arg(long, required_unless_present = "track")]
        name: Option<String>,
        #[arg(long = "artist", value_delimiter = ',')]
        artists: Vec<String>,
    },

    /// Link a recommended track to a streaming-service track id
    SetTrackId {
        track_id: String,
        spotify_track_id: String,
    },

    /// List playlists of the linked account
    Playlists,

    /// Add streaming-service tracks to a playlist
    AddToPlaylist {
        #[arg(long)]
        playlist: String,
        #[arg(required = true)]
        track_ids: Vec<String>,
    },

    /// Top tracks or artists of the linked account
    Top {
        /// short, medium or long
        #[arg(long, default_value = "medium")]
        period: TimePeriod,
        /// tracks or artists
        #[arg(long, default_value = "tracks")]
        kind: PersonalizationType,
    },

    /// Scrape the review site for new recommendations
    UpdateTracks {
        /// Review pages to scan (1-257)
        #[arg(long)]
        max_pages: Option<u32>,
    },
}

/// Run one subcommand against the backend
pub async fn run(command: Command, api: &BackendApi) -> ClientResult<()> {
    match command {
        Command::Login { email, password } => {
            let name = api.login(&email, &password).await?;
            println!("Logged in as {}", name.as_deref().unwrap_or(&email));
        }

        Command::Signup {
            email,
            password,
            name,
        } => match api.signup(&email, &password, &name).await {
            Ok(()) => println!("Account created, check {} for a verification link", email),
            Err(ClientError::Api { status: 409, .. }) => {
                println!("An account for {} already exists", email)
            }
            Err(e) => return Err(e),
        },

        Command::Verify { code } => {
            println!("{}", api.verify_account(&code).await?);
        }

        Command::Logout => {
            api.logout().await?;
            println!("Logged out");
        }

        Command::Status => {
            let Some(user) = logged_in_user(api).await else {
                println!("Not logged in");
                return Ok(());
            };
            println!("Logged in as {}", user);

            if !api.check_token().await? {
                println!("Session: expired, run `toptracks login`");
                return Ok(());
            }
            println!("Session: valid");

            let linked = api.account_is_authorized().await?;
            println!(
                "Streaming account: {}",
                if linked { "linked" } else { "not linked" }
            );
        }

        Command::Authorize => match api.authorize_account().await? {
            Some(url) => println!("Open this URL to grant access:\n{}", url),
            None => println!("Streaming account linked"),
        },

        Command::Unauthorize => {
            if api.unauthorize_account().await? {
                println!("Streaming account unlinked");
            } else {
                println!("No streaming account was linked");
            }
        }

        Command::Tracks {
            site,
            name,
            artists,
            genres,
            limit,
            offset,
        } => {
            let query = TrackQuery {
                site_name: site,
                song_name: name,
                artists,
                genres,
                limit,
                offset,
                ..Default::default()
            };
            let tracks = api.tracks(&query).await?;
            if tracks.is_empty() {
                println!("No tracks found");
            }
            for track in &tracks {
                println!("{}", format_track(track));
            }
        }

        Command::Track { id } => match api.load_track(&id).await? {
            Some(track) => print_track_details(&track),
            None => println!("Track {} not found", id),
        },

        Command::Search {
            track,
            name,
            artists,
        } => {
            let (name, artists) = match track {
                Some(id) => match api.load_track(&id).await? {
                    Some(track) => (track.name, track.artists),
                    None => {
                        println!("Track {} not found", id);
                        return Ok(());
                    }
                },
                None => (name.unwrap_or_default(), artists),
            };

            let results = api.search_spotify_tracks(&name, &artists).await?;
            if results.is_empty() {
                println!("No matches for '{}'", name);
            }
            for candidate in &results {
                println!("{}", format_spotify_track(candidate));
            }
        }

        Command::SetTrackId {
            track_id,
            spotify_track_id,
        } => {
            api.add_spotify_track_id(&track_id, &spotify_track_id).await?;
            println!("Track {} linked to {}", track_id, spotify_track_id);
        }

        Command::Playlists => {
            let playlists = api.playlists().await?;
            if playlists.is_empty() {
                println!("No playlists found");
            }
            for playlist in &playlists {
                println!("{}  {}", playlist.id, playlist.name);
            }
        }

        Command::AddToPlaylist {
            playlist,
            track_ids,
        } => {
            let results = api.add_tracks_to_playlist(&track_ids, &playlist).await?;
            println!(
                "Added {}, already present {}, failed {}",
                results.success.len(),
                results.duplicate.len(),
                results.failure.len()
            );
            for id in &results.failure {
                println!("  failed: {}", id);
            }
        }

        Command::Top { period, kind } => {
            let items = api.user_top_content(period, kind).await?;
            for (rank, item) in items.iter().enumerate() {
                println!("{:>3}. {}", rank + 1, describe_item(item));
            }
        }

        Command::UpdateTracks { max_pages } => {
            let added = api.update_tracks(max_pages).await?;
            println!("{} new tracks added", added);
        }
    }

    Ok(())
}

async fn logged_in_user(api: &BackendApi) -> Option<String> {
    let session = api.session();
    if !session.is_authenticated().await {
        return None;
    }
    Some(
        session
            .user_name()
            .await
            .unwrap_or_else(|| "unknown user".to_string()),
    )
}

/// One-line track summary for listings
fn format_track(track: &Track) -> String {
    let date = track
        .date_published
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "----------".to_string());
    let linked = if track.is_linked() { "*" } else { " " };

    let mut line = format!(
        "{:>6} {} {}  {} - {}",
        track.id,
        linked,
        date,
        track.artists.join(", "),
        track.name
    );
    if !track.genres.is_empty() {
        line.push_str(&format!("  [{}]", track.genres.join(", ")));
    }
    line
}

fn print_track_details(track: &Track) {
    println!("{}", track.name);
    println!("  id:        {}", track.id);
    println!("  artists:   {}", track.artists.join(", "));
    if !track.genres.is_empty() {
        println!("  genres:    {}", track.genres.join(", "));
    }
    if let Some(ref site) = track.site_name {
        println!("  site:      {}", site);
    }
    if let Some(date) = track.date_published {
        println!("  published: {}", date);
    }
    if let Some(ref link) = track.link {
        println!("  review:    {}", link);
    }
    match track.spotify_track_id {
        Some(ref id) => println!("  streaming: {}", id),
        None => println!("  streaming: not linked"),
    }
    if let Some(ref preview) = track.preview_url {
        println!("  preview:   {}", preview);
    }
}

fn format_spotify_track(track: &SpotifyTrack) -> String {
    format!("{}  {} - {}", track.id, track.artist_names().join(", "), track.name)
}

/// Personalization items are passed through from the streaming service
fn describe_item(item: &Value) -> String {
    let Some(name) = item.get("name").and_then(Value::as_str) else {
        return item.to_string();
    };

    let artists: Vec<&str> = item
        .get("artists")
        .and_then(Value::as_array)
        .map(|artists| {
            artists
                .iter()
                .filter_map(|a| a.get("name").and_then(Value::as_str).or_else(|| a.as_str()))
                .collect()
        })
        .unwrap_or_default();

    if artists.is_empty() {
        name.to_string()
    } else {
        format!("{} - {}", artists.join(", "), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn track() -> Track {
        Track {
            id: 42,
            name: "Song".to_string(),
            artists: vec!["A".to_string(), "B".to_string()],
            genres: vec!["Rock".to_string()],
            site_name: Some("pitchfork".to_string()),
            link: None,
            date_published: NaiveDate::from_ymd_opt(2023, 4, 1),
            spotify_track_id: None,
            preview_url: None,
        }
    }

    #[test]
    fn test_format_track_line() {
        assert_eq!(
            format_track(&track()),
            "    42   2023-04-01  A, B - Song  [Rock]"
        );

        let linked = Track {
            spotify_track_id: Some("sp".to_string()),
            genres: Vec::new(),
            date_published: None,
            ..track()
        };
        assert_eq!(format_track(&linked), "    42 * ----------  A, B - Song");
    }

    #[test]
    fn test_describe_personalization_items() {
        assert_eq!(
            describe_item(&json!({"name": "Tune", "artists": [{"name": "X"}, {"name": "Y"}]})),
            "X, Y - Tune"
        );
        assert_eq!(describe_item(&json!({"name": "Band", "genres": ["jazz"]})), "Band");
        assert_eq!(describe_item(&json!("raw")), "\"raw\"");
    }
}
