//! toptracks - command-line client for the Top Tracks backend
//!
//! Browses music-review recommendations, links them to the streaming
//! service and manages playlists. Credentials persist in a session file
//! between runs; expired access tokens are renewed transparently.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;
use tt_client::{BackendApi, ClientError, Session, SessionEvents};
use tt_common::api::AuthMethod;
use tt_common::config::ConfigResolver;

mod cli;

/// Command-line arguments for toptracks
#[derive(Parser, Debug)]
#[command(name = "toptracks")]
#[command(about = "Client for the Top Tracks music recommendation service")]
#[command(version)]
struct Args {
    /// Backend origin, e.g. http://127.0.0.1:5001
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Credential transport: bearer or cookie
    #[arg(long, global = true)]
    auth_method: Option<AuthMethod>,

    /// Config file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: cli::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = ConfigResolver::new()
        .with_base_url(args.base_url.clone())
        .with_auth_method(args.auth_method)
        .with_config_path(args.config.clone())
        .resolve()
        .context("Failed to resolve configuration")?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    debug!(
        "Starting toptracks v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    debug!(
        "Backend: {} ({} auth), session file: {}",
        config.base_url,
        config.auth_method,
        config.session_file.display()
    );

    let session = Arc::new(Session::load(&config.session_file, config.access_token_ttl));

    let events: Arc<dyn SessionEvents> = Arc::new(|| {
        warn!("Session has expired, run `toptracks login` to sign in again");
    });

    let api = BackendApi::connect(&config, session.clone(), events)
        .context("Failed to create HTTP client")?;

    match cli::run(args.command, &api).await {
        Ok(()) => Ok(()),
        Err(ClientError::SessionExpired) => {
            session
                .clear()
                .await
                .context("Failed to clear expired session")?;
            Err(ClientError::SessionExpired.into())
        }
        Err(e) => Err(e.into()),
    }
}
