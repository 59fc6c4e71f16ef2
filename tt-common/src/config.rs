//! Configuration loading and resolution
//!
//! Settings resolve in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing config file is not an error: a warning is logged and the
//! compiled defaults apply.

use crate::api::AuthMethod;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Backend address used when nothing else is configured
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5001";

/// Environment variable overriding the backend address
pub const BASE_URL_ENV: &str = "TOPTRACKS_BASE_URL";

/// Environment variable overriding the auth method
pub const AUTH_METHOD_ENV: &str = "TOPTRACKS_AUTH_METHOD";

/// Environment variable pointing at an alternate config file
pub const CONFIG_PATH_ENV: &str = "TOPTRACKS_CONFIG";

const APP_DIR: &str = "toptracks";

/// Logging section of the TOML config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level filter when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// On-disk TOML configuration
///
/// Every field is optional so a partial file only overrides what it names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub base_url: Option<String>,
    pub auth_method: Option<AuthMethod>,
    pub coalesce_refresh: Option<bool>,
    pub request_timeout_secs: Option<u64>,
    pub access_token_ttl_secs: Option<u64>,
    pub session_file: Option<PathBuf>,
    pub logging: LoggingConfig,
}

/// Compiled defaults for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub base_url: String,
    pub auth_method: AuthMethod,
    pub coalesce_refresh: bool,
    pub request_timeout: Duration,
    /// Backend issues 10-minute access tokens
    pub access_token_ttl: Duration,
    pub session_file: PathBuf,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            auth_method: AuthMethod::Bearer,
            coalesce_refresh: true,
            request_timeout: Duration::from_secs(30),
            access_token_ttl: Duration::from_secs(600),
            session_file: default_session_file(),
            log_level: "info".to_string(),
        }
    }
}

/// Fully resolved client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend origin without trailing slash
    pub base_url: String,
    pub auth_method: AuthMethod,
    /// Share one refresh call between concurrently rejected requests
    pub coalesce_refresh: bool,
    pub request_timeout: Duration,
    pub access_token_ttl: Duration,
    pub session_file: PathBuf,
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let defaults = CompiledDefaults::for_current_platform();
        Self {
            base_url: defaults.base_url,
            auth_method: defaults.auth_method,
            coalesce_refresh: defaults.coalesce_refresh,
            request_timeout: defaults.request_timeout,
            access_token_ttl: defaults.access_token_ttl,
            session_file: defaults.session_file,
            log_level: defaults.log_level,
        }
    }
}

impl ClientConfig {
    /// Configuration pointing at `base_url` with every other setting defaulted
    pub fn for_base_url(base_url: &str) -> Result<Self> {
        Ok(Self {
            base_url: normalize_base_url(base_url)?,
            ..Self::default()
        })
    }

    /// Absolute URL for an API path such as `/api/tracks`
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

/// Resolves a [`ClientConfig`] from CLI overrides, environment, TOML and defaults
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    cli_base_url: Option<String>,
    cli_auth_method: Option<AuthMethod>,
    cli_config_path: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        self.cli_base_url = base_url;
        self
    }

    pub fn with_auth_method(mut self, auth_method: Option<AuthMethod>) -> Self {
        self.cli_auth_method = auth_method;
        self
    }

    pub fn with_config_path(mut self, path: Option<PathBuf>) -> Self {
        self.cli_config_path = path;
        self
    }

    /// Resolve the configuration
    ///
    /// Fails only on malformed input (unparseable TOML, invalid URL or auth
    /// method); absent sources fall through to the next tier.
    pub fn resolve(&self) -> Result<ClientConfig> {
        let defaults = CompiledDefaults::for_current_platform();

        let toml_config = match self.config_file() {
            Some(path) => {
                debug!("Loading config file: {}", path.display());
                load_toml_config(&path)?
            }
            None => {
                warn!("No config file found, using compiled defaults");
                TomlConfig::default()
            }
        };

        // Priority 1 → 4 for the backend address
        let base_url = match self.cli_base_url.clone() {
            Some(url) => url,
            None => match std::env::var(BASE_URL_ENV) {
                Ok(url) if !url.trim().is_empty() => url,
                _ => toml_config
                    .base_url
                    .clone()
                    .unwrap_or_else(|| defaults.base_url.clone()),
            },
        };

        let auth_method = match self.cli_auth_method {
            Some(method) => method,
            None => match std::env::var(AUTH_METHOD_ENV) {
                Ok(value) if !value.trim().is_empty() => value.parse()?,
                _ => toml_config.auth_method.unwrap_or(defaults.auth_method),
            },
        };

        Ok(ClientConfig {
            base_url: normalize_base_url(&base_url)?,
            auth_method,
            coalesce_refresh: toml_config
                .coalesce_refresh
                .unwrap_or(defaults.coalesce_refresh),
            request_timeout: toml_config
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            access_token_ttl: toml_config
                .access_token_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.access_token_ttl),
            session_file: toml_config
                .session_file
                .clone()
                .unwrap_or(defaults.session_file),
            log_level: toml_config.logging.level,
        })
    }

    /// Locate the config file: CLI path, then env var, then platform default
    ///
    /// An explicitly named file is returned even if missing so that loading
    /// reports the error; the platform default is only used when it exists.
    fn config_file(&self) -> Option<PathBuf> {
        if let Some(ref path) = self.cli_config_path {
            return Some(path.clone());
        }

        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        default_config_file().filter(|path| path.exists())
    }
}

/// Default config file location: `<config_dir>/toptracks/config.toml`
pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
}

/// Default session file location: `<data_local_dir>/toptracks/session.json`
fn default_session_file() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(".toptracks"))
        .join("session.json")
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    Ok(toml::from_str(&content)?)
}

/// Write a TOML config file atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
    write_private_file(path, content.as_bytes())
}

/// Write `contents` to `path` atomically with owner-only permissions on Unix
///
/// Parent directories are created as needed. Used for files that may hold
/// credentials.
pub fn write_private_file(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    std::fs::write(&temp_path, contents)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600))?;
    }

    if let Err(e) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(Error::Io(e));
    }

    Ok(())
}

/// Validate and normalize a backend origin (scheme required, no trailing slash)
pub fn normalize_base_url(url: &str) -> Result<String> {
    let candidate = url.trim();
    let host = candidate
        .strip_prefix("http://")
        .or_else(|| candidate.strip_prefix("https://"))
        .ok_or_else(|| {
            Error::Config(format!(
                "Base URL must start with http:// or https://, got '{}'",
                url
            ))
        })?;

    if host.trim_end_matches('/').is_empty() {
        return Err(Error::Config(format!("Base URL has no host: '{}'", url)));
    }

    Ok(candidate.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("http://localhost:5001/").unwrap(),
            "http://localhost:5001"
        );
        assert_eq!(
            normalize_base_url(" https://tracks.example.com ").unwrap(),
            "https://tracks.example.com"
        );
        assert!(normalize_base_url("localhost:5001").is_err());
        assert!(normalize_base_url("http://").is_err());
        assert!(normalize_base_url("https://").is_err());
    }

    #[test]
    fn test_url_for_joins_paths() {
        let config = ClientConfig::for_base_url("http://host:1/").unwrap();
        assert_eq!(config.url_for("/api/tracks"), "http://host:1/api/tracks");
        assert_eq!(config.url_for("api/tracks"), "http://host:1/api/tracks");
        assert_eq!(config.url_for("https://other/x"), "https://other/x");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: TomlConfig = toml::from_str("auth_method = \"cookie\"").unwrap();
        assert_eq!(config.auth_method, Some(AuthMethod::Cookie));
        assert!(config.base_url.is_none());
        assert_eq!(config.logging.level, "info");
    }
}
