use anyhow::{bail, Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::models::policy::{BandwidthPolicy, SpeedLimit};
use crate::utils::units::mbps_to_bps;

pub const PLEX_TOKEN: &str = "PLEX_TOKEN";
pub const PLEX_URL: &str = "PLEX_URL";
pub const QBT_HOST: &str = "QBT_HOST";
pub const QBT_USER: &str = "QBT_USER";
pub const QBT_PASS: &str = "QBT_PASS";
pub const UPLOAD_LIMIT_MBPS: &str = "UPLOAD_LIMIT_MBPS";
pub const DOWNLOAD_LIMIT_MBPS: &str = "DOWNLOAD_LIMIT_MBPS";
pub const LOG_FILE: &str = "LOG_FILE";
pub const LOG_LEVEL: &str = "LOG_LEVEL";
pub const LOG_FORMAT: &str = "LOG_FORMAT";

/// Optional file with `KEY=value` lines read before the environment
pub const DOTENV_FILE: &str = ".env";

#[derive(Debug, Clone)]
pub struct Config {
    pub plex: PlexConfig,
    pub qbittorrent: QbtConfig,
    pub limits: LimitsConfig,
}

#[derive(Clone)]
pub struct PlexConfig {
    pub url: String,
    pub token: String,
}

#[derive(Clone)]
pub struct QbtConfig {
    pub host: String,
    pub username: String,
    pub password: String,
}

/// Caps applied while someone is streaming
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitsConfig {
    pub upload: SpeedLimit,
    pub download: SpeedLimit,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Append-only file receiving debug and above
    pub file: PathBuf,
    /// Console level, overridden by `RUST_LOG`
    pub level: String,
    /// Console format, `console` or `json`
    pub format: String,
}

// Secrets stay out of Debug output
impl fmt::Debug for PlexConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlexConfig")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl fmt::Debug for QbtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QbtConfig")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

// Default value functions
fn default_plex_url() -> String {
    "http://localhost:32400".to_string()
}

fn default_limit_mbps() -> String {
    "0".to_string() // unlimited
}

fn default_log_file() -> PathBuf {
    PathBuf::from("log.log")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "console".to_string()
}

impl LimitsConfig {
    pub fn caps(&self) -> BandwidthPolicy {
        BandwidthPolicy::new(self.upload, self.download)
    }
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its
    /// value. Required values that are unset or blank are all reported at once.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let token = required(PLEX_TOKEN);
        let host = required(QBT_HOST);
        let username = required(QBT_USER);
        let password = required(QBT_PASS);

        let missing: Vec<&str> = [
            (PLEX_TOKEN, token.is_none()),
            (QBT_HOST, host.is_none()),
            (QBT_USER, username.is_none()),
            (QBT_PASS, password.is_none()),
        ]
        .into_iter()
        .filter_map(|(key, absent)| absent.then_some(key))
        .collect();

        let (Some(token), Some(host), Some(username), Some(password)) =
            (token, host, username, password)
        else {
            bail!(
                "One or more environment variables are missing: {}",
                missing.join(", ")
            );
        };

        let config = Config {
            plex: PlexConfig {
                url: required(PLEX_URL).unwrap_or_else(default_plex_url),
                token,
            },
            qbittorrent: QbtConfig {
                host,
                username,
                password,
            },
            limits: LimitsConfig {
                upload: parse_limit(&lookup, UPLOAD_LIMIT_MBPS),
                download: parse_limit(&lookup, DOWNLOAD_LIMIT_MBPS),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.plex.url.starts_with("http://") && !self.plex.url.starts_with("https://") {
            bail!(
                "Invalid {} '{}'. Must start with http:// or https://",
                PLEX_URL,
                self.plex.url
            );
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let config = LoggingConfig {
            file: value(LOG_FILE).map(PathBuf::from).unwrap_or_else(default_log_file),
            level: value(LOG_LEVEL)
                .map(|level| level.trim().to_lowercase())
                .unwrap_or_else(default_log_level),
            format: value(LOG_FORMAT)
                .map(|format| format.trim().to_lowercase())
                .unwrap_or_else(default_log_format),
        };

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.as_str()) {
            bail!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.level
            );
        }

        let valid_formats = ["json", "console"];
        if !valid_formats.contains(&self.format.as_str()) {
            bail!(
                "Invalid log format '{}'. Must be one of: json, console",
                self.format
            );
        }

        if self.file.file_name().is_none() {
            bail!("{} must name a file, got '{}'", LOG_FILE, self.file.display());
        }

        Ok(())
    }
}

/// Load `path` into the process environment. Variables already set in the
/// environment win over the file. Returns `false` when the file does not exist.
pub fn load_env_file(path: &Path) -> Result<bool> {
    match dotenvy::from_path(path) {
        Ok(()) => Ok(true),
        Err(e) if e.not_found() => Ok(false),
        Err(e) => Err(e).with_context(|| format!("Failed to load {}", path.display())),
    }
}

/// Read a MB/s cap; anything unusable means unlimited
fn parse_limit<F>(lookup: &F, key: &str) -> SpeedLimit
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key).unwrap_or_else(default_limit_mbps);

    match mbps_to_bps(&raw) {
        Some(bps) => SpeedLimit::from_bytes_per_sec(bps),
        None => {
            warn!(
                variable = key,
                value = %raw,
                "Invalid limit value provided, treating as unlimited"
            );
            SpeedLimit::UNLIMITED
        }
    }
}
