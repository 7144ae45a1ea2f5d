// Error types for the media-server and torrent-client collaborators

use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur while fetching sessions from Plex
#[derive(Error, Debug)]
pub enum PlexError {
    #[error("Failed to send request to Plex: {0}")]
    Request(#[source] reqwest::Error),

    #[error("Plex returned error status: {0}")]
    Status(StatusCode),

    #[error("Failed to read Plex response body: {0}")]
    Body(#[source] reqwest::Error),

    #[error("Malformed session XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Malformed session XML attribute: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("Session XML has no MediaContainer root")]
    MissingRoot,

    #[error("Session XML ended before all elements were closed")]
    Truncated,
}

/// Errors that can occur while talking to the qBittorrent Web API
#[derive(Error, Debug)]
pub enum QbtError {
    #[error("Failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Failed to send request to qBittorrent: {0}")]
    Request(#[source] reqwest::Error),

    #[error("qBittorrent rejected the credentials")]
    LoginFailed,

    #[error("qBittorrent login succeeded without a session cookie")]
    MissingSessionCookie,

    #[error("qBittorrent returned error status {status} for {endpoint}")]
    Status { endpoint: &'static str, status: StatusCode },
}
