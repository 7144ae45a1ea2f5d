use anyhow::{Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use reqwest::header::ACCEPT;
use std::time::Duration;
use tracing::debug;

use crate::core::error::PlexError;
use crate::core::poller::SessionSource;
use crate::models::session::{MediaKind, Session, SessionSnapshot};

const SESSIONS_PATH: &str = "/status/sessions";
const TOKEN_PARAM: &str = "X-Plex-Token";

/// Client for the Plex active-session endpoint
pub struct PlexClient {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl PlexClient {
    pub fn new(base_url: &str, token: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), SESSIONS_PATH),
            token,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fetch and parse the sessions Plex is currently serving
    pub async fn fetch_sessions(&self) -> Result<SessionSnapshot, PlexError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[(TOKEN_PARAM, &self.token)])
            .header(ACCEPT, "application/xml")
            .send()
            .await
            .map_err(PlexError::Request)?;

        let status = response.status();
        if !status.is_success() {
            return Err(PlexError::Status(status));
        }

        let body = response.text().await.map_err(PlexError::Body)?;
        debug!(bytes = body.len(), "Session document received from Plex");

        parse_sessions(&body)
    }
}

impl SessionSource for PlexClient {
    async fn fetch_sessions(&self) -> Result<SessionSnapshot, PlexError> {
        PlexClient::fetch_sessions(self).await
    }
}

/// Parse a `/status/sessions` document.
///
/// Direct children of `MediaContainer` named `Video`, `Track` or `Photo` are
/// sessions; their `User` and `Player` children carry the viewer name and
/// playback state. When the root has no usable `size` attribute the number of
/// parsed sessions is used instead.
pub fn parse_sessions(xml: &str) -> Result<SessionSnapshot, PlexError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut depth = 0usize;
    let mut root_seen = false;
    let mut reported_size = None;
    let mut current: Option<Session> = None;
    let mut sessions = Vec::new();

    loop {
        let (element, self_closing) = match reader.read_event()? {
            Event::Start(element) => (element, false),
            Event::Empty(element) => (element, true),
            Event::End(_) => {
                if depth == 2 {
                    sessions.extend(current.take());
                }
                depth = depth.saturating_sub(1);
                continue;
            }
            Event::Eof if depth != 0 => return Err(PlexError::Truncated),
            Event::Eof => break,
            _ => continue,
        };

        let element_depth = depth + 1;
        match element_depth {
            1 => {
                if element.name().as_ref() != b"MediaContainer" {
                    return Err(PlexError::MissingRoot);
                }
                root_seen = true;
                reported_size = attribute(&element, "size")?
                    .and_then(|size| size.trim().parse::<usize>().ok());
            }
            2 => {
                if let Some(kind) = MediaKind::from_element(element.name().as_ref()) {
                    current = Some(read_session(&element, kind)?);
                }
            }
            3 => {
                if let Some(session) = current.as_mut() {
                    match element.name().as_ref() {
                        b"User" => session.user = attribute(&element, "title")?,
                        b"Player" => session.state = attribute(&element, "state")?,
                        _ => {}
                    }
                }
            }
            _ => {}
        }

        if self_closing {
            if element_depth == 2 {
                sessions.extend(current.take());
            }
        } else {
            depth = element_depth;
        }
    }

    if !root_seen {
        return Err(PlexError::MissingRoot);
    }

    let size = reported_size.unwrap_or(sessions.len());
    Ok(SessionSnapshot::new(size, sessions))
}

fn read_session(element: &BytesStart<'_>, kind: MediaKind) -> Result<Session, PlexError> {
    let mut session = Session::new(kind);
    session.library = attribute(element, "librarySectionTitle")?;
    session.title = attribute(element, "title")?;
    session.parent_title = attribute(element, "parentTitle")?;
    session.grandparent_title = attribute(element, "grandparentTitle")?;
    Ok(session)
}

fn attribute(element: &BytesStart<'_>, name: &str) -> Result<Option<String>, PlexError> {
    match element.try_get_attribute(name)? {
        Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}
