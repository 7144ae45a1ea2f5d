use std::fmt;

/// Kind of media a playback session is serving
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Track,
    Photo,
}

impl MediaKind {
    /// Map a `MediaContainer` child element name to a media kind
    pub fn from_element(name: &[u8]) -> Option<Self> {
        match name {
            b"Video" => Some(MediaKind::Video),
            b"Track" => Some(MediaKind::Track),
            b"Photo" => Some(MediaKind::Photo),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Track => "track",
            MediaKind::Photo => "photo",
        }
    }
}

/// One active playback session reported by Plex
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub kind: MediaKind,
    pub user: Option<String>,
    pub library: Option<String>,
    pub title: Option<String>,
    /// Season or album
    pub parent_title: Option<String>,
    /// Show or artist
    pub grandparent_title: Option<String>,
    /// Player state such as `playing`, `paused` or `buffering`
    pub state: Option<String>,
}

impl Session {
    pub fn new(kind: MediaKind) -> Self {
        Self {
            kind,
            user: None,
            library: None,
            title: None,
            parent_title: None,
            grandparent_title: None,
            state: None,
        }
    }

    /// Title as shown in the logs
    ///
    /// Episodes and tracks are rendered as `show - season - episode`; anything
    /// without a grandparent title uses its own title.
    pub fn display_title(&self) -> String {
        let title = self.title.as_deref().unwrap_or_default();

        match self.grandparent_title.as_deref() {
            Some(grandparent) if !grandparent.is_empty() => format!(
                "{} - {} - {}",
                grandparent,
                self.parent_title.as_deref().unwrap_or_default(),
                title
            ),
            _ => title.to_string(),
        }
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "User: {}, Library: {}, Title: {}",
            self.user.as_deref().unwrap_or("unknown"),
            self.library.as_deref().unwrap_or("unknown"),
            self.display_title()
        )
    }
}

/// Point-in-time view of the sessions Plex is serving
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Count reported by the server in the `size` attribute
    pub size: usize,
    pub sessions: Vec<Session>,
}

impl SessionSnapshot {
    pub fn new(size: usize, sessions: Vec<Session>) -> Self {
        Self { size, sessions }
    }

    pub fn is_streaming(&self) -> bool {
        self.size > 0
    }

    /// Session count as reported by the server. May differ from
    /// `sessions.len()` when Plex reports sessions it does not describe.
    pub fn count(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        !self.is_streaming()
    }
}
