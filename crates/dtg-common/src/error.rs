//! Error kinds shared across the download manager's crates.
//!
//! Mirrors the kinds spec.md §7 requires be surfaced to the caller, with
//! `#[from]` conversions from the two external error types workers and the
//! store actually produce (`reqwest`, and `rusqlite` wherever it's in scope
//! via the `Database`/`DbFailure` variant).

/// Errors surfaced by the localizer, planner, worker, and store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No item exists with the given id.
    #[error("item not found: {0}")]
    ItemNotFound(String),

    /// The requested operation is not legal in the item's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A request to the given URL exceeded its timeout.
    #[error("network timeout fetching {url}")]
    NetworkTimeout { url: String },

    /// Playlist content could not be parsed.
    #[error("malformed playlist: {0}")]
    MalformedPlaylist(String),

    /// A playlist was neither a master nor a media playlist.
    #[error("unknown playlist type: {0}")]
    UnknownPlaylistType(String),

    /// An invariant the implementation relies on was violated; this
    /// indicates a bug rather than bad input or network conditions.
    #[error("invalid internal state: {0}")]
    InvalidInternalState(String),

    /// An HTTP response could not be completed successfully.
    #[error("http failure ({status:?}): {cause}")]
    HttpFailure {
        status: Option<u16>,
        cause: String,
    },

    /// The persistence layer failed (connection, pool, or query error).
    #[error("store failure: {0}")]
    DbFailure(String),

    /// An I/O operation (temp file write, atomic rename, directory create)
    /// failed outside the HTTP/store paths above.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn item_not_found(id: impl Into<String>) -> Self {
        Self::ItemNotFound(id.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn malformed_playlist(msg: impl Into<String>) -> Self {
        Self::MalformedPlaylist(msg.into())
    }

    pub fn invalid_internal_state(msg: impl Into<String>) -> Self {
        Self::InvalidInternalState(msg.into())
    }

    pub fn db_failure(msg: impl Into<String>) -> Self {
        Self::DbFailure(msg.into())
    }

    /// True if this error kind should retry/escalate to `interrupted` rather
    /// than terminal `failed` (spec.md §7, §4.6).
    pub fn is_resumable(&self) -> bool {
        match self {
            Error::HttpFailure { status: Some(s), .. } => {
                *s >= 500 || *s == 408 || *s == 429
            }
            Error::NetworkTimeout { .. } | Error::Io(_) => true,
            Error::HttpFailure { status: None, .. } => true,
            _ => false,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::DbFailure(e.to_string())
    }
}

impl From<r2d2::Error> for Error {
    fn from(e: r2d2::Error) -> Self {
        Error::DbFailure(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::NetworkTimeout {
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            }
        } else {
            Error::HttpFailure {
                status: e.status().map(|s| s.as_u16()),
                cause: e.to_string(),
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::item_not_found("abc").to_string(),
            "item not found: abc"
        );
        assert_eq!(
            Error::invalid_state("already running").to_string(),
            "invalid state: already running"
        );
    }

    #[test]
    fn test_resumable_classification() {
        assert!(Error::HttpFailure { status: Some(503), cause: "x".into() }.is_resumable());
        assert!(Error::HttpFailure { status: Some(408), cause: "x".into() }.is_resumable());
        assert!(Error::HttpFailure { status: Some(429), cause: "x".into() }.is_resumable());
        assert!(!Error::HttpFailure { status: Some(404), cause: "x".into() }.is_resumable());
        assert!(!Error::HttpFailure { status: Some(400), cause: "x".into() }.is_resumable());
        assert!(Error::NetworkTimeout { url: "u".into() }.is_resumable());
        assert!(!Error::MalformedPlaylist("bad".into()).is_resumable());
    }

    #[test]
    fn test_db_error_conversion() {
        let e: Error = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(e, Error::DbFailure(_)));
    }
}
