use thiserror::Error;

/// Coarse classification of an [`Error`], carried by a session's `Error` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Fetch,
    Parse,
    SchedulingConflict,
    Audio,
    Config,
    Api,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("not a valid MIDI document: {0}")]
    Parse(String),

    #[error("notes are still scheduled for {0}")]
    SchedulingConflict(String),

    #[error("audio backend error: {0}")]
    Audio(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("melody service error: {0}")]
    Api(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Fetch { .. } => ErrorKind::Fetch,
            Error::Parse(_) => ErrorKind::Parse,
            Error::SchedulingConflict(_) => ErrorKind::SchedulingConflict,
            Error::Audio(_) => ErrorKind::Audio,
            Error::Config(_) => ErrorKind::Config,
            Error::Api(_) => ErrorKind::Api,
        }
    }

    /// Text shown next to a player's retry control.
    pub fn user_message(&self) -> String {
        match self {
            Error::Fetch { .. } => "Failed to load melody. Please try again.".to_string(),
            Error::Parse(_) => "This melody file could not be read. Please try again.".to_string(),
            Error::Audio(e) => format!("Playback failed: {}", e),
            other => other.to_string(),
        }
    }
}

impl From<midly::Error> for Error {
    fn from(e: midly::Error) -> Self {
        Error::Parse(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
