use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("Page returned no data, check that the expected page is open")]
    EmptyExtraction,

    #[error("Collector unreachable (is the desktop collector running?): {0}")]
    TransportUnreachable(String),

    #[error("Collector timed out")]
    TransportTimeout,

    #[error("Collector rejected update: HTTP {0}")]
    TransportRejected(u16),

    #[error("Poll failed: {0}")]
    Poll(String),

    #[error("Invalid command: {0}")]
    Command(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse class of a failure, kept on `AgentState` next to the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ParseFailure,
    EmptyExtraction,
    TransportUnreachable,
    TransportTimeout,
    TransportRejected,
    PollFailure,
    Other,
}

impl Error {
    pub fn kind(&self) -> FailureKind {
        match self {
            Error::UnknownSource(_) => FailureKind::ParseFailure,
            Error::EmptyExtraction => FailureKind::EmptyExtraction,
            Error::TransportUnreachable(_) => FailureKind::TransportUnreachable,
            Error::TransportTimeout => FailureKind::TransportTimeout,
            Error::TransportRejected(_) => FailureKind::TransportRejected,
            Error::Poll(_) => FailureKind::PollFailure,
            _ => FailureKind::Other,
        }
    }

    /// Maps a reqwest failure onto the transport taxonomy.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::TransportTimeout
        } else if let Some(status) = err.status() {
            Error::TransportRejected(status.as_u16())
        } else {
            Error::TransportUnreachable(err.to_string())
        }
    }
}
