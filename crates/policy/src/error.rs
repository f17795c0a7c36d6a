use std::io;

use reqwest::StatusCode;
use thiserror::Error;

/// Everything that can go wrong between sending a prompt and holding a valid
/// action. The generative policy never surfaces these to callers; they are
/// logged and replaced by the fallback action.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("request timed out")]
    Timeout,

    #[error("upstream status {0}")]
    Status(StatusCode),

    #[error("malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error("envelope has no `response` field")]
    MissingResponse,

    #[error("malformed action payload: {0}")]
    Payload(#[source] serde_json::Error),

    #[error("field `{field}` is not a number in [0, 1]: {value}")]
    OutOfRange { field: &'static str, value: String },
}

impl From<reqwest::Error> for GenerateError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GenerateError::Timeout
        } else {
            GenerateError::Transport(err)
        }
    }
}

/// Failure to persist a feedback record. Propagated to the caller since there
/// is no fallback for a lost record.
#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serde JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("writer task failed: {0}")]
    Join(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid listen address '{addr}': {source}")]
    ListenAddr {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },
}
