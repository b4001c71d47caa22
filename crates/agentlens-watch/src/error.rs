use std::fmt;

use serde::Serialize;

/// Result type for agentlens-watch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur when setting up a watcher
#[derive(Debug)]
pub enum Error {
    /// IO operation failed
    Io(std::io::Error),

    /// File-change subscription failed
    Notify(notify::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::Notify(err) => write!(f, "Watch error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Notify(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<notify::Error> for Error {
    fn from(err: notify::Error) -> Self {
        Error::Notify(err)
    }
}

/// Fault class surfaced through the `on_error` callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Transient read failure; the watcher stays alive and retries on the
    /// next change event.
    ReadError,
    /// The file-change subscription itself failed; fatal for this watcher.
    WatchError,
}

/// A runtime fault on a live watcher. Parse failures are never reported
/// here; they travel inline as `malformed` messages.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchError {
    pub session_id: String,
    pub code: ErrorCode,
    pub message: String,
    pub cause: Option<String>,
}
