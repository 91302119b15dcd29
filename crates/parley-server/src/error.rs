//! Server error types.

use std::fmt;

/// Errors that can occur while starting or running the server.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (rejected before binding).
    Config(String),

    /// Transport/network error.
    Transport(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::Transport(msg) => write!(f, "transport error: {}", msg),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
