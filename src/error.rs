//! Error types for anime-relay
//!
//! Only two kinds of failure ever abort work:
//! - a [`ParseError`] before a job starts
//! - an [`Error`] escaping the episode loop (reported as an unexpected error)
//!
//! Episode-scoped and sink-scoped failures are plain values
//! ([`EpisodeOutcome`](crate::types::EpisodeOutcome),
//! [`SinkFailure`](crate::sinks::SinkFailure)) so they can never end a job early.

use crate::types::ChatId;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for anime-relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for anime-relay
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "BOT_TOKEN")
        key: Option<String>,
    },

    /// Malformed download command
    #[error("invalid command: {0}")]
    Parse(#[from] ParseError),

    /// A job is already running for this chat
    #[error("a job is already running for chat {0}")]
    Busy(ChatId),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The chat API rejected a request
    #[error("chat transport error: {0}")]
    Transport(String),

    /// The chat API asked us to slow down
    #[error("rate limited by chat API, retry after {retry_after:?}")]
    RateLimited {
        /// Delay requested by the server
        retry_after: Duration,
    },

    /// External tool execution failed (fetch script, mega-cmd, etc.)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Offsite storage operation failed
    #[error("offsite storage error: {0}")]
    Offsite(String),

    /// Operation not supported (missing binary, sink disabled, etc.)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a key
    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

/// Reasons a `/dl` command is rejected before any work starts
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// No arguments after the verb
    #[error("usage: /dl -a \"Title\" -e 1-5 [-r 1080|all|best] [-o jpn|eng]")]
    Empty,

    /// `-a` absent or without a value
    #[error("missing anime title (-a \"Title\")")]
    MissingTitle,

    /// `-e` absent or without a value
    #[error("missing episodes (-e)")]
    MissingEpisodes,

    /// Episode specification parsed to nothing
    #[error("episode specification {0:?} contains no valid episodes")]
    EmptyEpisodes(String),

    /// `-r` value not understood
    #[error("invalid resolution {0:?} (expected a number, \"all\" or \"best\")")]
    InvalidResolution(String),

    /// `-o` value not understood
    #[error("invalid audio track {0:?} (expected \"jpn\" or \"eng\")")]
    InvalidAudio(String),

    /// A quote was opened but never closed
    #[error("unterminated quote in command")]
    UnterminatedQuote,

    /// `/toggle` with an unknown sink or state
    #[error("usage: /toggle channel|mega [on|off]")]
    InvalidToggle,
}
