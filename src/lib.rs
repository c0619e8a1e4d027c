//! # anime-relay
//!
//! Chat-driven anime episode fetcher and distributor.
//!
//! A user sends `/dl -a "Title" -e 1-12` to the bot. The bot runs an external
//! fetch tool once per episode, walking a resolution ladder until an attempt
//! produces a media file, and hands the file to every enabled destination
//! (the requesting chat, auxiliary channels, offsite storage) before deleting
//! it.
//!
//! ## Guarantees
//!
//! - **One job per chat** - a second `/dl` in a busy chat is rejected, other
//!   chats run concurrently
//! - **Nothing left behind** - each job works in its own directory, removed on
//!   every exit path including cancellation and unexpected errors
//! - **Failures stay local** - a failed episode or sink is reported and the
//!   job moves on
//! - **Bounded reporting** - users see short diagnostic excerpts, never full
//!   tool logs
//!
//! ## Quick Start
//!
//! ```no_run
//! use anime_relay::{Bot, Config};
//! use anime_relay::fetch::CliFetchTool;
//! use anime_relay::offsite::NoOpStorage;
//! use anime_relay::transport::TelegramTransport;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     config.validate()?;
//!
//!     let transport = Arc::new(TelegramTransport::new(&config.telegram, config.retry.clone())?);
//!     let fetch = Arc::new(CliFetchTool::from_config(&config.fetch));
//!     let bot = Bot::new(&config, transport, fetch, Arc::new(NoOpStorage));
//!
//!     // Subscribe to events
//!     let mut events = bot.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     bot.run().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Per-job artifact discovery and size policy
pub mod artifact;
/// Chat front end and job supervision
pub mod bot;
/// Job workspaces and cleanup
pub mod cleanup;
/// Chat command parsing
pub mod command;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Fetch tool boundary and process supervision
pub mod fetch;
/// Liveness endpoint
pub mod health;
/// Job execution
pub mod job;
/// Offsite storage boundary
pub mod offsite;
/// Per-chat job registry
pub mod registry;
/// Retry logic with exponential backoff
pub mod retry;
/// Distribution sinks
pub mod sinks;
/// Host CPU and memory sampling
pub mod system;
/// Chat transport boundary
pub mod transport;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use bot::Bot;
pub use config::Config;
pub use error::{Error, ParseError, Result};
pub use job::JobRunner;
pub use registry::{JobLease, TaskRegistry};
pub use types::{
    ChatId, EpisodeOutcome, Event, JobRequest, JobSummary, Resolution, ResolutionPreference,
};

/// Wait for a termination signal.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

/// Wait for a termination signal (Ctrl+C).
#[cfg(not(unix))]
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
