//! Fetch tool boundary
//!
//! A [`FetchTool`] retrieves one episode at one resolution into a directory.
//! The job runner owns the resolution ladder; the tool only runs single
//! attempts.
//!
//! - [`CliFetchTool`]: supervises the external fetch script
//! - [`diagnostics`]: bounded output capture and failure classification

mod cli;
pub mod diagnostics;

pub use cli::CliFetchTool;
pub use diagnostics::{TailBuffer, classify};

use crate::types::{AudioTrack, AttemptExit, Resolution, ResolutionPreference};
use async_trait::async_trait;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Callback told about the PID of each spawned process (`None` when it exits)
pub type SpawnObserver<'a> = &'a (dyn Fn(Option<u32>) + Send + Sync);

/// Parameters of one fetch attempt
#[derive(Clone, Copy)]
pub struct FetchRequest<'a> {
    /// Anime title, passed as a single argument
    pub title: &'a str,
    /// Episode number
    pub episode: u32,
    /// Resolution to request
    pub resolution: Resolution,
    /// Audio track
    pub audio: AudioTrack,
    /// Directory the tool writes into (also its working directory)
    pub output_dir: &'a Path,
}

impl std::fmt::Debug for FetchRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchRequest")
            .field("title", &self.title)
            .field("episode", &self.episode)
            .field("resolution", &self.resolution)
            .field("audio", &self.audio)
            .field("output_dir", &self.output_dir)
            .finish()
    }
}

/// What one attempt produced, before the artifact is located
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutput {
    /// How the process ended
    pub exit: AttemptExit,
    /// Last bounded slice of combined stdout/stderr
    pub diagnostics: String,
}

/// Runs single fetch attempts
#[async_trait]
pub trait FetchTool: Send + Sync {
    /// Run one attempt.
    ///
    /// Must return promptly with [`AttemptExit::Cancelled`] once `cancel` fires,
    /// after asking the underlying process to stop. `Err` is reserved for
    /// failures to run the tool at all (missing binary, spawn errors).
    async fn fetch(
        &self,
        request: FetchRequest<'_>,
        cancel: &CancellationToken,
        on_spawn: SpawnObserver<'_>,
    ) -> crate::Result<FetchOutput>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Resolutions to try for one episode, in order.
///
/// An explicit resolution is tried alone. Otherwise the configured ladder is
/// walked from the highest resolution down, each rung once.
pub fn resolution_ladder(
    preference: &ResolutionPreference,
    default_ladder: &[Resolution],
) -> Vec<Resolution> {
    match preference {
        ResolutionPreference::Exact(resolution) => vec![*resolution],
        ResolutionPreference::Ladder | ResolutionPreference::Best => {
            let mut ladder = default_ladder.to_vec();
            ladder.sort_unstable_by(|a, b| b.cmp(a));
            ladder.dedup();
            ladder
        }
    }
}
