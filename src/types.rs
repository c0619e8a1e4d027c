//! Core types for anime-relay

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Identifier of a chat (user, group or channel) on the chat transport
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl ChatId {
    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for ChatId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ChatId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

/// Identifier of a message previously sent through the transport
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

/// Vertical video resolution (1080, 720, 360, ...)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resolution(pub u16);

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}p", self.0)
    }
}

/// Which resolutions a job should try, as requested by the user
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionPreference {
    /// Only this resolution; no fallback
    Exact(Resolution),
    /// Walk the configured ladder high to low (`-r all` or no `-r`)
    #[default]
    Ladder,
    /// Alias of [`ResolutionPreference::Ladder`] (`-r best`)
    Best,
}

/// Audio track requested from the fetch tool
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioTrack {
    /// Original Japanese audio (subbed)
    #[default]
    Jpn,
    /// English dub
    Eng,
}

impl AudioTrack {
    /// Code passed to the fetch tool
    pub fn code(&self) -> &'static str {
        match self {
            AudioTrack::Jpn => "jpn",
            AudioTrack::Eng => "eng",
        }
    }

    /// Parse a user-supplied audio code (case-insensitive)
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_lowercase().as_str() {
            "jpn" => Some(AudioTrack::Jpn),
            "eng" => Some(AudioTrack::Eng),
            _ => None,
        }
    }
}

/// Per-job destination overrides; `None` falls back to the runtime sink toggles
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationFlags {
    /// Force the auxiliary channel sinks on or off
    pub channels: Option<bool>,
    /// Force the offsite storage sink on or off
    pub offsite: Option<bool>,
    /// Deliver as a streamable video instead of a document
    pub as_video: bool,
}

/// A parsed, immutable download job
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Anime title passed verbatim to the fetch tool
    pub title: String,
    /// Ascending, deduplicated episode numbers (never empty)
    pub episodes: Vec<u32>,
    /// Resolution preference
    pub resolution: ResolutionPreference,
    /// Audio track
    pub audio: AudioTrack,
    /// Destination overrides
    pub destinations: DestinationFlags,
}

/// Lifecycle status of a chat's job slot
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatTaskStatus {
    /// No job
    #[default]
    Idle,
    /// A job holds the chat's lease
    Running,
    /// Cancellation requested; the job stops at the next boundary
    Cancelling,
}

/// Snapshot of a chat's job slot as held by the registry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTaskState {
    /// Chat that owns the job
    pub chat_id: ChatId,
    /// Current status
    pub status: ChatTaskStatus,
    /// When the lease was granted
    pub started_at: DateTime<Utc>,
    /// PID of the fetch process currently running, if any
    pub active_pid: Option<u32>,
    /// Number of episodes in the job
    pub total_episodes: usize,
    /// Number of episodes that reached a terminal disposition
    pub completed_episodes: usize,
}

/// How one fetch attempt ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptExit {
    /// The process exited on its own (`None` = killed by a signal)
    Exited(Option<i32>),
    /// The attempt exceeded its timeout and was terminated
    TimedOut,
    /// The job was cancelled while the attempt was running
    Cancelled,
}

impl AttemptExit {
    /// True only for a clean zero exit
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptExit::Exited(Some(0)))
    }
}

/// Record of one (episode, resolution) attempt
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeAttempt {
    /// Episode number
    pub episode: u32,
    /// Resolution requested
    pub resolution: Resolution,
    /// Process outcome
    pub exit: AttemptExit,
    /// Whether an artifact was confirmed for this attempt
    pub success: bool,
}

/// Media file produced by a successful attempt
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Location inside the job workspace
    pub path: PathBuf,
    /// File size in bytes
    pub size_bytes: u64,
    /// Resolution of the attempt that produced it
    pub resolution: Resolution,
}

impl Artifact {
    /// File name component, for captions and remote uploads
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "episode.mp4".to_string())
    }
}

/// Metadata attached to every delivery of an artifact
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryMeta {
    /// Anime title
    pub title: String,
    /// Episode number
    pub episode: u32,
    /// Resolution that succeeded
    pub resolution: Resolution,
    /// Artifact size in bytes
    pub size_bytes: u64,
}

impl DeliveryMeta {
    /// Uniform caption used by every chat sink
    pub fn caption(&self) -> String {
        format!(
            "{} - Episode {} [{}] ({})",
            self.title,
            self.episode,
            self.resolution,
            crate::utils::format_size(self.size_bytes)
        )
    }

    /// Stored file name: path-safe title, episode and resolution
    pub fn file_name(&self, extension: &str) -> String {
        format!(
            "{}_E{:02}_{}.{extension}",
            crate::utils::safe_name(&self.title),
            self.episode,
            self.resolution
        )
    }
}

/// User-facing classification of a failed fetch
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// The upstream site has no such episode
    EpisodeNotFound,
    /// The attempt ran past its timeout
    TimedOut,
    /// Nothing recognised in the diagnostics
    Unknown,
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureCategory::EpisodeNotFound => "episode not found",
            FailureCategory::TimedOut => "timed out",
            FailureCategory::Unknown => "download failed",
        };
        f.write_str(s)
    }
}

/// Terminal disposition of one episode
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EpisodeOutcome {
    /// Artifact delivered (possibly with some sink failures)
    Delivered {
        /// Resolution that succeeded
        resolution: Resolution,
        /// Artifact size
        size_bytes: u64,
        /// Sinks that accepted the artifact
        delivered_to: Vec<String>,
        /// Sinks that failed, with a bounded error excerpt
        failed_sinks: Vec<(String, String)>,
    },
    /// Every rung of the ladder failed
    FetchFailed {
        /// Best-effort classification of the last attempt
        category: FailureCategory,
        /// Bounded tail of the last attempt's diagnostics
        excerpt: String,
    },
    /// Artifact exceeded the delivery ceiling and was discarded
    Oversize {
        /// Resolution of the oversize artifact
        resolution: Resolution,
        /// Actual size
        size_bytes: u64,
        /// Configured ceiling
        limit_bytes: u64,
    },
    /// Cancellation stopped this episode
    Cancelled,
}

/// Final report of a job
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    /// Episodes requested
    pub total: usize,
    /// Episodes accepted by at least one sink
    pub delivered: usize,
    /// Episodes whose ladder was exhausted or that no sink accepted
    pub failed: usize,
    /// Episodes rejected for size
    pub oversize: usize,
    /// Whether the job was cancelled
    pub cancelled: bool,
    /// Excerpt of an unexpected error that ended the loop early
    pub aborted: Option<String>,
}

/// Events emitted while jobs run (subscribe with `JobRunner::subscribe`)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Lease granted, job loop starting
    JobStarted {
        /// Chat id
        chat_id: ChatId,
        /// Title
        title: String,
        /// Episode count
        episodes: usize,
    },
    /// A fetch attempt is about to start
    AttemptStarted {
        /// Chat id
        chat_id: ChatId,
        /// Episode number
        episode: u32,
        /// Resolution
        resolution: Resolution,
    },
    /// A fetch attempt finished
    AttemptFinished {
        /// Chat id
        chat_id: ChatId,
        /// Attempt record
        attempt: EpisodeAttempt,
    },
    /// An episode reached its terminal disposition
    EpisodeFinished {
        /// Chat id
        chat_id: ChatId,
        /// Episode number
        episode: u32,
        /// Outcome
        outcome: EpisodeOutcome,
    },
    /// A sink failed to accept an artifact
    SinkFailed {
        /// Chat id
        chat_id: ChatId,
        /// Episode number
        episode: u32,
        /// Sink name
        sink: String,
        /// Error text
        error: String,
    },
    /// The job ended and its lease was released
    JobFinished {
        /// Chat id
        chat_id: ChatId,
        /// Summary
        summary: JobSummary,
    },
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_codes_round_trip_case_insensitively() {
        assert_eq!(AudioTrack::from_code("ENG"), Some(AudioTrack::Eng));
        assert_eq!(AudioTrack::from_code("jpn"), Some(AudioTrack::Jpn));
        assert_eq!(AudioTrack::from_code("fr"), None);
        assert_eq!(AudioTrack::default().code(), "jpn");
    }

    #[test]
    fn only_zero_exit_is_success() {
        assert!(AttemptExit::Exited(Some(0)).is_success());
        assert!(!AttemptExit::Exited(Some(1)).is_success());
        assert!(!AttemptExit::Exited(None).is_success());
        assert!(!AttemptExit::TimedOut.is_success());
        assert!(!AttemptExit::Cancelled.is_success());
    }

    #[test]
    fn caption_carries_uniform_metadata() {
        let meta = DeliveryMeta {
            title: "Naruto".to_string(),
            episode: 3,
            resolution: Resolution(720),
            size_bytes: 5 * 1024 * 1024,
        };
        assert_eq!(meta.caption(), "Naruto - Episode 3 [720p] (5.0 MiB)");
    }

    #[test]
    fn chat_id_parses_negative_channel_ids() {
        let id: ChatId = " -1001234 ".parse().unwrap();
        assert_eq!(id, ChatId(-1001234));
        assert_eq!(id.to_string(), "-1001234");
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let event = Event::JobStarted {
            chat_id: ChatId(1),
            title: "x".to_string(),
            episodes: 2,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "job_started");
        assert_eq!(json["episodes"], 2);
    }
}
