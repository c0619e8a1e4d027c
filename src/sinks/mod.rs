//! Distribution sinks and fan-out
//!
//! A [`Sink`] is one destination for a delivered artifact: the requesting
//! chat, an auxiliary channel, or offsite storage. [`fan_out`] hands the same
//! artifact to every sink of a job; a failing sink is recorded as a
//! [`SinkFailure`] and never stops the others.
//!
//! Which optional sinks take part is decided per job from the runtime
//! [`SinkSettings`] and the job's own destination flags.

mod chat;
mod fanout;
mod offsite;

pub use chat::ChatSink;
pub use fanout::{FanOutReport, SinkFailure, fan_out};
pub use offsite::OffsiteSink;

use crate::config::SinkConfig;
use crate::offsite::OffsiteStorage;
use crate::transport::ChatTransport;
use crate::types::{Artifact, ChatId, DeliveryMeta, DestinationFlags};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// One destination for delivered artifacts
#[async_trait]
pub trait Sink: Send + Sync {
    /// Stable name used in reports ("requester", "channel:-100123", "offsite")
    fn name(&self) -> &str;

    /// Deliver the artifact. The file must still exist when this returns.
    async fn deliver(&self, artifact: &Artifact, meta: &DeliveryMeta) -> crate::Result<()>;
}

/// Optional sink groups that can be switched at runtime
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Auxiliary chat channels
    Channel,
    /// Offsite bulk storage
    Offsite,
}

impl SinkKind {
    /// Parse the name used in `/toggle`
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "channel" | "channels" => Some(SinkKind::Channel),
            "mega" | "offsite" => Some(SinkKind::Offsite),
            _ => None,
        }
    }

    /// User-facing name
    pub fn name(&self) -> &'static str {
        match self {
            SinkKind::Channel => "channel",
            SinkKind::Offsite => "mega",
        }
    }
}

impl std::fmt::Display for SinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Snapshot of which optional sinks are on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkToggles {
    /// Auxiliary channels receive artifacts
    pub channels: bool,
    /// Offsite storage receives artifacts
    pub offsite: bool,
}

impl SinkToggles {
    /// Apply a job's destination overrides
    pub fn resolve(&self, flags: &DestinationFlags) -> SinkToggles {
        SinkToggles {
            channels: flags.channels.unwrap_or(self.channels),
            offsite: flags.offsite.unwrap_or(self.offsite),
        }
    }

    /// State of one sink group
    pub fn get(&self, kind: SinkKind) -> bool {
        match kind {
            SinkKind::Channel => self.channels,
            SinkKind::Offsite => self.offsite,
        }
    }
}

/// Runtime sink toggles shared by the bot and new jobs (in memory only)
#[derive(Clone, Debug)]
pub struct SinkSettings {
    toggles: Arc<RwLock<SinkToggles>>,
}

impl SinkSettings {
    /// Start from the configured defaults
    pub fn new(config: &SinkConfig) -> Self {
        Self {
            toggles: Arc::new(RwLock::new(SinkToggles {
                channels: config.channels_enabled,
                offsite: config.offsite_enabled,
            })),
        }
    }

    /// Current toggles
    pub async fn current(&self) -> SinkToggles {
        *self.toggles.read().await
    }

    /// Set a sink group on or off, or flip it when `enabled` is `None`.
    /// Returns the new state.
    pub async fn set(&self, kind: SinkKind, enabled: Option<bool>) -> bool {
        let mut toggles = self.toggles.write().await;
        let slot = match kind {
            SinkKind::Channel => &mut toggles.channels,
            SinkKind::Offsite => &mut toggles.offsite,
        };
        *slot = enabled.unwrap_or(!*slot);
        tracing::info!(sink = %kind, enabled = *slot, "sink toggled");
        *slot
    }
}

/// Everything needed to build the sinks of one job
pub struct SinkFactory {
    config: SinkConfig,
    transport: Arc<dyn ChatTransport>,
    offsite: Arc<dyn OffsiteStorage>,
    offsite_root: String,
}

impl SinkFactory {
    /// Create a factory
    pub fn new(
        config: SinkConfig,
        transport: Arc<dyn ChatTransport>,
        offsite: Arc<dyn OffsiteStorage>,
        offsite_root: String,
    ) -> Self {
        Self {
            config,
            transport,
            offsite,
            offsite_root,
        }
    }

    /// Sinks for a job started from `requester`.
    ///
    /// The requester always comes first. Channels equal to the requester are
    /// skipped so nobody receives the same file twice.
    pub fn build(
        &self,
        requester: ChatId,
        title: &str,
        flags: &DestinationFlags,
        toggles: SinkToggles,
    ) -> Vec<Arc<dyn Sink>> {
        let active = toggles.resolve(flags);
        let as_video = flags.as_video || self.config.as_video;

        let mut sinks: Vec<Arc<dyn Sink>> = vec![Arc::new(ChatSink::requester(
            requester,
            self.transport.clone(),
            as_video,
        ))];

        if active.channels {
            for channel in self.config.channel_ids.iter().filter(|c| **c != requester) {
                sinks.push(Arc::new(ChatSink::channel(
                    *channel,
                    self.transport.clone(),
                    as_video,
                )));
            }
        }

        if active.offsite {
            sinks.push(Arc::new(OffsiteSink::new(
                self.offsite.clone(),
                crate::offsite::title_folder(&self.offsite_root, title),
            )));
        }

        sinks
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::test_helpers::RecordingTransport;
    use crate::offsite::NoOpStorage;

    #[test]
    fn sink_kind_names() {
        assert_eq!(SinkKind::from_name("MEGA"), Some(SinkKind::Offsite));
        assert_eq!(SinkKind::from_name("channel"), Some(SinkKind::Channel));
        assert_eq!(SinkKind::from_name("ftp"), None);
        assert_eq!(SinkKind::Offsite.to_string(), "mega");
    }

    #[test]
    fn job_flags_override_toggles() {
        let toggles = SinkToggles {
            channels: true,
            offsite: false,
        };
        let flags = DestinationFlags {
            channels: Some(false),
            offsite: Some(true),
            as_video: false,
        };
        assert_eq!(
            toggles.resolve(&flags),
            SinkToggles {
                channels: false,
                offsite: true
            }
        );
        assert_eq!(toggles.resolve(&DestinationFlags::default()), toggles);
    }

    #[tokio::test]
    async fn settings_flip_and_set() {
        let settings = SinkSettings::new(&SinkConfig::default());
        assert!(settings.current().await.channels);

        assert!(!settings.set(SinkKind::Channel, None).await);
        assert!(settings.set(SinkKind::Offsite, Some(true)).await);
        assert!(settings.set(SinkKind::Offsite, Some(true)).await);

        let now = settings.current().await;
        assert!(!now.channels);
        assert!(now.offsite);
    }

    #[test]
    fn factory_builds_requester_first_and_skips_duplicates() {
        let config = SinkConfig {
            channel_ids: vec![ChatId(-100), ChatId(7)],
            ..Default::default()
        };
        let factory = SinkFactory::new(
            config,
            Arc::new(RecordingTransport::default()),
            Arc::new(NoOpStorage),
            "/Root".to_string(),
        );

        let sinks = factory.build(
            ChatId(7),
            "Naruto",
            &DestinationFlags::default(),
            SinkToggles {
                channels: true,
                offsite: true,
            },
        );
        let names: Vec<_> = sinks.iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["requester", "channel:-100", "offsite"]);

        let sinks = factory.build(
            ChatId(7),
            "Naruto",
            &DestinationFlags::default(),
            SinkToggles {
                channels: false,
                offsite: false,
            },
        );
        assert_eq!(sinks.len(), 1);
    }
}
