//! Delivering one artifact to every sink of a job

use super::Sink;
use crate::types::{Artifact, DeliveryMeta};
use crate::utils::tail_excerpt;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// A sink that did not accept the artifact
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkFailure {
    /// Sink name
    pub sink: String,
    /// Bounded error excerpt
    pub error: String,
}

/// Result of delivering one artifact to all sinks
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanOutReport {
    /// Sinks that accepted the artifact, in sink order
    pub delivered: Vec<String>,
    /// Sinks that failed, in sink order
    pub failed: Vec<SinkFailure>,
}

/// Deliver `artifact` to every sink concurrently.
///
/// Never fails: each sink's error is captured in the report. Returns only
/// after every sink has finished with the file, so the caller may delete it
/// afterwards.
pub async fn fan_out(
    sinks: &[Arc<dyn Sink>],
    artifact: &Artifact,
    meta: &DeliveryMeta,
    excerpt_chars: usize,
) -> FanOutReport {
    let results = join_all(sinks.iter().map(|sink| async move {
        let result = sink.deliver(artifact, meta).await;
        (sink.name().to_string(), result)
    }))
    .await;

    let mut report = FanOutReport::default();
    for (sink, result) in results {
        match result {
            Ok(()) => {
                debug!(sink = %sink, episode = meta.episode, "delivered");
                report.delivered.push(sink);
            }
            Err(e) => {
                warn!(sink = %sink, episode = meta.episode, error = %e, "delivery failed");
                report.failed.push(SinkFailure {
                    sink,
                    error: tail_excerpt(&e.to_string(), excerpt_chars),
                });
            }
        }
    }
    report
}
