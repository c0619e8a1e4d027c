//! Job execution: one `/dl` command from lease to summary.
//!
//! The job loop is split by concern:
//! - this module - job lifecycle, status message, summary
//! - [`episode`] - the resolution ladder walk and artifact disposition for one episode
//!
//! Every terminal path (success, partial failure, cancellation, unexpected
//! error) removes the job workspace before the chat's lease is released, and
//! the release is always the last step.

mod episode;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

use crate::cleanup::JobWorkspace;
use crate::config::FetchConfig;
use crate::error::Result;
use crate::fetch::{FetchTool, resolution_ladder};
use crate::registry::JobLease;
use crate::sinks::Sink;
use crate::transport::ChatTransport;
use crate::types::{ChatId, EpisodeOutcome, Event, JobRequest, JobSummary, MessageId, Resolution};
use crate::utils::{format_size, tail_excerpt};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Runs jobs. Shared by every chat; each job brings its own lease and sinks.
pub struct JobRunner {
    config: FetchConfig,
    fetch: Arc<dyn FetchTool>,
    transport: Arc<dyn ChatTransport>,
    event_tx: broadcast::Sender<Event>,
}

/// Borrowed state of one running job
struct JobContext<'a> {
    request: &'a JobRequest,
    lease: &'a JobLease,
    sinks: &'a [Arc<dyn Sink>],
    workspace: &'a JobWorkspace,
    ladder: &'a [Resolution],
}

impl JobContext<'_> {
    fn chat_id(&self) -> ChatId {
        self.lease.chat_id()
    }
}

impl JobRunner {
    /// Create a runner
    pub fn new(
        config: FetchConfig,
        fetch: Arc<dyn FetchTool>,
        transport: Arc<dyn ChatTransport>,
    ) -> Self {
        let (event_tx, _rx) = broadcast::channel(256);
        Self {
            config,
            fetch,
            transport,
            event_tx,
        }
    }

    /// Subscribe to job events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Message the chat; failures are logged and never end the job
    async fn notify(&self, chat_id: ChatId, text: &str) -> Option<MessageId> {
        match self.transport.send_message(chat_id, text).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(%chat_id, error = %e, "failed to send chat message");
                None
            }
        }
    }

    async fn update_status(&self, chat_id: ChatId, status: Option<MessageId>, text: &str) {
        let Some(message_id) = status else {
            return;
        };
        if let Err(e) = self.transport.edit_message(chat_id, message_id, text).await {
            warn!(%chat_id, error = %e, "failed to update status message");
        }
    }

    /// Run a job to completion and release its lease.
    ///
    /// Never fails: episode and sink failures are part of the summary, and an
    /// unexpected error ends the loop early with [`JobSummary::aborted`] set.
    pub async fn run(
        &self,
        request: JobRequest,
        lease: JobLease,
        sinks: Vec<Arc<dyn Sink>>,
    ) -> JobSummary {
        let chat_id = lease.chat_id();
        let total = request.episodes.len();
        lease.set_total(total);
        info!(%chat_id, title = %request.title, episodes = total, "job started");
        self.emit(Event::JobStarted {
            chat_id,
            title: request.title.clone(),
            episodes: total,
        });

        let status = self
            .notify(
                chat_id,
                &format!("Queueing {}: {} episode(s)", request.title, total),
            )
            .await;

        let mut summary = JobSummary {
            total,
            ..Default::default()
        };

        let result = match JobWorkspace::create(&self.config.workspace_root, chat_id).await {
            Ok(workspace) => {
                let ladder = resolution_ladder(&request.resolution, &self.config.default_ladder);
                let ctx = JobContext {
                    request: &request,
                    lease: &lease,
                    sinks: &sinks,
                    workspace: &workspace,
                    ladder: &ladder,
                };
                let result = self.run_episodes(&ctx, status, &mut summary).await;
                workspace.remove().await;
                result
            }
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            error!(%chat_id, error = %e, "job aborted by unexpected error");
            summary.aborted = Some(tail_excerpt(&e.to_string(), self.config.excerpt_chars));
        }
        summary.cancelled |= lease.is_cancelled();

        let text = summary_text(&request.title, &summary);
        match status {
            Some(_) => self.update_status(chat_id, status, &text).await,
            None => {
                self.notify(chat_id, &text).await;
            }
        }

        info!(
            %chat_id,
            delivered = summary.delivered,
            failed = summary.failed,
            oversize = summary.oversize,
            cancelled = summary.cancelled,
            "job finished"
        );
        self.emit(Event::JobFinished {
            chat_id,
            summary: summary.clone(),
        });

        lease.release();
        summary
    }

    async fn run_episodes(
        &self,
        ctx: &JobContext<'_>,
        status: Option<MessageId>,
        summary: &mut JobSummary,
    ) -> Result<()> {
        let chat_id = ctx.chat_id();
        let total = ctx.request.episodes.len();

        for (index, &episode) in ctx.request.episodes.iter().enumerate() {
            if ctx.lease.is_cancelled() {
                break;
            }
            if index > 0 && !self.pause(ctx.lease).await {
                break;
            }

            self.update_status(
                chat_id,
                status,
                &format!(
                    "Downloading {}: episode {} ({}/{})",
                    ctx.request.title,
                    episode,
                    index + 1,
                    total
                ),
            )
            .await;

            let outcome = self.process_episode(ctx, episode).await?;
            self.report_outcome(chat_id, episode, &outcome).await;

            match &outcome {
                EpisodeOutcome::Delivered { delivered_to, .. } if !delivered_to.is_empty() => {
                    summary.delivered += 1
                }
                EpisodeOutcome::Delivered { .. } | EpisodeOutcome::FetchFailed { .. } => {
                    summary.failed += 1
                }
                EpisodeOutcome::Oversize { .. } => summary.oversize += 1,
                EpisodeOutcome::Cancelled => summary.cancelled = true,
            }
            let stop = matches!(outcome, EpisodeOutcome::Cancelled);
            if !stop {
                ctx.lease.episode_completed();
            }
            self.emit(Event::EpisodeFinished {
                chat_id,
                episode,
                outcome,
            });
            if stop {
                break;
            }
        }
        Ok(())
    }

    /// Wait between episodes. Returns false if the job was cancelled meanwhile.
    async fn pause(&self, lease: &JobLease) -> bool {
        if self.config.episode_pause.is_zero() {
            return !lease.is_cancelled();
        }
        tokio::select! {
            _ = tokio::time::sleep(self.config.episode_pause) => true,
            _ = lease.cancel_token().cancelled() => false,
        }
    }

    /// Tell the requester about anything other than a clean delivery
    async fn report_outcome(&self, chat_id: ChatId, episode: u32, outcome: &EpisodeOutcome) {
        let text = match outcome {
            EpisodeOutcome::Delivered { failed_sinks, .. } if !failed_sinks.is_empty() => {
                let lines: Vec<String> = failed_sinks
                    .iter()
                    .map(|(sink, error)| format!("{sink}: {error}"))
                    .collect();
                format!("Episode {episode}: delivery failed for\n{}", lines.join("\n"))
            }
            EpisodeOutcome::Delivered { .. } | EpisodeOutcome::Cancelled => return,
            EpisodeOutcome::FetchFailed { category, excerpt } if excerpt.is_empty() => {
                format!("Episode {episode}: {category}")
            }
            EpisodeOutcome::FetchFailed { category, excerpt } => {
                format!("Episode {episode}: {category}\n{excerpt}")
            }
            EpisodeOutcome::Oversize {
                resolution,
                size_bytes,
                limit_bytes,
            } => format!(
                "Episode {episode}: {resolution} file is {} (limit {}), skipped",
                format_size(*size_bytes),
                format_size(*limit_bytes)
            ),
        };
        self.notify(chat_id, &text).await;
    }
}

/// Final status text of a job
pub fn summary_text(title: &str, summary: &JobSummary) -> String {
    let headline = if summary.aborted.is_some() {
        "Batch aborted"
    } else if summary.cancelled {
        "Batch cancelled"
    } else {
        "Batch complete"
    };

    let mut text = format!(
        "{headline}: {title}\ndelivered {}/{}",
        summary.delivered, summary.total
    );
    if summary.failed > 0 {
        text.push_str(&format!(", failed {}", summary.failed));
    }
    if summary.oversize > 0 {
        text.push_str(&format!(", too large {}", summary.oversize));
    }
    if let Some(reason) = &summary.aborted {
        text.push_str(&format!("\nunexpected error: {reason}"));
    }
    text
}
