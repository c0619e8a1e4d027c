//! One episode: walk the resolution ladder, then dispose of the artifact

use super::{JobContext, JobRunner};
use crate::artifact::{self, Validation};
use crate::error::Result;
use crate::fetch::{FetchRequest, classify};
use crate::sinks::fan_out;
use crate::types::{
    Artifact, AttemptExit, DeliveryMeta, EpisodeAttempt, EpisodeOutcome, Event, FailureCategory,
};
use crate::utils::tail_excerpt;
use tracing::{debug, info, warn};

impl JobRunner {
    /// Try each rung of the ladder until one yields an artifact.
    ///
    /// Cancellation is checked before every attempt. The episode directory is
    /// gone when this returns, whatever the outcome; an `Err` is only
    /// returned when the fetch tool cannot be run at all.
    pub(super) async fn process_episode(
        &self,
        ctx: &JobContext<'_>,
        episode: u32,
    ) -> Result<EpisodeOutcome> {
        let result = self.walk_ladder(ctx, episode).await;
        ctx.workspace.finish_episode(episode).await;
        result
    }

    async fn walk_ladder(&self, ctx: &JobContext<'_>, episode: u32) -> Result<EpisodeOutcome> {
        let chat_id = ctx.chat_id();
        let dir = ctx.workspace.prepare_episode(episode).await?;
        let mut last_failure: Option<(AttemptExit, String)> = None;

        for (rung, &resolution) in ctx.ladder.iter().enumerate() {
            if ctx.lease.is_cancelled() {
                return Ok(EpisodeOutcome::Cancelled);
            }
            if rung > 0 {
                ctx.workspace.reset_episode(episode).await?;
            }

            debug!(%chat_id, episode, %resolution, "starting fetch attempt");
            self.emit(Event::AttemptStarted {
                chat_id,
                episode,
                resolution,
            });

            let lease = ctx.lease;
            let on_spawn = move |pid: Option<u32>| lease.attach_process(pid);
            let request = FetchRequest {
                title: &ctx.request.title,
                episode,
                resolution,
                audio: ctx.request.audio,
                output_dir: &dir,
            };
            let output = self
                .fetch
                .fetch(request, ctx.lease.cancel_token(), &on_spawn)
                .await;
            ctx.lease.detach_process();
            let output = output?;

            let artifact = if output.exit.is_success() {
                artifact::locate(&dir, &self.config.media_extension, resolution).await
            } else {
                None
            };

            self.emit(Event::AttemptFinished {
                chat_id,
                attempt: EpisodeAttempt {
                    episode,
                    resolution,
                    exit: output.exit,
                    success: artifact.is_some(),
                },
            });

            if output.exit == AttemptExit::Cancelled {
                info!(%chat_id, episode, %resolution, "attempt cancelled");
                return Ok(EpisodeOutcome::Cancelled);
            }

            if let Some(artifact) = artifact {
                info!(
                    %chat_id,
                    episode,
                    %resolution,
                    size_bytes = artifact.size_bytes,
                    "episode fetched"
                );
                return Ok(self.dispose(ctx, episode, artifact).await);
            }

            let mut diagnostics = output.diagnostics;
            if output.exit.is_success() {
                diagnostics.push_str(&format!(
                    "\nno .{} file was produced",
                    self.config.media_extension
                ));
            }
            warn!(
                %chat_id,
                episode,
                %resolution,
                exit = ?output.exit,
                "fetch attempt failed"
            );
            last_failure = Some((output.exit, diagnostics));
        }

        let (exit, diagnostics) =
            last_failure.unwrap_or((AttemptExit::Exited(None), String::new()));
        let category = match exit {
            AttemptExit::TimedOut => FailureCategory::TimedOut,
            _ => classify(&diagnostics),
        };
        warn!(%chat_id, episode, %category, "resolution ladder exhausted");
        Ok(EpisodeOutcome::FetchFailed {
            category,
            excerpt: tail_excerpt(&diagnostics, self.config.excerpt_chars),
        })
    }

    /// Validate, fan out, delete. The artifact never outlives this call.
    async fn dispose(&self, ctx: &JobContext<'_>, episode: u32, artifact: Artifact) -> EpisodeOutcome {
        let chat_id = ctx.chat_id();
        let limit_bytes = self.config.max_artifact_bytes;

        match artifact::validate(artifact, limit_bytes) {
            Validation::Oversize(artifact) => {
                ctx.workspace.remove_artifact(&artifact).await;
                EpisodeOutcome::Oversize {
                    resolution: artifact.resolution,
                    size_bytes: artifact.size_bytes,
                    limit_bytes,
                }
            }
            Validation::Accepted(artifact) => {
                let meta = DeliveryMeta {
                    title: ctx.request.title.clone(),
                    episode,
                    resolution: artifact.resolution,
                    size_bytes: artifact.size_bytes,
                };
                let report = fan_out(ctx.sinks, &artifact, &meta, self.config.excerpt_chars).await;
                ctx.workspace.remove_artifact(&artifact).await;

                for failure in &report.failed {
                    self.emit(Event::SinkFailed {
                        chat_id,
                        episode,
                        sink: failure.sink.clone(),
                        error: failure.error.clone(),
                    });
                }

                EpisodeOutcome::Delivered {
                    resolution: artifact.resolution,
                    size_bytes: artifact.size_bytes,
                    delivered_to: report.delivered,
                    failed_sinks: report
                        .failed
                        .into_iter()
                        .map(|f| (f.sink, f.error))
                        .collect(),
                }
            }
        }
    }
}
