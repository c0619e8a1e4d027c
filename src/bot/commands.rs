//! Command handlers

use super::Bot;
use crate::command::{Command, HELP_TEXT};
use crate::error::{Error, Result};
use crate::registry::JobLease;
use crate::sinks::{Sink, SinkKind};
use crate::types::{ChatId, JobRequest};
use crate::utils::tail_excerpt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}

impl Bot {
    pub(super) async fn dispatch(&self, chat_id: ChatId, command: Command) {
        match command {
            Command::Download(request) => self.start_download(chat_id, request).await,
            Command::Cancel => self.cancel(chat_id).await,
            Command::Status => self.status(chat_id).await,
            Command::Toggle { sink, enabled } => self.toggle(chat_id, sink, enabled).await,
            Command::Help => self.reply(chat_id, HELP_TEXT).await,
        }
    }

    async fn start_download(&self, chat_id: ChatId, request: JobRequest) {
        match self.submit(chat_id, request).await {
            Ok(_) => {}
            Err(Error::Busy(_)) => {
                self.reply(
                    chat_id,
                    "A job is already running in this chat. Use /cancel to stop it.",
                )
                .await
            }
            Err(Error::ShuttingDown) => {
                self.reply(chat_id, "Shutting down, not accepting new jobs.")
                    .await
            }
            Err(e) => {
                let text = tail_excerpt(&e.to_string(), self.excerpt_chars);
                self.reply(chat_id, &text).await
            }
        }
    }

    /// Start a job for `chat_id` with the sinks enabled right now.
    ///
    /// # Errors
    ///
    /// [`Error::Busy`] if the chat already runs a job, [`Error::ShuttingDown`]
    /// once shutdown has begun.
    pub async fn submit(&self, chat_id: ChatId, request: JobRequest) -> Result<JoinHandle<()>> {
        if self.shutdown.is_cancelled() {
            return Err(Error::ShuttingDown);
        }
        let lease = self
            .registry
            .try_acquire(chat_id)
            .ok_or(Error::Busy(chat_id))?;

        let toggles = self.settings.current().await;
        let sinks = self
            .factory
            .build(chat_id, &request.title, &request.destinations, toggles);
        info!(
            %chat_id,
            title = %request.title,
            episodes = request.episodes.len(),
            sinks = sinks.len(),
            "accepted download"
        );
        Ok(self.spawn_job(request, lease, sinks))
    }

    /// Run the job in its own task and report a panic as an unexpected error.
    ///
    /// The lease and workspace are released by their destructors while the
    /// panicking task unwinds.
    fn spawn_job(
        &self,
        request: JobRequest,
        lease: JobLease,
        sinks: Vec<Arc<dyn Sink>>,
    ) -> JoinHandle<()> {
        let chat_id = lease.chat_id();
        let title = request.title.clone();
        let runner = self.runner.clone();
        let transport = self.transport.clone();
        let excerpt_chars = self.excerpt_chars;

        let job = tokio::spawn(async move { runner.run(request, lease, sinks).await });

        tokio::spawn(async move {
            if let Err(e) = job.await {
                error!(%chat_id, error = %e, "job task failed");
                let text = format!(
                    "Batch aborted: {title}\nunexpected error: {}",
                    tail_excerpt(&e.to_string(), excerpt_chars)
                );
                if let Err(e) = transport.send_message(chat_id, &text).await {
                    warn!(%chat_id, error = %e, "failed to report aborted job");
                }
            }
        })
    }

    async fn cancel(&self, chat_id: ChatId) {
        let text = if self.registry.request_cancel(chat_id) {
            "Stopping... no further episodes will start."
        } else {
            "Nothing to stop."
        };
        self.reply(chat_id, text).await;
    }

    async fn status(&self, chat_id: ChatId) {
        let toggles = self.settings.current().await;

        let storage = if self.offsite.is_ready() {
            match self.offsite.quota().await {
                Ok(quota) if quota.is_empty() => "logged in".to_string(),
                Ok(quota) => quota,
                Err(e) => format!(
                    "unavailable ({})",
                    tail_excerpt(&e.to_string(), self.excerpt_chars)
                ),
            }
        } else {
            "not logged in".to_string()
        };

        let this_chat = match self.registry.snapshot(chat_id) {
            Some(state) => format!(
                "{:?}, {}/{} episodes done",
                state.status, state.completed_episodes, state.total_episodes
            )
            .to_lowercase(),
            None => "idle".to_string(),
        };

        let usage = self.system.sample().await;

        let text = format!(
            "Sinks\nchannel: {} ({} configured)\nmega: {}\n\nActive jobs: {}\nThis chat: {}\n\nStorage\n{}\n\nSystem\n{}",
            on_off(toggles.channels),
            self.channel_count,
            on_off(toggles.offsite),
            self.registry.active_count(),
            this_chat,
            storage,
            usage
        );
        self.reply(chat_id, &text).await;
    }

    async fn toggle(&self, chat_id: ChatId, sink: SinkKind, enabled: Option<bool>) {
        let enabled = self.settings.set(sink, enabled).await;
        let mut text = format!("{sink} sink is now {}", on_off(enabled));
        if enabled && sink == SinkKind::Offsite && !self.offsite.is_ready() {
            text.push_str(" (offsite storage is not logged in, uploads will fail)");
        }
        self.reply(chat_id, &text).await;
    }
}
