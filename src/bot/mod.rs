//! Chat front end: update loop, command dispatch and job supervision.
//!
//! The bot owns every long-lived component and wires them together:
//! - [`TaskRegistry`] - one job per chat
//! - [`JobRunner`] - the episode loop
//! - [`SinkSettings`] / [`SinkFactory`] - who receives artifacts
//! - [`OffsiteStorage`] / [`SystemMonitor`] - quota and host usage for `/status`
//!
//! Command handlers live in [`commands`]. Each accepted `/dl` runs in its own
//! task, so a long job never blocks the update loop or other chats.

mod commands;


use crate::config::{Config, TelegramConfig};
use crate::fetch::FetchTool;
use crate::job::JobRunner;
use crate::offsite::OffsiteStorage;
use crate::registry::TaskRegistry;
use crate::sinks::{SinkFactory, SinkSettings};
use crate::system::SystemMonitor;
use crate::transport::{ChatTransport, Update};
use crate::types::{ChatId, Event};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Wait after a failed `getUpdates` before polling again
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// How often shutdown checks whether every job has released its chat
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The chat bot
pub struct Bot {
    transport: Arc<dyn ChatTransport>,
    registry: TaskRegistry,
    runner: Arc<JobRunner>,
    settings: SinkSettings,
    factory: SinkFactory,
    offsite: Arc<dyn OffsiteStorage>,
    system: SystemMonitor,
    telegram: TelegramConfig,
    channel_count: usize,
    excerpt_chars: usize,
    shutdown: CancellationToken,
}

impl Bot {
    /// Wire up a bot from its configuration and boundary implementations
    pub fn new(
        config: &Config,
        transport: Arc<dyn ChatTransport>,
        fetch: Arc<dyn FetchTool>,
        offsite: Arc<dyn OffsiteStorage>,
    ) -> Self {
        let runner = JobRunner::new(config.fetch.clone(), fetch, transport.clone());
        let factory = SinkFactory::new(
            config.sinks.clone(),
            transport.clone(),
            offsite.clone(),
            config.offsite.root.clone(),
        );
        Self {
            transport,
            registry: TaskRegistry::new(),
            runner: Arc::new(runner),
            settings: SinkSettings::new(&config.sinks),
            factory,
            offsite,
            system: SystemMonitor::new(),
            telegram: config.telegram.clone(),
            channel_count: config.sinks.channel_ids.len(),
            excerpt_chars: config.fetch.excerpt_chars,
            shutdown: CancellationToken::new(),
        }
    }

    /// Registry of running jobs (shared with the liveness endpoint)
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Token that stops the update loop when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Subscribe to job events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.runner.subscribe()
    }

    /// Poll for updates and dispatch them until the shutdown token fires.
    ///
    /// Transport errors are logged and retried after a pause; they never end
    /// the loop.
    pub async fn run(&self) {
        info!("bot update loop started");
        let mut offset: Option<i64> = None;

        loop {
            let polled = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                polled = self.transport.get_updates(offset, self.telegram.poll_timeout) => polled,
            };

            match polled {
                Ok(batch) => {
                    if batch.next_offset.is_some() {
                        offset = batch.next_offset;
                    }
                    for update in batch.updates {
                        self.handle_update(update).await;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to poll for updates");
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(POLL_ERROR_BACKOFF) => {}
                    }
                }
            }
        }
        info!("bot update loop stopped");
    }

    /// Dispatch one incoming message
    pub async fn handle_update(&self, update: Update) {
        if !self.telegram.is_chat_allowed(update.chat_id) {
            debug!(chat_id = %update.chat_id, "ignoring message from chat outside the allow-list");
            return;
        }
        let Some(parsed) = crate::command::parse_command(&update.text) else {
            return;
        };

        match parsed {
            Ok(command) => self.dispatch(update.chat_id, command).await,
            Err(e) => {
                debug!(chat_id = %update.chat_id, error = %e, "rejected command");
                self.reply(update.chat_id, &e.to_string()).await;
            }
        }
    }

    /// Send a reply; failures are logged only
    async fn reply(&self, chat_id: ChatId, text: &str) {
        if let Err(e) = self.transport.send_message(chat_id, text).await {
            warn!(%chat_id, error = %e, "failed to send reply");
        }
    }

    /// Stop accepting work, cancel every job and wait up to `grace` for them
    /// to clean up.
    ///
    /// Returns true if every chat was released in time.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        info!("initiating graceful shutdown");
        self.shutdown.cancel();

        let cancelled = self.registry.cancel_all();
        if cancelled > 0 {
            info!(jobs = cancelled, "cancelled running jobs");
        }

        match tokio::time::timeout(grace, self.wait_idle()).await {
            Ok(()) => {
                info!("all jobs finished cleanup");
                true
            }
            Err(_) => {
                warn!(
                    remaining = self.registry.active_count(),
                    "timed out waiting for jobs to finish, proceeding with shutdown"
                );
                false
            }
        }
    }

    async fn wait_idle(&self) {
        while self.registry.active_count() > 0 {
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
        }
    }
}
