//! Per-chat job exclusivity and cancellation.
//!
//! The registry is the only owner of [`ChatTaskState`]. A job gets a
//! [`JobLease`] from [`TaskRegistry::try_acquire`]; every other mutation goes
//! through the lease or through [`TaskRegistry::request_cancel`]. Dropping the
//! lease releases the chat, so a panicking job still returns its chat to idle.

use crate::types::{ChatId, ChatTaskState, ChatTaskStatus};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

struct Slot {
    state: ChatTaskState,
    cancel: CancellationToken,
    // Distinguishes this lease from a later one for the same chat
    generation: u64,
}

#[derive(Default)]
struct Inner {
    slots: HashMap<ChatId, Slot>,
    next_generation: u64,
}

/// Shared registry of running jobs, one slot per chat (cheap to clone)
#[derive(Clone, Default)]
pub struct TaskRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl TaskRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    // A poisoned lock only means another thread panicked mid-update; the map
    // itself is still consistent, so keep serving.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim the chat's slot. Returns `None` immediately if a job is already
    /// running there; there is no queueing.
    pub fn try_acquire(&self, chat_id: ChatId) -> Option<JobLease> {
        let mut inner = self.lock();
        if inner.slots.contains_key(&chat_id) {
            tracing::debug!(%chat_id, "rejecting job: chat already busy");
            return None;
        }

        inner.next_generation += 1;
        let generation = inner.next_generation;
        let cancel = CancellationToken::new();
        inner.slots.insert(
            chat_id,
            Slot {
                state: ChatTaskState {
                    chat_id,
                    status: ChatTaskStatus::Running,
                    started_at: Utc::now(),
                    active_pid: None,
                    total_episodes: 0,
                    completed_episodes: 0,
                },
                cancel: cancel.clone(),
                generation,
            },
        );
        tracing::debug!(%chat_id, generation, "job lease granted");

        Some(JobLease {
            registry: self.clone(),
            chat_id,
            generation,
            cancel,
            released: false,
        })
    }

    /// Return the chat to idle regardless of who holds the lease.
    ///
    /// Normally the lease does this itself; this is the operator override.
    pub fn release(&self, chat_id: ChatId) {
        if let Some(slot) = self.lock().slots.remove(&chat_id) {
            slot.cancel.cancel();
            tracing::debug!(%chat_id, "job slot released");
        }
    }

    fn release_generation(&self, chat_id: ChatId, generation: u64) {
        let mut inner = self.lock();
        if inner
            .slots
            .get(&chat_id)
            .is_some_and(|slot| slot.generation == generation)
        {
            inner.slots.remove(&chat_id);
            tracing::debug!(%chat_id, generation, "job lease released");
        }
    }

    /// Mark the chat's job as cancelling and fire its cancellation token.
    ///
    /// The token stops the loop at the next boundary and tells the running
    /// fetch process to terminate. Returns false if nothing was running.
    pub fn request_cancel(&self, chat_id: ChatId) -> bool {
        let mut inner = self.lock();
        match inner.slots.get_mut(&chat_id) {
            Some(slot) => {
                slot.state.status = ChatTaskStatus::Cancelling;
                slot.cancel.cancel();
                tracing::info!(%chat_id, pid = ?slot.state.active_pid, "cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Cancel every running job (shutdown)
    pub fn cancel_all(&self) -> usize {
        let mut inner = self.lock();
        for slot in inner.slots.values_mut() {
            slot.state.status = ChatTaskStatus::Cancelling;
            slot.cancel.cancel();
        }
        inner.slots.len()
    }

    /// Whether the chat currently holds a lease
    pub fn is_active(&self, chat_id: ChatId) -> bool {
        self.lock().slots.contains_key(&chat_id)
    }

    /// Status of the chat's slot (`Idle` when no lease exists)
    pub fn status(&self, chat_id: ChatId) -> ChatTaskStatus {
        self.lock()
            .slots
            .get(&chat_id)
            .map(|slot| slot.state.status)
            .unwrap_or(ChatTaskStatus::Idle)
    }

    /// Copy of the chat's state, if a job is running
    pub fn snapshot(&self, chat_id: ChatId) -> Option<ChatTaskState> {
        self.lock().slots.get(&chat_id).map(|slot| slot.state.clone())
    }

    /// Number of chats with a running job
    pub fn active_count(&self) -> usize {
        self.lock().slots.len()
    }

    fn update<F>(&self, chat_id: ChatId, generation: u64, f: F)
    where
        F: FnOnce(&mut ChatTaskState),
    {
        let mut inner = self.lock();
        if let Some(slot) = inner
            .slots
            .get_mut(&chat_id)
            .filter(|slot| slot.generation == generation)
        {
            f(&mut slot.state);
        }
    }
}

/// Exclusive claim on one chat's job slot.
///
/// Releases the slot when dropped or when [`JobLease::release`] is called.
pub struct JobLease {
    registry: TaskRegistry,
    chat_id: ChatId,
    generation: u64,
    cancel: CancellationToken,
    released: bool,
}

impl JobLease {
    /// Chat this lease belongs to
    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    /// Token fired by [`TaskRegistry::request_cancel`]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Record the job size
    pub fn set_total(&self, total: usize) {
        self.registry
            .update(self.chat_id, self.generation, |s| s.total_episodes = total);
    }

    /// Record one more episode reaching a terminal disposition
    pub fn episode_completed(&self) {
        self.registry
            .update(self.chat_id, self.generation, |s| s.completed_episodes += 1);
    }

    /// Record the PID of the fetch process now running
    pub fn attach_process(&self, pid: Option<u32>) {
        self.registry
            .update(self.chat_id, self.generation, |s| s.active_pid = pid);
    }

    /// Clear the PID once the fetch process is gone
    pub fn detach_process(&self) {
        self.attach_process(None);
    }

    /// Release the chat now (equivalent to dropping the lease)
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            self.registry.release_generation(self.chat_id, self.generation);
        }
    }
}

impl Drop for JobLease {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl std::fmt::Debug for JobLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobLease")
            .field("chat_id", &self.chat_id)
            .field("generation", &self.generation)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
