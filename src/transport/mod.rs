//! Chat transport boundary
//!
//! [`ChatTransport`] is everything the bot needs from the chat platform:
//! receive commands, send and edit text, and upload files. The production
//! implementation is [`TelegramTransport`].

mod telegram;

pub use telegram::TelegramTransport;

use crate::types::{ChatId, MessageId};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

/// Longest text a single message may carry (characters)
pub const MESSAGE_LIMIT: usize = 4096;

/// One incoming text message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    /// Monotonic update id; poll again with `update_id + 1`
    pub update_id: i64,
    /// Chat the message came from
    pub chat_id: ChatId,
    /// Message text
    pub text: String,
}

/// Result of one long poll
///
/// `next_offset` is derived from every update the platform returned, including
/// ones without text, so non-text updates are acknowledged too.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateBatch {
    /// Text messages, in update order
    pub updates: Vec<Update>,
    /// Offset for the next poll, `None` when nothing arrived
    pub next_offset: Option<i64>,
}

impl UpdateBatch {
    /// Batch of text messages only; the offset follows the highest id
    pub fn from_updates(updates: Vec<Update>) -> Self {
        let next_offset = updates.iter().map(|u| u.update_id + 1).max();
        Self {
            updates,
            next_offset,
        }
    }
}

/// Chat platform operations
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send a text message and return its id (for later edits)
    async fn send_message(&self, chat_id: ChatId, text: &str) -> crate::Result<MessageId>;

    /// Replace the text of a message sent earlier
    async fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
    ) -> crate::Result<()>;

    /// Upload a file, as a streamable video or as a document
    async fn send_file(
        &self,
        chat_id: ChatId,
        path: &Path,
        caption: &str,
        as_video: bool,
    ) -> crate::Result<()>;

    /// Long-poll for text messages newer than `offset`
    async fn get_updates(&self, offset: Option<i64>, timeout: Duration)
    -> crate::Result<UpdateBatch>;
}

/// Cut a message to the platform's character limit.
pub fn truncate_message(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let suffix = "\n\n[truncated]";
    let budget = limit.saturating_sub(suffix.chars().count());
    let truncated: String = text.chars().take(budget).collect();
    format!("{truncated}{suffix}")
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_message_respects_limit() {
        assert_eq!(truncate_message("hello", 100), "hello");

        let long = "a".repeat(5000);
        let truncated = truncate_message(&long, MESSAGE_LIMIT);
        assert!(truncated.chars().count() <= MESSAGE_LIMIT);
        assert!(truncated.ends_with("[truncated]"));
    }
}
