//! Chat destinations: the requesting chat and auxiliary channels

use super::Sink;
use crate::transport::ChatTransport;
use crate::types::{Artifact, ChatId, DeliveryMeta};
use async_trait::async_trait;
use std::sync::Arc;

/// Uploads the artifact into a chat with the uniform caption
pub struct ChatSink {
    name: String,
    chat_id: ChatId,
    transport: Arc<dyn ChatTransport>,
    as_video: bool,
}

impl ChatSink {
    /// The chat that issued the command
    pub fn requester(chat_id: ChatId, transport: Arc<dyn ChatTransport>, as_video: bool) -> Self {
        Self {
            name: "requester".to_string(),
            chat_id,
            transport,
            as_video,
        }
    }

    /// An auxiliary distribution channel
    pub fn channel(chat_id: ChatId, transport: Arc<dyn ChatTransport>, as_video: bool) -> Self {
        Self {
            name: format!("channel:{}", chat_id),
            chat_id,
            transport,
            as_video,
        }
    }
}

#[async_trait]
impl Sink for ChatSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, artifact: &Artifact, meta: &DeliveryMeta) -> crate::Result<()> {
        self.transport
            .send_file(self.chat_id, &artifact.path, &meta.caption(), self.as_video)
            .await
    }
}
