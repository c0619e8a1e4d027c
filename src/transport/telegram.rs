//! Telegram Bot API transport.
//!
//! Every call is `POST /bot<token>/<method>`. Error answers carry a JSON body
//! with `description` and `error_code`; 429 answers add
//! `parameters.retry_after`, which becomes [`Error::RateLimited`] and is
//! honoured by the retry helper.

use super::{ChatTransport, MESSAGE_LIMIT, Update, UpdateBatch, truncate_message};
use crate::config::{RetryConfig, TelegramConfig};
use crate::error::{Error, Result};
use crate::retry::with_retry;
use crate::types::{ChatId, MessageId};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::debug;

/// Caption limit for media messages (characters)
const CAPTION_LIMIT: usize = 1024;

/// Slack added on top of the long-poll timeout for the HTTP request itself
const POLL_SLACK: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<u16>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

#[derive(Debug, Deserialize)]
struct RawUpdate {
    update_id: i64,
    message: Option<RawMessage>,
    channel_post: Option<RawMessage>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    chat: RawChat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawChat {
    id: i64,
}

/// Telegram Bot API client
pub struct TelegramTransport {
    client: Client,
    base_url: String,
    retry: RetryConfig,
}

impl TelegramTransport {
    /// Create a client for the configured bot
    pub fn new(config: &TelegramConfig, retry: RetryConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: format!(
                "{}/bot{}",
                config.api_url.trim_end_matches('/'),
                config.bot_token
            ),
            retry,
        })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, payload: &serde_json::Value) -> Result<T> {
        with_retry(&self.retry, move || self.call_once(method, payload, None)).await
    }

    async fn call_once<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: &serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<T> {
        let mut request = self.client.post(self.url(method)).json(payload);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let body = response.bytes().await?;

    let parsed: ApiResponse<T> = match serde_json::from_slice(&body) {
        Ok(parsed) => parsed,
        Err(_) => {
            return Err(Error::Transport(format!("Bot API returned HTTP {}", status)));
        }
    };

    if parsed.ok {
        return parsed
            .result
            .ok_or_else(|| Error::Transport("Bot API response has no result".into()));
    }

    let code = parsed.error_code.unwrap_or(status.as_u16());
    if code == 429 {
        let retry_after = parsed
            .parameters
            .and_then(|p| p.retry_after)
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(1));
        return Err(Error::RateLimited { retry_after });
    }

    Err(Error::Transport(format!(
        "{} ({})",
        parsed.description.unwrap_or_else(|| status.to_string()),
        code
    )))
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<MessageId> {
        let payload = json!({
            "chat_id": chat_id.get(),
            "text": truncate_message(text, MESSAGE_LIMIT),
            "disable_web_page_preview": true,
        });
        let sent: SentMessage = self.call("sendMessage", &payload).await?;
        Ok(MessageId(sent.message_id))
    }

    async fn edit_message(&self, chat_id: ChatId, message_id: MessageId, text: &str) -> Result<()> {
        let payload = json!({
            "chat_id": chat_id.get(),
            "message_id": message_id.0,
            "text": truncate_message(text, MESSAGE_LIMIT),
            "disable_web_page_preview": true,
        });
        match self.call::<serde_json::Value>("editMessageText", &payload).await {
            Ok(_) => Ok(()),
            Err(Error::Transport(msg)) if msg.contains("message is not modified") => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn send_file(&self, chat_id: ChatId, path: &Path, caption: &str, as_video: bool) -> Result<()> {
        let (method, field) = if as_video {
            ("sendVideo", "video")
        } else {
            ("sendDocument", "document")
        };
        let caption = truncate_message(caption, CAPTION_LIMIT);
        let caption = caption.as_str();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "episode.mp4".to_string());
        let file_name = file_name.as_str();

        with_retry(&self.retry, move || async move {
            let file = tokio::fs::File::open(path).await?;
            let len = file.metadata().await?.len();
            let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
            let part = Part::stream_with_length(body, len).file_name(file_name.to_string());

            let mut form = Form::new()
                .text("chat_id", chat_id.to_string())
                .text("caption", caption.to_string())
                .part(field, part);
            if as_video {
                form = form.text("supports_streaming", "true");
            }

            debug!(%chat_id, method, file = file_name, size_bytes = len, "uploading file");
            let response = self.client.post(self.url(method)).multipart(form).send().await?;
            decode::<serde_json::Value>(response).await?;
            Ok::<(), Error>(())
        })
        .await
    }

    async fn get_updates(&self, offset: Option<i64>, timeout: Duration) -> Result<UpdateBatch> {
        let payload = json!({
            "offset": offset,
            "timeout": timeout.as_secs(),
            "allowed_updates": ["message", "channel_post"],
        });
        let raw: Vec<RawUpdate> = self
            .call_once("getUpdates", &payload, Some(timeout + POLL_SLACK))
            .await?;

        let next_offset = raw.iter().map(|update| update.update_id + 1).max();
        let updates = raw
            .into_iter()
            .filter_map(|update| {
                let message = update.message.or(update.channel_post)?;
                let text = message.text?;
                Some(Update {
                    update_id: update.update_id,
                    chat_id: ChatId(message.chat.id),
                    text,
                })
            })
            .collect();
        Ok(UpdateBatch {
            updates,
            next_offset,
        })
    }
}

impl std::fmt::Debug for TelegramTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // base_url embeds the token
        f.debug_struct("TelegramTransport").finish_non_exhaustive()
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport(server: &MockServer) -> TelegramTransport {
        let config = TelegramConfig {
            bot_token: "123:abc".to_string(),
            api_url: server.uri(),
            ..Default::default()
        };
        let retry = RetryConfig {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
            jitter: false,
        };
        TelegramTransport::new(&config, retry).unwrap()
    }

    #[tokio::test]
    async fn send_message_returns_message_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_partial_json(json!({"chat_id": 42, "text": "hello"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"message_id": 77, "chat": {"id": 42}, "date": 0}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let id = transport(&server).send_message(ChatId(42), "hello").await.unwrap();
        assert_eq!(id, MessageId(77));
    }

    #[tokio::test]
    async fn rate_limit_is_retried_after_requested_delay() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "ok": false,
                "error_code": 429,
                "description": "Too Many Requests: retry after 0",
                "parameters": {"retry_after": 0}
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"message_id": 1}
            })))
            .mount(&server)
            .await;

        let id = transport(&server).send_message(ChatId(1), "x").await.unwrap();
        assert_eq!(id, MessageId(1));
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: chat not found"
            })))
            .expect(1)
            .mount(&server)
            .await;

        match transport(&server).send_message(ChatId(9), "x").await {
            Err(Error::Transport(msg)) => assert!(msg.contains("chat not found")),
            other => panic!("expected Transport error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unchanged_edit_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/editMessageText"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: message is not modified"
            })))
            .mount(&server)
            .await;

        transport(&server)
            .edit_message(ChatId(1), MessageId(2), "same")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn send_file_uploads_multipart_document() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendDocument"))
            .and(body_string_contains("name=\"document\""))
            .and(body_string_contains("Naruto - Episode 1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"message_id": 3}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("ep1.mp4");
        std::fs::write(&file, b"fake video bytes").unwrap();

        transport(&server)
            .send_file(ChatId(5), &file, "Naruto - Episode 1 [720p]", false)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn send_file_as_video_uses_send_video() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendVideo"))
            .and(body_string_contains("supports_streaming"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"message_id": 4}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("ep2.mp4");
        std::fs::write(&file, b"fake").unwrap();

        transport(&server)
            .send_file(ChatId(5), &file, "caption", true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_file_fails_without_request() {
        let server = MockServer::start().await;
        let result = transport(&server)
            .send_file(ChatId(5), Path::new("/nonexistent/ep.mp4"), "c", false)
            .await;
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn get_updates_keeps_text_messages_only() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/getUpdates"))
            .and(body_partial_json(json!({"offset": 10})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": [
                    {"update_id": 10, "message": {"message_id": 1, "chat": {"id": 42}, "text": "/help"}},
                    {"update_id": 11, "message": {"message_id": 2, "chat": {"id": 42}}},
                    {"update_id": 12, "channel_post": {"message_id": 3, "chat": {"id": -100}, "text": "/status"}}
                ]
            })))
            .mount(&server)
            .await;

        let batch = transport(&server)
            .get_updates(Some(10), Duration::from_secs(0))
            .await
            .unwrap();
        assert_eq!(batch.next_offset, Some(13));
        assert_eq!(
            batch.updates,
            vec![
                Update {
                    update_id: 10,
                    chat_id: ChatId(42),
                    text: "/help".to_string()
                },
                Update {
                    update_id: 12,
                    chat_id: ChatId(-100),
                    text: "/status".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn non_text_updates_still_advance_the_offset() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/getUpdates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": [
                    {"update_id": 10, "message": {"message_id": 1, "chat": {"id": 1}, "photo": []}},
                    {"update_id": 11, "edited_message": {"message_id": 1, "chat": {"id": 1}, "text": "x"}}
                ]
            })))
            .mount(&server)
            .await;

        let batch = transport(&server)
            .get_updates(None, Duration::from_secs(0))
            .await
            .unwrap();
        assert!(batch.updates.is_empty());
        assert_eq!(batch.next_offset, Some(12));
    }

    #[tokio::test]
    async fn empty_poll_has_no_offset() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/getUpdates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": []})))
            .mount(&server)
            .await;

        let batch = transport(&server)
            .get_updates(Some(5), Duration::from_secs(0))
            .await
            .unwrap();
        assert_eq!(batch, UpdateBatch::default());
    }

    #[tokio::test]
    async fn non_json_error_page_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
            .mount(&server)
            .await;

        match transport(&server).send_message(ChatId(1), "x").await {
            Err(Error::Transport(msg)) => assert!(msg.contains("502")),
            other => panic!("expected Transport error, got {other:?}"),
        }
    }
}
