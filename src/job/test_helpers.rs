//! Shared fakes for job, sink and bot tests.

use crate::error::{Error, Result};
use crate::fetch::{FetchOutput, FetchRequest, FetchTool, SpawnObserver};
use crate::sinks::Sink;
use crate::transport::{ChatTransport, UpdateBatch};
use crate::types::{Artifact, AttemptExit, ChatId, DeliveryMeta, MessageId, Resolution};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What the fake fetch tool does for one (episode, resolution)
#[derive(Clone, Debug)]
pub(crate) enum Script {
    /// Write a media file of this many bytes (sparse) and exit 0
    Produce(u64),
    /// Exit with `code`, printing `diagnostics`
    Fail(i32, String),
    /// End with this exit and no output
    Exit(AttemptExit),
    /// Exit 0 without writing anything
    NoFile,
    /// Block until the job is cancelled
    WaitForCancel,
    /// Fail to start at all
    SpawnError,
    /// Panic inside the job task
    Panic,
}

type AttemptHook = Arc<dyn Fn(u32, Resolution) + Send + Sync>;

/// Scripted [`FetchTool`] that records every attempt
pub(crate) struct FakeFetchTool {
    default: Script,
    scripts: HashMap<(u32, u16), Script>,
    hook: Option<AttemptHook>,
    attempts: Mutex<Vec<(u32, Resolution)>>,
}

impl FakeFetchTool {
    /// Every attempt not scripted otherwise runs `default`
    pub(crate) fn new(default: Script) -> Self {
        Self {
            default,
            scripts: HashMap::new(),
            hook: None,
            attempts: Mutex::new(Vec::new()),
        }
    }

    /// Script one (episode, resolution) pair
    pub(crate) fn with(mut self, episode: u32, resolution: u16, script: Script) -> Self {
        self.scripts.insert((episode, resolution), script);
        self
    }

    /// Run `hook` at the start of every attempt, before the cancellation check
    pub(crate) fn on_attempt<F>(mut self, hook: F) -> Self
    where
        F: Fn(u32, Resolution) + Send + Sync + 'static,
    {
        self.hook = Some(Arc::new(hook));
        self
    }

    /// Attempts made so far, in order
    pub(crate) fn attempts(&self) -> Vec<(u32, Resolution)> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl FetchTool for FakeFetchTool {
    async fn fetch(
        &self,
        request: FetchRequest<'_>,
        cancel: &CancellationToken,
        on_spawn: SpawnObserver<'_>,
    ) -> Result<FetchOutput> {
        self.attempts
            .lock()
            .unwrap()
            .push((request.episode, request.resolution));
        if let Some(hook) = &self.hook {
            hook(request.episode, request.resolution);
        }

        let script = self
            .scripts
            .get(&(request.episode, request.resolution.0))
            .cloned()
            .unwrap_or_else(|| self.default.clone());

        if matches!(script, Script::SpawnError) {
            return Err(Error::ExternalTool(
                "Failed to execute fetch tool bash: No such file or directory".into(),
            ));
        }
        if cancel.is_cancelled() {
            return Ok(FetchOutput {
                exit: AttemptExit::Cancelled,
                diagnostics: String::new(),
            });
        }

        if matches!(script, Script::Panic) {
            panic!("fetch tool exploded");
        }

        on_spawn(Some(4242));
        let output = match script {
            Script::Produce(bytes) => {
                // nested by title, like the real tool
                let dir = request.output_dir.join(crate::utils::safe_name(request.title));
                std::fs::create_dir_all(&dir)?;
                let file = std::fs::File::create(dir.join(format!(
                    "{}_E{}_{}.mp4",
                    crate::utils::safe_name(request.title),
                    request.episode,
                    request.resolution
                )))?;
                file.set_len(bytes)?;
                FetchOutput {
                    exit: AttemptExit::Exited(Some(0)),
                    diagnostics: "Downloading... done".to_string(),
                }
            }
            Script::Fail(code, diagnostics) => FetchOutput {
                exit: AttemptExit::Exited(Some(code)),
                diagnostics,
            },
            Script::Exit(exit) => FetchOutput {
                exit,
                diagnostics: String::new(),
            },
            Script::NoFile => FetchOutput {
                exit: AttemptExit::Exited(Some(0)),
                diagnostics: "nothing to do".to_string(),
            },
            Script::WaitForCancel => {
                cancel.cancelled().await;
                FetchOutput {
                    exit: AttemptExit::Cancelled,
                    diagnostics: String::new(),
                }
            }
            Script::SpawnError | Script::Panic => unreachable!("handled above"),
        };
        on_spawn(None);
        Ok(output)
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// A file handed to [`RecordingTransport::send_file`]
#[derive(Clone, Debug)]
pub(crate) struct SentFile {
    pub(crate) chat_id: ChatId,
    pub(crate) path: PathBuf,
    pub(crate) caption: String,
    pub(crate) as_video: bool,
    /// Whether the file existed when the upload was made
    pub(crate) existed: bool,
}

/// [`ChatTransport`] that records everything and never touches the network
#[derive(Default)]
pub(crate) struct RecordingTransport {
    messages: Mutex<Vec<(ChatId, String)>>,
    edits: Mutex<Vec<(ChatId, MessageId, String)>>,
    files: Mutex<Vec<SentFile>>,
    failing_chats: Mutex<HashSet<ChatId>>,
    updates: Mutex<VecDeque<UpdateBatch>>,
    polled_offsets: Mutex<Vec<Option<i64>>>,
    next_id: AtomicI64,
}

impl RecordingTransport {
    /// Make every upload to `chat_id` fail
    pub(crate) fn fail_uploads_to(&self, chat_id: ChatId) {
        self.failing_chats.lock().unwrap().insert(chat_id);
    }

    /// Queue a batch returned by the next `get_updates`
    pub(crate) fn push_updates(&self, batch: UpdateBatch) {
        self.updates.lock().unwrap().push_back(batch);
    }

    /// Offsets passed to `get_updates`, in call order
    pub(crate) fn polled_offsets(&self) -> Vec<Option<i64>> {
        self.polled_offsets.lock().unwrap().clone()
    }

    pub(crate) fn messages(&self) -> Vec<(ChatId, String)> {
        self.messages.lock().unwrap().clone()
    }

    pub(crate) fn edits(&self) -> Vec<(ChatId, MessageId, String)> {
        self.edits.lock().unwrap().clone()
    }

    pub(crate) fn files(&self) -> Vec<SentFile> {
        self.files.lock().unwrap().clone()
    }

    /// Every text sent or edited into `chat_id`, in order
    pub(crate) fn texts_for(&self, chat_id: ChatId) -> Vec<String> {
        let mut texts: Vec<String> = self
            .messages()
            .into_iter()
            .filter(|(c, _)| *c == chat_id)
            .map(|(_, t)| t)
            .collect();
        texts.extend(
            self.edits()
                .into_iter()
                .filter(|(c, _, _)| *c == chat_id)
                .map(|(_, _, t)| t),
        );
        texts
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<MessageId> {
        self.messages
            .lock()
            .unwrap()
            .push((chat_id, text.to_string()));
        Ok(MessageId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1))
    }

    async fn edit_message(&self, chat_id: ChatId, message_id: MessageId, text: &str) -> Result<()> {
        self.edits
            .lock()
            .unwrap()
            .push((chat_id, message_id, text.to_string()));
        Ok(())
    }

    async fn send_file(&self, chat_id: ChatId, path: &Path, caption: &str, as_video: bool) -> Result<()> {
        self.files.lock().unwrap().push(SentFile {
            chat_id,
            path: path.to_path_buf(),
            caption: caption.to_string(),
            as_video,
            existed: path.exists(),
        });
        if self.failing_chats.lock().unwrap().contains(&chat_id) {
            return Err(Error::Transport("Forbidden: bot is not a member (403)".into()));
        }
        Ok(())
    }

    async fn get_updates(&self, offset: Option<i64>, timeout: Duration) -> Result<UpdateBatch> {
        self.polled_offsets.lock().unwrap().push(offset);
        let batch = self.updates.lock().unwrap().pop_front();
        match batch {
            Some(batch) => Ok(batch),
            None => {
                tokio::time::sleep(timeout.min(Duration::from_millis(10))).await;
                Ok(UpdateBatch::default())
            }
        }
    }
}

/// One recorded delivery
#[derive(Clone, Debug)]
pub(crate) struct Delivery {
    pub(crate) episode: u32,
    pub(crate) size_bytes: u64,
    /// Whether the artifact existed when the sink got it
    pub(crate) existed: bool,
}

/// [`Sink`] that records deliveries, optionally failing every one
pub(crate) struct RecordingSink {
    name: String,
    fail: bool,
    deliveries: Mutex<Vec<Delivery>>,
}

impl RecordingSink {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fail: false,
            deliveries: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing(name: &str) -> Self {
        Self {
            fail: true,
            ..Self::new(name)
        }
    }

    pub(crate) fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sink for RecordingSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, artifact: &Artifact, meta: &DeliveryMeta) -> Result<()> {
        self.deliveries.lock().unwrap().push(Delivery {
            episode: meta.episode,
            size_bytes: artifact.size_bytes,
            existed: artifact.path.exists(),
        });
        if self.fail {
            return Err(Error::Offsite(format!("{} rejected the upload", self.name)));
        }
        Ok(())
    }
}
