//! Offsite storage destination

use super::Sink;
use crate::offsite::OffsiteStorage;
use crate::types::{Artifact, DeliveryMeta};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Uploads artifacts into one per-title remote folder.
///
/// The folder is created on the first delivery of the job only.
pub struct OffsiteSink {
    storage: Arc<dyn OffsiteStorage>,
    folder: String,
    folder_ready: OnceCell<()>,
}

impl OffsiteSink {
    /// Sink uploading into `folder`
    pub fn new(storage: Arc<dyn OffsiteStorage>, folder: String) -> Self {
        Self {
            storage,
            folder,
            folder_ready: OnceCell::new(),
        }
    }

    /// Remote folder this sink writes to
    pub fn folder(&self) -> &str {
        &self.folder
    }
}

#[async_trait]
impl Sink for OffsiteSink {
    fn name(&self) -> &str {
        "offsite"
    }

    async fn deliver(&self, artifact: &Artifact, meta: &DeliveryMeta) -> crate::Result<()> {
        self.folder_ready
            .get_or_try_init(|| self.storage.ensure_folder(&self.folder))
            .await?;

        let extension = artifact
            .path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| "mp4".to_string());
        let remote_name = meta.file_name(&extension);
        tracing::debug!(
            storage = self.storage.name(),
            folder = %self.folder,
            file = %artifact.file_name(),
            remote_name = %remote_name,
            title = %meta.title,
            episode = meta.episode,
            resolution = %meta.resolution,
            size_bytes = meta.size_bytes,
            "uploading to offsite storage"
        );
        self.storage
            .upload(&artifact.path, &self.folder, &remote_name)
            .await
    }
}
