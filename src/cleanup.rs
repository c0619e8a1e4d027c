//! Per-job workspace and artifact cleanup
//!
//! Every job writes into its own directory under the workspace root, and each
//! episode into its own `epNNNN` subdirectory, so the newest-file heuristic in
//! [`artifact::locate`](crate::artifact::locate) never sees another chat's
//! files. Removal errors are logged as warnings but never fail the job.

use crate::error::Result;
use crate::types::{Artifact, ChatId};
use rand::Rng;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Isolated directory owned by one job.
///
/// Call [`JobWorkspace::remove`] when the job ends; dropping the workspace
/// without doing so removes it synchronously as a fallback (panicking job).
#[derive(Debug)]
pub struct JobWorkspace {
    root: PathBuf,
    removed: bool,
}

impl JobWorkspace {
    /// Create `base/chat<id>-<timestamp>-<rand>`
    pub async fn create(base: &Path, chat_id: ChatId) -> Result<Self> {
        let suffix: u32 = rand::thread_rng().gen_range(0..0x100_0000);
        let name = format!(
            "chat{}-{}-{:06x}",
            chat_id,
            chrono::Utc::now().format("%Y%m%d%H%M%S"),
            suffix
        );
        let root = base.join(name);
        fs::create_dir_all(&root).await?;
        debug!(%chat_id, ?root, "created job workspace");
        Ok(Self {
            root,
            removed: false,
        })
    }

    /// Workspace directory
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Path of an episode's output directory (not created)
    pub fn episode_path(&self, episode: u32) -> PathBuf {
        self.root.join(format!("ep{episode:04}"))
    }

    /// Fresh, empty output directory for an episode.
    ///
    /// Anything left by an earlier attempt at the same episode is removed
    /// first.
    pub async fn prepare_episode(&self, episode: u32) -> Result<PathBuf> {
        let dir = self.episode_path(episode);
        if fs::metadata(&dir).await.is_ok() {
            fs::remove_dir_all(&dir).await?;
        }
        fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Clear partial output between resolution attempts
    pub async fn reset_episode(&self, episode: u32) -> Result<()> {
        self.prepare_episode(episode).await.map(|_| ())
    }

    /// Delete an artifact right after its terminal disposition
    pub async fn remove_artifact(&self, artifact: &Artifact) {
        match fs::remove_file(&artifact.path).await {
            Ok(()) => debug!(path = ?artifact.path, "deleted artifact"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = ?artifact.path, error = %e, "failed to delete artifact"),
        }
    }

    /// Remove an episode's output directory and anything still in it
    pub async fn finish_episode(&self, episode: u32) {
        let dir = self.episode_path(episode);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => debug!(?dir, "removed episode directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(?dir, error = %e, "failed to remove episode directory"),
        }
    }

    /// Remove the whole workspace
    pub async fn remove(mut self) {
        self.removed = true;
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => debug!(root = ?self.root, "removed job workspace"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(root = ?self.root, error = %e, "failed to remove job workspace"),
        }
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        if !self.removed
            && let Err(e) = std::fs::remove_dir_all(&self.root)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(root = ?self.root, error = %e, "failed to remove job workspace on drop");
        }
    }
}

/// Delete workspaces left behind by a previous process (crash, kill -9).
///
/// Only entries named like a job workspace (`chat...`) are touched. Returns
/// how many were removed.
pub async fn purge_stale_workspaces(base: &Path) -> usize {
    let mut entries = match fs::read_dir(base).await {
        Ok(entries) => entries,
        Err(e) => {
            debug!(?base, error = %e, "workspace root not readable, nothing to purge");
            return 0;
        }
    };

    let mut removed = 0;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let is_workspace = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with("chat"));
        let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
        if !(is_workspace && is_dir) {
            continue;
        }
        match fs::remove_dir_all(&path).await {
            Ok(()) => removed += 1,
            Err(e) => warn!(?path, error = %e, "failed to remove stale workspace"),
        }
    }

    if removed > 0 {
        info!(removed, ?base, "purged stale job workspaces");
    }
    removed
}
