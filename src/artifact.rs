//! Locating and validating the media file an attempt produced

use crate::types::{Artifact, Resolution};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::SystemTime;
use tokio::fs;
use tracing::{debug, warn};

/// Result of checking an artifact against the delivery ceiling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// Size is within the ceiling
    Accepted(Artifact),
    /// Size exceeds the ceiling; the file must not be delivered
    Oversize(Artifact),
}

/// Find the most recently created media file under `dir`.
///
/// Creation time is used where the filesystem reports it, otherwise the
/// modification time. Files with another extension, and unreadable entries,
/// are ignored. Returns `None` if no candidate exists.
pub async fn locate(dir: &Path, extension: &str, resolution: Resolution) -> Option<Artifact> {
    let mut candidates = Vec::new();
    collect_candidates(dir, extension, &mut candidates).await;

    let (path, size_bytes, _) = candidates.into_iter().max_by_key(|(_, _, stamp)| *stamp)?;
    debug!(?path, size_bytes, "located artifact");
    Some(Artifact {
        path,
        size_bytes,
        resolution,
    })
}

/// Compare an artifact against the size ceiling
pub fn validate(artifact: Artifact, max_bytes: u64) -> Validation {
    if artifact.size_bytes > max_bytes {
        warn!(
            path = ?artifact.path,
            size_bytes = artifact.size_bytes,
            max_bytes,
            "artifact exceeds delivery ceiling"
        );
        Validation::Oversize(artifact)
    } else {
        Validation::Accepted(artifact)
    }
}

fn collect_candidates<'a>(
    dir: &'a Path,
    extension: &'a str,
    out: &'a mut Vec<(PathBuf, u64, SystemTime)>,
) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!(?dir, error = %e, "cannot read directory while locating artifact");
                return;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let file_type = match entry.file_type().await {
                Ok(ft) => ft,
                Err(_) => continue,
            };

            if file_type.is_dir() {
                collect_candidates(&path, extension, out).await;
            } else if file_type.is_file()
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case(extension))
                && let Ok(metadata) = entry.metadata().await
            {
                let stamp = metadata
                    .created()
                    .or_else(|_| metadata.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                out.push((path, metadata.len(), stamp));
            }
        }
    })
}
