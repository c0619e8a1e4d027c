//! No-op offsite storage for runs without an account

use super::traits::OffsiteStorage;
use async_trait::async_trait;
use std::path::Path;

/// Offsite storage used when no credentials are configured
///
/// Every operation returns `Error::NotSupported`, so the offsite sink reports
/// a failure instead of silently dropping files.
///
/// # Examples
///
/// ```
/// use anime_relay::offsite::{NoOpStorage, OffsiteStorage};
///
/// # #[tokio::main]
/// # async fn main() {
/// let storage = NoOpStorage;
/// assert!(storage.ensure_session().await.is_err());
/// assert!(!storage.is_ready());
/// # }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpStorage;

const NOT_CONFIGURED: &str = "offsite storage requires MEGA_EMAIL and MEGA_PASS";

#[async_trait]
impl OffsiteStorage for NoOpStorage {
    async fn ensure_session(&self) -> crate::Result<()> {
        Err(crate::Error::NotSupported(NOT_CONFIGURED.into()))
    }

    async fn ensure_folder(&self, _remote_dir: &str) -> crate::Result<()> {
        Err(crate::Error::NotSupported(NOT_CONFIGURED.into()))
    }

    async fn upload(&self, _local: &Path, _remote_dir: &str, _remote_name: &str) -> crate::Result<()> {
        Err(crate::Error::NotSupported(NOT_CONFIGURED.into()))
    }

    async fn quota(&self) -> crate::Result<String> {
        Err(crate::Error::NotSupported(NOT_CONFIGURED.into()))
    }

    fn is_ready(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
