//! Traits and types for offsite storage

use async_trait::async_trait;
use std::path::Path;

/// Trait for offsite bulk storage
///
/// Implementations can drive an external client, talk to an HTTP API, or
/// provide stub functionality when no account is configured.
#[async_trait]
pub trait OffsiteStorage: Send + Sync {
    /// Make sure an authenticated session exists, logging in if needed
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be run or the login is rejected.
    async fn ensure_session(&self) -> crate::Result<()>;

    /// Create `remote_dir` (and its parents) if it does not exist
    async fn ensure_folder(&self, remote_dir: &str) -> crate::Result<()>;

    /// Store `local` as `remote_dir/remote_name`
    ///
    /// # Errors
    ///
    /// Returns an error if the upload fails or exceeds the command timeout.
    async fn upload(&self, local: &Path, remote_dir: &str, remote_name: &str)
    -> crate::Result<()>;

    /// Human-readable quota/usage report
    async fn quota(&self) -> crate::Result<String>;

    /// Whether the last session check succeeded
    fn is_ready(&self) -> bool;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
