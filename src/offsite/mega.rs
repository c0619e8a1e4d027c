//! Offsite storage backed by the mega-cmd command-line clients

use super::traits::OffsiteStorage;
use crate::config::OffsiteConfig;
use crate::utils::tail_excerpt;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::process::Command;

/// Marker `mega-whoami` prints when a session exists
const SESSION_MARKER: &str = "Account e-mail:";

/// Characters of client output kept in error messages
const ERROR_EXCERPT_CHARS: usize = 200;

/// Offsite storage that runs `mega-whoami`, `mega-login`, `mega-mkdir`,
/// `mega-put` and `mega-df`.
///
/// Binaries are looked up in `bin_dir` when configured, otherwise in `PATH`.
/// Every command is bounded by the configured timeout and killed when it
/// expires.
pub struct MegaCliStorage {
    bin_dir: Option<PathBuf>,
    email: String,
    password: String,
    timeout: Duration,
    ready: AtomicBool,
}

impl MegaCliStorage {
    /// Create storage from the offsite configuration
    pub fn from_config(config: &OffsiteConfig) -> Self {
        Self {
            bin_dir: config.bin_dir.clone(),
            email: config.email.clone(),
            password: config.password.clone(),
            timeout: config.command_timeout,
            ready: AtomicBool::new(false),
        }
    }

    fn binary(&self, name: &str) -> PathBuf {
        match &self.bin_dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }

    /// Start the background `mega-cmd-server` the clients talk to.
    ///
    /// Best effort: the clients can also start it on demand, so a missing
    /// server binary is only logged.
    pub fn start_server(&self) {
        let server = self.binary("mega-cmd-server");
        match Command::new(&server)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => tracing::info!(pid = ?child.id(), "started mega-cmd server"),
            Err(e) => tracing::debug!(?server, error = %e, "could not start mega-cmd server"),
        }
    }

    async fn run(&self, name: &str, args: &[&str]) -> crate::Result<Output> {
        let binary = self.binary(name);
        let output = Command::new(&binary)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.timeout, output).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(crate::Error::ExternalTool(format!(
                "Failed to execute {}: {}",
                name, e
            ))),
            Err(_) => Err(crate::Error::Offsite(format!(
                "{} timed out after {:?}",
                name, self.timeout
            ))),
        }
    }

    async fn run_checked(&self, name: &str, args: &[&str]) -> crate::Result<String> {
        let output = self.run(name, args).await?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            return Ok(stdout);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = if stderr.trim().is_empty() {
            stdout.as_str()
        } else {
            &*stderr
        };
        Err(crate::Error::Offsite(format!(
            "{} failed ({}): {}",
            name,
            output.status,
            tail_excerpt(detail, ERROR_EXCERPT_CHARS)
        )))
    }
}

impl std::fmt::Debug for MegaCliStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MegaCliStorage")
            .field("bin_dir", &self.bin_dir)
            .field("email", &self.email)
            .field("timeout", &self.timeout)
            .field("ready", &self.ready.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl OffsiteStorage for MegaCliStorage {
    async fn ensure_session(&self) -> crate::Result<()> {
        let whoami = self.run("mega-whoami", &[]).await?;
        if String::from_utf8_lossy(&whoami.stdout).contains(SESSION_MARKER) {
            tracing::debug!("mega session already active");
            self.ready.store(true, Ordering::Relaxed);
            return Ok(());
        }

        if self.email.is_empty() || self.password.is_empty() {
            self.ready.store(false, Ordering::Relaxed);
            return Err(crate::Error::NotSupported(
                "no mega session and no credentials configured".into(),
            ));
        }

        tracing::info!(email = %self.email, "logging into mega");
        let result = self
            .run_checked("mega-login", &[self.email.as_str(), self.password.as_str()])
            .await
            .map(|_| ());
        self.ready.store(result.is_ok(), Ordering::Relaxed);
        result
    }

    async fn ensure_folder(&self, remote_dir: &str) -> crate::Result<()> {
        let output = self.run("mega-mkdir", &["-p", remote_dir]).await?;
        // mega-mkdir -p still exits non-zero on some versions when the folder exists
        if !output.status.success() {
            tracing::debug!(
                remote_dir,
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "mega-mkdir reported failure, continuing"
            );
        }
        Ok(())
    }

    async fn upload(&self, local: &Path, remote_dir: &str, remote_name: &str) -> crate::Result<()> {
        let local = local.to_string_lossy();
        let target = format!("{}/{remote_name}", remote_dir.trim_end_matches('/'));
        self.run_checked("mega-put", &[&*local, target.as_str()])
            .await
            .map(|_| ())
    }

    async fn quota(&self) -> crate::Result<String> {
        let report = self.run_checked("mega-df", &["-h"]).await?;
        Ok(report.trim().to_string())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    fn name(&self) -> &'static str {
        "mega-cmd"
    }
}
