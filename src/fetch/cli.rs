//! Fetch tool backed by the external fetch script

use super::diagnostics::TailBuffer;
use super::{FetchOutput, FetchRequest, FetchTool, SpawnObserver};
use crate::config::FetchConfig;
use crate::types::AttemptExit;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long to wait for the output readers after the process is gone
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Runs the fetch script once per attempt.
///
/// Arguments are passed as a structured list (`-a TITLE -e N -r RES -o AUDIO`
/// plus configured extras); nothing is ever interpolated into a shell string.
/// Each attempt runs in its own process group so termination reaches the
/// helpers the script starts.
///
/// # Examples
///
/// ```no_run
/// use anime_relay::config::FetchConfig;
/// use anime_relay::fetch::CliFetchTool;
///
/// let tool = CliFetchTool::from_config(&FetchConfig::default());
/// ```
#[derive(Debug, Clone)]
pub struct CliFetchTool {
    interpreter: PathBuf,
    script_path: PathBuf,
    bin_dir: Option<PathBuf>,
    extra_args: Vec<String>,
    timeout: Duration,
    terminate_grace: Duration,
    tail_bytes: usize,
}

impl CliFetchTool {
    /// Create a tool from the fetch configuration.
    ///
    /// A relative script path is resolved against the current directory now,
    /// because each attempt runs with the job workspace as its working
    /// directory.
    pub fn from_config(config: &FetchConfig) -> Self {
        let script_path = if config.script_path.is_relative() {
            std::env::current_dir()
                .map(|cwd| cwd.join(&config.script_path))
                .unwrap_or_else(|_| config.script_path.clone())
        } else {
            config.script_path.clone()
        };

        Self {
            interpreter: config.interpreter.clone(),
            script_path,
            bin_dir: config.bin_dir.clone(),
            extra_args: config.extra_args.clone(),
            timeout: config.attempt_timeout,
            terminate_grace: config.terminate_grace,
            tail_bytes: config.diagnostic_tail_bytes,
        }
    }

    /// Script this tool runs
    pub fn script_path(&self) -> &Path {
        &self.script_path
    }

    /// Whether the interpreter can be found (PATH lookup for bare names)
    pub fn is_available(&self) -> bool {
        which::which(&self.interpreter).is_ok() && self.script_path.exists()
    }

    fn build_command(&self, request: &FetchRequest<'_>) -> Command {
        let mut command = Command::new(&self.interpreter);
        command
            .arg(&self.script_path)
            .arg("-a")
            .arg(request.title)
            .arg("-e")
            .arg(request.episode.to_string())
            .arg("-r")
            .arg(request.resolution.0.to_string())
            .arg("-o")
            .arg(request.audio.code())
            .args(&self.extra_args)
            .current_dir(request.output_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(bin_dir) = &self.bin_dir {
            command.env("PATH", prepend_to_path(bin_dir));
        }

        #[cfg(unix)]
        command.process_group(0);

        command
    }
}

#[async_trait]
impl FetchTool for CliFetchTool {
    async fn fetch(
        &self,
        request: FetchRequest<'_>,
        cancel: &CancellationToken,
        on_spawn: SpawnObserver<'_>,
    ) -> crate::Result<FetchOutput> {
        if cancel.is_cancelled() {
            return Ok(FetchOutput {
                exit: AttemptExit::Cancelled,
                diagnostics: String::new(),
            });
        }

        let mut child = self.build_command(&request).spawn().map_err(|e| {
            crate::Error::ExternalTool(format!(
                "Failed to execute fetch tool {}: {}",
                self.interpreter.display(),
                e
            ))
        })?;
        let pid = child.id();
        on_spawn(pid);
        tracing::debug!(
            pid = ?pid,
            title = request.title,
            episode = request.episode,
            resolution = %request.resolution,
            "fetch tool started"
        );

        let tail = Arc::new(Mutex::new(TailBuffer::new(self.tail_bytes)));
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, "stdout", tail.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, "stderr", tail.clone()));
        }

        enum Waited {
            Exited(std::io::Result<std::process::ExitStatus>),
            TimedOut,
            Cancelled,
        }

        let waited = tokio::select! {
            status = child.wait() => Waited::Exited(status),
            _ = tokio::time::sleep(self.timeout) => Waited::TimedOut,
            _ = cancel.cancelled() => Waited::Cancelled,
        };

        let exit = match waited {
            Waited::Exited(Ok(status)) => AttemptExit::Exited(status.code()),
            Waited::Exited(Err(e)) => {
                on_spawn(None);
                return Err(crate::Error::ExternalTool(format!(
                    "Failed to wait for fetch tool: {}",
                    e
                )));
            }
            Waited::TimedOut => {
                tracing::warn!(
                    pid = ?pid,
                    episode = request.episode,
                    timeout = ?self.timeout,
                    "fetch attempt timed out, terminating"
                );
                terminate(&mut child, self.terminate_grace).await;
                AttemptExit::TimedOut
            }
            Waited::Cancelled => {
                tracing::info!(pid = ?pid, episode = request.episode, "fetch attempt cancelled, terminating");
                terminate(&mut child, self.terminate_grace).await;
                AttemptExit::Cancelled
            }
        };
        on_spawn(None);

        for reader in readers {
            if tokio::time::timeout(READER_DRAIN_TIMEOUT, reader).await.is_err() {
                tracing::debug!(pid = ?pid, "output reader did not finish, abandoning");
            }
        }

        let diagnostics = tail
            .lock()
            .map(|t| t.contents())
            .unwrap_or_else(|poisoned| poisoned.into_inner().contents());

        tracing::debug!(pid = ?pid, exit = ?exit, "fetch tool finished");
        Ok(FetchOutput { exit, diagnostics })
    }

    fn name(&self) -> &'static str {
        "cli-fetch"
    }
}

fn spawn_reader<R>(stream: R, label: &'static str, tail: Arc<Mutex<TailBuffer>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(stream = label, "{}", line);
            if let Ok(mut tail) = tail.lock() {
                tail.push_line(&line);
            }
        }
    })
}

/// Ask the process group to stop, then kill it if it is still alive after `grace`
async fn terminate(child: &mut Child, grace: Duration) {
    let pid = child.id();

    #[cfg(unix)]
    if let Some(pid) = pid {
        signal_group(pid, libc::SIGTERM);
    }
    #[cfg(not(unix))]
    if let Err(e) = child.start_kill() {
        tracing::debug!(pid = ?pid, error = %e, "stopping fetch process failed");
    }

    if tokio::time::timeout(grace, child.wait()).await.is_ok() {
        return;
    }

    tracing::warn!(pid = ?pid, grace = ?grace, "fetch tool ignored terminate, killing");
    #[cfg(unix)]
    if let Some(pid) = pid {
        signal_group(pid, libc::SIGKILL);
    }
    if let Err(e) = child.kill().await {
        tracing::debug!(pid = ?pid, error = %e, "kill after terminate failed");
    }
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: libc::c_int) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: kill(2) takes plain integers and has no memory-safety
    // preconditions. A negative pid addresses the process group created by
    // `process_group(0)`, whose id equals the child's pid.
    let rc = unsafe { libc::kill(-pgid, signal) };
    if rc != 0 {
        tracing::debug!(
            pid,
            signal,
            error = %std::io::Error::last_os_error(),
            "signalling fetch process group failed"
        );
    }
}

fn prepend_to_path(dir: &Path) -> OsString {
    let mut paths = vec![dir.to_path_buf()];
    if let Some(existing) = std::env::var_os("PATH") {
        paths.extend(std::env::split_paths(&existing));
    }
    std::env::join_paths(paths).unwrap_or_else(|_| dir.as_os_str().to_os_string())
}
