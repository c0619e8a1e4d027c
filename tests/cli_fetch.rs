//! CliFetchTool against real shell scripts
#![cfg(unix)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use anime_relay::config::FetchConfig;
use anime_relay::fetch::{CliFetchTool, FetchRequest, FetchTool};
use anime_relay::types::{AttemptExit, AudioTrack, Resolution};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn write_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fetch.sh");
    std::fs::write(&path, format!("#!/usr/bin/env bash\n{body}\n")).unwrap();
    path
}

fn tool(script: PathBuf, configure: impl FnOnce(&mut FetchConfig)) -> CliFetchTool {
    let mut config = FetchConfig {
        script_path: script,
        attempt_timeout: Duration::from_secs(20),
        terminate_grace: Duration::from_millis(500),
        ..Default::default()
    };
    configure(&mut config);
    CliFetchTool::from_config(&config)
}

fn request<'a>(output_dir: &'a Path) -> FetchRequest<'a> {
    FetchRequest {
        title: "Sousou no Frieren",
        episode: 3,
        resolution: Resolution(720),
        audio: AudioTrack::Eng,
        output_dir,
    }
}

struct Workdir {
    _dir: TempDir,
    script_dir: PathBuf,
    output: PathBuf,
}

fn workdir() -> Workdir {
    let dir = tempfile::tempdir().unwrap();
    let script_dir = dir.path().join("tool");
    let output = dir.path().join("out");
    std::fs::create_dir_all(&script_dir).unwrap();
    std::fs::create_dir_all(&output).unwrap();
    Workdir {
        _dir: dir,
        script_dir,
        output,
    }
}

#[tokio::test]
async fn successful_run_writes_into_output_dir() {
    let w = workdir();
    // echo the arguments into the file name so the test sees what was passed
    let script = write_script(
        &w.script_dir,
        r#"mkdir -p "$2"
echo "fetching $2 episode $4 at $6p ($8)"
touch "$2/$4_$6_$8.mp4""#,
    );
    let pids = Mutex::new(Vec::new());
    let observer = |pid: Option<u32>| pids.lock().unwrap().push(pid);

    let output = tool(script, |_| {})
        .fetch(request(&w.output), &CancellationToken::new(), &observer)
        .await
        .unwrap();

    assert_eq!(output.exit, AttemptExit::Exited(Some(0)));
    assert!(output.diagnostics.contains("fetching Sousou no Frieren episode 3 at 720p (eng)"));
    assert!(w.output.join("Sousou no Frieren/3_720_eng.mp4").exists());

    let pids = pids.lock().unwrap();
    assert_eq!(pids.len(), 2, "observer sees spawn and exit: {pids:?}");
    assert!(pids[0].is_some());
    assert_eq!(pids[1], None);
}

#[tokio::test]
async fn failure_keeps_tail_of_both_streams() {
    let w = workdir();
    let script = write_script(
        &w.script_dir,
        r#"for i in $(seq 1 200); do echo "progress line $i"; done
sleep 0.2
echo "[ERROR] Episode 3 not found!" >&2
exit 1"#,
    );

    let output = tool(script, |config| config.diagnostic_tail_bytes = 256)
        .fetch(request(&w.output), &CancellationToken::new(), &|_| {})
        .await
        .unwrap();

    assert_eq!(output.exit, AttemptExit::Exited(Some(1)));
    assert!(output.diagnostics.len() <= 256);
    assert!(output.diagnostics.contains("Episode 3 not found"));
    assert!(!output.diagnostics.contains("progress line 1\n"));
    assert_eq!(
        anime_relay::fetch::classify(&output.diagnostics),
        anime_relay::types::FailureCategory::EpisodeNotFound
    );
}

#[tokio::test]
async fn extra_args_and_bin_dir_reach_the_script() {
    let w = workdir();
    let bin = w.script_dir.join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    let helper = bin.join("relay-helper");
    std::fs::write(&helper, "#!/bin/sh\necho helper-ran\n").unwrap();
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&helper, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    let script = write_script(&w.script_dir, r#"echo "last=${@: -1}"; relay-helper"#);

    let output = tool(script, |config| {
        config.extra_args = vec!["-t".into(), "4".into()];
        config.bin_dir = Some(bin.clone());
    })
    .fetch(request(&w.output), &CancellationToken::new(), &|_| {})
    .await
    .unwrap();

    assert!(output.exit.is_success());
    assert!(output.diagnostics.contains("last=4"));
    assert!(output.diagnostics.contains("helper-ran"));
}

#[tokio::test]
async fn timeout_escalates_to_kill_when_term_is_ignored() {
    let w = workdir();
    let script = write_script(&w.script_dir, "trap '' TERM\necho started\nsleep 30");

    let started = Instant::now();
    let output = tool(script, |config| {
        config.attempt_timeout = Duration::from_millis(500);
        config.terminate_grace = Duration::from_millis(500);
    })
    .fetch(request(&w.output), &CancellationToken::new(), &|_| {})
    .await
    .unwrap();

    assert_eq!(output.exit, AttemptExit::TimedOut);
    assert!(
        started.elapsed() < Duration::from_secs(10),
        "attempt took {:?}",
        started.elapsed()
    );
    assert!(output.diagnostics.contains("started"));
}

#[tokio::test]
async fn cancellation_stops_a_running_attempt() {
    let w = workdir();
    let script = write_script(&w.script_dir, "echo waiting\nsleep 30");
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let output = tool(script, |_| {})
        .fetch(request(&w.output), &cancel, &|_| {})
        .await
        .unwrap();

    assert_eq!(output.exit, AttemptExit::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(10));
}
