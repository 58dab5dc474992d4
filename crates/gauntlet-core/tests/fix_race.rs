#![cfg(unix)]

use gauntlet_core::engine::{FixOutcome, FixStep};
use gauntlet_core::trace::TranscriptLocator;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

fn script(dir: &Path, name: &str, body: &str) -> anyhow::Result<PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body))?;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
    Ok(path)
}

fn step(bin: PathBuf, sessions: &Path) -> FixStep {
    FixStep::new(bin, TranscriptLocator::new(sessions))
        .stuck_after(Duration::from_secs(10))
        .poll_interval(Duration::from_millis(50))
}

#[tokio::test]
async fn normal_exit_reports_code() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let bin = script(tmp.path(), "exits", "echo \"fixing: $2 $3\"\nexit 3")?;

    let outcome = step(bin, tmp.path())
        .run("tighten the skills", Duration::from_secs(20))
        .await?;
    assert_eq!(outcome, FixOutcome::Exited(Some(3)));
    Ok(())
}

#[tokio::test]
async fn silent_process_is_stuck_and_killed() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let bin = script(tmp.path(), "hangs", "echo starting\nexec sleep 30")?;

    let started = Instant::now();
    let outcome = step(bin, tmp.path())
        .stuck_after(Duration::from_millis(300))
        .run("fix", Duration::from_secs(20))
        .await?;
    assert_eq!(outcome, FixOutcome::Stuck);
    assert!(started.elapsed() < Duration::from_secs(10));
    Ok(())
}

#[tokio::test]
async fn completion_event_ends_the_step() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let sessions = tmp.path().join("sessions");
    std::fs::create_dir_all(&sessions)?;
    let session_dir = sessions.join("fix-1");
    let body = format!(
        "mkdir -p '{dir}'\nprintf '%s\\n' '{{\"type\":\"session.task_complete\",\"data\":{{}},\"id\":\"1\",\"timestamp\":\"2025-01-01T00:00:00Z\"}}' > '{dir}/events.jsonl'\necho written\nexec sleep 30",
        dir = session_dir.display()
    );
    let bin = script(tmp.path(), "completes", &body)?;

    let started = Instant::now();
    let outcome = step(bin, &sessions)
        .run("fix", Duration::from_secs(20))
        .await?;
    assert_eq!(outcome, FixOutcome::Completed);
    assert!(started.elapsed() < Duration::from_secs(10));
    Ok(())
}

#[tokio::test]
async fn completed_session_from_before_the_step_is_ignored() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let sessions = tmp.path().join("sessions");
    std::fs::create_dir_all(sessions.join("earlier"))?;
    std::fs::write(
        sessions.join("earlier/events.jsonl"),
        "{\"type\":\"session.task_complete\",\"data\":{},\"id\":\"1\",\"timestamp\":\"2025-01-01T00:00:00Z\"}\n",
    )?;
    let bin = script(tmp.path(), "quiet", "echo starting\nexec sleep 30")?;

    let outcome = step(bin, &sessions)
        .stuck_after(Duration::from_millis(500))
        .run("fix", Duration::from_secs(20))
        .await?;
    assert_eq!(outcome, FixOutcome::Stuck);
    Ok(())
}

#[tokio::test]
async fn binary_output_still_counts_toward_stuck_detection() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let bin = script(
        tmp.path(),
        "garbled",
        "printf '\\377\\n'\nprintf '\\377\\n' >&2\nexec sleep 30",
    )?;

    let started = Instant::now();
    let outcome = step(bin, tmp.path())
        .stuck_after(Duration::from_millis(500))
        .run("fix", Duration::from_secs(4))
        .await?;
    assert_eq!(outcome, FixOutcome::Stuck);
    assert!(started.elapsed() < Duration::from_secs(4));
    Ok(())
}

#[tokio::test]
async fn busy_process_hits_the_timeout() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let bin = script(
        tmp.path(),
        "chatty",
        "while true; do echo tick; sleep 0.1; done",
    )?;

    let outcome = step(bin, tmp.path())
        .stuck_after(Duration::from_secs(5))
        .run("fix", Duration::from_millis(600))
        .await?;
    assert_eq!(outcome, FixOutcome::TimedOut);
    Ok(())
}

#[tokio::test]
async fn missing_binary_is_an_error() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let err = step(tmp.path().join("no-such-assistant"), tmp.path())
        .run("fix", Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("failed to start fix step"));
    Ok(())
}
