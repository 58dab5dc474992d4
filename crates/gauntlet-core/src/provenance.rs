use std::path::Path;
use std::process::Command;

/// Current `HEAD` commit of the repository at `dir`, if there is one.
///
/// Provenance is best-effort: a missing git binary or a directory outside
/// any repository yields `None`.
pub fn git_commit(dir: &Path) -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(dir)
        .output()
        .ok()?;
    if !output.status.success() {
        tracing::debug!(dir = %dir.display(), "not a git checkout, no commit recorded");
        return None;
    }
    let commit = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!commit.is_empty()).then_some(commit)
}
