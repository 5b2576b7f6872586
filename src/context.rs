//! Git/project context captured alongside new notes.

use std::path::Path;
use std::process::Command;

pub const DISABLE_GIT_ENV: &str = "CLI_UNITES_DISABLE_GIT";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitContext {
    pub commit: Option<String>,
    pub branch: Option<String>,
    /// Repository root.
    pub root: Option<String>,
    /// Working directory relative to `root`, with a trailing `/`.
    pub relative_path: Option<String>,
}

/// Context for the current directory. Empty when `CLI_UNITES_DISABLE_GIT=1`.
pub fn current_context() -> GitContext {
    if std::env::var(DISABLE_GIT_ENV).is_ok_and(|v| v == "1") {
        return GitContext::default();
    }
    match std::env::current_dir() {
        Ok(dir) => collect(&dir),
        Err(e) => {
            tracing::debug!(error = %e, "no working directory; skipping git context");
            GitContext::default()
        }
    }
}

/// Context for `dir`. Every field degrades to `None` on failure.
pub fn collect(dir: &Path) -> GitContext {
    let root = git_output(dir, &["rev-parse", "--show-toplevel"]);
    if root.is_none() {
        tracing::debug!(dir = %dir.display(), "not inside a git repository");
        return GitContext::default();
    }
    GitContext {
        commit: git_output(dir, &["rev-parse", "HEAD"]),
        branch: git_output(dir, &["rev-parse", "--abbrev-ref", "HEAD"]),
        root,
        relative_path: git_output(dir, &["rev-parse", "--show-prefix"]),
    }
}

fn git_output(dir: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
