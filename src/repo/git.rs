//! A single call site for every git subprocess invocation, so the
//! per-operation timeouts in §5 are enforced uniformly.

use std::path::Path;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{DeltacovError, Result};

pub const CLONE_TIMEOUT: Duration = Duration::from_secs(600);
pub const FETCH_COMMIT_TIMEOUT: Duration = Duration::from_secs(300);
pub const FETCH_ALL_TIMEOUT: Duration = Duration::from_secs(600);
pub const WORKTREE_TIMEOUT: Duration = Duration::from_secs(300);
pub const DIFF_TIMEOUT: Duration = Duration::from_secs(60);
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
pub const REV_PARSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs `git <args>` in `cwd`, bounded by `bound`. Returns trimmed stdout on
/// a zero exit status.
pub async fn run_git(args: &[&str], cwd: Option<&Path>, bound: Duration) -> Result<String> {
    let mut cmd = Command::new("git");
    cmd.args(args);
    if let Some(cwd) = cwd {
        cmd.current_dir(cwd);
    }
    cmd.env("GIT_SSH_COMMAND", ssh_command());
    cmd.env("GIT_TERMINAL_PROMPT", "0");

    debug!(?args, ?cwd, "running git");

    let output = match timeout(bound, cmd.output()).await {
        Ok(res) => res.map_err(DeltacovError::Io)?,
        Err(_) => return Err(DeltacovError::GitTimeout(bound)),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DeltacovError::Git(format!(
            "git {:?} failed: {}",
            args, stderr
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Runs `git <args>`, tolerating a non-zero exit as a plain `false` rather
/// than an error — used for object-existence probes (§4.C operation 2).
pub async fn run_git_probe(args: &[&str], cwd: Option<&Path>, bound: Duration) -> Result<bool> {
    let mut cmd = Command::new("git");
    cmd.args(args);
    if let Some(cwd) = cwd {
        cmd.current_dir(cwd);
    }

    let output = match timeout(bound, cmd.output()).await {
        Ok(res) => res.map_err(DeltacovError::Io)?,
        Err(_) => return Err(DeltacovError::GitTimeout(bound)),
    };

    Ok(output.status.success())
}

/// Accept-new host key policy, matching container environments without an
/// interactive `known_hosts` prompt available.
fn ssh_command() -> &'static str {
    "ssh -o StrictHostKeyChecking=accept-new -o BatchMode=yes"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_git_reports_version() {
        let out = run_git(&["--version"], None, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(out.starts_with("git version"));
    }

    #[tokio::test]
    async fn run_git_surfaces_failure() {
        let err = run_git(&["not-a-real-subcommand"], None, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, DeltacovError::Git(_)));
    }

    #[tokio::test]
    async fn run_git_probe_returns_false_instead_of_erroring() {
        let ok = run_git_probe(&["not-a-real-subcommand"], None, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(!ok);
    }
}
