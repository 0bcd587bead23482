//! Content-addressed `(repo, commit)` materialization cache: a shared bare
//! mirror plus cheap per-commit worktrees (§4.C).

pub mod git;
pub mod lock;
pub mod token;

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{DeltacovError, Result};
use git::{
    run_git, run_git_probe, CLONE_TIMEOUT, FETCH_ALL_TIMEOUT, FETCH_COMMIT_TIMEOUT,
    PROBE_TIMEOUT, WORKTREE_TIMEOUT,
};
use lock::CommitLock;

pub struct RepoCache {
    root: PathBuf,
}

/// Derives the canonical on-disk project path `P(U)` for a repository URL:
/// scheme/authority syntax and a trailing `.git` stripped, e.g.
/// `github.com/owner/name`.
pub fn project_path(url: &str) -> String {
    let https = token::ssh_to_https(url);
    let mut s = https.as_str();
    for scheme in ["https://", "http://"] {
        if let Some(rest) = s.strip_prefix(scheme) {
            s = rest;
            break;
        }
    }
    s.strip_suffix(".git").unwrap_or(s).to_string()
}

impl RepoCache {
    pub fn new(root: PathBuf) -> RepoCache {
        RepoCache { root }
    }

    fn project_dir(&self, url: &str) -> PathBuf {
        self.root.join(project_path(url))
    }

    pub fn bare_repo_path(&self, url: &str) -> PathBuf {
        self.project_dir(url).join("repo.git")
    }

    pub fn worktree_dir(&self, url: &str, commit: &str) -> PathBuf {
        self.project_dir(url).join("worktrees").join(commit)
    }

    fn commit_lock_path(&self, url: &str, commit: &str) -> PathBuf {
        self.project_dir(url)
            .join("worktrees")
            .join(format!(".lock_{commit}"))
    }

    /// §4.C operation 1. Clones if `repo.git/HEAD` is missing; otherwise
    /// ensures the configured remote URL carries a fresh token.
    pub async fn ensure_bare(&self, url: &str) -> Result<PathBuf> {
        let bare = self.bare_repo_path(url);
        let auth_url = token::authenticated_url_from_env(url);

        if bare.join("HEAD").exists() {
            run_git(
                &["remote", "set-url", "origin", &auth_url],
                Some(&bare),
                PROBE_TIMEOUT,
            )
            .await?;
            return Ok(bare);
        }

        tokio::fs::create_dir_all(bare.parent().unwrap())
            .await
            .map_err(DeltacovError::Io)?;
        info!(url, "cloning bare mirror");
        run_git(
            &[
                "clone",
                "--bare",
                &auth_url,
                bare.to_str().expect("non-utf8 repo cache path"),
            ],
            None,
            CLONE_TIMEOUT,
        )
        .await?;
        Ok(bare)
    }

    /// §4.C operation 2. Probes for the commit object; fetches it directly
    /// on a miss, then falls back to a full ref fetch and re-probes.
    pub async fn ensure_commit(&self, url: &str, commit: &str) -> Result<()> {
        let bare = self.ensure_bare(url).await?;
        let present = run_git_probe(
            &["cat-file", "-e", &format!("{commit}^{{commit}}")],
            Some(&bare),
            PROBE_TIMEOUT,
        )
        .await?;
        if present {
            return Ok(());
        }

        let auth_url = token::authenticated_url_from_env(url);
        let direct = run_git(
            &["fetch", &auth_url, commit],
            Some(&bare),
            FETCH_COMMIT_TIMEOUT,
        )
        .await;
        if direct.is_ok() {
            return Ok(());
        }
        warn!(url, commit, "direct commit fetch failed, fetching all refs");
        run_git(
            &["fetch", &auth_url, "+refs/*:refs/*"],
            Some(&bare),
            FETCH_ALL_TIMEOUT,
        )
        .await?;

        let present = run_git_probe(
            &["cat-file", "-e", &format!("{commit}^{{commit}}")],
            Some(&bare),
            PROBE_TIMEOUT,
        )
        .await?;
        if !present {
            return Err(DeltacovError::Git(format!(
                "commit {commit} not found in {url} after full fetch"
            )));
        }
        Ok(())
    }

    /// §4.C operation 3. Returns the worktree path once `HEAD` resolves to
    /// `commit`, re-creating it under the per-commit lock otherwise.
    pub async fn ensure_worktree(&self, url: &str, commit: &str) -> Result<PathBuf> {
        let worktree = self.worktree_dir(url, commit);
        if self.worktree_head_matches(&worktree, commit).await {
            return Ok(worktree);
        }

        self.ensure_commit(url, commit).await?;

        let lock_path = self.commit_lock_path(url, commit);
        tokio::fs::create_dir_all(lock_path.parent().unwrap())
            .await
            .map_err(DeltacovError::Io)?;
        let lock_path_owned = lock_path.clone();
        let _lock = tokio::task::spawn_blocking(move || CommitLock::acquire(&lock_path_owned))
            .await
            .expect("lock acquisition task panicked")?;

        // Re-check: another process may have materialized it while we waited.
        if self.worktree_head_matches(&worktree, commit).await {
            return Ok(worktree);
        }

        if worktree.exists() {
            tokio::fs::remove_dir_all(&worktree)
                .await
                .map_err(DeltacovError::Io)?;
        }

        let bare = self.bare_repo_path(url);
        run_git(
            &[
                "worktree",
                "add",
                "--detach",
                worktree.to_str().expect("non-utf8 repo cache path"),
                commit,
            ],
            Some(&bare),
            WORKTREE_TIMEOUT,
        )
        .await?;

        Ok(worktree)
    }

    async fn worktree_head_matches(&self, worktree: &Path, commit: &str) -> bool {
        if !worktree.join("HEAD").exists() && !worktree.is_dir() {
            return false;
        }
        match run_git(
            &["rev-parse", "HEAD"],
            Some(worktree),
            git::PROBE_TIMEOUT,
        )
        .await
        {
            Ok(head) => head == commit,
            Err(_) => false,
        }
    }

    /// §4.C operation 4. Tries `path` verbatim, then with its leading
    /// segment stripped (module-prefix mismatches), then a bounded basename
    /// walk. UTF-8 decoded with malformed bytes tolerated.
    pub fn read_file(&self, url: &str, commit: &str, path: &str) -> Result<String> {
        let worktree = self.worktree_dir(url, commit);

        if let Some(contents) = read_lossy(&worktree.join(path)) {
            return Ok(contents);
        }

        if let Some((_, rest)) = path.split_once('/') {
            if let Some(contents) = read_lossy(&worktree.join(rest)) {
                return Ok(contents);
            }
        }

        let basename = path.rsplit('/').next().unwrap_or(path);
        if let Some(found) = walk_for_basename(&worktree, basename, 0) {
            if let Some(contents) = read_lossy(&found) {
                return Ok(contents);
            }
        }

        Err(DeltacovError::Git(format!(
            "{path} not found in worktree for {url}@{commit}"
        )))
    }
}

fn read_lossy(path: &Path) -> Option<String> {
    let bytes = std::fs::read(path).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

const BASENAME_WALK_MAX_DEPTH: usize = 8;

fn walk_for_basename(dir: &Path, basename: &str, depth: usize) -> Option<PathBuf> {
    if depth > BASENAME_WALK_MAX_DEPTH {
        return None;
    }
    let entries = std::fs::read_dir(dir).ok()?;
    let mut subdirs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.file_name().and_then(|n| n.to_str()) == Some(".git") {
            continue;
        }
        if path.is_dir() {
            subdirs.push(path);
        } else if path.file_name().and_then(|n| n.to_str()) == Some(basename) {
            return Some(path);
        }
    }
    for subdir in subdirs {
        if let Some(found) = walk_for_basename(&subdir, basename, depth + 1) {
            return Some(found);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_path_strips_scheme_and_git_suffix() {
        assert_eq!(
            project_path("https://github.com/owner/name.git"),
            "github.com/owner/name"
        );
    }

    #[test]
    fn project_path_normalizes_ssh_urls_too() {
        assert_eq!(
            project_path("git@github.com:owner/name.git"),
            "github.com/owner/name"
        );
    }

    #[test]
    fn read_file_falls_back_to_stripped_prefix_then_basename_walk() {
        let dir = tempfile::TempDir::new().unwrap();
        let cache = RepoCache::new(dir.path().to_path_buf());
        let worktree = cache.worktree_dir("https://host/o/r.git", "deadbeef");
        std::fs::create_dir_all(worktree.join("nested")).unwrap();
        std::fs::write(worktree.join("nested/f.go"), b"package nested").unwrap();

        // verbatim miss, stripped-prefix miss, basename walk hit
        let contents = cache
            .read_file("https://host/o/r.git", "deadbeef", "modprefix/nested/f.go")
            .unwrap();
        assert_eq!(contents, "package nested");
    }
}
