//! Base-commit resolution: merge-base of a base branch and a target commit,
//! falling back to the branch tip (§4.F).

use tracing::warn;

use crate::repo::git::{run_git, REV_PARSE_TIMEOUT};
use crate::repo::RepoCache;

/// Returns the resolved hash, or `None` on total failure (neither
/// merge-base nor branch-tip rev-parse succeeded).
pub async fn resolve_base_commit(
    cache: &RepoCache,
    url: &str,
    base_branch: &str,
    target_commit: &str,
) -> Option<String> {
    cache.ensure_commit(url, target_commit).await.ok()?;
    let bare = cache.bare_repo_path(url);

    let merge_base = run_git(
        &["merge-base", base_branch, target_commit],
        Some(&bare),
        REV_PARSE_TIMEOUT,
    )
    .await;
    if let Ok(hash) = merge_base {
        if !hash.is_empty() {
            return Some(hash);
        }
    }

    warn!(url, base_branch, "merge-base unavailable, falling back to branch tip");
    run_git(
        &["rev-parse", base_branch],
        Some(&bare),
        REV_PARSE_TIMEOUT,
    )
    .await
    .ok()
    .filter(|s| !s.is_empty())
}
