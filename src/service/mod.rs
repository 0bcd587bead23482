//! Orchestrates base-commit resolution, diffing, coverage indexing, and
//! overlay generation for one report (§4.H).

pub mod overlay;

use tracing::warn;

use crate::coverage::{summarize, merge_diff_and_coverage, CoverageIndex, DiffCoverageFile, DiffCoverageSummary};
use crate::error::{DeltacovError, Result};
use crate::parsers::diff::parse_unified_diff;
use crate::paths::{reconcile, scan_go_modules, ModuleMap};
use crate::repo::git::{run_git, DIFF_TIMEOUT};
use crate::repo::RepoCache;
use crate::resolver::resolve_base_commit;
use crate::store::Store;
use overlay::{build_overlay, OverlayPayload};

pub struct DiffCoverageResult {
    pub files: Vec<DiffCoverageFile>,
    pub summary: DiffCoverageSummary,
    pub overlay: OverlayPayload,
    pub base_commit: String,
}

impl DiffCoverageResult {
    fn empty() -> DiffCoverageResult {
        DiffCoverageResult {
            files: Vec::new(),
            summary: DiffCoverageSummary::default(),
            overlay: OverlayPayload::default(),
            base_commit: String::new(),
        }
    }
}

/// §4.H. `base_branch_override` lets a caller compute incremental coverage
/// against a branch other than the Report's stored `base_branch`.
pub async fn diff_coverage(
    store: &dyn Store,
    repo_cache: &RepoCache,
    report_id: i64,
    base_branch_override: Option<&str>,
) -> Result<DiffCoverageResult> {
    let Some(report) = store.get_report_by_id(report_id)? else {
        return Err(DeltacovError::ReportNotFound {
            repo_id: String::new(),
            branch: String::new(),
        });
    };
    let Some(config) = store.get_config(&report.repo_id)? else {
        return Err(DeltacovError::ConfigNotFound(report.repo_id.clone()));
    };

    let effective_base_branch = base_branch_override.unwrap_or(&report.base_branch);

    let Some(base_commit) = resolve_base_commit(
        repo_cache,
        &config.repo_url,
        effective_base_branch,
        &report.commit,
    )
    .await
    else {
        warn!(repo_id = report.repo_id, "base commit could not be resolved, returning empty diff");
        return Ok(DiffCoverageResult::empty());
    };

    // Target materialization failure is a hard error: the diff cannot be
    // computed at all without it.
    let target_worktree = repo_cache
        .ensure_worktree(&config.repo_url, &report.commit)
        .await
        .map_err(|e| DeltacovError::Git(format!("target materialization failed: {e}")))?;

    // Base materialization is best-effort; the diff is still computable
    // from the bare mirror if it fails.
    if let Err(e) = repo_cache.ensure_worktree(&config.repo_url, &base_commit).await {
        warn!(error = %e, base_commit, "base worktree materialization failed, continuing from bare mirror");
    }

    let bare = repo_cache.bare_repo_path(&config.repo_url);
    let diff_range = format!("{base_commit}...{}", report.commit);
    let diff_text = match run_git(
        &["diff", "-U0", "-M", &diff_range],
        Some(&bare),
        DIFF_TIMEOUT,
    )
    .await
    {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "diff computation failed, returning empty result");
            return Ok(DiffCoverageResult::empty());
        }
    };

    let module_map: ModuleMap = scan_go_modules(&target_worktree);

    let diff_files = parse_unified_diff(&diff_text);
    let stored_files = store.list_files(&report.repo_id, &report.branch)?;

    let mut result_files = Vec::new();
    for diff_file in &diff_files {
        let Some(stored) = stored_files
            .iter()
            .find(|f| reconcile(&f.file_path, &diff_file.path, &module_map))
        else {
            continue;
        };
        let ranges = store.list_ranges(stored.id)?;
        let index = CoverageIndex::build(&ranges);
        let lines = merge_diff_and_coverage(&diff_file.added_lines, &index);
        if !lines.is_empty() {
            result_files.push(DiffCoverageFile {
                path: diff_file.path.clone(),
                lines,
            });
        }
    }

    let summary = summarize(&result_files);
    let overlay = build_overlay(&result_files);

    // Step 7: opportunistic persistence, only if currently empty.
    store.set_base_commit_if_empty(report.id, &base_commit)?;

    Ok(DiffCoverageResult {
        files: result_files,
        summary,
        overlay,
        base_commit,
    })
}
