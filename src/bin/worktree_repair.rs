//! Scans every report and re-materializes any worktree missing from the
//! cache root, e.g. after the cache volume was pruned or recreated.
//! Grounded in `fix_missing_worktrees.py`.

use std::process::ExitCode;

use clap::Parser;
use deltacov::config::{init_tracing, WorktreeRepairArgs};
use deltacov::repo::RepoCache;
use deltacov::store::{SqliteStore, Store};
use tracing::{error, info, warn};

#[derive(Debug, Default)]
struct Tally {
    repaired: u32,
    skipped: u32,
    failed: u32,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = WorktreeRepairArgs::parse();
    init_tracing(&args.common.log_level);

    match run(args).await {
        Ok(tally) => {
            info!(
                repaired = tally.repaired,
                skipped = tally.skipped,
                failed = tally.failed,
                "worktree repair complete"
            );
            if tally.failed > 0 {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!(error = %e, "worktree repair aborted");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: WorktreeRepairArgs) -> deltacov::error::Result<Tally> {
    let store = SqliteStore::open(&args.common.database_url)?;
    let repo_cache = RepoCache::new(args.common.repo_cache_root.clone());

    let reports = store.list_all_reports()?;
    let mut tally = Tally::default();

    for report in reports {
        let config = match store.get_config(&report.repo_id)? {
            Some(config) => config,
            None => {
                warn!(repo_id = report.repo_id, "no config for report, skipping");
                tally.skipped += 1;
                continue;
            }
        };

        for commit in [report.commit.as_str(), report.base_commit.as_str()] {
            if commit.is_empty() {
                tally.skipped += 1;
                continue;
            }
            match repo_cache.ensure_worktree(&config.repo_url, commit).await {
                Ok(_) => tally.repaired += 1,
                Err(e) => {
                    error!(repo_id = report.repo_id, commit, error = %e, "repair failed");
                    tally.failed += 1;
                }
            }
        }
    }

    Ok(tally)
}
