use std::process::ExitCode;

use clap::Parser;
use deltacov::config::{init_tracing, DiffCoverageArgs};
use deltacov::repo::RepoCache;
use deltacov::service::diff_coverage;
use deltacov::store::SqliteStore;
use serde_json::json;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let args = DiffCoverageArgs::parse();
    init_tracing(&args.common.log_level);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "diff coverage computation failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: DiffCoverageArgs) -> deltacov::error::Result<()> {
    info!(report_id = args.report_id, "computing diff coverage");

    let store = SqliteStore::open(&args.common.database_url)?;
    let repo_cache = RepoCache::new(args.common.repo_cache_root.clone());

    let result = diff_coverage(
        &store,
        &repo_cache,
        args.report_id,
        args.base_branch.as_deref(),
    )
    .await?;

    let output = json!({
        "base_commit": result.base_commit,
        "summary": {
            "new_covered": result.summary.new_covered,
            "new_uncovered": result.summary.new_uncovered,
            "rate": result.summary.rate(),
        },
        "files": result.files,
        "overlay": result.overlay,
    });

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
