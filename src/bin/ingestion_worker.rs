use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use deltacov::config::{init_tracing, WorkerArgs};
use deltacov::repo::RepoCache;
use deltacov::store::{SqliteStore, Store};
use deltacov::worker;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let args = WorkerArgs::parse();
    init_tracing(&args.common.log_level);

    if let Err(e) = run(args).await {
        error!(error = %e, "ingestion worker exited with an error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn run(args: WorkerArgs) -> deltacov::error::Result<()> {
    info!("starting ingestion worker");

    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&args.common.database_url)?);
    let repo_cache = Arc::new(RepoCache::new(args.common.repo_cache_root.clone()));

    let connection = worker::connect(&args.amqp_url).await?;
    let channel = connection.create_channel().await?;
    worker::declare_topology(&channel).await?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received shutdown signal");
            let _ = shutdown_tx.send(true);
        }
    });

    worker::run(channel, store, repo_cache, shutdown_rx).await
}
