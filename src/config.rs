//! Typed, `env`-overridable configuration shared by every binary (§1.1),
//! in place of the source's hardcoded module-level constants.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Clone, Parser)]
pub struct CommonArgs {
    /// Path to the SQLite database file backing the relational store.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: PathBuf,

    /// Root directory for the bare-mirror + worktree cache (§4.C).
    #[arg(long, env = "REPO_CACHE_ROOT")]
    pub repo_cache_root: PathBuf,

    /// `RUST_LOG`-style filter string for `tracing-subscriber`.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Clone, Parser)]
pub struct WorkerArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// AMQP connection URI for the broker consumer.
    #[arg(long, env = "AMQP_URL")]
    pub amqp_url: String,
}

#[derive(Debug, Clone, Parser)]
pub struct DiffCoverageArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Report id to compute incremental coverage for.
    #[arg(long)]
    pub report_id: i64,

    /// Overrides the Report's stored `base_branch` for this computation.
    #[arg(long)]
    pub base_branch: Option<String>,
}

#[derive(Debug, Clone, Parser)]
pub struct WorktreeRepairArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
