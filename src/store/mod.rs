//! Typed CRUD over reports, files, ranges, and configs (§4.B).

pub mod models;
pub mod sqlite;

pub use sqlite::SqliteStore;

use std::collections::HashMap;

use crate::error::Result;
use crate::model::{CiMetadata, CoverageFormat, File, Range, Report, RepoConfig};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReportStatistics {
    pub total_statements: i64,
    pub covered_statements: i64,
}

impl ReportStatistics {
    pub fn rate(&self) -> f64 {
        if self.total_statements == 0 {
            0.0
        } else {
            (self.covered_statements as f64 / self.total_statements as f64) * 100.0
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileSummary {
    pub file_path: String,
    pub stats: ReportStatistics,
}

/// Everything the ingestion worker knows about one incoming message before
/// it touches the store (§4.G steps 1-6).
pub struct IngestInput<'a> {
    pub repo_id: &'a str,
    pub repo_name: &'a str,
    pub branch: &'a str,
    pub commit: &'a str,
    pub ci: CiMetadata,
    pub format: CoverageFormat,
    pub raw_trace: &'a str,
    pub blocks: HashMap<String, Vec<Range>>,
    pub default_base_branch: &'a str,
    pub now_ms: i64,
}

pub trait Store: Send + Sync {
    fn get_config(&self, repo_id: &str) -> Result<Option<RepoConfig>>;
    fn upsert_config(&self, config: &RepoConfig) -> Result<()>;

    fn get_report(&self, repo_id: &str, branch: &str) -> Result<Option<Report>>;
    fn get_report_by_id(&self, id: i64) -> Result<Option<Report>>;

    /// §4.B "upsert report" + §3 invariants 1-3: runs entirely inside one
    /// transaction. Creates the Report/File rows on first ingestion for
    /// their key, mutates them otherwise; replaces each touched file's
    /// Range set wholesale.
    fn ingest(&self, input: IngestInput) -> Result<Report>;

    /// Marks a Report `failed` with `error_message`, creating the row if
    /// this is the first ingestion for the key (§4.G step 5).
    fn mark_failed(
        &self,
        repo_id: &str,
        repo_name: &str,
        branch: &str,
        default_base_branch: &str,
        error_message: &str,
        now_ms: i64,
    ) -> Result<()>;

    fn list_files(&self, repo_id: &str, branch: &str) -> Result<Vec<File>>;
    fn list_ranges(&self, file_id: i64) -> Result<Vec<Range>>;

    /// Every Report row, for the worktree-repair tool (§2.1) to scan.
    fn list_all_reports(&self) -> Result<Vec<Report>>;

    /// §3 invariant 6 / §4.H step 7: only writes when the Report's
    /// `base_commit` is currently empty.
    fn set_base_commit_if_empty(&self, report_id: i64, base_commit: &str) -> Result<()>;

    fn report_statistics(
        &self,
        repo_id: &str,
        branch: &str,
        config: &RepoConfig,
    ) -> Result<ReportStatistics>;

    fn file_summary(
        &self,
        repo_id: &str,
        branch: &str,
        file_path: &str,
        config: &RepoConfig,
    ) -> Result<Option<FileSummary>>;
}
