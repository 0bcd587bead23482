//! Core entities: [`Report`], [`File`], [`Range`], [`RepoConfig`].
//!
//! Mirrors the logical schema owned by the `migrations/` directory.
//! Timestamps are milliseconds since the Unix epoch, matching the wire
//! format of [`crate::message::CoverageMessage`].

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverageFormat {
    Goc,
    Pyca,
    Jacoco,
}

impl CoverageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoverageFormat::Goc => "goc",
            CoverageFormat::Pyca => "pyca",
            CoverageFormat::Jacoco => "jacoco",
        }
    }

    pub fn parse(s: &str) -> Option<CoverageFormat> {
        match s {
            "goc" => Some(CoverageFormat::Goc),
            "pyca" => Some(CoverageFormat::Pyca),
            "jacoco" => Some(CoverageFormat::Jacoco),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Processing => "processing",
            ReportStatus::Completed => "completed",
            ReportStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<ReportStatus> {
        match s {
            "pending" => Some(ReportStatus::Pending),
            "processing" => Some(ReportStatus::Processing),
            "completed" => Some(ReportStatus::Completed),
            "failed" => Some(ReportStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoType {
    Go,
    Python,
    Java,
}

impl RepoType {
    pub fn from_i64(v: i64) -> Option<RepoType> {
        match v {
            1 => Some(RepoType::Go),
            2 => Some(RepoType::Python),
            3 => Some(RepoType::Java),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> i64 {
        match self {
            RepoType::Go => 1,
            RepoType::Python => 2,
            RepoType::Java => 3,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CiMetadata {
    pub provider: String,
    pub pipeline_id: String,
    pub job_id: String,
}

#[derive(Debug, Clone)]
pub struct Report {
    pub id: i64,
    pub repo_id: String,
    pub repo_name: String,
    pub branch: String,
    pub base_branch: String,
    pub commit: String,
    pub base_commit: String,
    pub ci: CiMetadata,
    pub coverage_format: CoverageFormat,
    pub raw_trace: String,
    pub status: ReportStatus,
    pub error_message: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct File {
    pub id: i64,
    pub repo_id: String,
    pub branch: String,
    pub file_path: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A coverage block. `hit > 0` means the block was executed at least once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start_line: i64,
    pub start_col: i64,
    pub end_line: i64,
    pub end_col: i64,
    pub statements: i64,
    pub hit: i64,
}

#[derive(Debug, Clone)]
pub struct RepoConfig {
    pub repo_id: String,
    pub repo_name: String,
    pub repo_url: String,
    pub repo_type: RepoType,
    pub base_branch: String,
    pub exclude_dirs: Vec<String>,
    pub exclude_files: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl RepoConfig {
    /// `exclude_dirs`/`exclude_files` are persisted as semicolon-delimited
    /// strings; this is the boundary where they become lists.
    pub fn split_list(raw: &str) -> Vec<String> {
        raw.split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }

    pub fn join_list(items: &[String]) -> String {
        items.join(";")
    }

    /// A file is excluded if its path starts with an `exclude_dirs` prefix,
    /// or matches an `exclude_files` pattern (exact trailing segment, or
    /// `*.<suffix>` glob).
    pub fn excludes(&self, file_path: &str) -> bool {
        if self
            .exclude_dirs
            .iter()
            .any(|prefix| file_path.starts_with(prefix.as_str()))
        {
            return true;
        }
        let basename = file_path.rsplit('/').next().unwrap_or(file_path);
        self.exclude_files.iter().any(|pattern| {
            if let Some(suffix) = pattern.strip_prefix("*.") {
                basename.ends_with(suffix) && basename.contains('.')
            } else {
                basename == pattern.as_str() || file_path == pattern.as_str()
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excludes_by_dir_prefix() {
        let cfg = RepoConfig {
            repo_id: "1".into(),
            repo_name: "r".into(),
            repo_url: "u".into(),
            repo_type: RepoType::Go,
            base_branch: "master".into(),
            exclude_dirs: vec!["vendor/".into()],
            exclude_files: vec![],
            created_at: 0,
            updated_at: 0,
        };
        assert!(cfg.excludes("vendor/pkg/a.go"));
        assert!(!cfg.excludes("pkg/a.go"));
    }

    #[test]
    fn excludes_by_file_glob_and_exact() {
        let cfg = RepoConfig {
            repo_id: "1".into(),
            repo_name: "r".into(),
            repo_url: "u".into(),
            repo_type: RepoType::Go,
            base_branch: "master".into(),
            exclude_dirs: vec![],
            exclude_files: vec!["*.pb.go".into(), "config.go".into()],
            created_at: 0,
            updated_at: 0,
        };
        assert!(cfg.excludes("pkg/types.pb.go"));
        assert!(cfg.excludes("pkg/config.go"));
        assert!(!cfg.excludes("pkg/main.go"));
    }

    #[test]
    fn split_and_join_round_trip() {
        let raw = "vendor/ ; third_party/";
        let items = RepoConfig::split_list(raw);
        assert_eq!(items, vec!["vendor/", "third_party/"]);
    }
}
