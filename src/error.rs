use thiserror::Error;

pub type Result<T, E = DeltacovError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum DeltacovError {
    #[error("sqlite failure: '{0}'")]
    Sqlite(#[from] rusqlite::Error),

    #[error("sqlite migration failure: '{0}'")]
    SqliteMigration(#[from] rusqlite_migration::Error),

    #[error("connection pool failure: '{0}'")]
    Pool(#[from] r2d2::Error),

    #[error("broker failure: '{0}'")]
    Broker(#[from] lapin::Error),

    #[error("malformed message: '{0}'")]
    Json(#[from] serde_json::Error),

    #[error("io error: '{0}'")]
    Io(#[from] std::io::Error),

    #[error("trace parse error: '{0}'")]
    Parser(String),

    #[error("git command failed: '{0}'")]
    Git(String),

    #[error("git command timed out after {0:?}")]
    GitTimeout(std::time::Duration),

    #[error("lock held by another process after {0} attempts")]
    LockContention(u32),

    #[error("report not found: repo_id={repo_id} branch={branch}")]
    ReportNotFound { repo_id: String, branch: String },

    #[error("config not found for repo_id={0}")]
    ConfigNotFound(String),
}

/// Classification used by the ingestion worker to pick a retry branch
/// (§4.G/§7) instead of matching on error variants directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Malformed,
    AdmissionMiss,
    Transient,
    Logical,
}

impl DeltacovError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            DeltacovError::Json(_) => ErrorCategory::Malformed,
            DeltacovError::ConfigNotFound(_) => ErrorCategory::AdmissionMiss,
            DeltacovError::Sqlite(_)
            | DeltacovError::SqliteMigration(_)
            | DeltacovError::Pool(_)
            | DeltacovError::Broker(_)
            | DeltacovError::Io(_)
            | DeltacovError::Git(_)
            | DeltacovError::GitTimeout(_)
            | DeltacovError::LockContention(_) => ErrorCategory::Transient,
            DeltacovError::Parser(_) | DeltacovError::ReportNotFound { .. } => {
                ErrorCategory::Logical
            }
        }
    }
}
