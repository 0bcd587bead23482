use std::path::Path;

use include_dir::{include_dir, Dir};
use lazy_static::lazy_static;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use tracing::instrument;

use super::models::{self, Insertable, RangeRow};
use super::{FileSummary, IngestInput, ReportStatistics, Store};
use crate::error::Result;
use crate::model::{File, Range, RepoConfig, RepoType};

static MIGRATIONS_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/migrations");

lazy_static! {
    static ref MIGRATIONS: rusqlite_migration::Migrations<'static> =
        rusqlite_migration::Migrations::from_directory(&MIGRATIONS_DIR).unwrap();
}

pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<SqliteStore> {
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            MIGRATIONS
                .to_latest(conn)
                .map_err(|e| rusqlite::Error::ModuleError(e.to_string()))
        });
        let pool = Pool::builder().max_size(10).build(manager)?;
        Ok(SqliteStore { pool })
    }

    pub fn open_in_memory() -> Result<SqliteStore> {
        let manager = SqliteConnectionManager::memory().with_init(|conn| {
            MIGRATIONS
                .to_latest(conn)
                .map_err(|e| rusqlite::Error::ModuleError(e.to_string()))
        });
        // a pooled in-memory sqlite connection would give every checkout a
        // distinct empty database; tests that need this pin max_size(1).
        let pool = Pool::builder().max_size(1).build(manager)?;
        Ok(SqliteStore { pool })
    }
}

impl Store for SqliteStore {
    fn get_config(&self, repo_id: &str) -> Result<Option<RepoConfig>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare_cached(
            "SELECT repo_id, repo_name, repo_url, repo_type, base_branch, exclude_dirs, \
             exclude_files, created_at, updated_at FROM configs WHERE repo_id = ?1",
        )?;
        let config = stmt
            .query_row(params![repo_id], |row| {
                let repo_type: i64 = row.get(3)?;
                let exclude_dirs: String = row.get(5)?;
                let exclude_files: String = row.get(6)?;
                Ok(RepoConfig {
                    repo_id: row.get(0)?,
                    repo_name: row.get(1)?,
                    repo_url: row.get(2)?,
                    repo_type: RepoType::from_i64(repo_type).unwrap_or(RepoType::Go),
                    base_branch: row.get(4)?,
                    exclude_dirs: RepoConfig::split_list(&exclude_dirs),
                    exclude_files: RepoConfig::split_list(&exclude_files),
                    created_at: row.get(7)?,
                    updated_at: row.get(8)?,
                })
            })
            .optional()?;
        Ok(config)
    }

    fn upsert_config(&self, config: &RepoConfig) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO configs (repo_id, repo_name, repo_url, repo_type, base_branch, \
             exclude_dirs, exclude_files, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8) \
             ON CONFLICT (repo_id) DO UPDATE SET \
             repo_name = excluded.repo_name, repo_url = excluded.repo_url, \
             repo_type = excluded.repo_type, base_branch = excluded.base_branch, \
             exclude_dirs = excluded.exclude_dirs, exclude_files = excluded.exclude_files, \
             updated_at = excluded.updated_at",
            params![
                config.repo_id,
                config.repo_name,
                config.repo_url,
                config.repo_type.as_i64(),
                config.base_branch,
                RepoConfig::join_list(&config.exclude_dirs),
                RepoConfig::join_list(&config.exclude_files),
                config.created_at,
            ],
        )?;
        Ok(())
    }

    fn get_report(&self, repo_id: &str, branch: &str) -> Result<Option<crate::model::Report>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, repo_id, repo_name, branch, base_branch, commit_sha, base_commit, \
             ci_provider, ci_pipeline_id, ci_job_id, coverage_format, raw_trace, status, \
             error_message, created_at, updated_at FROM reports WHERE repo_id = ?1 AND branch = ?2",
        )?;
        Ok(stmt
            .query_row(params![repo_id, branch], |row| models::report_from_row(row))
            .optional()?)
    }

    fn get_report_by_id(&self, id: i64) -> Result<Option<crate::model::Report>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, repo_id, repo_name, branch, base_branch, commit_sha, base_commit, \
             ci_provider, ci_pipeline_id, ci_job_id, coverage_format, raw_trace, status, \
             error_message, created_at, updated_at FROM reports WHERE id = ?1",
        )?;
        Ok(stmt
            .query_row(params![id], |row| models::report_from_row(row))
            .optional()?)
    }

    #[instrument(skip(self, input), fields(repo_id = input.repo_id, branch = input.branch))]
    fn ingest(&self, input: IngestInput) -> Result<crate::model::Report> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        let existing: Option<(i64, i64, String, String)> = tx
            .query_row(
                "SELECT id, created_at, base_commit, base_branch FROM reports \
                 WHERE repo_id = ?1 AND branch = ?2",
                params![input.repo_id, input.branch],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        let report_id = match existing {
            Some((id, _created_at, base_commit, base_branch)) => {
                tx.execute(
                    "UPDATE reports SET repo_name = ?1, commit_sha = ?2, ci_provider = ?3, \
                     ci_pipeline_id = ?4, ci_job_id = ?5, coverage_format = ?6, raw_trace = ?7, \
                     status = 'processing', error_message = '', base_commit = ?8, \
                     base_branch = ?9, updated_at = ?10 WHERE id = ?11",
                    params![
                        input.repo_name,
                        input.commit,
                        input.ci.provider,
                        input.ci.pipeline_id,
                        input.ci.job_id,
                        input.format.as_str(),
                        input.raw_trace,
                        base_commit,
                        if base_branch.is_empty() {
                            input.default_base_branch
                        } else {
                            base_branch.as_str()
                        },
                        input.now_ms,
                        id,
                    ],
                )?;
                id
            }
            None => {
                tx.execute(
                    "INSERT INTO reports (repo_id, repo_name, branch, base_branch, commit_sha, \
                     base_commit, ci_provider, ci_pipeline_id, ci_job_id, coverage_format, \
                     raw_trace, status, error_message, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, '', ?6, ?7, ?8, ?9, ?10, 'processing', '', ?11, ?11)",
                    params![
                        input.repo_id,
                        input.repo_name,
                        input.branch,
                        input.default_base_branch,
                        input.commit,
                        input.ci.provider,
                        input.ci.pipeline_id,
                        input.ci.job_id,
                        input.format.as_str(),
                        input.raw_trace,
                        input.now_ms,
                    ],
                )?;
                tx.last_insert_rowid()
            }
        };

        for (file_path, ranges) in &input.blocks {
            let file_id: Option<i64> = tx
                .query_row(
                    "SELECT id FROM files WHERE repo_id = ?1 AND branch = ?2 AND file_path = ?3",
                    params![input.repo_id, input.branch, file_path],
                    |row| row.get(0),
                )
                .optional()?;

            let file_id = match file_id {
                Some(id) => {
                    tx.execute(
                        "UPDATE files SET updated_at = ?1 WHERE id = ?2",
                        params![input.now_ms, id],
                    )?;
                    id
                }
                None => {
                    tx.execute(
                        "INSERT INTO files (repo_id, branch, file_path, created_at, updated_at) \
                         VALUES (?1, ?2, ?3, ?4, ?4)",
                        params![input.repo_id, input.branch, file_path, input.now_ms],
                    )?;
                    tx.last_insert_rowid()
                }
            };

            tx.execute("DELETE FROM ranges WHERE file_id = ?1", params![file_id])?;
            let rows: Vec<RangeRow> = ranges
                .iter()
                .map(|r| RangeRow {
                    file_id,
                    range: *r,
                })
                .collect();
            if !rows.is_empty() {
                RangeRow::multi_insert(rows.iter(), &tx)?;
            }
        }

        tx.execute(
            "UPDATE reports SET status = 'completed', updated_at = ?1 WHERE id = ?2",
            params![input.now_ms, report_id],
        )?;

        tx.commit()?;
        drop(conn);

        self.get_report_by_id(report_id)
            .map(|r| r.expect("just-ingested report must exist"))
    }

    fn mark_failed(
        &self,
        repo_id: &str,
        repo_name: &str,
        branch: &str,
        default_base_branch: &str,
        error_message: &str,
        now_ms: i64,
    ) -> Result<()> {
        let conn = self.pool.get()?;
        let updated = conn.execute(
            "UPDATE reports SET status = 'failed', error_message = ?1, updated_at = ?2 \
             WHERE repo_id = ?3 AND branch = ?4",
            params![error_message, now_ms, repo_id, branch],
        )?;
        if updated == 0 {
            conn.execute(
                "INSERT INTO reports (repo_id, repo_name, branch, base_branch, commit_sha, \
                 base_commit, ci_provider, ci_pipeline_id, ci_job_id, coverage_format, \
                 raw_trace, status, error_message, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, '', '', '', '', '', 'goc', '', 'failed', ?5, ?6, ?6)",
                params![repo_id, repo_name, branch, default_base_branch, error_message, now_ms],
            )?;
        }
        Ok(())
    }

    fn list_files(&self, repo_id: &str, branch: &str) -> Result<Vec<File>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, repo_id, branch, file_path, created_at, updated_at FROM files \
             WHERE repo_id = ?1 AND branch = ?2",
        )?;
        let files = stmt
            .query_map(params![repo_id, branch], |row| {
                Ok(File {
                    id: row.get(0)?,
                    repo_id: row.get(1)?,
                    branch: row.get(2)?,
                    file_path: row.get(3)?,
                    created_at: row.get(4)?,
                    updated_at: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<File>>>()?;
        Ok(files)
    }

    fn list_ranges(&self, file_id: i64) -> Result<Vec<Range>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare_cached(
            "SELECT start_line, start_col, end_line, end_col, statements, hit FROM ranges \
             WHERE file_id = ?1",
        )?;
        let ranges = stmt
            .query_map(params![file_id], |row| models::range_from_row(row))?
            .collect::<rusqlite::Result<Vec<Range>>>()?;
        Ok(ranges)
    }

    fn list_all_reports(&self) -> Result<Vec<crate::model::Report>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, repo_id, repo_name, branch, base_branch, commit_sha, base_commit, \
             ci_provider, ci_pipeline_id, ci_job_id, coverage_format, raw_trace, status, \
             error_message, created_at, updated_at FROM reports",
        )?;
        let reports = stmt
            .query_map([], |row| models::report_from_row(row))?
            .collect::<rusqlite::Result<Vec<crate::model::Report>>>()?;
        Ok(reports)
    }

    fn set_base_commit_if_empty(&self, report_id: i64, base_commit: &str) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE reports SET base_commit = ?1 WHERE id = ?2 AND base_commit = ''",
            params![base_commit, report_id],
        )?;
        Ok(())
    }

    fn report_statistics(
        &self,
        repo_id: &str,
        branch: &str,
        config: &RepoConfig,
    ) -> Result<ReportStatistics> {
        let files = self.list_files(repo_id, branch)?;
        let mut stats = ReportStatistics::default();
        for file in files {
            if config.excludes(&file.file_path) {
                continue;
            }
            for range in self.list_ranges(file.id)? {
                stats.total_statements += range.statements;
                if range.hit > 0 {
                    stats.covered_statements += range.statements;
                }
            }
        }
        Ok(stats)
    }

    fn file_summary(
        &self,
        repo_id: &str,
        branch: &str,
        file_path: &str,
        config: &RepoConfig,
    ) -> Result<Option<FileSummary>> {
        if config.excludes(file_path) {
            return Ok(None);
        }
        let files = self.list_files(repo_id, branch)?;
        let Some(file) = files.into_iter().find(|f| f.file_path == file_path) else {
            return Ok(None);
        };
        let mut stats = ReportStatistics::default();
        for range in self.list_ranges(file.id)? {
            stats.total_statements += range.statements;
            if range.hit > 0 {
                stats.covered_statements += range.statements;
            }
        }
        Ok(Some(FileSummary {
            file_path: file_path.to_string(),
            stats,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::model::{CiMetadata, CoverageFormat};

    fn sample_input<'a>(blocks: HashMap<String, Vec<Range>>, now_ms: i64) -> IngestInput<'a> {
        IngestInput {
            repo_id: "42",
            repo_name: "o/r",
            branch: "main",
            commit: "abc",
            ci: CiMetadata::default(),
            format: CoverageFormat::Goc,
            raw_trace: "mode: set",
            blocks,
            default_base_branch: "master",
            now_ms,
        }
    }

    fn range(sl: i64, sc: i64, el: i64, ec: i64, statements: i64, hit: i64) -> Range {
        Range {
            start_line: sl,
            start_col: sc,
            end_line: el,
            end_col: ec,
            statements,
            hit,
        }
    }

    #[test]
    fn fresh_ingestion_matches_scenario_one() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut blocks = HashMap::new();
        blocks.insert(
            "m/f.go".to_string(),
            vec![range(1, 1, 2, 2, 3, 1), range(3, 1, 4, 2, 2, 0)],
        );
        let report = store.ingest(sample_input(blocks, 1_000)).unwrap();
        assert_eq!(report.status.as_str(), "completed");
        assert_eq!(report.created_at, 1_000);
        assert_eq!(report.updated_at, 1_000);

        let files = store.list_files("42", "main").unwrap();
        assert_eq!(files.len(), 1);
        let ranges = store.list_ranges(files[0].id).unwrap();
        assert_eq!(ranges.len(), 2);

        let config = RepoConfig {
            repo_id: "42".into(),
            repo_name: "o/r".into(),
            repo_url: "https://host/o/r.git".into(),
            repo_type: RepoType::Go,
            base_branch: "master".into(),
            exclude_dirs: vec![],
            exclude_files: vec![],
            created_at: 0,
            updated_at: 0,
        };
        let stats = store.report_statistics("42", "main", &config).unwrap();
        assert_eq!(stats.total_statements, 5);
        assert_eq!(stats.covered_statements, 3);
        assert_eq!(stats.rate(), 60.0);
    }

    #[test]
    fn reingestion_replaces_ranges_and_preserves_created_at() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut blocks = HashMap::new();
        blocks.insert(
            "m/f.go".to_string(),
            vec![range(1, 1, 2, 2, 3, 1), range(3, 1, 4, 2, 2, 0)],
        );
        store.ingest(sample_input(blocks, 1_000)).unwrap();

        let mut blocks2 = HashMap::new();
        blocks2.insert("m/f.go".to_string(), vec![range(1, 1, 2, 2, 3, 1)]);
        let report2 = store
            .ingest(IngestInput {
                commit: "def",
                ..sample_input(blocks2, 2_000)
            })
            .unwrap();

        assert_eq!(report2.created_at, 1_000);
        assert_eq!(report2.updated_at, 2_000);
        assert_eq!(report2.commit, "def");

        let files = store.list_files("42", "main").unwrap();
        assert_eq!(files.len(), 1);
        let ranges = store.list_ranges(files[0].id).unwrap();
        assert_eq!(ranges.len(), 1);
    }

    #[test]
    fn base_commit_is_only_ever_set_once() {
        let store = SqliteStore::open_in_memory().unwrap();
        let report = store.ingest(sample_input(HashMap::new(), 1_000)).unwrap();
        store.set_base_commit_if_empty(report.id, "base1").unwrap();
        store.set_base_commit_if_empty(report.id, "base2").unwrap();
        let reloaded = store.get_report_by_id(report.id).unwrap().unwrap();
        assert_eq!(reloaded.base_commit, "base1");
    }

    #[test]
    fn admission_miss_leaves_no_config() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.get_config("unknown").unwrap().is_none());
    }

    #[test]
    fn exclude_dirs_are_omitted_from_statistics() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut blocks = HashMap::new();
        blocks.insert("vendor/x.go".to_string(), vec![range(1, 1, 1, 5, 4, 4)]);
        blocks.insert("pkg/a.go".to_string(), vec![range(1, 1, 1, 5, 2, 0)]);
        store.ingest(sample_input(blocks, 1_000)).unwrap();

        let config = RepoConfig {
            repo_id: "42".into(),
            repo_name: "o/r".into(),
            repo_url: "u".into(),
            repo_type: RepoType::Go,
            base_branch: "master".into(),
            exclude_dirs: vec!["vendor/".into()],
            exclude_files: vec![],
            created_at: 0,
            updated_at: 0,
        };
        let stats = store.report_statistics("42", "main", &config).unwrap();
        assert_eq!(stats.total_statements, 2);
        assert_eq!(stats.covered_statements, 0);
    }
}
