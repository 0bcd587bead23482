//! `rusqlite` row-mapping and bulk-insert boilerplate for [`crate::model`]
//! types, following the same `Insertable`/`TryFrom<&Row>` split the rest of
//! this codebase's sqlite layer uses.

use rusqlite::Row;

use crate::error::Result;
use crate::model::{CiMetadata, CoverageFormat, Report, ReportStatus, Range};

/// Takes care of the boilerplate to bulk-insert a model into the database.
/// Implementers provide `TABLE_NAME`, `FIELDS`, and `extend_params`; this
/// trait builds chunked `INSERT` statements sized to stay under SQLite's
/// bound-parameter limit.
pub trait Insertable {
    const TABLE_NAME: &'static str;
    const FIELDS: &'static [&'static str];

    fn extend_params<'a>(&'a self, params: &mut Vec<&'a dyn rusqlite::ToSql>);

    fn maximum_chunk_size(conn: &rusqlite::Connection) -> usize {
        let var_limit = conn.limit(rusqlite::limits::Limit::SQLITE_LIMIT_VARIABLE_NUMBER) as usize;
        (var_limit / Self::FIELDS.len()).max(1)
    }

    fn build_query(rows: usize) -> String {
        let mut query = format!("INSERT INTO {} (", Self::TABLE_NAME);
        let mut placeholder = String::from('(');
        for (i, field) in Self::FIELDS.iter().enumerate() {
            if i > 0 {
                placeholder.push_str(", ");
                query.push_str(", ");
            }
            placeholder.push('?');
            query.push_str(field);
        }
        placeholder.push(')');
        query.push_str(") VALUES ");
        for i in 0..rows {
            if i > 0 {
                query.push_str(", ");
            }
            query.push_str(&placeholder);
        }
        query.push(';');
        query
    }

    fn multi_insert<'a, I>(mut models: I, conn: &rusqlite::Connection) -> Result<()>
    where
        I: Iterator<Item = &'a Self> + ExactSizeIterator,
        Self: 'a,
    {
        let chunk_size = Self::maximum_chunk_size(conn);
        let mut params = Vec::with_capacity(Self::FIELDS.len() * models.len().min(chunk_size));

        if models.len() >= chunk_size {
            let mut chunked_stmt = conn.prepare_cached(&Self::build_query(chunk_size))?;
            while models.len() >= chunk_size {
                for row in models.by_ref().take(chunk_size) {
                    row.extend_params(&mut params);
                }
                chunked_stmt.execute(params.as_slice())?;
                params.clear();
            }
        }

        if models.len() > 0 {
            let mut remainder_stmt = conn.prepare(&Self::build_query(models.len()))?;
            for row in models {
                row.extend_params(&mut params);
            }
            remainder_stmt.execute(params.as_slice())?;
        }

        Ok(())
    }
}

/// A [`Range`] scoped to a specific `file_id`, ready for bulk insert.
pub struct RangeRow {
    pub file_id: i64,
    pub range: Range,
}

impl Insertable for RangeRow {
    const TABLE_NAME: &'static str = "ranges";
    const FIELDS: &'static [&'static str] = &[
        "file_id",
        "start_line",
        "start_col",
        "end_line",
        "end_col",
        "statements",
        "hit",
    ];

    fn extend_params<'a>(&'a self, params: &mut Vec<&'a dyn rusqlite::ToSql>) {
        params.extend(&[
            &self.file_id as &dyn rusqlite::ToSql,
            &self.range.start_line,
            &self.range.start_col,
            &self.range.end_line,
            &self.range.end_col,
            &self.range.statements,
            &self.range.hit,
        ]);
    }
}

pub fn report_from_row(row: &Row) -> rusqlite::Result<Report> {
    let status_str: String = row.get("status")?;
    let format_str: String = row.get("coverage_format")?;
    Ok(Report {
        id: row.get("id")?,
        repo_id: row.get("repo_id")?,
        repo_name: row.get("repo_name")?,
        branch: row.get("branch")?,
        base_branch: row.get("base_branch")?,
        commit: row.get("commit_sha")?,
        base_commit: row.get("base_commit")?,
        ci: CiMetadata {
            provider: row.get("ci_provider")?,
            pipeline_id: row.get("ci_pipeline_id")?,
            job_id: row.get("ci_job_id")?,
        },
        coverage_format: CoverageFormat::parse(&format_str).unwrap_or(CoverageFormat::Goc),
        raw_trace: row.get("raw_trace")?,
        status: ReportStatus::parse(&status_str).unwrap_or(ReportStatus::Pending),
        error_message: row.get("error_message")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub fn range_from_row(row: &Row) -> rusqlite::Result<Range> {
    Ok(Range {
        start_line: row.get("start_line")?,
        start_col: row.get("start_col")?,
        end_line: row.get("end_line")?,
        end_col: row.get("end_col")?,
        statements: row.get("statements")?,
        hit: row.get("hit")?,
    })
}
