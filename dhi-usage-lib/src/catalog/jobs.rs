use super::store::{Catalog, opt_timestamp, timestamp, to_millis};
use crate::Result;
use chrono::{DateTime, Utc};
use core::fmt;
use core::str::FromStr;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ValueRef};
use rusqlite::{OptionalExtension, params};
use serde::Serialize;

const JOB_COLUMNS: &str = "id, status, started_at, completed_at, projects_found, error_message, created_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether the job has reached a final state
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown job status '{other}'")),
        }
    }
}

impl FromSql for JobStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str()?.parse().map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// One ingestion run as recorded in the job log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshJob {
    pub id: i64,
    pub status: JobStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub projects_found: u64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Catalog {
    /// Record a new pending job and return its id
    pub fn create_job(&self, now: DateTime<Utc>) -> Result<i64> {
        let conn = self.conn();
        let _ = conn.execute("INSERT INTO refresh_jobs (status, created_at) VALUES ('pending', ?1)", [to_millis(now)])?;
        Ok(conn.last_insert_rowid())
    }

    pub fn start_job(&self, id: i64, now: DateTime<Utc>) -> Result<()> {
        let _ = self.conn().execute(
            "UPDATE refresh_jobs SET status = 'running', started_at = ?2 WHERE id = ?1",
            params![id, to_millis(now)],
        )?;
        Ok(())
    }

    pub fn complete_job(&self, id: i64, projects_found: u64, now: DateTime<Utc>) -> Result<()> {
        let _ = self.conn().execute(
            "UPDATE refresh_jobs SET status = 'completed', completed_at = ?2, projects_found = ?3 WHERE id = ?1",
            params![id, to_millis(now), projects_found],
        )?;
        Ok(())
    }

    pub fn fail_job(&self, id: i64, message: &str, now: DateTime<Utc>) -> Result<()> {
        let _ = self.conn().execute(
            "UPDATE refresh_jobs SET status = 'failed', completed_at = ?2, error_message = ?3 WHERE id = ?1",
            params![id, to_millis(now), message],
        )?;
        Ok(())
    }

    /// Fail every job still marked running or pending. Returns how many were closed.
    ///
    /// Only meaningful at startup, before any run of this process has begun.
    pub fn fail_abandoned_jobs(&self, message: &str, now: DateTime<Utc>) -> Result<usize> {
        Ok(self.conn().execute(
            "UPDATE refresh_jobs SET status = 'failed', completed_at = ?1, error_message = ?2 \
             WHERE status IN ('pending', 'running')",
            params![to_millis(now), message],
        )?)
    }

    pub fn job(&self, id: i64) -> Result<Option<RefreshJob>> {
        self.query_job(&format!("SELECT {JOB_COLUMNS} FROM refresh_jobs WHERE id = ?1"), Some(id))
    }

    /// The most recently created job, whatever its state
    pub fn latest_job(&self) -> Result<Option<RefreshJob>> {
        self.query_job(&format!("SELECT {JOB_COLUMNS} FROM refresh_jobs ORDER BY id DESC LIMIT 1"), None)
    }

    pub fn running_job(&self) -> Result<Option<RefreshJob>> {
        self.query_job(
            &format!("SELECT {JOB_COLUMNS} FROM refresh_jobs WHERE status = 'running' ORDER BY id DESC LIMIT 1"),
            None,
        )
    }

    pub fn last_completed_job(&self) -> Result<Option<RefreshJob>> {
        self.query_job(
            &format!("SELECT {JOB_COLUMNS} FROM refresh_jobs WHERE status = 'completed' ORDER BY completed_at DESC, id DESC LIMIT 1"),
            None,
        )
    }

    fn query_job(&self, sql: &str, id: Option<i64>) -> Result<Option<RefreshJob>> {
        let conn = self.conn();
        let job = match id {
            Some(id) => conn.query_row(sql, [id], job_from_row),
            None => conn.query_row(sql, [], job_from_row),
        };
        Ok(job.optional()?)
    }
}

fn job_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RefreshJob> {
    Ok(RefreshJob {
        id: row.get(0)?,
        status: row.get(1)?,
        started_at: opt_timestamp(row, 2)?,
        completed_at: opt_timestamp(row, 3)?,
        projects_found: row.get(4)?,
        error_message: row.get(5)?,
        created_at: timestamp(row, 6)?,
    })
}
