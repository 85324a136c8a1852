use crate::Result;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use ohno::IntoAppError;
use rusqlite::Connection;
use rusqlite::types::{FromSqlError, Type};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const LOG_TARGET: &str = "   catalog";

/// Bumped whenever a migration is appended to [`MIGRATIONS`]
const SCHEMA_VERSION: i64 = 1;

const MIGRATIONS: &[&str] = &[
    // 1: initial schema
    r"
    CREATE TABLE IF NOT EXISTS projects (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        full_name TEXT NOT NULL UNIQUE,
        url TEXT NOT NULL,
        stars INTEGER NOT NULL DEFAULT 0,
        description TEXT,
        language TEXT,
        file_path TEXT NOT NULL,
        file_url TEXT NOT NULL,
        category TEXT NOT NULL,
        adopted_at INTEGER,
        adoption_commit_sha TEXT,
        adoption_commit_url TEXT,
        first_seen_at INTEGER NOT NULL,
        last_seen_at INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_projects_stars ON projects(stars DESC);
    CREATE INDEX IF NOT EXISTS idx_projects_first_seen ON projects(first_seen_at DESC);
    CREATE INDEX IF NOT EXISTS idx_projects_category ON projects(category);

    CREATE TABLE IF NOT EXISTS refresh_jobs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        status TEXT NOT NULL DEFAULT 'pending',
        started_at INTEGER,
        completed_at INTEGER,
        projects_found INTEGER NOT NULL DEFAULT 0,
        error_message TEXT,
        created_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_refresh_jobs_status ON refresh_jobs(status);

    CREATE TABLE IF NOT EXISTS snapshots (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        recorded_at INTEGER NOT NULL,
        total_projects INTEGER NOT NULL,
        total_stars INTEGER NOT NULL,
        popular_count INTEGER NOT NULL,
        notable_count INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_snapshots_recorded ON snapshots(recorded_at DESC);
    ",
];

/// Durable store for projects, refresh jobs and snapshots.
///
/// Cloning is cheap and every clone shares the same connection. Each statement runs
/// under the connection lock, so every individual write is atomic.
#[derive(Debug, Clone)]
pub struct Catalog {
    conn: Arc<Mutex<Connection>>,
    path: Option<Utf8PathBuf>,
}

impl Catalog {
    /// Open or create the catalog at `path`, creating parent directories as needed.
    pub fn open(path: &Utf8Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_str().is_empty()
        {
            std::fs::create_dir_all(parent).into_app_err_with(|| format!("creating directory '{parent}'"))?;
        }

        let conn = Connection::open(path).into_app_err_with(|| format!("opening catalog '{path}'"))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(core::time::Duration::from_secs(5))?;

        log::debug!(target: LOG_TARGET, "Opened catalog at '{path}'");
        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Open a private catalog that lives only as long as this value
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<Utf8PathBuf>) -> Result<Self> {
        migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Database file backing this catalog, `None` when in memory
    #[must_use]
    pub fn path(&self) -> Option<&Utf8Path> {
        self.path.as_deref()
    }

    /// Run `f` against this catalog on Tokio's blocking pool.
    ///
    /// Statements hold the connection lock and may wait on SQLite's busy timeout, so async
    /// callers go through here rather than touching the catalog from a worker thread.
    pub async fn call<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let catalog = self.clone();
        tokio::task::spawn_blocking(move || f(&catalog))
            .await
            .into_app_err("catalog task panicked")?
    }

    pub(super) fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-statement cannot leave SQLite itself inconsistent
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if version > SCHEMA_VERSION {
        ohno::bail!("catalog schema version {version} is newer than supported version {SCHEMA_VERSION}");
    }

    for (index, sql) in MIGRATIONS.iter().enumerate().skip(usize::try_from(version).unwrap_or(0)) {
        log::debug!(target: LOG_TARGET, "Applying catalog migration {}", index + 1);
        conn.execute_batch(sql).into_app_err_with(|| format!("applying catalog migration {}", index + 1))?;
    }

    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

/// Timestamps are stored as unix milliseconds
pub(super) const fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(super) fn from_millis(idx: usize, millis: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(FromSqlError::OutOfRange(millis))))
}

pub(super) fn timestamp(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    from_millis(idx, row.get(idx)?)
}

pub(super) fn opt_timestamp(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    row.get::<_, Option<i64>>(idx)?.map(|millis| from_millis(idx, millis)).transpose()
}
