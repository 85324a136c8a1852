use super::store::{Catalog, opt_timestamp, timestamp, to_millis};
use crate::Result;
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, params, params_from_iter};
use serde::{Deserialize, Serialize};

/// Star count at which a project counts as popular
pub const POPULAR_STARS: u64 = 1000;

/// Star count at which a project counts as notable (up to [`POPULAR_STARS`], exclusive)
pub const NOTABLE_STARS: u64 = 100;

const PROJECT_COLUMNS: &str = "id, full_name, url, stars, description, language, file_path, file_url, category, \
     adopted_at, adoption_commit_sha, adoption_commit_url, first_seen_at, last_seen_at, created_at, updated_at";

/// A repository found referencing the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    pub id: i64,
    pub full_name: String,
    pub url: String,
    pub stars: u64,
    pub description: Option<String>,
    pub language: Option<String>,
    pub file_path: String,
    pub file_url: String,
    pub category: String,
    pub adopted_at: Option<DateTime<Utc>>,
    pub adoption_commit_sha: Option<String>,
    pub adoption_commit_url: Option<String>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The fields written by one ingestion pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectUpsert {
    pub full_name: String,
    pub url: String,
    pub stars: u64,
    pub description: Option<String>,
    pub language: Option<String>,
    pub file_path: String,
    pub file_url: String,
    pub category: String,
    pub adopted_at: Option<DateTime<Utc>>,
    pub adoption_commit_sha: Option<String>,
    pub adoption_commit_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Stars,
    Name,
    FirstSeen,
}

impl SortKey {
    const fn column(self) -> &'static str {
        match self {
            Self::Stars => "stars",
            Self::Name => "full_name",
            Self::FirstSeen => "first_seen_at",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    const fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Criteria for [`Catalog::list_projects`]. Unset fields do not constrain the result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectFilter {
    /// Substring matched against the full name and the description
    pub search: Option<String>,
    pub category: Option<String>,
    pub min_stars: Option<u64>,
    pub max_stars: Option<u64>,
    pub sort: SortKey,
    pub order: SortOrder,

    /// Page size; zero means no limit
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Aggregate counts over the whole catalog
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub total_projects: u64,
    pub total_stars: u64,

    /// Projects with at least [`POPULAR_STARS`] stars
    pub popular_count: u64,

    /// Projects with [`NOTABLE_STARS`] up to [`POPULAR_STARS`] stars, exclusive
    pub notable_count: u64,
}

/// SQL projecting [`Stats`] columns over `projects`, shared with snapshot recording
pub(super) const STATS_SELECT: &str = "SELECT COUNT(*), COALESCE(SUM(stars), 0), \
     COALESCE(SUM(CASE WHEN stars >= 1000 THEN 1 ELSE 0 END), 0), \
     COALESCE(SUM(CASE WHEN stars >= 100 AND stars < 1000 THEN 1 ELSE 0 END), 0) \
     FROM projects";

impl Catalog {
    /// Insert or refresh one project.
    ///
    /// On conflict the mutable fields are overwritten and `last_seen_at`/`updated_at` move to `now`.
    /// `first_seen_at` and `created_at` never change, and a recorded adoption is never replaced
    /// or cleared.
    pub fn upsert_project(&self, project: &ProjectUpsert, now: DateTime<Utc>) -> Result<()> {
        let now = to_millis(now);
        let _ = self.conn().execute(
            "INSERT INTO projects (full_name, url, stars, description, language, file_path, file_url, category, \
                 adopted_at, adoption_commit_sha, adoption_commit_url, first_seen_at, last_seen_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12, ?12, ?12)
             ON CONFLICT(full_name) DO UPDATE SET
                 url = excluded.url,
                 stars = excluded.stars,
                 description = excluded.description,
                 language = excluded.language,
                 file_path = excluded.file_path,
                 file_url = excluded.file_url,
                 category = excluded.category,
                 adopted_at = COALESCE(projects.adopted_at, excluded.adopted_at),
                 adoption_commit_sha = COALESCE(projects.adoption_commit_sha, excluded.adoption_commit_sha),
                 adoption_commit_url = COALESCE(projects.adoption_commit_url, excluded.adoption_commit_url),
                 last_seen_at = excluded.last_seen_at,
                 updated_at = excluded.updated_at",
            params![
                project.full_name,
                project.url,
                project.stars,
                project.description,
                project.language,
                project.file_path,
                project.file_url,
                project.category,
                project.adopted_at.map(to_millis),
                project.adoption_commit_sha,
                project.adoption_commit_url,
                now,
            ],
        )?;

        Ok(())
    }

    /// Look up one project by full name
    pub fn project(&self, full_name: &str) -> Result<Option<Project>> {
        let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE full_name = ?1");
        Ok(self.conn().query_row(&sql, [full_name], project_from_row).optional()?)
    }

    /// Whether an adoption timestamp has already been resolved for `full_name`
    pub fn adoption_known(&self, full_name: &str) -> Result<bool> {
        let known: Option<bool> = self
            .conn()
            .query_row("SELECT adopted_at IS NOT NULL FROM projects WHERE full_name = ?1", [full_name], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(known.unwrap_or(false))
    }

    /// Filtered, sorted, paged listing. Ties are broken by full name so paging is stable.
    pub fn list_projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>> {
        let mut sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE 1 = 1");
        let mut args: Vec<Value> = Vec::new();

        if let Some(min) = filter.min_stars {
            sql.push_str(" AND stars >= ?");
            args.push(Value::Integer(clamp_i64(min)));
        }

        if let Some(max) = filter.max_stars {
            sql.push_str(" AND stars <= ?");
            args.push(Value::Integer(clamp_i64(max)));
        }

        if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
            sql.push_str(r" AND (full_name LIKE ? ESCAPE '\' OR description LIKE ? ESCAPE '\')");
            let pattern = format!("%{}%", escape_like(search));
            args.push(Value::Text(pattern.clone()));
            args.push(Value::Text(pattern));
        }

        if let Some(category) = filter.category.as_deref().filter(|s| !s.is_empty()) {
            sql.push_str(" AND category = ?");
            args.push(Value::Text(category.to_string()));
        }

        sql.push_str(&format!(" ORDER BY {} {}", filter.sort.column(), filter.order.keyword()));
        if filter.sort != SortKey::Name {
            sql.push_str(", full_name ASC");
        }

        // SQLite only accepts OFFSET after a LIMIT; -1 means unbounded
        let limit = filter.limit.filter(|&l| l > 0);
        if limit.is_some() || filter.offset.is_some() {
            sql.push_str(" LIMIT ? OFFSET ?");
            args.push(Value::Integer(limit.map_or(-1, i64::from)));
            args.push(Value::Integer(filter.offset.map_or(0, i64::from)));
        }

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args), project_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Distinct match categories present, alphabetically
    pub fn categories(&self) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT DISTINCT category FROM projects WHERE category != '' ORDER BY category")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn stats(&self) -> Result<Stats> {
        Ok(self.conn().query_row(STATS_SELECT, [], stats_from_row)?)
    }

    /// Projects first seen strictly after `since`, newest discovery first
    pub fn new_since(&self, since: DateTime<Utc>) -> Result<Vec<Project>> {
        let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE first_seen_at > ?1 ORDER BY first_seen_at DESC, full_name ASC");
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([to_millis(since)], project_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Number of projects [`Catalog::new_since`] would return
    pub fn new_count(&self, since: DateTime<Utc>) -> Result<u64> {
        Ok(self
            .conn()
            .query_row("SELECT COUNT(*) FROM projects WHERE first_seen_at > ?1", [to_millis(since)], |row| row.get(0))?)
    }
}

pub(super) fn stats_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Stats> {
    Ok(Stats {
        total_projects: row.get(0)?,
        total_stars: row.get(1)?,
        popular_count: row.get(2)?,
        notable_count: row.get(3)?,
    })
}

fn project_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        full_name: row.get(1)?,
        url: row.get(2)?,
        stars: row.get(3)?,
        description: row.get(4)?,
        language: row.get(5)?,
        file_path: row.get(6)?,
        file_url: row.get(7)?,
        category: row.get(8)?,
        adopted_at: opt_timestamp(row, 9)?,
        adoption_commit_sha: row.get(10)?,
        adoption_commit_url: row.get(11)?,
        first_seen_at: timestamp(row, 12)?,
        last_seen_at: timestamp(row, 13)?,
        created_at: timestamp(row, 14)?,
        updated_at: timestamp(row, 15)?,
    })
}

fn clamp_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
