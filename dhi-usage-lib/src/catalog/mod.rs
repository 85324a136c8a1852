//! Durable catalog of discovered projects
//!
//! A single SQLite database holds three tables:
//!
//! - `projects`: one row per repository, keyed by full name. Rows are upserted on every run
//!   that re-matches them and are never deleted by ingestion; a repository that stops matching
//!   simply goes stale. First-seen and adoption fields are write-once.
//! - `refresh_jobs`: the job log, moving `pending → running → completed | failed`.
//! - `snapshots`: append-only aggregate counts, one per successful run.
//!
//! Timestamps are stored as UTC unix milliseconds.

mod jobs;
mod projects;
mod snapshots;
mod store;

pub use jobs::{JobStatus, RefreshJob};
pub use projects::{NOTABLE_STARS, POPULAR_STARS, Project, ProjectFilter, ProjectUpsert, SortKey, SortOrder, Stats};
pub use snapshots::Snapshot;
pub use store::Catalog;
