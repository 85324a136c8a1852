use super::projects::STATS_SELECT;
use super::store::{Catalog, timestamp, to_millis};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Catalog-wide counts frozen at the end of a successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub id: i64,
    pub recorded_at: DateTime<Utc>,
    pub total_projects: u64,
    pub total_stars: u64,
    pub popular_count: u64,
    pub notable_count: u64,
}

impl Catalog {
    /// Append a snapshot of the current [`Catalog::stats`].
    ///
    /// The counts are computed by the insert itself, so they match the store at that instant.
    pub fn record_snapshot(&self, now: DateTime<Utc>) -> Result<Snapshot> {
        let conn = self.conn();
        let _ = conn.execute(
            &format!(
                "INSERT INTO snapshots (recorded_at, total_projects, total_stars, popular_count, notable_count) \
                 SELECT ?1, * FROM ({STATS_SELECT})"
            ),
            [to_millis(now)],
        )?;

        let id = conn.last_insert_rowid();
        Ok(conn.query_row(
            "SELECT id, recorded_at, total_projects, total_stars, popular_count, notable_count FROM snapshots WHERE id = ?1",
            [id],
            snapshot_from_row,
        )?)
    }

    /// Most recent snapshots first, at most `limit` of them
    pub fn snapshots(&self, limit: u32) -> Result<Vec<Snapshot>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, recorded_at, total_projects, total_stars, popular_count, notable_count \
             FROM snapshots ORDER BY recorded_at DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit], snapshot_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn snapshot_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Snapshot> {
    Ok(Snapshot {
        id: row.get(0)?,
        recorded_at: timestamp(row, 1)?,
        total_projects: row.get(2)?,
        total_stars: row.get(3)?,
        popular_count: row.get(4)?,
        notable_count: row.get(5)?,
    })
}
