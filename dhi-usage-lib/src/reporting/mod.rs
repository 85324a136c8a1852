//! Read-only views over the catalog
//!
//! Everything here is a pure read. User-supplied inputs (duration strings, star ranges) are
//! validated up front and rejected with [`ReportError::InvalidDuration`] or
//! [`ReportError::InvalidFilter`], which the HTTP surface maps to `400 Bad Request`.

mod duration;

pub use duration::parse_relative_duration;

use crate::catalog::{Catalog, Project, ProjectFilter, Snapshot, Stats};
use chrono::{DateTime, TimeDelta, Utc};
use core::fmt;
use serde::Serialize;

/// Window used for the "new this week" count
pub const NEW_THIS_WEEK: TimeDelta = TimeDelta::days(7);

/// History length when the caller gives none, or a non-positive one
pub const DEFAULT_HISTORY_LIMIT: u32 = 100;

#[derive(Debug)]
pub enum ReportError {
    InvalidDuration(String),
    InvalidFilter(String),
    Store(ohno::AppError),
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDuration(s) => write!(f, "invalid duration '{s}', use a count followed by h, d or w (e.g. '7d', '1w', '30d')"),
            Self::InvalidFilter(msg) => write!(f, "invalid filter: {msg}"),
            Self::Store(e) => write!(f, "{e}"),
        }
    }
}

impl core::error::Error for ReportError {}

impl From<ohno::AppError> for ReportError {
    fn from(e: ohno::AppError) -> Self {
        Self::Store(e)
    }
}

/// Catalog totals plus the trailing-week discovery count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Summary {
    #[serde(flatten)]
    pub stats: Stats,

    /// Projects first seen by this system in the trailing seven days
    pub new_this_week: u64,
}

#[derive(Debug, Clone)]
pub struct Reporter {
    catalog: Catalog,
}

impl Reporter {
    #[must_use]
    pub const fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }

    pub fn projects(&self, filter: &ProjectFilter) -> Result<Vec<Project>, ReportError> {
        if let (Some(min), Some(max)) = (filter.min_stars, filter.max_stars)
            && min > max
        {
            return Err(ReportError::InvalidFilter(format!("min_stars ({min}) exceeds max_stars ({max})")));
        }

        Ok(self.catalog.list_projects(filter)?)
    }

    pub fn summary(&self, now: DateTime<Utc>) -> Result<Summary, ReportError> {
        Ok(Summary {
            stats: self.catalog.stats()?,
            new_this_week: self.catalog.new_count(now - NEW_THIS_WEEK)?,
        })
    }

    pub fn categories(&self) -> Result<Vec<String>, ReportError> {
        Ok(self.catalog.categories()?)
    }

    /// Projects discovered within `window` (e.g. `7d`) before `now`
    pub fn new_since(&self, window: &str, now: DateTime<Utc>) -> Result<Vec<Project>, ReportError> {
        let window = parse_relative_duration(window)?;
        let window = TimeDelta::from_std(window).map_err(|e| ReportError::InvalidFilter(e.to_string()))?;
        let since = now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC);
        Ok(self.catalog.new_since(since)?)
    }

    /// Most recent snapshots first
    pub fn history(&self, limit: Option<i64>) -> Result<Vec<Snapshot>, ReportError> {
        let limit = limit
            .filter(|&l| l > 0)
            .map_or(DEFAULT_HISTORY_LIMIT, |l| u32::try_from(l).unwrap_or(u32::MAX));
        Ok(self.catalog.snapshots(limit)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ProjectUpsert;

    fn repo(name: &str, stars: u64) -> ProjectUpsert {
        ProjectUpsert {
            full_name: name.to_string(),
            url: format!("https://github.com/{name}"),
            stars,
            description: None,
            language: None,
            file_path: "Dockerfile".into(),
            file_url: format!("https://github.com/{name}/blob/HEAD/Dockerfile"),
            category: "Dockerfiles".into(),
            adopted_at: None,
            adoption_commit_sha: None,
            adoption_commit_url: None,
        }
    }

    #[test]
    fn test_new_this_week_uses_discovery_time() {
        let catalog = Catalog::open_in_memory().unwrap();
        let now = Utc::now();

        // Discovered long ago but adopted recently: not new
        let mut old = repo("old/app", 10);
        old.adopted_at = Some(now - TimeDelta::days(1));
        catalog.upsert_project(&old, now - TimeDelta::days(30)).unwrap();

        // Discovered yesterday but adopted years ago: new
        let mut fresh = repo("fresh/app", 10);
        fresh.adopted_at = Some(now - TimeDelta::days(900));
        catalog.upsert_project(&fresh, now - TimeDelta::days(1)).unwrap();

        let reporter = Reporter::new(catalog);
        let summary = reporter.summary(now).unwrap();
        assert_eq!(summary.stats.total_projects, 2);
        assert_eq!(summary.new_this_week, 1);
    }

    #[test]
    fn test_summary_serializes_flat() {
        let reporter = Reporter::new(Catalog::open_in_memory().unwrap());
        let json = serde_json::to_value(reporter.summary(Utc::now()).unwrap()).unwrap();

        assert_eq!(json["total_projects"], 0);
        assert_eq!(json["total_stars"], 0);
        assert_eq!(json["popular_count"], 0);
        assert_eq!(json["notable_count"], 0);
        assert_eq!(json["new_this_week"], 0);
    }

    #[test]
    fn test_new_since_window() {
        let catalog = Catalog::open_in_memory().unwrap();
        let now = Utc::now();
        catalog.upsert_project(&repo("a/recent", 1), now - TimeDelta::hours(2)).unwrap();
        catalog.upsert_project(&repo("b/older", 1), now - TimeDelta::days(3)).unwrap();

        let reporter = Reporter::new(catalog);
        assert_eq!(reporter.new_since("3h", now).unwrap().len(), 1);
        assert_eq!(reporter.new_since("1w", now).unwrap().len(), 2);
        assert!(matches!(reporter.new_since("xyz", now), Err(ReportError::InvalidDuration(_))));
    }

    #[test]
    fn test_inverted_star_range_is_rejected() {
        let reporter = Reporter::new(Catalog::open_in_memory().unwrap());
        let filter = ProjectFilter {
            min_stars: Some(500),
            max_stars: Some(100),
            ..ProjectFilter::default()
        };
        assert!(matches!(reporter.projects(&filter), Err(ReportError::InvalidFilter(_))));
    }

    #[test]
    fn test_history_limit_defaults() {
        let catalog = Catalog::open_in_memory().unwrap();
        let now = Utc::now();
        for i in 0..3 {
            let _ = catalog.record_snapshot(now + TimeDelta::seconds(i)).unwrap();
        }

        let reporter = Reporter::new(catalog);
        assert_eq!(reporter.history(None).unwrap().len(), 3);
        assert_eq!(reporter.history(Some(0)).unwrap().len(), 3);
        assert_eq!(reporter.history(Some(-5)).unwrap().len(), 3);
        assert_eq!(reporter.history(Some(2)).unwrap().len(), 2);
    }
}
