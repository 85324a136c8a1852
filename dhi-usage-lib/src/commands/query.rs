//! Read-only commands over the catalog

use super::Host;
use super::common::{Common, CommonArgs, write_json};
use crate::Result;
use crate::catalog::{Project, ProjectFilter, RefreshJob, SortKey, SortOrder};
use crate::refresh::RefreshStatus;
use crate::reporting::DEFAULT_HISTORY_LIMIT;
use chrono::{DateTime, Utc};
use clap::Parser;
use ohno::IntoAppError;
use std::io::Write;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M UTC";

#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Only projects whose name or description contains this text
    #[arg(long, value_name = "TEXT")]
    pub search: Option<String>,

    /// Only projects in this match category
    #[arg(long, value_name = "NAME")]
    pub category: Option<String>,

    /// Only projects with at least this many stars
    #[arg(long, value_name = "N")]
    pub min_stars: Option<u64>,

    /// Only projects with at most this many stars
    #[arg(long, value_name = "N")]
    pub max_stars: Option<u64>,

    #[arg(long, value_name = "KEY", default_value = "stars")]
    pub sort: SortKey,

    #[arg(long, value_name = "ORDER", default_value = "desc")]
    pub order: SortOrder,

    /// Maximum number of projects to show
    #[arg(long, value_name = "N")]
    pub limit: Option<u32>,

    /// Number of projects to skip
    #[arg(long, value_name = "N")]
    pub offset: Option<u32>,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Parser, Debug)]
pub struct StatsArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Parser, Debug)]
pub struct NewArgs {
    /// How far back to look, e.g. `24h`, `7d`, `2w`
    #[arg(long, value_name = "DURATION", default_value = "7d")]
    pub since: String,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Parser, Debug)]
pub struct HistoryArgs {
    /// Number of snapshots to show
    #[arg(long, value_name = "N", default_value_t = i64::from(DEFAULT_HISTORY_LIMIT), allow_negative_numbers = true)]
    pub limit: i64,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Parser, Debug)]
pub struct CategoriesArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Parser, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

pub fn list_projects<H: Host>(host: &mut H, args: &ListArgs) -> Result<()> {
    let common = Common::new(&args.common, false)?;
    let filter = ProjectFilter {
        search: args.search.clone(),
        category: args.category.clone(),
        min_stars: args.min_stars,
        max_stars: args.max_stars,
        sort: args.sort,
        order: args.order,
        limit: args.limit,
        offset: args.offset,
    };

    let projects = common.reporter()?.projects(&filter)?;
    print_projects(host, &common, &projects)
}

pub fn list_new<H: Host>(host: &mut H, args: &NewArgs) -> Result<()> {
    let common = Common::new(&args.common, false)?;
    let projects = common.reporter()?.new_since(&args.since, Utc::now())?;
    print_projects(host, &common, &projects)
}

pub fn show_stats<H: Host>(host: &mut H, args: &StatsArgs) -> Result<()> {
    let common = Common::new(&args.common, false)?;
    let summary = common.reporter()?.summary(Utc::now())?;

    if common.json {
        return write_json(host, &summary);
    }

    let mut out = host.output();
    writeln!(out, "Projects:        {}", summary.stats.total_projects).into_app_err("writing output")?;
    writeln!(out, "Total stars:     {}", summary.stats.total_stars).into_app_err("writing output")?;
    writeln!(out, "Popular (1000+): {}", summary.stats.popular_count).into_app_err("writing output")?;
    writeln!(out, "Notable (100+):  {}", summary.stats.notable_count).into_app_err("writing output")?;
    writeln!(out, "New this week:   {}", summary.new_this_week).into_app_err("writing output")?;
    Ok(())
}

pub fn show_history<H: Host>(host: &mut H, args: &HistoryArgs) -> Result<()> {
    let common = Common::new(&args.common, false)?;
    let snapshots = common.reporter()?.history(Some(args.limit))?;

    if common.json {
        return write_json(host, &snapshots);
    }

    let mut out = host.output();
    if snapshots.is_empty() {
        writeln!(out, "No snapshots recorded yet").into_app_err("writing output")?;
        return Ok(());
    }

    for s in &snapshots {
        writeln!(
            out,
            "{}  {:>6} projects  {:>9} stars  {:>4} popular  {:>4} notable",
            s.recorded_at.format(TIME_FORMAT),
            s.total_projects,
            s.total_stars,
            s.popular_count,
            s.notable_count
        )
        .into_app_err("writing output")?;
    }

    Ok(())
}

pub fn list_categories<H: Host>(host: &mut H, args: &CategoriesArgs) -> Result<()> {
    let common = Common::new(&args.common, false)?;
    let categories = common.reporter()?.categories()?;

    if common.json {
        return write_json(host, &categories);
    }

    let mut out = host.output();
    for category in &categories {
        writeln!(out, "{category}").into_app_err("writing output")?;
    }

    Ok(())
}

/// Reports the latest job from the store. A run in another process shows up as a `running` job.
pub fn show_status<H: Host>(host: &mut H, args: &StatusArgs) -> Result<()> {
    let common = Common::new(&args.common, false)?;
    let catalog = common.open_catalog()?;
    let status = RefreshStatus {
        is_running: catalog.running_job()?.is_some(),
        last_job: catalog.latest_job()?,
    };

    if common.json {
        return write_json(host, &status);
    }

    let mut out = host.output();
    match &status.last_job {
        Some(job) => write_job(&mut out, job)?,
        None => writeln!(out, "No refresh has run yet").into_app_err("writing output")?,
    }

    Ok(())
}

/// One-line summary of a job, shared with the `refresh` command
pub(super) fn write_job(out: &mut impl Write, job: &RefreshJob) -> Result<()> {
    let when = job.completed_at.or(job.started_at).unwrap_or(job.created_at);
    write!(out, "Job {} {} at {}", job.id, job.status, when.format(TIME_FORMAT)).into_app_err("writing output")?;

    if let Some(error) = &job.error_message {
        writeln!(out, ": {error}").into_app_err("writing output")?;
    } else {
        writeln!(out, ", {} projects updated", job.projects_found).into_app_err("writing output")?;
    }

    Ok(())
}

fn print_projects<H: Host>(host: &mut H, common: &Common, projects: &[Project]) -> Result<()> {
    if common.json {
        return write_json(host, projects);
    }

    let mut out = host.output();
    if projects.is_empty() {
        writeln!(out, "No matching projects").into_app_err("writing output")?;
        return Ok(());
    }

    for p in projects {
        writeln!(
            out,
            "{:>7}  {:<40}  {:<12}  first seen {}",
            p.stars,
            p.full_name,
            p.category,
            date(p.first_seen_at)
        )
        .into_app_err("writing output")?;
    }

    Ok(())
}

fn date(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}
