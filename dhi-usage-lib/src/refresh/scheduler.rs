use super::orchestrator::{Orchestrator, TriggerOrigin, TriggerOutcome};
use crate::Result;
use crate::catalog::RefreshJob;
use chrono::{DateTime, TimeDelta, Utc};
use core::time::Duration;
use ohno::IntoAppError;
use tokio_cron_scheduler::{Job, JobScheduler};

const LOG_TARGET: &str = " scheduler";

/// Start a cron scheduler that triggers a run on every tick of `schedule`.
///
/// Ticks that land while a run is active are skipped. The caller keeps the returned
/// scheduler alive and shuts it down on exit.
pub async fn start_scheduler(orchestrator: &Orchestrator, schedule: &str) -> Result<JobScheduler> {
    let sched = JobScheduler::new().await.into_app_err("creating refresh scheduler")?;

    let orchestrator = orchestrator.clone();
    let job = Job::new_async(schedule, move |_uuid, _l| {
        let orchestrator = orchestrator.clone();
        Box::pin(async move {
            log::debug!(target: LOG_TARGET, "Refresh schedule fired");
            if let Err(e) = orchestrator.trigger(TriggerOrigin::Scheduled) {
                log::error!(target: LOG_TARGET, "Could not start scheduled refresh: {e}");
            }
        })
    })
    .into_app_err_with(|| format!("invalid refresh schedule '{schedule}'"))?;

    let _ = sched.add(job).await.into_app_err("adding refresh job to scheduler")?;
    sched.start().await.into_app_err("starting refresh scheduler")?;

    log::info!(target: LOG_TARGET, "Scheduled refreshes on '{schedule}'");
    Ok(sched)
}

/// Trigger a run right away if the last completed one is older than `stale_after`, or if
/// there has never been one. Covers missed ticks while the process was down.
pub fn startup_catch_up(orchestrator: &Orchestrator, stale_after: Duration) -> Result<Option<TriggerOutcome>> {
    let last = orchestrator.catalog().last_completed_job()?;

    if !is_stale(last.as_ref(), Utc::now(), stale_after) {
        log::info!(target: LOG_TARGET, "Catalog is fresh, no startup refresh needed");
        return Ok(None);
    }

    match last.and_then(|job| job.completed_at) {
        Some(at) => log::info!(target: LOG_TARGET, "Last refresh completed at {at}, triggering startup refresh"),
        None => log::info!(target: LOG_TARGET, "No completed refresh on record, triggering startup refresh"),
    }

    orchestrator.trigger(TriggerOrigin::Startup).map(Some)
}

fn is_stale(last_completed: Option<&RefreshJob>, now: DateTime<Utc>, stale_after: Duration) -> bool {
    let Some(completed_at) = last_completed.and_then(|job| job.completed_at) else {
        return true;
    };

    let threshold = TimeDelta::from_std(stale_after).unwrap_or(TimeDelta::MAX);
    now.signed_duration_since(completed_at) > threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, JobStatus};
    use crate::github::{Client, DEFAULT_API_VERSION, DEFAULT_QUERIES, Enricher, SearchAggregator, SearchSettings};

    fn idle_orchestrator() -> Orchestrator {
        let client = Client::new("t", "http://127.0.0.1:9", DEFAULT_API_VERSION, Duration::from_secs(1), Duration::ZERO).unwrap();
        Orchestrator::new(
            Catalog::open_in_memory().unwrap(),
            SearchAggregator::new(client.clone(), DEFAULT_QUERIES, SearchSettings::default()),
            Enricher::new(client, Duration::ZERO),
            Duration::from_secs(1),
        )
    }

    fn completed_at(at: DateTime<Utc>) -> RefreshJob {
        RefreshJob {
            id: 1,
            status: JobStatus::Completed,
            started_at: Some(at),
            completed_at: Some(at),
            projects_found: 3,
            error_message: None,
            created_at: at,
        }
    }

    #[test]
    fn test_never_refreshed_is_stale() {
        assert!(is_stale(None, Utc::now(), Duration::from_secs(3600)));
    }

    #[test]
    fn test_staleness_threshold() {
        let now = Utc::now();
        let day = Duration::from_secs(24 * 3600);

        assert!(!is_stale(Some(&completed_at(now - TimeDelta::hours(23))), now, day));
        assert!(!is_stale(Some(&completed_at(now - TimeDelta::hours(24))), now, day));
        assert!(is_stale(Some(&completed_at(now - TimeDelta::hours(25))), now, day));
    }

    #[tokio::test]
    async fn test_invalid_schedule_is_rejected() {
        let orchestrator = idle_orchestrator();
        let Err(err) = start_scheduler(&orchestrator, "not a schedule").await else {
            panic!("schedule should be rejected");
        };
        assert!(err.to_string().contains("invalid refresh schedule"));
    }

    #[tokio::test]
    async fn test_fresh_catalog_skips_startup_refresh() {
        let orchestrator = idle_orchestrator();
        let catalog = orchestrator.catalog();
        let id = catalog.create_job(Utc::now()).unwrap();
        catalog.start_job(id, Utc::now()).unwrap();
        catalog.complete_job(id, 0, Utc::now()).unwrap();

        let outcome = startup_catch_up(&orchestrator, Duration::from_secs(3600)).unwrap();
        assert!(outcome.is_none());
        assert_eq!(catalog.latest_job().unwrap().unwrap().id, id);
    }
}
