use super::run_lock::RunLock;
use super::single_flight::{FlightGuard, SingleFlight};
use crate::Result;
use crate::catalog::{Catalog, JobStatus, ProjectUpsert, RefreshJob};
use crate::github::{EnrichError, EnrichedRepo, Enricher, SearchAggregator, SearchFailure, SearchOutcome, pause};
use chrono::Utc;
use core::fmt;
use core::time::Duration;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const LOG_TARGET: &str = "   refresh";

/// Written to jobs left running by a previous process
pub const ABANDONED_JOB_MESSAGE: &str = "interrupted by process restart";

/// What asked for a run. Only affects logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOrigin {
    Manual,
    Scheduled,
    Startup,
}

impl fmt::Display for TriggerOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Manual => "manual",
            Self::Scheduled => "scheduled",
            Self::Startup => "startup",
        })
    }
}

#[derive(Debug)]
pub enum TriggerOutcome {
    /// A job was created and its run spawned. The handle resolves to the job's terminal state.
    Started { job_id: i64, handle: JoinHandle<JobStatus> },

    /// Another run, in this process or another one, is active; no job was created
    AlreadyRunning,
}

/// Exclusive right to run, released when the run's job is final
#[derive(Debug)]
struct RunClaim {
    _flight: FlightGuard,
    _lock: Option<RunLock>,
}

/// Why a run did not complete
#[derive(Debug)]
pub enum RunError {
    Search(SearchFailure),
    Cancelled,
    TimedOut(Duration),
    Store(ohno::AppError),
    Panicked,
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Search(failure) => write!(f, "{failure}"),
            Self::Cancelled => write!(f, "refresh cancelled"),
            Self::TimedOut(limit) => write!(f, "refresh timed out after {}s", limit.as_secs()),
            Self::Store(e) => write!(f, "catalog error: {e}"),
            Self::Panicked => write!(f, "refresh task panicked"),
        }
    }
}

impl core::error::Error for RunError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Search(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Snapshot of the orchestrator for status displays
#[derive(Debug, Clone, Serialize)]
pub struct RefreshStatus {
    pub is_running: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_job: Option<RefreshJob>,
}

/// Starts refresh runs and owns every job-record transition.
///
/// At most one run is active per catalog file, across processes. Clones share state.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    catalog: Catalog,
    search: SearchAggregator,
    enricher: Enricher,
    flight: SingleFlight,
    run_timeout: Duration,
    shutdown: CancellationToken,
}

impl Orchestrator {
    #[must_use]
    pub fn new(catalog: Catalog, search: SearchAggregator, enricher: Enricher, run_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                catalog,
                search,
                enricher,
                flight: SingleFlight::new(),
                run_timeout,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.flight.is_running()
    }

    pub fn status(&self) -> Result<RefreshStatus> {
        Ok(RefreshStatus {
            is_running: self.is_running(),
            last_job: self.inner.catalog.latest_job()?,
        })
    }

    /// Close out jobs a crashed process left behind. Call before the first trigger.
    ///
    /// Does nothing while another process holds the run lock, since its job is live.
    pub fn recover_abandoned_jobs(&self) -> Result<usize> {
        let Some(_claim) = self.claim()? else {
            log::info!(target: LOG_TARGET, "A refresh is active elsewhere, leaving its job alone");
            return Ok(0);
        };

        let closed = self.inner.catalog.fail_abandoned_jobs(ABANDONED_JOB_MESSAGE, Utc::now())?;
        if closed > 0 {
            log::warn!(target: LOG_TARGET, "Marked {closed} abandoned refresh job(s) as failed");
        }
        Ok(closed)
    }

    /// Cancel any active run and refuse to start new ones
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    /// Start a run in the background unless one is already active.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn trigger(&self, origin: TriggerOrigin) -> Result<TriggerOutcome> {
        let Some(claim) = self.claim()? else {
            match origin {
                TriggerOrigin::Manual => log::info!(target: LOG_TARGET, "Refresh already in progress, declining {origin} trigger"),
                TriggerOrigin::Scheduled | TriggerOrigin::Startup => {
                    log::info!(target: LOG_TARGET, "Refresh already in progress, skipping {origin} refresh");
                }
            }
            return Ok(TriggerOutcome::AlreadyRunning);
        };

        if self.inner.shutdown.is_cancelled() {
            ohno::bail!("shutting down, not starting a {origin} refresh");
        }

        // The claim is dropped on error, releasing both locks
        let job_id = self.inner.catalog.create_job(Utc::now())?;
        log::info!(target: LOG_TARGET, "Starting {origin} refresh (job {job_id})");

        let this = self.clone();
        let handle = tokio::spawn(async move {
            let runner = this.clone();
            this.execute(job_id, origin, claim, move |token| async move { runner.run(&token).await })
                .await
        });

        Ok(TriggerOutcome::Started { job_id, handle })
    }

    /// Take the in-process flag, then the catalog's run lock
    fn claim(&self) -> Result<Option<RunClaim>> {
        let Some(flight) = self.inner.flight.try_acquire() else {
            return Ok(None);
        };

        let lock = match self.inner.catalog.path() {
            Some(path) => match RunLock::try_acquire(path)? {
                Some(lock) => Some(lock),
                None => return Ok(None),
            },
            None => None,
        };

        Ok(Some(RunClaim {
            _flight: flight,
            _lock: lock,
        }))
    }

    /// Drive one job to a terminal state. The claim is held until the job row is final.
    async fn execute<F, Fut>(self, job_id: i64, origin: TriggerOrigin, _claim: RunClaim, body: F) -> JobStatus
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<u64, RunError>> + Send + 'static,
    {
        let catalog = &self.inner.catalog;
        if let Err(e) = catalog.call(move |c| c.start_job(job_id, Utc::now())).await {
            log::error!(target: LOG_TARGET, "Could not mark job {job_id} running: {e}");
        }

        let result = self.supervise(body).await;

        let now = Utc::now();
        match result {
            Ok(found) => {
                if let Err(e) = catalog.call(move |c| c.complete_job(job_id, found, now)).await {
                    log::error!(target: LOG_TARGET, "Could not mark job {job_id} completed: {e}");
                    return self.close_failed(job_id, format!("could not record completion: {e}")).await;
                }

                match catalog.call(move |c| c.record_snapshot(now)).await {
                    Ok(snapshot) => log::info!(
                        target: LOG_TARGET,
                        "Recorded snapshot: {} projects, {} stars",
                        snapshot.total_projects,
                        snapshot.total_stars
                    ),
                    Err(e) => log::error!(target: LOG_TARGET, "Could not record snapshot: {e}"),
                }

                log::info!(target: LOG_TARGET, "{origin} refresh completed (job {job_id}): {found} projects updated");
                JobStatus::Completed
            }

            Err(e) => {
                log::error!(target: LOG_TARGET, "{origin} refresh failed (job {job_id}): {e}");
                self.close_failed(job_id, e.to_string()).await
            }
        }
    }

    async fn close_failed(&self, job_id: i64, message: String) -> JobStatus {
        match self.inner.catalog.call(move |c| c.fail_job(job_id, &message, Utc::now())).await {
            Ok(()) => JobStatus::Failed,
            Err(e) => {
                log::error!(target: LOG_TARGET, "Could not mark job {job_id} failed: {e}");
                JobStatus::Running
            }
        }
    }

    /// Run `body` in its own task so a panic is contained, bounded by the run timeout
    async fn supervise<F, Fut>(&self, body: F) -> Result<u64, RunError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<u64, RunError>> + Send + 'static,
    {
        let token = self.inner.shutdown.child_token();
        let timeout = self.inner.run_timeout;

        let mut run = tokio::spawn(body(token.clone()));

        match tokio::time::timeout(timeout, &mut run).await {
            Ok(joined) => joined.unwrap_or_else(|e| {
                log::error!(target: LOG_TARGET, "Refresh task failed: {e}");
                Err(RunError::Panicked)
            }),

            Err(_) => {
                log::warn!(target: LOG_TARGET, "Refresh exceeded {}s, cancelling", timeout.as_secs());
                token.cancel();

                // Let the run observe cancellation so nothing writes after the job is closed
                let _ = run.await;
                Err(RunError::TimedOut(timeout))
            }
        }
    }

    /// Search, then enrich and upsert each hit in turn. Returns the number of projects upserted.
    async fn run(&self, token: &CancellationToken) -> Result<u64, RunError> {
        let hits = match self.inner.search.search_all(token).await {
            Ok(SearchOutcome::Complete(hits)) => hits,
            Ok(SearchOutcome::Cancelled(_)) => return Err(RunError::Cancelled),
            Err(failure) => return Err(RunError::Search(failure)),
        };

        let total = hits.len();
        let mut upserted = 0u64;

        for (index, (full_name, hit)) in hits.iter().enumerate() {
            if index > 0 && !pause(token, self.inner.enricher.repo_delay()).await {
                log::info!(target: LOG_TARGET, "Run cancelled after upserting {upserted} of {total} projects");
                return Err(RunError::Cancelled);
            }

            log::info!(target: LOG_TARGET, "Fetching details for {full_name} ({}/{total})", index + 1);

            let name = full_name.clone();
            let adoption_known = self
                .inner
                .catalog
                .call(move |c| c.adoption_known(&name))
                .await
                .map_err(RunError::Store)?;

            match self.inner.enricher.enrich(full_name, hit, adoption_known, token).await {
                Ok(repo) => {
                    let project = to_upsert(repo);
                    self.inner
                        .catalog
                        .call(move |c| c.upsert_project(&project, Utc::now()))
                        .await
                        .map_err(RunError::Store)?;
                    upserted += 1;
                }
                Err(EnrichError::Cancelled) => {
                    log::info!(target: LOG_TARGET, "Run cancelled after upserting {upserted} of {total} projects");
                    return Err(RunError::Cancelled);
                }
                Err(e) => log::warn!(target: LOG_TARGET, "Skipping '{full_name}' this run: {e}"),
            }
        }

        Ok(upserted)
    }
}

fn to_upsert(repo: EnrichedRepo) -> ProjectUpsert {
    let (adopted_at, adoption_commit_sha, adoption_commit_url) = match repo.adoption {
        Some(a) => (Some(a.adopted_at), Some(a.commit_sha), Some(a.commit_url)),
        None => (None, None, None),
    };

    ProjectUpsert {
        full_name: repo.details.full_name,
        url: repo.details.html_url,
        stars: repo.details.stargazers_count,
        description: repo.details.description,
        language: repo.details.language,
        file_path: repo.hit.file_path,
        file_url: repo.hit.file_url,
        category: repo.hit.category,
        adopted_at,
        adoption_commit_sha,
        adoption_commit_url,
    }
}
