//! Refresh runs
//!
//! The [`Orchestrator`] is the single entry point for starting an ingestion run. A run moves
//! its job `pending → running → completed | failed`; completion is always followed by a
//! snapshot, failure never is. A process-wide [`SingleFlight`] flag and an advisory lock file
//! beside the catalog keep runs from overlapping, including runs started by separate
//! processes. A manual trigger that finds either held reports "already running" and a
//! scheduled one is skipped, neither creating a job.
//!
//! Each run is bounded by a wall-clock timeout. When it fires the run's cancellation token is
//! cancelled, the run unwinds at its next wait point, and whatever it already upserted stays.
//!
//! Two trigger sources feed the orchestrator: a cron schedule ([`start_scheduler`]) and a
//! one-shot check at startup ([`startup_catch_up`]).

mod orchestrator;
mod run_lock;
mod scheduler;
mod single_flight;

pub use orchestrator::{ABANDONED_JOB_MESSAGE, Orchestrator, RefreshStatus, RunError, TriggerOrigin, TriggerOutcome};
pub use scheduler::{start_scheduler, startup_catch_up};
pub use single_flight::{FlightGuard, SingleFlight};
