use super::Host;
use super::common::{Common, CommonArgs, GithubArgs, write_json};
use super::query::write_job;
use crate::Result;
use crate::catalog::JobStatus;
use crate::refresh::{TriggerOrigin, TriggerOutcome};
use clap::Parser;
use ohno::{IntoAppError, app_err};
use std::io::Write;

const LOG_TARGET: &str = "   refresh";

#[derive(Parser, Debug)]
pub struct RefreshArgs {
    #[command(flatten)]
    pub github: GithubArgs,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Run one refresh in the foreground and report how it ended.
///
/// Exits with status 1 if the job did not complete. Ctrl-C cancels the run, which is then
/// recorded as failed.
pub async fn refresh_once<H: Host>(host: &mut H, args: &RefreshArgs) -> Result<()> {
    let common = Common::new(&args.common, false)?;
    let orchestrator = common.orchestrator(&args.github)?;

    let TriggerOutcome::Started { job_id, mut handle } = orchestrator.trigger(TriggerOrigin::Manual)? else {
        ohno::bail!("a refresh is already in progress");
    };

    let _ = writeln!(host.error(), "Refreshing catalog (job {job_id})...");

    let joined = tokio::select! {
        joined = &mut handle => joined,
        _ = tokio::signal::ctrl_c() => {
            log::warn!(target: LOG_TARGET, "Interrupted, cancelling refresh");
            orchestrator.shutdown();
            handle.await
        }
    };
    let status = joined.into_app_err("waiting for refresh to finish")?;

    let job = orchestrator
        .catalog()
        .job(job_id)?
        .ok_or_else(|| app_err!("refresh job {job_id} disappeared from the catalog"))?;

    if common.json {
        write_json(host, &job)?;
    } else {
        write_job(&mut host.output(), &job)?;
    }

    if status != JobStatus::Completed {
        host.exit(1);
    }

    Ok(())
}
