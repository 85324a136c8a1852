use super::Host;
use super::common::{Common, CommonArgs, GithubArgs};
use crate::Result;
use crate::refresh::{Orchestrator, start_scheduler, startup_catch_up};
use crate::server::{self, AppState};
use clap::Parser;
use core::time::Duration;
use ohno::IntoAppError;
use std::io::Write;
use tokio::net::TcpListener;

const LOG_TARGET: &str = "     serve";

/// How long shutdown waits for an in-flight run to record its final state
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to listen on, overriding the configuration file
    #[arg(long, value_name = "ADDR")]
    pub listen: Option<String>,

    /// Do not refresh at startup even if the catalog is stale
    #[arg(long)]
    pub no_startup_refresh: bool,

    #[command(flatten)]
    pub github: GithubArgs,

    #[command(flatten)]
    pub common: CommonArgs,
}

pub async fn serve<H: Host>(host: &mut H, args: &ServeArgs) -> Result<()> {
    let common = Common::new(&args.common, true)?;
    let orchestrator = common.orchestrator(&args.github)?;

    // Must precede the first trigger so a live run is never mistaken for an abandoned one
    let _ = orchestrator.recover_abandoned_jobs()?;

    let address = args.listen.as_deref().unwrap_or(&common.config.listen_address);
    let listener = TcpListener::bind(address)
        .await
        .into_app_err_with(|| format!("binding to '{address}'"))?;

    let mut scheduler = start_scheduler(&orchestrator, &common.config.refresh_schedule).await?;

    if !args.no_startup_refresh {
        let _ = startup_catch_up(&orchestrator, common.config.stale_after)?;
    }

    if let Ok(addr) = listener.local_addr() {
        let _ = writeln!(host.output(), "Serving on http://{addr} (Ctrl-C to stop)");
    }

    let result = server::serve(listener, server::router(AppState::new(orchestrator.clone())), shutdown_signal()).await;

    log::info!(target: LOG_TARGET, "Shutting down");
    orchestrator.shutdown();
    if let Err(e) = scheduler.shutdown().await {
        log::warn!(target: LOG_TARGET, "Could not stop refresh scheduler: {e}");
    }
    drain(&orchestrator).await;

    result
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!(target: LOG_TARGET, "Could not listen for Ctrl-C: {e}");
        core::future::pending::<()>().await;
    }
}

/// Wait for a cancelled run to close its job record
async fn drain(orchestrator: &Orchestrator) {
    let wait = async {
        while orchestrator.is_running() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    };

    if tokio::time::timeout(DRAIN_TIMEOUT, wait).await.is_err() {
        log::warn!(target: LOG_TARGET, "Refresh still running after {}s, exiting anyway", DRAIN_TIMEOUT.as_secs());
    }
}
