//! Argument groups, logging setup, and wiring shared by every subcommand.

use super::Host;
use super::config::Config;
use crate::Result;
use crate::catalog::Catalog;
use crate::github::{Client, DEFAULT_QUERIES, Enricher, SearchAggregator, SearchSettings};
use crate::refresh::Orchestrator;
use crate::reporting::Reporter;
use camino::Utf8PathBuf;
use clap::{Args, ValueEnum};
use ohno::{IntoAppError, app_err};
use serde::Serialize;
use std::io::Write;

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// No logging output
    None,

    /// Only error messages
    Error,

    /// Warning and error messages
    Warn,

    /// Info, warning, and error messages
    Info,

    /// Debug, info, warning, and error messages
    Debug,

    /// Trace, debug, info, warning, and error messages
    Trace,
}

/// Arguments accepted by every subcommand that touches the catalog
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Path to configuration file (default is `dhi-usage.toml` in the current directory)
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<Utf8PathBuf>,

    /// Path to the catalog database, overriding the configuration file
    #[arg(long, value_name = "PATH")]
    pub database: Option<Utf8PathBuf>,

    /// Set the logging level for diagnostic output [default: warn, or info for `serve`]
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Print machine-readable JSON instead of text
    #[arg(long)]
    pub json: bool,
}

/// Credentials for the GitHub API
#[derive(Args, Debug, Clone)]
pub struct GithubArgs {
    /// GitHub personal access token
    #[arg(long, value_name = "TOKEN", env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,
}

impl GithubArgs {
    fn token(&self) -> Result<&str> {
        self.github_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| app_err!("a GitHub token is required, pass --github-token or set GITHUB_TOKEN"))
    }
}

/// Configuration and output settings resolved from [`CommonArgs`]
#[derive(Debug)]
pub struct Common {
    pub config: Config,
    pub json: bool,
}

impl Common {
    /// Initialize logging and load the configuration.
    ///
    /// `long_running` selects the default log level and turns on timestamps.
    pub fn new(args: &CommonArgs, long_running: bool) -> Result<Self> {
        let default_level = if long_running { LogLevel::Info } else { LogLevel::Warn };
        init_logging(args.log_level.unwrap_or(default_level), long_running);

        let mut config = Config::load(args.config.as_deref())?;
        if let Some(database) = &args.database {
            config.database_path = Some(database.clone());
        }

        Ok(Self { config, json: args.json })
    }

    pub fn open_catalog(&self) -> Result<Catalog> {
        Catalog::open(&self.config.resolve_database_path()?)
    }

    pub fn reporter(&self) -> Result<Reporter> {
        Ok(Reporter::new(self.open_catalog()?))
    }

    /// Build the full ingestion pipeline over the catalog
    pub fn orchestrator(&self, github: &GithubArgs) -> Result<Orchestrator> {
        let config = &self.config;

        let client = Client::new(
            github.token()?,
            &config.api_base_url,
            &config.api_version,
            config.request_timeout,
            config.rate_limit_cooldown,
        )?;

        let settings = SearchSettings {
            page_delay: config.search_page_delay,
            max_rate_limit_retries: config.max_search_rate_limit_retries,
            ..SearchSettings::default()
        };

        Ok(Orchestrator::new(
            self.open_catalog()?,
            SearchAggregator::new(client.clone(), DEFAULT_QUERIES, settings),
            Enricher::new(client, config.repo_delay),
            config.run_timeout,
        ))
    }
}

/// Initialize logger based on log level. `RUST_LOG` takes precedence when set.
fn init_logging(log_level: LogLevel, timestamps: bool) {
    let level = match log_level {
        LogLevel::None => return,
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    };

    let env = env_logger::Env::default().filter_or("RUST_LOG", level);

    let mut builder = env_logger::Builder::from_env(env);
    let _ = builder
        .format_module_path(false)
        .format_target(matches!(log_level, LogLevel::Debug | LogLevel::Trace));

    if !timestamps {
        let _ = builder.format_timestamp(None);
    }

    // A second command in the same process (as in tests) keeps the first logger
    let _ = builder.try_init();
}

/// Write `value` as pretty-printed JSON followed by a newline
pub fn write_json<H: Host, T: Serialize + ?Sized>(host: &mut H, value: &T) -> Result<()> {
    let mut out = host.output();
    serde_json::to_writer_pretty(&mut out, value).into_app_err("writing JSON output")?;
    writeln!(out).into_app_err("writing JSON output")?;
    Ok(())
}
