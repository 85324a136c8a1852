//! Command-line interface for dhi-usage
//!
//! `run` parses the arguments with clap and routes to one handler per subcommand:
//!
//! - **serve**: recover jobs a crashed process left running, start the refresh schedule,
//!   catch up if the catalog is stale, and serve the JSON API until Ctrl-C
//! - **refresh**: run one refresh in the foreground and report the job's final state
//! - **list**, **new**, **stats**, **history**, **categories**, **status**: read-only views over
//!   the catalog, printed as text or, with `--json`, as JSON
//! - **init**: write the default configuration file
//!
//! Every handler writes through [`Host`] so it can be driven in-process by tests.
//! Configuration is a TOML file; the GitHub token only ever comes from the command line or
//! the `GITHUB_TOKEN` environment variable.

mod common;
mod config;
mod host;
mod init;
mod query;
mod refresh;
mod run;
mod serve;

#[cfg(debug_assertions)]
pub use config::Config;

pub use common::{CommonArgs, GithubArgs, LogLevel};
pub use host::Host;
pub use init::{InitArgs, init_config};
pub use query::{
    CategoriesArgs, HistoryArgs, ListArgs, NewArgs, StatsArgs, StatusArgs, list_categories, list_new, list_projects, show_history, show_stats,
    show_status,
};
pub use refresh::{RefreshArgs, refresh_once};
pub use run::run;
pub use serve::{ServeArgs, serve};
