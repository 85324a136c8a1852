//! Command dispatch logic for dhi-usage

use super::{
    CategoriesArgs, HistoryArgs, InitArgs, ListArgs, NewArgs, RefreshArgs, ServeArgs, StatsArgs, StatusArgs, init_config, list_categories,
    list_new, list_projects, refresh_once, serve, show_history, show_stats, show_status,
};
use crate::{Host, Result};
use clap::builder::Styles;
use clap::builder::styling::{AnsiColor, Effects};
use clap::{Parser, Subcommand};

const CLAP_STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

#[derive(Parser, Debug)]
#[command(name = "dhi-usage", version, author, long_about = None)]
#[command(about = "Track public repositories that pull images from the dhi.io registry")]
#[command(styles = CLAP_STYLES)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the JSON API and refresh the catalog on a schedule
    Serve(ServeArgs),
    /// Run one refresh now and wait for it to finish
    Refresh(RefreshArgs),
    /// List tracked projects
    List(ListArgs),
    /// Show catalog totals
    Stats(StatsArgs),
    /// List projects discovered recently
    New(NewArgs),
    /// Show recorded snapshots, newest first
    History(HistoryArgs),
    /// List the match categories present in the catalog
    Categories(CategoriesArgs),
    /// Show the most recent refresh job
    Status(StatusArgs),
    /// Generate a default configuration file
    Init(InitArgs),
}

/// Dispatch command-line arguments to the appropriate handler
///
/// This function parses the command-line arguments and executes the corresponding
/// subcommand. It's designed to be called from main.rs with the program arguments.
///
/// # Errors
///
/// Returns an error if command parsing fails or if the executed command fails
pub async fn run<I, T, H>(host: &mut H, args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
    H: Host,
{
    match Cli::parse_from(args).command {
        Command::Serve(args) => serve(host, &args).await,
        Command::Refresh(args) => refresh_once(host, &args).await,
        Command::List(args) => list_projects(host, &args),
        Command::Stats(args) => show_stats(host, &args),
        Command::New(args) => list_new(host, &args),
        Command::History(args) => show_history(host, &args),
        Command::Categories(args) => list_categories(host, &args),
        Command::Status(args) => show_status(host, &args),
        Command::Init(args) => init_config(host, &args),
    }
}
