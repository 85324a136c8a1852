#![doc(hidden)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Core library for dhi-usage
//!
//! Tracks public repositories that reference the `dhi.io` container registry, records when
//! each one adopted it, and serves the resulting catalog.
//!
//! # Module Organization
//!
//! - [`github`]: Rate-limited API client, code search aggregation, and repository enrichment
//! - [`catalog`]: SQLite-backed store of projects, refresh jobs, and snapshots
//! - [`refresh`]: Single-flight refresh runs, scheduling, and startup catch-up
//! - [`reporting`]: Read-only views and input validation over the catalog
//! - [`server`]: JSON API
//! - [`commands`]: Command-line interface and configuration

pub type Result<T, E = ohno::AppError> = core::result::Result<T, E>;

#[cfg(any(debug_assertions, test))]
pub mod catalog;
#[cfg(not(any(debug_assertions, test)))]
mod catalog;

#[cfg(any(debug_assertions, test))]
pub mod commands;
#[cfg(not(any(debug_assertions, test)))]
mod commands;

#[cfg(any(debug_assertions, test))]
pub mod github;
#[cfg(not(any(debug_assertions, test)))]
mod github;

#[cfg(any(debug_assertions, test))]
pub mod refresh;
#[cfg(not(any(debug_assertions, test)))]
mod refresh;

#[cfg(any(debug_assertions, test))]
pub mod reporting;
#[cfg(not(any(debug_assertions, test)))]
mod reporting;

#[cfg(any(debug_assertions, test))]
pub mod server;
#[cfg(not(any(debug_assertions, test)))]
mod server;

pub use crate::commands::{Host, run};
