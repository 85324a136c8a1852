//! JSON API consumed by the dashboard
//!
//! | Route                     | Method | Purpose                                       |
//! |---------------------------|--------|-----------------------------------------------|
//! | `/api/projects`           | GET    | filtered, sorted, paged project listing       |
//! | `/api/projects/new`       | GET    | projects discovered within `?since=` (`7d`)   |
//! | `/api/stats`              | GET    | catalog totals and `new_this_week`            |
//! | `/api/categories`         | GET    | distinct match categories                     |
//! | `/api/refresh`            | POST   | start a manual refresh                        |
//! | `/api/refresh/status`     | GET    | whether a run is active and the latest job    |
//! | `/api/history`            | GET    | snapshot series, newest first (`?limit=`)     |
//!
//! Malformed query parameters are rejected with `400 Bad Request`.

mod handlers;

use crate::Result;
use crate::refresh::Orchestrator;
use crate::reporting::Reporter;
use axum::Router;
use axum::routing::{get, post};
use ohno::IntoAppError;
use tokio::net::TcpListener;

const LOG_TARGET: &str = "    server";

/// Shared handler state
#[derive(Debug, Clone)]
pub struct AppState {
    reporter: Reporter,
    orchestrator: Orchestrator,
}

impl AppState {
    #[must_use]
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            reporter: Reporter::new(orchestrator.catalog().clone()),
            orchestrator,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/projects", get(handlers::projects))
        .route("/api/projects/new", get(handlers::new_projects))
        .route("/api/stats", get(handlers::stats))
        .route("/api/categories", get(handlers::categories))
        .route("/api/refresh", post(handlers::refresh))
        .route("/api/refresh/status", get(handlers::refresh_status))
        .route("/api/history", get(handlers::history))
        .with_state(state)
}

/// Serve `router` on `listener` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        log::info!(target: LOG_TARGET, "Listening on http://{addr}");
    }

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .into_app_err("serving HTTP API")
}
