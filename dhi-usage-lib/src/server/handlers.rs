use super::AppState;
use crate::catalog::{Project, ProjectFilter, Snapshot, SortKey, SortOrder};
use crate::refresh::{RefreshStatus, TriggerOrigin, TriggerOutcome};
use crate::reporting::{ReportError, Summary};
use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use ohno::IntoAppError;
use serde::{Deserialize, Serialize};

const LOG_TARGET: &str = "    server";

const DEFAULT_NEW_WINDOW: &str = "7d";

/// Error body returned by every failing endpoint
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Handler-level failure mapped onto an HTTP status
#[derive(Debug)]
pub(super) struct HandlerError(ReportError);

impl From<ReportError> for HandlerError {
    fn from(e: ReportError) -> Self {
        Self(e)
    }
}

impl From<ohno::AppError> for HandlerError {
    fn from(e: ohno::AppError) -> Self {
        Self(ReportError::Store(e))
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let (status, error) = match self.0 {
            e @ (ReportError::InvalidDuration(_) | ReportError::InvalidFilter(_)) => (StatusCode::BAD_REQUEST, e.to_string()),
            ReportError::Store(e) => {
                log::error!(target: LOG_TARGET, "Request failed: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        (status, Json(ErrorBody { error })).into_response()
    }
}

type HandlerResult<T> = Result<Json<T>, HandlerError>;

/// Catalog access blocks on SQLite, so it runs on the blocking pool
async fn blocking<T, F>(f: F) -> Result<T, HandlerError>
where
    F: FnOnce() -> Result<T, ReportError> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await.into_app_err("request task panicked")??)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct ProjectsParams {
    search: Option<String>,
    category: Option<String>,
    sort: Option<SortKey>,
    order: Option<SortOrder>,
    min_stars: Option<u64>,
    max_stars: Option<u64>,
    limit: Option<u32>,
    offset: Option<u32>,
}

impl From<ProjectsParams> for ProjectFilter {
    fn from(p: ProjectsParams) -> Self {
        Self {
            search: p.search,
            category: p.category,
            min_stars: p.min_stars,
            max_stars: p.max_stars,
            sort: p.sort.unwrap_or_default(),
            order: p.order.unwrap_or_default(),
            limit: p.limit,
            offset: p.offset,
        }
    }
}

pub(super) async fn projects(State(state): State<AppState>, Query(params): Query<ProjectsParams>) -> HandlerResult<Vec<Project>> {
    let filter: ProjectFilter = params.into();
    Ok(Json(blocking(move || state.reporter.projects(&filter)).await?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct NewParams {
    since: Option<String>,
}

pub(super) async fn new_projects(State(state): State<AppState>, Query(params): Query<NewParams>) -> HandlerResult<Vec<Project>> {
    let since = params
        .since
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_NEW_WINDOW.to_string());
    Ok(Json(blocking(move || state.reporter.new_since(&since, Utc::now())).await?))
}

pub(super) async fn stats(State(state): State<AppState>) -> HandlerResult<Summary> {
    Ok(Json(blocking(move || state.reporter.summary(Utc::now())).await?))
}

pub(super) async fn categories(State(state): State<AppState>) -> HandlerResult<Vec<String>> {
    Ok(Json(blocking(move || state.reporter.categories()).await?))
}

#[derive(Debug, Serialize)]
pub(super) struct RefreshResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    job_id: Option<i64>,
    message: &'static str,
}

pub(super) async fn refresh(State(state): State<AppState>) -> HandlerResult<RefreshResponse> {
    let outcome = blocking(move || Ok(state.orchestrator.trigger(TriggerOrigin::Manual)?)).await?;
    let response = match outcome {
        // The run continues detached from this request
        TriggerOutcome::Started { job_id, .. } => RefreshResponse {
            success: true,
            job_id: Some(job_id),
            message: "Refresh started",
        },
        TriggerOutcome::AlreadyRunning => RefreshResponse {
            success: false,
            job_id: None,
            message: "Refresh already in progress",
        },
    };

    Ok(Json(response))
}

pub(super) async fn refresh_status(State(state): State<AppState>) -> HandlerResult<RefreshStatus> {
    Ok(Json(blocking(move || Ok(state.orchestrator.status()?)).await?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct HistoryParams {
    limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct HistoryResponse {
    snapshots: Vec<Snapshot>,
}

pub(super) async fn history(State(state): State<AppState>, Query(params): Query<HistoryParams>) -> HandlerResult<HistoryResponse> {
    let snapshots = blocking(move || state.reporter.history(params.limit)).await?;
    Ok(Json(HistoryResponse { snapshots }))
}
