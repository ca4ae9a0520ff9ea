//! Axum route handlers for the Pipeline API.

use std::collections::BTreeMap;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::history::PipelineStatistics;
use super::run::{PipelineRun, RunRequest, RunSummary};
use super::PipelineError;
use crate::collection::SearchParams;
use crate::errors::AppError;
use crate::models::analysis::ScoreDimension;
use crate::scoring::ScoreWeights;
use crate::state::AppState;

const DEFAULT_HISTORY_LIMIT: usize = 10;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub job_id: Uuid,
    #[serde(default)]
    pub search_params: SearchParams,
    pub max_candidates: usize,
    /// Per-dimension overrides; unlisted dimensions keep their default weight.
    #[serde(default)]
    pub weights: Option<BTreeMap<ScoreDimension, f64>>,
    #[serde(default)]
    pub force_reanalysis: bool,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub run_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ControlResponse {
    /// False when the run was not in a state the command applies to.
    pub accepted: bool,
    pub run: Option<PipelineRun>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub runs: Vec<RunSummary>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/pipeline/start
///
/// Starts a run for a stored job. Returns as soon as the run is accepted;
/// progress is read back through `/status`.
pub async fn handle_start(
    State(state): State<AppState>,
    Json(request): Json<StartRequest>,
) -> Result<Json<StartResponse>, AppError> {
    let job = state
        .store
        .get_job(request.job_id)
        .await?
        .ok_or(PipelineError::JobNotFound(request.job_id))?;

    let weights = request
        .weights
        .as_ref()
        .map(ScoreWeights::with_overrides)
        .unwrap_or_default();

    let handle = state.orchestrator.start(
        job,
        RunRequest {
            search_params: request.search_params,
            max_candidates: request.max_candidates,
            weights,
            force_reanalysis: request.force_reanalysis,
        },
    )?;

    Ok(Json(StartResponse {
        run_id: handle.run_id,
    }))
}

/// GET /api/v1/pipeline/status
pub async fn handle_status(State(state): State<AppState>) -> Result<Json<PipelineRun>, AppError> {
    state
        .orchestrator
        .status()
        .map(Json)
        .ok_or_else(|| AppError::NotFound("No pipeline run has been started".to_string()))
}

/// POST /api/v1/pipeline/pause
pub async fn handle_pause(State(state): State<AppState>) -> Json<ControlResponse> {
    let accepted = state.orchestrator.pause();
    Json(ControlResponse {
        accepted,
        run: state.orchestrator.status(),
    })
}

/// POST /api/v1/pipeline/resume
pub async fn handle_resume(State(state): State<AppState>) -> Json<ControlResponse> {
    let accepted = state.orchestrator.resume();
    Json(ControlResponse {
        accepted,
        run: state.orchestrator.status(),
    })
}

/// POST /api/v1/pipeline/cancel
pub async fn handle_cancel(State(state): State<AppState>) -> Json<ControlResponse> {
    let accepted = state.orchestrator.cancel();
    Json(ControlResponse {
        accepted,
        run: state.orchestrator.status(),
    })
}

/// GET /api/v1/pipeline/history?limit=N
pub async fn handle_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<HistoryResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    Json(HistoryResponse {
        runs: state.orchestrator.history(limit),
    })
}

/// GET /api/v1/pipeline/statistics
pub async fn handle_statistics(State(state): State<AppState>) -> Json<PipelineStatistics> {
    Json(state.orchestrator.statistics())
}
