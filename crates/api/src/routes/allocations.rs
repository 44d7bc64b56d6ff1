//! Allocation runs.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use collateral_common::error::AppError;
use collateral_engine::orchestrator::AllocationRequest;
use collateral_engine::report::AllocationOutcome;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/allocations", post(start_allocation))
}

/// POST /api/allocations: run the margin call to completion.
///
/// Pending and successful runs both answer 200 with the outcome; the
/// report is attached only on success.
async fn start_allocation(
    State(state): State<AppState>,
    Json(request): Json<AllocationRequest>,
) -> Result<Json<AllocationOutcome>, AppError> {
    let outcome = state.orchestrator.start_allocation(&request).await?;
    Ok(Json(outcome))
}
