//! Transaction lookup.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};

use collateral_common::error::AppError;
use collateral_common::types::Transaction;
use collateral_ledger::DealService;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/transactions/{id}", get(get_transaction))
}

async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Transaction>, AppError> {
    let transaction = state.ledger.get_transaction(&id).await?;
    Ok(Json(transaction))
}
