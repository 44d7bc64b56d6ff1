//! Account change notifications.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use collateral_common::error::AppError;
use collateral_common::types::Role;
use collateral_engine::cutoff::StatusTransition;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/accounts/updated", post(account_updated))
}

#[derive(Debug, Deserialize)]
pub struct AccountUpdated {
    pub account_name: String,
    pub role: Role,
    /// When the update happened; defaults to receipt time.
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct AccountUpdatedResponse {
    pub account_name: String,
    pub role: Role,
    pub evaluated_at: DateTime<Utc>,
    pub transitions: Vec<StatusTransition>,
}

/// POST /api/accounts/updated: re-evaluate the party's pending allocations.
async fn account_updated(
    State(state): State<AppState>,
    Json(update): Json<AccountUpdated>,
) -> Result<Json<AccountUpdatedResponse>, AppError> {
    if update.account_name.trim().is_empty() {
        return Err(AppError::Validation(
            "account_name must not be empty".to_string(),
        ));
    }

    let evaluated_at = update.timestamp.unwrap_or_else(Utc::now);
    let transitions = state
        .cutoff
        .account_updated(&update.account_name, update.role, evaluated_at)
        .await?;

    Ok(Json(AccountUpdatedResponse {
        account_name: update.account_name,
        role: update.role,
        evaluated_at,
        transitions,
    }))
}
