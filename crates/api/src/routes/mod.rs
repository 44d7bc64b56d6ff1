pub mod accounts;
pub mod allocations;
pub mod health;
pub mod transactions;

use axum::Router;

use crate::state::AppState;

/// Build the complete API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(allocations::router())
        .merge(accounts::router())
        .merge(transactions::router())
        .with_state(state)
}
