//! Shared application state for the Axum API server.

use std::sync::Arc;

use collateral_common::config::AppConfig;
use collateral_engine::cutoff::CutoffMonitor;
use collateral_engine::orchestrator::AllocationOrchestrator;
use collateral_engine::sources::{FxSource, MarketDataSource, RulesetSource};
use collateral_ledger::Ledger;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Ledger,
    pub orchestrator: Arc<AllocationOrchestrator>,
    pub cutoff: Arc<CutoffMonitor>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(
        ledger: Ledger,
        rulesets: Arc<dyn RulesetSource>,
        market_data: Arc<dyn MarketDataSource>,
        fx: Arc<dyn FxSource>,
        config: AppConfig,
    ) -> Self {
        let orchestrator = AllocationOrchestrator::new(
            ledger.clone(),
            rulesets,
            market_data,
            fx,
            config.commit_timeout(),
        );
        let cutoff = CutoffMonitor::new(
            ledger.clone(),
            chrono::Duration::hours(config.allocation_cutoff_hours),
            orchestrator.transaction_locks(),
        );

        Self {
            ledger,
            orchestrator: Arc::new(orchestrator),
            cutoff: Arc::new(cutoff),
            config,
        }
    }
}
