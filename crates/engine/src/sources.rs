//! Remote collaborators an allocation run reads from.

use async_trait::async_trait;
use rust_decimal::Decimal;

use collateral_common::AppError;
use collateral_common::types::{RateTable, Ruleset};

/// Private rulesets negotiated per pledger/pledgee pair.
#[async_trait]
pub trait RulesetSource: Send + Sync {
    async fn private_ruleset(&self, pledger: &str, pledgee: &str) -> Result<Ruleset, AppError>;
}

#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn price(&self, security_id: &str) -> Result<Decimal, AppError>;
}

#[async_trait]
pub trait FxSource: Send + Sync {
    /// Rates quoted against `base`. The table always maps `base` to one.
    async fn rates(&self, base: &str) -> Result<RateTable, AppError>;
}
