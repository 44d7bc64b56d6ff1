//! Collateral allocation engine.
//!
//! A run converts holdings into the margin call's currency, values them
//! under the counterparties' private ruleset, checks that eligible
//! collateral covers the required value, plans a priority-ordered draw and
//! grades the result against the public regulatory ruleset before the
//! ledger commit.

pub mod availability;
pub mod compliance;
pub mod conversion;
pub mod cutoff;
pub mod eligibility;
pub mod locks;
pub mod orchestrator;
pub mod planner;
pub mod report;
pub mod rulesets;
pub mod sources;
pub mod valuator;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

/// Percentages in rulesets are expressed out of one hundred.
pub(crate) const HUNDRED: rust_decimal::Decimal = rust_decimal::Decimal::ONE_HUNDRED;
