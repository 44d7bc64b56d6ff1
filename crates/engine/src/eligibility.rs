//! Per-type ceilings on how much of the RQV each collateral type may cover.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;

use collateral_common::AppError;
use collateral_common::types::{CollateralType, Ruleset};

use crate::HUNDRED;

/// Remaining value each collateral type may still contribute.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EligibilityEnvelope(BTreeMap<CollateralType, Decimal>);

impl EligibilityEnvelope {
    /// Ceiling for a type; types outside the envelope have none.
    pub fn ceiling(&self, collateral_type: &CollateralType) -> Decimal {
        self.0.get(collateral_type).copied().unwrap_or(Decimal::ZERO)
    }

    /// Lower the ceiling of a type. Ceilings only ever go down.
    pub fn consume(&mut self, collateral_type: &CollateralType, value: Decimal) {
        if value <= Decimal::ZERO {
            return;
        }
        if let Some(ceiling) = self.0.get_mut(collateral_type) {
            *ceiling -= value;
        }
    }

    pub fn contains(&self, collateral_type: &CollateralType) -> bool {
        self.0.contains_key(collateral_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CollateralType, &Decimal)> {
        self.0.iter()
    }
}

impl FromIterator<(CollateralType, Decimal)> for EligibilityEnvelope {
    fn from_iter<I: IntoIterator<Item = (CollateralType, Decimal)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug)]
pub struct EligibilityCalculator;

impl EligibilityCalculator {
    pub fn new() -> Self {
        Self
    }

    /// `ceiling[type] = rqv * concentration_limit / 100` for every type in
    /// the ruleset, zero-limit types included.
    pub fn envelope(&self, rqv: Decimal, ruleset: &Ruleset) -> Result<EligibilityEnvelope, AppError> {
        if rqv <= Decimal::ZERO {
            return Err(AppError::Validation(format!("RQV must be positive, got {rqv}")));
        }

        Ok(ruleset
            .rules
            .iter()
            .map(|(collateral_type, rule)| {
                (
                    collateral_type.clone(),
                    rqv * rule.concentration_limit / HUNDRED,
                )
            })
            .collect())
    }
}

impl Default for EligibilityCalculator {
    fn default() -> Self {
        Self::new()
    }
}
