//! Sums available value per collateral type and caps it by eligibility.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;

use collateral_common::types::CollateralType;

use crate::eligibility::EligibilityEnvelope;
use crate::valuator::ValuedSecurity;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Availability {
    /// Total value of the pooled holdings of each type.
    pub available: BTreeMap<CollateralType, Decimal>,
    /// `min(available, ceiling)` for every type in the envelope.
    pub eligible: EligibilityEnvelope,
    pub available_eligible_collateral: Decimal,
}

impl Availability {
    pub fn covers(&self, rqv: Decimal) -> bool {
        self.available_eligible_collateral >= rqv
    }

    /// Value still missing to cover `rqv`, zero when covered.
    pub fn shortfall(&self, rqv: Decimal) -> Decimal {
        (rqv - self.available_eligible_collateral).max(Decimal::ZERO)
    }
}

#[derive(Debug)]
pub struct AvailabilityAggregator;

impl AvailabilityAggregator {
    pub fn new() -> Self {
        Self
    }

    pub fn aggregate(
        &self,
        securities: &[ValuedSecurity],
        envelope: &EligibilityEnvelope,
    ) -> Availability {
        let mut available: BTreeMap<CollateralType, Decimal> = BTreeMap::new();
        for security in securities {
            *available
                .entry(security.security.collateral_type.clone())
                .or_default() += security.total_value();
        }

        let eligible: EligibilityEnvelope = envelope
            .iter()
            .map(|(collateral_type, ceiling)| {
                let held = available
                    .get(collateral_type)
                    .copied()
                    .unwrap_or(Decimal::ZERO);
                (collateral_type.clone(), held.min(*ceiling))
            })
            .collect();

        let available_eligible_collateral = eligible.iter().map(|(_, value)| *value).sum();

        Availability {
            available,
            eligible,
            available_eligible_collateral,
        }
    }
}

impl Default for AvailabilityAggregator {
    fn default() -> Self {
        Self::new()
    }
}
