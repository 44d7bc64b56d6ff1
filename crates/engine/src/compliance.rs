//! Grades a satisfied plan against the public regulatory ruleset.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;

use collateral_common::types::{CollateralType, ComplianceStatus, Ruleset};

use crate::HUNDRED;
use crate::planner::AllocationPlan;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum ComplianceViolation {
    /// The public table has no entry for the type.
    UnregulatedType { collateral_type: CollateralType },
    /// Selection credited more per unit than regulation allows.
    ValuationAbovePublic {
        security_id: String,
        collateral_type: CollateralType,
        private_effective_value: Decimal,
        public_effective_value: Decimal,
    },
    ConcentrationExceeded {
        collateral_type: CollateralType,
        allocated: Decimal,
        limit: Decimal,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplianceReport {
    pub status: ComplianceStatus,
    pub violations: Vec<ComplianceViolation>,
}

pub struct ComplianceChecker<'a> {
    public: &'a Ruleset,
}

impl<'a> ComplianceChecker<'a> {
    pub fn new(public: &'a Ruleset) -> Self {
        Self { public }
    }

    pub fn check(&self, plan: &AllocationPlan, rqv: Decimal) -> ComplianceReport {
        let mut violations = Vec::new();
        let mut allocated: BTreeMap<&CollateralType, Decimal> = BTreeMap::new();

        for line in &plan.lines {
            *allocated.entry(&line.collateral_type).or_default() += line.value;

            let Some(rule) = self.public.rule(&line.collateral_type) else {
                continue;
            };
            let public_effective_value = line.converted_price * rule.valuation_percentage / HUNDRED;
            if public_effective_value < line.effective_value {
                violations.push(ComplianceViolation::ValuationAbovePublic {
                    security_id: line.security_id.clone(),
                    collateral_type: line.collateral_type.clone(),
                    private_effective_value: line.effective_value,
                    public_effective_value,
                });
            }
        }

        for (collateral_type, allocated) in allocated {
            let Some(rule) = self.public.rule(collateral_type) else {
                violations.push(ComplianceViolation::UnregulatedType {
                    collateral_type: collateral_type.clone(),
                });
                continue;
            };
            let limit = rule.concentration_limit * rqv / HUNDRED;
            if allocated > limit {
                violations.push(ComplianceViolation::ConcentrationExceeded {
                    collateral_type: collateral_type.clone(),
                    allocated,
                    limit,
                });
            }
        }

        let status = if violations.is_empty() {
            ComplianceStatus::Compliant
        } else {
            ComplianceStatus::NonCompliant
        };
        ComplianceReport { status, violations }
    }
}
