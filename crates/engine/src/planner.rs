//! Greedy, priority-ordered selection of collateral against the RQV.
//!
//! Candidates are ordered by private priority (lower first), then by
//! effective value per unit (higher first), then by security id. Each
//! candidate is taken whole when both its type's remaining ceiling and the
//! remaining RQV allow it; otherwise a whole number of units is taken:
//!
//! - RQV binds: `ceil(rqv_left / effective_value)` units
//! - ceiling binds: `floor(ceiling / effective_value)` units, re-derived from
//!   the RQV if that overshoots, and dropped if the re-derived take then
//!   breaks the ceiling
//!
//! The plan is pure data. Nothing is written until the orchestrator commits.

use std::cmp::Ordering;

use rust_decimal::Decimal;
use serde::Serialize;

use collateral_common::types::{CollateralType, Ruleset};

use crate::eligibility::EligibilityEnvelope;
use crate::valuator::ValuedSecurity;

/// Quotients are rounded to this many places before `ceil`/`floor` so that
/// division drift cannot add or drop a unit.
const UNIT_SCALE: u32 = 12;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanLine {
    pub security_id: String,
    pub collateral_type: CollateralType,
    pub quantity: Decimal,
    pub value: Decimal,
    /// Private effective value per unit used for selection.
    pub effective_value: Decimal,
    /// Unit price in the RQV currency.
    pub converted_price: Decimal,
    pub whole: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationPlan {
    pub lines: Vec<PlanLine>,
    pub rqv_left: Decimal,
    pub eligibility_left: EligibilityEnvelope,
}

impl AllocationPlan {
    pub fn is_satisfied(&self) -> bool {
        self.rqv_left <= Decimal::ZERO
    }

    pub fn value_taken(&self) -> Decimal {
        self.lines.iter().map(|line| line.value).sum()
    }

    pub fn quantity_of(&self, security_id: &str) -> Decimal {
        self.lines
            .iter()
            .filter(|line| line.security_id == security_id)
            .map(|line| line.quantity)
            .sum()
    }

    /// Value still missing, zero once satisfied.
    pub fn shortfall(&self) -> Decimal {
        self.rqv_left.max(Decimal::ZERO)
    }
}

pub struct AllocationPlanner<'a> {
    ruleset: &'a Ruleset,
}

impl<'a> AllocationPlanner<'a> {
    pub fn new(ruleset: &'a Ruleset) -> Self {
        Self { ruleset }
    }

    fn priority(&self, security: &ValuedSecurity) -> u32 {
        self.ruleset
            .rule(&security.security.collateral_type)
            .map(|rule| rule.priority)
            .unwrap_or(u32::MAX)
    }

    fn compare(&self, a: &ValuedSecurity, b: &ValuedSecurity) -> Ordering {
        self.priority(a)
            .cmp(&self.priority(b))
            .then_with(|| b.effective_value().cmp(&a.effective_value()))
            .then_with(|| a.security_id().cmp(b.security_id()))
    }

    /// Candidates in selection order.
    pub fn order<'s>(&self, securities: &'s [ValuedSecurity]) -> Vec<&'s ValuedSecurity> {
        let mut ordered: Vec<&ValuedSecurity> = securities.iter().collect();
        ordered.sort_by(|a, b| self.compare(a, b));
        ordered
    }

    pub fn plan(
        &self,
        securities: &[ValuedSecurity],
        mut eligibility_left: EligibilityEnvelope,
        rqv: Decimal,
    ) -> AllocationPlan {
        let mut rqv_left = rqv;
        let mut lines = Vec::new();

        for security in self.order(securities) {
            if rqv_left <= Decimal::ZERO {
                break;
            }

            let collateral_type = &security.security.collateral_type;
            let effective_value = security.effective_value();
            let cap = eligibility_left.ceiling(collateral_type);
            if cap <= Decimal::ZERO || effective_value <= Decimal::ZERO {
                continue;
            }

            let held = security.quantity();
            let total_value = security.total_value();

            let quantity = if total_value <= cap {
                if total_value <= rqv_left {
                    held
                } else {
                    units(rqv_left, effective_value).ceil().min(held)
                }
            } else {
                let mut quantity = units(cap, effective_value).floor().min(held);
                if quantity * effective_value > rqv_left {
                    quantity = units(rqv_left, effective_value).ceil().min(held);
                    if quantity * effective_value > cap {
                        quantity = Decimal::ZERO;
                    }
                }
                quantity
            };

            if quantity <= Decimal::ZERO {
                tracing::debug!(
                    security_id = %security.security_id(),
                    collateral_type = %collateral_type,
                    "Candidate yields no whole units"
                );
                continue;
            }

            let whole = quantity == held;
            let value = if whole {
                total_value
            } else {
                quantity * effective_value
            };

            rqv_left -= value;
            eligibility_left.consume(collateral_type, value);
            lines.push(PlanLine {
                security_id: security.security_id().to_string(),
                collateral_type: collateral_type.clone(),
                quantity,
                value,
                effective_value,
                converted_price: security.converted_price,
                whole,
            });
        }

        AllocationPlan {
            lines,
            rqv_left,
            eligibility_left,
        }
    }
}

fn units(value: Decimal, effective_value: Decimal) -> Decimal {
    (value / effective_value).round_dp(UNIT_SCALE)
}
