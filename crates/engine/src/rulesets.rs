//! The public regulatory ruleset and validation of private rulesets.

use std::sync::LazyLock;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use collateral_common::AppError;
use collateral_common::types::{CollateralRule, Ruleset};

use crate::HUNDRED;

pub const PUBLIC_RULESET_VERSION: &str = "2017.1";

/// Regulatory table every allocation is graded against.
pub static PUBLIC_RULESET: LazyLock<Ruleset> = LazyLock::new(|| {
    let table = [
        ("Govt Securities", dec!(50), 1, dec!(95)),
        ("Govt Securities - Non EU", dec!(10), 2, dec!(93)),
        ("Municipal Securities", dec!(50), 3, dec!(91)),
        ("Municipal Securities - Non EU", dec!(10), 4, dec!(89)),
        ("Corporate Bonds", dec!(10), 5, dec!(88)),
        ("Equities", dec!(10), 6, dec!(85)),
        ("Medium Term Notes", dec!(10), 7, dec!(83)),
    ];

    let mut ruleset = Ruleset::default();
    for (name, concentration_limit, priority, valuation_percentage) in table {
        ruleset.rules.insert(
            name.into(),
            CollateralRule {
                concentration_limit,
                priority,
                valuation_percentage,
            },
        );
    }
    ruleset
});

/// Reject rulesets whose percentages fall outside 0..=100.
///
/// Types unknown to the public table are allowed but logged, since any
/// allocation using them will grade as non-compliant.
pub fn validate_private_ruleset(ruleset: &Ruleset) -> Result<(), AppError> {
    let in_range = |v: Decimal| v >= Decimal::ZERO && v <= HUNDRED;

    for (collateral_type, rule) in &ruleset.rules {
        if !in_range(rule.concentration_limit) {
            return Err(AppError::Malformed(format!(
                "concentration limit {} for {collateral_type} is outside 0..=100",
                rule.concentration_limit
            )));
        }
        if !in_range(rule.valuation_percentage) {
            return Err(AppError::Malformed(format!(
                "valuation percentage {} for {collateral_type} is outside 0..=100",
                rule.valuation_percentage
            )));
        }
        if PUBLIC_RULESET.rule(collateral_type).is_none() {
            tracing::warn!(
                collateral_type = %collateral_type,
                "Private ruleset names a type outside the public table"
            );
        }
    }
    Ok(())
}
