//! Pools eligible holdings from both accounts and values them.
//!
//! 1. Drop holdings whose collateral type is not eligible under the ruleset
//! 2. Merge holdings of the same security across accounts, remembering how
//!    much came from each side
//! 3. Convert the market price into the RQV currency and attach the
//!    ruleset's valuation percentage
//!
//! A holding whose currency has no usable rate is left out of the pool and
//! reported, never valued at zero. Every other holding of the same security
//! is left out with it, so the commit never rewrites units it did not pool.

use std::collections::{BTreeMap, HashSet};

use rust_decimal::Decimal;
use serde::Serialize;

use collateral_common::AppError;
use collateral_common::types::{Ruleset, Security};

use crate::HUNDRED;
use crate::conversion::ValuationConverter;

/// A pooled security with its valuation inputs for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValuedSecurity {
    /// Merged record. `quantity` is the pooled quantity across both accounts.
    pub security: Security,
    /// Market price converted into the RQV currency.
    pub converted_price: Decimal,
    pub valuation_percentage: Decimal,
    pub source_quantity: Decimal,
    pub destination_quantity: Decimal,
}

impl ValuedSecurity {
    pub fn security_id(&self) -> &str {
        &self.security.security_id
    }

    pub fn quantity(&self) -> Decimal {
        self.security.quantity
    }

    /// Value credited per unit.
    pub fn effective_value(&self) -> Decimal {
        self.converted_price * self.valuation_percentage / HUNDRED
    }

    pub fn total_value(&self) -> Decimal {
        self.effective_value() * self.security.quantity
    }
}

/// A holding that could not be valued.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnvaluedHolding {
    pub security_id: String,
    pub account_number: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Valuation {
    pub securities: Vec<ValuedSecurity>,
    pub unvalued: Vec<UnvaluedHolding>,
}

impl Valuation {
    pub fn pooled_ids(&self) -> Vec<String> {
        self.securities
            .iter()
            .map(|s| s.security.security_id.clone())
            .collect()
    }
}

pub struct SecurityValuator<'a> {
    ruleset: &'a Ruleset,
    converter: &'a ValuationConverter<'a>,
}

#[derive(Clone, Copy)]
enum Side {
    Source,
    Destination,
}

struct Candidate<'h> {
    side: Side,
    holding: &'h Security,
    valuation_percentage: Decimal,
    converted_price: Result<Decimal, AppError>,
}

impl<'a> SecurityValuator<'a> {
    pub fn new(ruleset: &'a Ruleset, converter: &'a ValuationConverter<'a>) -> Self {
        Self { ruleset, converter }
    }

    /// Pool is ordered by security id, unvalued holdings by id then account.
    pub fn valuate(&self, source: &[Security], destination: &[Security]) -> Valuation {
        let candidates: Vec<Candidate<'_>> = source
            .iter()
            .map(|h| (Side::Source, h))
            .chain(destination.iter().map(|h| (Side::Destination, h)))
            .filter_map(|(side, holding)| {
                let rule = self.ruleset.rule(&holding.collateral_type)?;
                if rule.concentration_limit <= Decimal::ZERO || holding.quantity <= Decimal::ZERO {
                    return None;
                }
                Some(Candidate {
                    side,
                    holding,
                    valuation_percentage: rule.valuation_percentage,
                    converted_price: self
                        .converter
                        .convert(holding.market_price, &holding.currency),
                })
            })
            .collect();

        // One unconvertible holding keeps every holding of that id out of the pool.
        let excluded: HashSet<&str> = candidates
            .iter()
            .filter_map(|c| c.converted_price.is_err().then_some(c.holding))
            .map(|h| h.security_id.as_str())
            .collect();

        let mut pool: BTreeMap<String, ValuedSecurity> = BTreeMap::new();
        let mut unvalued = Vec::new();

        for candidate in candidates {
            let holding = candidate.holding;
            let converted_price = match candidate.converted_price {
                Ok(price) if !excluded.contains(holding.security_id.as_str()) => price,
                outcome => {
                    let reason = match outcome {
                        Err(e) => e.to_string(),
                        Ok(_) => format!(
                            "another holding of {} cannot be valued",
                            holding.security_id
                        ),
                    };
                    tracing::warn!(
                        security_id = %holding.security_id,
                        account = %holding.account_number,
                        currency = %holding.currency,
                        reason = %reason,
                        "Holding left out of allocation pool"
                    );
                    unvalued.push(UnvaluedHolding {
                        security_id: holding.security_id.clone(),
                        account_number: holding.account_number.clone(),
                        reason,
                    });
                    continue;
                }
            };

            let pooled = pool
                .entry(holding.security_id.clone())
                .or_insert_with(|| {
                    let mut security = holding.clone();
                    security.quantity = Decimal::ZERO;
                    security.valuation_percentage = Some(candidate.valuation_percentage);
                    ValuedSecurity {
                        security,
                        converted_price,
                        valuation_percentage: candidate.valuation_percentage,
                        source_quantity: Decimal::ZERO,
                        destination_quantity: Decimal::ZERO,
                    }
                });

            pooled.security.quantity += holding.quantity;
            match candidate.side {
                Side::Source => pooled.source_quantity += holding.quantity,
                Side::Destination => pooled.destination_quantity += holding.quantity,
            }
        }

        unvalued.sort_by(|a, b| {
            (&a.security_id, &a.account_number).cmp(&(&b.security_id, &b.account_number))
        });

        Valuation {
            securities: pool.into_values().collect(),
            unvalued,
        }
    }
}
