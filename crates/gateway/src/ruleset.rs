//! `GET /securityRuleset/{pledger}/{pledgee}`.
//!
//! The service answers with
//! `{"Security": {type: {"Concentration Limit", "Priority", "Valuation Percentage"}},
//!   "BaseCurrency": "...", "EligibleCurrency": [...]}` where every number is a JSON number.

use std::collections::BTreeMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;

use collateral_common::AppError;
use collateral_common::types::{CollateralRule, CollateralType, Ruleset};
use collateral_engine::sources::RulesetSource;

use crate::client::HttpGateway;

#[derive(Debug, Deserialize)]
struct RulesetBody {
    #[serde(rename = "Security")]
    security: BTreeMap<String, RuleBody>,
    #[serde(rename = "BaseCurrency", default)]
    base_currency: Option<String>,
    #[serde(rename = "EligibleCurrency", default)]
    eligible_currency: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RuleBody {
    #[serde(rename = "Concentration Limit")]
    concentration_limit: Decimal,
    #[serde(rename = "Priority")]
    priority: Decimal,
    #[serde(rename = "Valuation Percentage")]
    valuation_percentage: Decimal,
}

impl TryFrom<RulesetBody> for Ruleset {
    type Error = AppError;

    fn try_from(body: RulesetBody) -> Result<Self, Self::Error> {
        let mut rules = BTreeMap::new();
        for (name, rule) in body.security {
            let priority = rule
                .priority
                .normalize()
                .to_u32()
                .filter(|_| rule.priority.fract().is_zero())
                .ok_or_else(|| {
                    AppError::Malformed(format!(
                        "priority {} for {name} is not a whole non-negative number",
                        rule.priority
                    ))
                })?;
            rules.insert(
                CollateralType::new(name),
                CollateralRule {
                    concentration_limit: rule.concentration_limit,
                    priority,
                    valuation_percentage: rule.valuation_percentage,
                },
            );
        }

        Ok(Ruleset {
            rules,
            base_currency: body.base_currency.filter(|c| !c.is_empty()),
            eligible_currencies: body.eligible_currency.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl RulesetSource for HttpGateway {
    async fn private_ruleset(&self, pledger: &str, pledgee: &str) -> Result<Ruleset, AppError> {
        let url = self.ruleset_url(&["securityRuleset", pledger, pledgee])?;
        let body: RulesetBody = self.get_json("ruleset", url).await?;
        let ruleset = Ruleset::try_from(body)?;

        tracing::debug!(
            pledger,
            pledgee,
            types = ruleset.rules.len(),
            "Fetched private ruleset"
        );
        Ok(ruleset)
    }
}
