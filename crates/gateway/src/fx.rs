//! `GET /latest?base=CUR` in the fixer.io shape `{base, date, rates}`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

use collateral_common::AppError;
use collateral_common::types::RateTable;
use collateral_engine::sources::FxSource;

use crate::client::HttpGateway;

#[derive(Debug, Deserialize)]
struct LatestBody {
    base: String,
    #[serde(default)]
    date: String,
    rates: BTreeMap<String, Decimal>,
}

impl LatestBody {
    fn into_table(self, requested: &str) -> Result<RateTable, AppError> {
        if !self.base.eq_ignore_ascii_case(requested) {
            return Err(AppError::Malformed(format!(
                "asked for {requested} rates, got {}",
                self.base
            )));
        }
        if let Some((currency, rate)) = self.rates.iter().find(|(_, r)| **r <= Decimal::ZERO) {
            return Err(AppError::Malformed(format!(
                "non-positive rate {rate} for {currency}"
            )));
        }

        let mut rates = self.rates;
        rates.insert(requested.to_string(), Decimal::ONE);
        Ok(RateTable {
            base: requested.to_string(),
            date: self.date,
            rates,
        })
    }
}

#[async_trait]
impl FxSource for HttpGateway {
    async fn rates(&self, base: &str) -> Result<RateTable, AppError> {
        let mut url = self.fx_url(&["latest"])?;
        url.query_pairs_mut().append_pair("base", base);

        let body: LatestBody = self.get_json("fx_rates", url).await?;
        let table = body.into_table(base)?;
        tracing::debug!(base, date = %table.date, currencies = table.rates.len(), "Fetched FX rates");
        Ok(table)
    }
}
