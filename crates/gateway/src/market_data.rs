//! `GET /MarketData/{securityId}` answers with a JSON array of strings whose
//! first element is the mark-to-market price.

use async_trait::async_trait;
use rust_decimal::Decimal;

use collateral_common::AppError;
use collateral_engine::sources::MarketDataSource;

use crate::client::HttpGateway;

fn parse_price(security_id: &str, quote: &[String]) -> Result<Decimal, AppError> {
    let raw = quote
        .first()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Malformed(format!("empty quote for {security_id}")))?;

    let price: Decimal = raw
        .parse()
        .map_err(|_| AppError::Malformed(format!("price {raw:?} for {security_id} is not a number")))?;
    if price.is_sign_negative() {
        return Err(AppError::Malformed(format!(
            "negative price {price} for {security_id}"
        )));
    }
    Ok(price)
}

#[async_trait]
impl MarketDataSource for HttpGateway {
    async fn price(&self, security_id: &str) -> Result<Decimal, AppError> {
        let url = self.ruleset_url(&["MarketData", security_id])?;
        let quote: Vec<String> = self.get_json("market_data", url).await?;
        parse_price(security_id, &quote)
    }
}
