//! Currency conversion of market prices into the RQV currency.

use rust_decimal::Decimal;

use collateral_common::AppError;
use collateral_common::types::RateTable;

/// Converts prices quoted in any currency into the margin call's currency.
///
/// Rates in the table are units of a currency per one unit of the target,
/// so a price converts as `price / rate`.
pub struct ValuationConverter<'a> {
    rates: &'a RateTable,
    target_currency: &'a str,
}

impl<'a> ValuationConverter<'a> {
    pub fn new(rates: &'a RateTable, target_currency: &'a str) -> Self {
        Self {
            rates,
            target_currency,
        }
    }

    pub fn target_currency(&self) -> &str {
        self.target_currency
    }

    pub fn convert(&self, price: Decimal, currency: &str) -> Result<Decimal, AppError> {
        if currency == self.target_currency {
            return Ok(price);
        }

        match self.rates.rate(currency) {
            Some(rate) if rate > Decimal::ZERO => Ok(price / rate),
            Some(rate) => Err(AppError::MissingRate(format!(
                "{currency}/{} rate is {rate}",
                self.target_currency
            ))),
            None => Err(AppError::MissingRate(format!(
                "no {currency} rate in {} table of {}",
                self.rates.base, self.rates.date
            ))),
        }
    }
}
