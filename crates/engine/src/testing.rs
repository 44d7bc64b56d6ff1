//! Fixtures and in-process collaborators for tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use tokio::sync::Notify;

use collateral_common::AppError;
use collateral_common::types::{
    Account, AccountType, AllocationStatus, CollateralRule, ComplianceStatus, Deal, RateTable,
    Ruleset, Security, Transaction, TransactionStatus,
};
use collateral_ledger::{Ledger, MemoryStore};

use crate::sources::{FxSource, MarketDataSource, RulesetSource};
use crate::valuator::ValuedSecurity;

pub const PLEDGER: &str = "Bank A";
pub const PLEDGEE: &str = "Bank B";
pub const SOURCE: &str = "LB-1";
pub const DESTINATION: &str = "SG-1";
pub const DEAL: &str = "D1";

/// Ruleset from `(type, concentration limit, priority, valuation %)` rows.
pub fn ruleset(rows: &[(&str, Decimal, u32, Decimal)]) -> Ruleset {
    let mut ruleset = Ruleset::default();
    for &(name, concentration_limit, priority, valuation_percentage) in rows {
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
}

pub fn rates(base: &str, rows: &[(&str, Decimal)]) -> RateTable {
    RateTable {
        base: base.to_string(),
        date: "2017-06-01".to_string(),
        rates: rows
            .iter()
            .map(|(currency, rate)| (currency.to_string(), *rate))
            .collect::<BTreeMap<_, _>>(),
    }
}

pub fn holding(
    account: &str,
    security_id: &str,
    collateral_type: &str,
    quantity: Decimal,
    market_price: Decimal,
    currency: &str,
) -> Security {
    Security {
        security_id: security_id.to_string(),
        account_number: account.to_string(),
        name: format!("{security_id} {collateral_type}"),
        security_type: "Bond".to_string(),
        collateral_type: collateral_type.into(),
        quantity,
        market_price,
        currency: currency.to_string(),
        valuation_percentage: None,
    }
}

/// A pooled security held entirely at the source.
pub fn valued(
    security_id: &str,
    collateral_type: &str,
    quantity: Decimal,
    converted_price: Decimal,
    valuation_percentage: Decimal,
) -> ValuedSecurity {
    let mut security = holding(
        SOURCE,
        security_id,
        collateral_type,
        quantity,
        converted_price,
        "EUR",
    );
    security.valuation_percentage = Some(valuation_percentage);
    ValuedSecurity {
        security,
        converted_price,
        valuation_percentage,
        source_quantity: quantity,
        destination_quantity: Decimal::ZERO,
    }
}

pub fn make_transaction(transaction_id: &str, rqv: Decimal) -> Transaction {
    let at = Utc
        .with_ymd_and_hms(2017, 6, 2, 9, 0, 0)
        .single()
        .unwrap_or_default();
    Transaction {
        transaction_id: transaction_id.to_string(),
        deal_id: DEAL.to_string(),
        pledger: PLEDGER.to_string(),
        pledgee: PLEDGEE.to_string(),
        transaction_date: at,
        margin_call_at: at,
        rqv,
        currency: "EUR".to_string(),
        allocation_status: AllocationStatus::NotStarted,
        transaction_status: TransactionStatus::Matched,
        compliance_status: ComplianceStatus::NotAssessed,
        shortfall: Decimal::ZERO,
        conversion_rates: None,
    }
}

fn make_account(number: &str, account_type: AccountType, owner: &str) -> Account {
    Account {
        account_number: number.to_string(),
        account_name: format!("{owner} {number}"),
        account_type,
        owner: owner.to_string(),
        currency: "EUR".to_string(),
        securities: Vec::new(),
    }
}

/// In-memory ledger holding deal `D1` plus the pledger's longbox `LB-1`
/// and the pledgee's segregated account `SG-1`, both empty.
pub async fn seeded_ledger() -> (Ledger, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let ledger = Ledger::new(store.clone());

    let seeded = async {
        ledger
            .create_account(&make_account(SOURCE, AccountType::Longbox, PLEDGER))
            .await?;
        ledger
            .create_account(&make_account(DESTINATION, AccountType::Segregated, PLEDGEE))
            .await?;
        ledger
            .create_deal(&Deal {
                deal_id: DEAL.to_string(),
                pledger: PLEDGER.to_string(),
                pledgee: PLEDGEE.to_string(),
                issue_date: Utc::now(),
                last_successful_allocation: None,
                transactions: Vec::new(),
            })
            .await
    };
    if let Err(e) = seeded.await {
        panic!("seeding in-memory ledger failed: {e}");
    }

    (ledger, store)
}

/// Serves one fixed ruleset, or fails every call when built `unavailable`.
pub struct StaticRulesets {
    ruleset: Option<Ruleset>,
}

impl StaticRulesets {
    pub fn new(ruleset: Ruleset) -> Self {
        Self {
            ruleset: Some(ruleset),
        }
    }

    pub fn unavailable() -> Self {
        Self { ruleset: None }
    }
}

#[async_trait]
impl RulesetSource for StaticRulesets {
    async fn private_ruleset(&self, pledger: &str, pledgee: &str) -> Result<Ruleset, AppError> {
        self.ruleset.clone().ok_or_else(|| {
            AppError::Unavailable(format!("ruleset service down for {pledger}/{pledgee}"))
        })
    }
}

/// Holds every ruleset lookup until [`GatedRulesets::release`] is called.
pub struct GatedRulesets {
    ruleset: Option<Ruleset>,
    entered: Notify,
    release: Notify,
}

impl GatedRulesets {
    pub fn new(ruleset: Option<Ruleset>) -> Self {
        Self {
            ruleset,
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    /// Resolves once a lookup is parked at the gate.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl RulesetSource for GatedRulesets {
    async fn private_ruleset(&self, pledger: &str, pledgee: &str) -> Result<Ruleset, AppError> {
        self.entered.notify_one();
        self.release.notified().await;
        self.ruleset.clone().ok_or_else(|| {
            AppError::Unavailable(format!("ruleset service down for {pledger}/{pledgee}"))
        })
    }
}

/// Fixed prices; unknown ids fail as unavailable. Records every lookup.
#[derive(Default)]
pub struct StaticPrices {
    prices: HashMap<String, Decimal>,
    lookups: Mutex<Vec<String>>,
}

impl StaticPrices {
    pub fn new(prices: &[(&str, Decimal)]) -> Self {
        Self {
            prices: prices
                .iter()
                .map(|(id, price)| (id.to_string(), *price))
                .collect(),
            lookups: Mutex::new(Vec::new()),
        }
    }

    pub fn lookups(&self) -> Vec<String> {
        self.lookups
            .lock()
            .map(|l| l.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl MarketDataSource for StaticPrices {
    async fn price(&self, security_id: &str) -> Result<Decimal, AppError> {
        if let Ok(mut lookups) = self.lookups.lock() {
            lookups.push(security_id.to_string());
        }
        self.prices
            .get(security_id)
            .copied()
            .ok_or_else(|| AppError::Unavailable(format!("no price for {security_id}")))
    }
}

/// Serves one rate table, or times out every call when built `timing_out`.
pub struct StaticRates {
    table: Option<RateTable>,
}

impl StaticRates {
    pub fn new(table: RateTable) -> Self {
        Self { table: Some(table) }
    }

    pub fn timing_out() -> Self {
        Self { table: None }
    }
}

#[async_trait]
impl FxSource for StaticRates {
    async fn rates(&self, base: &str) -> Result<RateTable, AppError> {
        match &self.table {
            Some(table) if table.base == base => Ok(table.clone()),
            Some(table) => Err(AppError::Malformed(format!(
                "asked for {base} rates, table is based on {}",
                table.base
            ))),
            None => Err(AppError::Timeout(format!("fx rates for {base}"))),
        }
    }
}
