use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Label grouping securities for eligibility and concentration limits
/// (e.g. "Govt Securities", "Equities").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollateralType(pub String);

impl CollateralType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CollateralType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CollateralType {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// Role of an account owner in a deal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Pledger,
    Pledgee,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Pledger => write!(f, "Pledger"),
            Role::Pledgee => write!(f, "Pledgee"),
        }
    }
}

/// Longbox accounts hold the pledger's free inventory; segregated accounts
/// hold collateral pledged to a counterparty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountType {
    Longbox,
    Segregated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationStatus {
    #[serde(rename = "None")]
    NotStarted,
    #[serde(rename = "Pending due to insufficient collateral")]
    Pending,
    #[serde(rename = "Ready for Allocation")]
    ReadyForAllocation,
    #[serde(rename = "Allocation in progress")]
    InProgress,
    #[serde(rename = "Allocation Successful")]
    Successful,
    #[serde(rename = "Allocation Failed")]
    Failed,
}

impl AllocationStatus {
    /// Whether a new allocation run may start from this status.
    pub fn accepts_new_run(&self) -> bool {
        matches!(
            self,
            AllocationStatus::NotStarted
                | AllocationStatus::Pending
                | AllocationStatus::ReadyForAllocation
        )
    }
}

impl std::fmt::Display for AllocationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            AllocationStatus::NotStarted => "None",
            AllocationStatus::Pending => "Pending due to insufficient collateral",
            AllocationStatus::ReadyForAllocation => "Ready for Allocation",
            AllocationStatus::InProgress => "Allocation in progress",
            AllocationStatus::Successful => "Allocation Successful",
            AllocationStatus::Failed => "Allocation Failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Matched,
    Unmatched,
    Ready,
    Pending,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComplianceStatus {
    #[serde(rename = "NA")]
    NotAssessed,
    #[serde(rename = "Regulatory Compliant")]
    Compliant,
    #[serde(rename = "Regulatory Non-Compliant")]
    NonCompliant,
}

impl std::fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ComplianceStatus::NotAssessed => "NA",
            ComplianceStatus::Compliant => "Regulatory Compliant",
            ComplianceStatus::NonCompliant => "Regulatory Non-Compliant",
        };
        f.write_str(label)
    }
}

/// A holding of one security inside one account.
///
/// Only the stored attributes live here. Effective and total values depend
/// on the active ruleset and FX snapshot and are computed during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Security {
    pub security_id: String,
    pub account_number: String,
    pub name: String,
    pub security_type: String,
    pub collateral_type: CollateralType,
    pub quantity: Decimal,
    pub market_price: Decimal,
    pub currency: String,
    /// Valuation percentage applied during the last successful allocation.
    pub valuation_percentage: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_number: String,
    pub account_name: String,
    pub account_type: AccountType,
    pub owner: String,
    pub currency: String,
    /// Security ids of the holdings currently in this account.
    pub securities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub deal_id: String,
    pub pledger: String,
    pub pledgee: String,
    pub issue_date: DateTime<Utc>,
    pub last_successful_allocation: Option<DateTime<Utc>>,
    pub transactions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub deal_id: String,
    pub pledger: String,
    pub pledgee: String,
    pub transaction_date: DateTime<Utc>,
    pub margin_call_at: DateTime<Utc>,
    /// Required value of the margin call.
    pub rqv: Decimal,
    pub currency: String,
    pub allocation_status: AllocationStatus,
    pub transaction_status: TransactionStatus,
    pub compliance_status: ComplianceStatus,
    pub shortfall: Decimal,
    /// FX snapshot used by the last completed allocation run.
    pub conversion_rates: Option<RateTable>,
}

/// Eligibility rule for one collateral type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralRule {
    /// Percentage of RQV that may be covered by this type, 0..=100.
    pub concentration_limit: Decimal,
    /// Lower is preferred.
    pub priority: u32,
    /// Haircut-adjusted share of market value credited, 0..=100.
    pub valuation_percentage: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ruleset {
    pub rules: BTreeMap<CollateralType, CollateralRule>,
    pub base_currency: Option<String>,
    #[serde(default)]
    pub eligible_currencies: Vec<String>,
}

impl Ruleset {
    pub fn rule(&self, collateral_type: &CollateralType) -> Option<&CollateralRule> {
        self.rules.get(collateral_type)
    }

    /// A type is eligible when the ruleset names it with a positive limit.
    pub fn is_eligible(&self, collateral_type: &CollateralType) -> bool {
        self.rule(collateral_type)
            .is_some_and(|rule| rule.concentration_limit > Decimal::ZERO)
    }
}

/// FX snapshot: units of each currency per one unit of `base`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTable {
    pub base: String,
    pub date: String,
    pub rates: BTreeMap<String, Decimal>,
}

impl RateTable {
    pub fn rate(&self, currency: &str) -> Option<Decimal> {
        if currency == self.base {
            return Some(Decimal::ONE);
        }
        self.rates.get(currency).copied()
    }
}
