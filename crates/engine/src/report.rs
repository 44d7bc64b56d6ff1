//! Outcome and audit record of one allocation run.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use collateral_common::types::{
    AllocationStatus, ComplianceStatus, RateTable, Ruleset, Security,
};

use crate::compliance::ComplianceViolation;
use crate::planner::PlanLine;
use crate::valuator::UnvaluedHolding;

/// Everything a successful run decided, kept for audit.
#[derive(Debug, Clone, Serialize)]
pub struct AllocationReport {
    pub run_id: Uuid,
    pub deal_id: String,
    pub transaction_id: String,
    pub margin_call_at: DateTime<Utc>,
    pub pledger: String,
    pub pledgee: String,
    pub source_account: String,
    pub destination_account: String,
    pub rqv: Decimal,
    pub currency: String,
    pub public_ruleset_version: String,
    pub public_ruleset: Ruleset,
    pub private_ruleset: Ruleset,
    pub conversion_rates: RateTable,
    pub remaining_source_holdings: Vec<Security>,
    pub allocated_holdings: Vec<Security>,
    pub plan: Vec<PlanLine>,
    pub unvalued_holdings: Vec<UnvaluedHolding>,
    pub allocation_status: AllocationStatus,
    pub compliance_status: ComplianceStatus,
    pub violations: Vec<ComplianceViolation>,
    pub completed_at: DateTime<Utc>,
}

/// What the caller gets back from a run that completed normally.
#[derive(Debug, Clone, Serialize)]
pub struct AllocationOutcome {
    pub run_id: Uuid,
    pub transaction_id: String,
    pub allocation_status: AllocationStatus,
    pub compliance_status: ComplianceStatus,
    pub shortfall: Decimal,
    pub message: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<AllocationReport>,
}

impl AllocationOutcome {
    pub fn pending(run_id: Uuid, transaction_id: &str, shortfall: Decimal) -> Self {
        Self {
            run_id,
            transaction_id: transaction_id.to_string(),
            allocation_status: AllocationStatus::Pending,
            compliance_status: ComplianceStatus::NotAssessed,
            shortfall,
            message: format!("Insufficient eligible collateral, shortfall {shortfall}"),
            code: 200,
            report: None,
        }
    }

    pub fn successful(report: AllocationReport) -> Self {
        Self {
            run_id: report.run_id,
            transaction_id: report.transaction_id.clone(),
            allocation_status: AllocationStatus::Successful,
            compliance_status: report.compliance_status,
            shortfall: Decimal::ZERO,
            message: format!("Allocation successful, {}", report.compliance_status),
            code: 200,
            report: Some(report),
        }
    }

    pub fn is_successful(&self) -> bool {
        self.allocation_status == AllocationStatus::Successful
    }
}
