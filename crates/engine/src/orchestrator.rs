//! Allocation orchestrator.
//!
//! Runs one margin call to completion:
//! 1. Validate the request and look up deal, transaction and both accounts
//! 2. Mark the transaction in progress
//! 3. Fetch the private ruleset, the FX table and fresh market prices
//! 4. Value the pooled holdings and check eligible collateral covers the RQV
//! 5. Plan the draw and grade it against the public ruleset
//! 6. Commit holdings, transaction and deal in one atomic batch
//!
//! Collaborator failures in steps 3-5 restore the previous allocation status,
//! unless something else has already moved the transaction out of progress.
//! A failed commit is fatal and is surfaced as is.
//!
//! The run holds the transaction id lock throughout. [`CutoffMonitor`] takes
//! the same lock, so a cutoff decision never lands in the middle of a run.
//!
//! [`CutoffMonitor`]: crate::cutoff::CutoffMonitor

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use collateral_common::AppError;
use collateral_common::types::{
    AllocationStatus, ComplianceStatus, Deal, RateTable, Ruleset, Security, Transaction,
    TransactionStatus,
};
use collateral_ledger::{AccountService, AllocationCommit, DealService, Ledger};

use crate::availability::AvailabilityAggregator;
use crate::compliance::ComplianceChecker;
use crate::conversion::ValuationConverter;
use crate::eligibility::EligibilityCalculator;
use crate::locks::KeyedLocks;
use crate::planner::{AllocationPlan, AllocationPlanner};
use crate::report::{AllocationOutcome, AllocationReport};
use crate::rulesets::{PUBLIC_RULESET, PUBLIC_RULESET_VERSION, validate_private_ruleset};
use crate::sources::{FxSource, MarketDataSource, RulesetSource};
use crate::valuator::{SecurityValuator, Valuation};

#[derive(Debug, Clone, Deserialize)]
pub struct AllocationRequest {
    pub deal_id: String,
    pub transaction_id: String,
    pub source_account: String,
    pub destination_account: String,
}

impl AllocationRequest {
    fn validate(&self) -> Result<(), AppError> {
        let fields = [
            ("deal_id", &self.deal_id),
            ("transaction_id", &self.transaction_id),
            ("source_account", &self.source_account),
            ("destination_account", &self.destination_account),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(AppError::Validation(format!("{name} must not be empty")));
            }
        }
        if self.source_account == self.destination_account {
            return Err(AppError::Validation(
                "source and destination accounts must differ".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct AllocationOrchestrator {
    ledger: Ledger,
    rulesets: Arc<dyn RulesetSource>,
    market_data: Arc<dyn MarketDataSource>,
    fx: Arc<dyn FxSource>,
    account_locks: KeyedLocks,
    transaction_locks: Arc<KeyedLocks>,
    commit_timeout: std::time::Duration,
}

impl AllocationOrchestrator {
    pub fn new(
        ledger: Ledger,
        rulesets: Arc<dyn RulesetSource>,
        market_data: Arc<dyn MarketDataSource>,
        fx: Arc<dyn FxSource>,
        commit_timeout: std::time::Duration,
    ) -> Self {
        Self {
            ledger,
            rulesets,
            market_data,
            fx,
            account_locks: KeyedLocks::new(),
            transaction_locks: Arc::new(KeyedLocks::new()),
            commit_timeout,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Per-transaction locks held by every run; share with the cutoff monitor.
    pub fn transaction_locks(&self) -> Arc<KeyedLocks> {
        self.transaction_locks.clone()
    }

    pub async fn start_allocation(
        &self,
        request: &AllocationRequest,
    ) -> Result<AllocationOutcome, AppError> {
        request.validate()?;
        let _accounts = self
            .account_locks
            .acquire(&[
                request.source_account.as_str(),
                request.destination_account.as_str(),
            ])
            .await;
        let _transaction = self
            .transaction_locks
            .acquire(&[request.transaction_id.as_str()])
            .await;

        let deal = self.ledger.get_deal(&request.deal_id).await?;
        let transaction = self.ledger.get_transaction(&request.transaction_id).await?;
        check_preconditions(&deal, &transaction)?;
        self.ledger.get_account(&request.source_account).await?;
        self.ledger.get_account(&request.destination_account).await?;

        let run_id = Uuid::new_v4();
        let previous = transaction.allocation_status;
        let transaction = self
            .ledger
            .update_transaction_allocation_status(
                &transaction.transaction_id,
                AllocationStatus::InProgress,
                None,
            )
            .await?;

        tracing::info!(
            run_id = %run_id,
            deal_id = %deal.deal_id,
            transaction_id = %transaction.transaction_id,
            rqv = %transaction.rqv,
            currency = %transaction.currency,
            "Allocation in progress"
        );

        match self.run(run_id, request, deal, transaction).await {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is_fatal() => {
                tracing::error!(
                    run_id = %run_id,
                    transaction_id = %request.transaction_id,
                    error = %e,
                    "Allocation commit failed, ledger state needs reconciliation"
                );
                Err(e)
            }
            Err(e) => {
                tracing::warn!(
                    run_id = %run_id,
                    transaction_id = %request.transaction_id,
                    error = %e,
                    "Allocation aborted, restoring previous status"
                );
                if let Err(restore) = self
                    .ledger
                    .compare_and_set_allocation_status(
                        &request.transaction_id,
                        AllocationStatus::InProgress,
                        previous,
                    )
                    .await
                {
                    tracing::error!(
                        transaction_id = %request.transaction_id,
                        error = %restore,
                        "Failed to restore allocation status"
                    );
                }
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        run_id: Uuid,
        request: &AllocationRequest,
        mut deal: Deal,
        mut transaction: Transaction,
    ) -> Result<AllocationOutcome, AppError> {
        let rqv = transaction.rqv;

        let private = self
            .rulesets
            .private_ruleset(&transaction.pledger, &transaction.pledgee)
            .await?;
        validate_private_ruleset(&private)?;
        let rates = self.fx.rates(&transaction.currency).await?;

        let mut source = self
            .ledger
            .get_securities_by_account(&request.source_account)
            .await?;
        let mut destination = self
            .ledger
            .get_securities_by_account(&request.destination_account)
            .await?;
        self.refresh_prices(&private, &mut source, &mut destination)
            .await?;

        let converter = ValuationConverter::new(&rates, &transaction.currency);
        let valuation = SecurityValuator::new(&private, &converter).valuate(&source, &destination);
        let envelope = EligibilityCalculator::new().envelope(rqv, &private)?;
        let availability = AvailabilityAggregator::new().aggregate(&valuation.securities, &envelope);

        if !availability.covers(rqv) {
            tracing::info!(
                run_id = %run_id,
                transaction_id = %transaction.transaction_id,
                available = %availability.available_eligible_collateral,
                rqv = %rqv,
                "Insufficient eligible collateral"
            );
            return self
                .mark_pending(run_id, transaction, availability.shortfall(rqv), rates)
                .await;
        }

        let plan = AllocationPlanner::new(&private).plan(
            &valuation.securities,
            availability.eligible.clone(),
            rqv,
        );
        if !plan.is_satisfied() {
            tracing::warn!(
                run_id = %run_id,
                transaction_id = %transaction.transaction_id,
                rqv_left = %plan.rqv_left,
                "Plan left part of the RQV uncovered"
            );
            return self
                .mark_pending(run_id, transaction, plan.shortfall(), rates)
                .await;
        }

        let compliance = ComplianceChecker::new(&PUBLIC_RULESET).check(&plan, rqv);
        tracing::info!(
            run_id = %run_id,
            transaction_id = %transaction.transaction_id,
            compliance = %compliance.status,
            violations = compliance.violations.len(),
            "Compliance graded"
        );

        let (remaining, allocated) = rearrange(
            &valuation,
            &plan,
            &request.source_account,
            &request.destination_account,
        )?;

        let completed_at = Utc::now();
        transaction.allocation_status = AllocationStatus::Successful;
        transaction.compliance_status = compliance.status;
        transaction.shortfall = Decimal::ZERO;
        transaction.conversion_rates = Some(rates.clone());
        deal.last_successful_allocation = Some(completed_at);

        let commit = AllocationCommit {
            source_account: request.source_account.clone(),
            destination_account: request.destination_account.clone(),
            pooled_security_ids: valuation.pooled_ids(),
            source_holdings: remaining.clone(),
            destination_holdings: allocated.clone(),
            transaction: transaction.clone(),
            deal: deal.clone(),
        };
        self.commit(&commit).await?;

        let report = AllocationReport {
            run_id,
            deal_id: deal.deal_id,
            transaction_id: transaction.transaction_id,
            margin_call_at: transaction.margin_call_at,
            pledger: transaction.pledger,
            pledgee: transaction.pledgee,
            source_account: request.source_account.clone(),
            destination_account: request.destination_account.clone(),
            rqv,
            currency: transaction.currency,
            public_ruleset_version: PUBLIC_RULESET_VERSION.to_string(),
            public_ruleset: PUBLIC_RULESET.clone(),
            private_ruleset: private,
            conversion_rates: rates,
            remaining_source_holdings: remaining,
            allocated_holdings: allocated,
            plan: plan.lines,
            unvalued_holdings: valuation.unvalued,
            allocation_status: AllocationStatus::Successful,
            compliance_status: compliance.status,
            violations: compliance.violations,
            completed_at,
        };

        tracing::info!(
            run_id = %run_id,
            transaction_id = %report.transaction_id,
            lines = report.plan.len(),
            compliance = %report.compliance_status,
            "Allocation successful"
        );
        Ok(AllocationOutcome::successful(report))
    }

    /// One price lookup per distinct eligible security across both accounts.
    async fn refresh_prices(
        &self,
        ruleset: &Ruleset,
        source: &mut [Security],
        destination: &mut [Security],
    ) -> Result<(), AppError> {
        let ids: BTreeSet<String> = source
            .iter()
            .chain(destination.iter())
            .filter(|h| ruleset.is_eligible(&h.collateral_type))
            .map(|h| h.security_id.clone())
            .collect();

        for security_id in ids {
            let price = self.market_data.price(&security_id).await?;
            for holding in source.iter_mut().chain(destination.iter_mut()) {
                if holding.security_id == security_id {
                    holding.market_price = price;
                }
            }
        }
        Ok(())
    }

    async fn mark_pending(
        &self,
        run_id: Uuid,
        mut transaction: Transaction,
        shortfall: Decimal,
        rates: RateTable,
    ) -> Result<AllocationOutcome, AppError> {
        transaction.allocation_status = AllocationStatus::Pending;
        transaction.transaction_status = TransactionStatus::Pending;
        transaction.compliance_status = ComplianceStatus::NotAssessed;
        transaction.shortfall = shortfall;
        transaction.conversion_rates = Some(rates);
        self.ledger.update_transaction(&transaction).await?;

        tracing::info!(
            run_id = %run_id,
            transaction_id = %transaction.transaction_id,
            shortfall = %shortfall,
            "Allocation pending"
        );
        Ok(AllocationOutcome::pending(
            run_id,
            &transaction.transaction_id,
            shortfall,
        ))
    }

    async fn commit(&self, commit: &AllocationCommit) -> Result<(), AppError> {
        match tokio::time::timeout(self.commit_timeout, self.ledger.commit_allocation(commit)).await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(AppError::Commit(msg))) => Err(AppError::Commit(msg)),
            Ok(Err(e)) => Err(AppError::Commit(e.to_string())),
            Err(_) => Err(AppError::Commit(format!(
                "commit of transaction {} timed out after {:?}",
                commit.transaction.transaction_id, self.commit_timeout
            ))),
        }
    }
}

fn check_preconditions(deal: &Deal, transaction: &Transaction) -> Result<(), AppError> {
    if transaction.deal_id != deal.deal_id {
        return Err(AppError::Validation(format!(
            "transaction {} belongs to deal {}, not {}",
            transaction.transaction_id, transaction.deal_id, deal.deal_id
        )));
    }
    if transaction.rqv <= Decimal::ZERO {
        return Err(AppError::Validation(format!(
            "transaction {} has non-positive RQV {}",
            transaction.transaction_id, transaction.rqv
        )));
    }
    if !transaction.allocation_status.accepts_new_run() {
        return Err(AppError::Validation(format!(
            "transaction {} is {}",
            transaction.transaction_id, transaction.allocation_status
        )));
    }
    Ok(())
}

/// Split every pooled security into what stays at the source and what
/// moves to the destination. Quantity is conserved per security.
fn rearrange(
    valuation: &Valuation,
    plan: &AllocationPlan,
    source_account: &str,
    destination_account: &str,
) -> Result<(Vec<Security>, Vec<Security>), AppError> {
    let mut remaining = Vec::new();
    let mut allocated = Vec::new();

    for pooled in &valuation.securities {
        let taken = plan.quantity_of(pooled.security_id());
        let held = pooled.quantity();
        if taken > held || held != pooled.source_quantity + pooled.destination_quantity {
            return Err(AppError::Internal(format!(
                "quantity of {} not conserved: held {held}, taken {taken}",
                pooled.security_id()
            )));
        }

        let left = held - taken;
        if left > Decimal::ZERO {
            let mut holding = pooled.security.clone();
            holding.account_number = source_account.to_string();
            holding.quantity = left;
            remaining.push(holding);
        }
        if taken > Decimal::ZERO {
            let mut holding = pooled.security.clone();
            holding.account_number = destination_account.to_string();
            holding.quantity = taken;
            allocated.push(holding);
        }
    }

    Ok((remaining, allocated))
}
