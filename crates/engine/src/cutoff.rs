//! Re-evaluation of pending allocations when an account changes.
//!
//! A transaction left pending for lack of collateral becomes ready for a new
//! run if the account update lands within the cutoff window after its margin
//! call. Past the window the allocation is failed for good.
//!
//! Each transaction is decided under its id lock, shared with the
//! orchestrator, and re-read once the lock is held. A transaction caught in a
//! run is therefore judged on whatever status the run leaves behind.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use collateral_common::AppError;
use collateral_common::types::{AllocationStatus, Role, Transaction, TransactionStatus};
use collateral_ledger::{DealService, Ledger};

use crate::locks::KeyedLocks;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusTransition {
    pub transaction_id: String,
    pub from: AllocationStatus,
    pub to: AllocationStatus,
    pub transaction_status: TransactionStatus,
}

pub struct CutoffMonitor {
    ledger: Ledger,
    window: Duration,
    locks: Arc<KeyedLocks>,
}

impl CutoffMonitor {
    pub fn new(ledger: Ledger, window: Duration, locks: Arc<KeyedLocks>) -> Self {
        Self {
            ledger,
            window,
            locks,
        }
    }

    /// Where a pending transaction goes when an account changes at `now`.
    pub fn decide(
        &self,
        transaction: &Transaction,
        now: DateTime<Utc>,
    ) -> Option<(AllocationStatus, TransactionStatus)> {
        if transaction.allocation_status != AllocationStatus::Pending {
            return None;
        }

        let elapsed = now - transaction.margin_call_at;
        if elapsed >= Duration::zero() && elapsed <= self.window {
            Some((AllocationStatus::ReadyForAllocation, TransactionStatus::Ready))
        } else {
            Some((AllocationStatus::Failed, TransactionStatus::Failed))
        }
    }

    pub async fn account_updated(
        &self,
        party: &str,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<Vec<StatusTransition>, AppError> {
        let mut transitions = Vec::new();

        // In-progress runs may yet fall back to pending, so wait them out.
        let candidates: Vec<String> = self
            .ledger
            .transactions_by_party(party, role)
            .await?
            .into_iter()
            .filter(|t| {
                matches!(
                    t.allocation_status,
                    AllocationStatus::Pending | AllocationStatus::InProgress
                )
            })
            .map(|t| t.transaction_id)
            .collect();

        for transaction_id in candidates {
            let _guard = self.locks.acquire(&[transaction_id.as_str()]).await;
            let mut transaction = self.ledger.get_transaction(&transaction_id).await?;
            let Some((status, transaction_status)) = self.decide(&transaction, now) else {
                continue;
            };

            let from = transaction.allocation_status;
            transaction.allocation_status = status;
            transaction.transaction_status = transaction_status;
            self.ledger.update_transaction(&transaction).await?;

            tracing::info!(
                transaction_id = %transaction.transaction_id,
                party,
                role = %role,
                from = %from,
                to = %status,
                "Pending allocation re-evaluated"
            );
            transitions.push(StatusTransition {
                transaction_id: transaction.transaction_id,
                from,
                to: status,
                transaction_status,
            });
        }

        Ok(transitions)
    }
}
