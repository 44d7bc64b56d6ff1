//! Deal and account services over a [`LedgerStore`].
//!
//! `Ledger` is the single implementation used by the engine and API. It
//! also owns the allocation commit, which rewrites both accounts, the
//! transaction and the deal in one atomic batch.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;

use collateral_common::AppError;
use collateral_common::types::{
    Account, AllocationStatus, ComplianceStatus, Deal, Role, Security, Transaction,
};

use crate::codec::{self, LedgerRecord};
use crate::keys;
use crate::store::{LedgerStore, WriteBatch};

#[async_trait]
pub trait DealService: Send + Sync {
    async fn get_deal(&self, deal_id: &str) -> Result<Deal, AppError>;

    async fn get_transaction(&self, transaction_id: &str) -> Result<Transaction, AppError>;

    async fn update_transaction(&self, transaction: &Transaction) -> Result<(), AppError>;

    async fn update_transaction_allocation_status(
        &self,
        transaction_id: &str,
        status: AllocationStatus,
        compliance: Option<ComplianceStatus>,
    ) -> Result<Transaction, AppError>;

    /// Move the allocation status to `status` only while it is still
    /// `expected`. Returns whether the record was written.
    async fn compare_and_set_allocation_status(
        &self,
        transaction_id: &str,
        expected: AllocationStatus,
        status: AllocationStatus,
    ) -> Result<bool, AppError>;

    /// Transactions where `party` acts in `role`, ordered by transaction id.
    async fn transactions_by_party(
        &self,
        party: &str,
        role: Role,
    ) -> Result<Vec<Transaction>, AppError>;
}

#[async_trait]
pub trait AccountService: Send + Sync {
    async fn get_account(&self, account_number: &str) -> Result<Account, AppError>;

    async fn get_securities_by_account(
        &self,
        account_number: &str,
    ) -> Result<Vec<Security>, AppError>;

    /// Add a holding, merging quantity into an existing holding of the same id.
    async fn add_security(&self, security: &Security) -> Result<(), AppError>;

    async fn remove_all_securities_from_account(
        &self,
        account_number: &str,
    ) -> Result<(), AppError>;
}

/// Everything an allocation run writes back.
#[derive(Debug, Clone)]
pub struct AllocationCommit {
    pub source_account: String,
    pub destination_account: String,
    /// Security ids pooled into the run. Their holdings in both accounts are
    /// replaced by `source_holdings` / `destination_holdings`.
    pub pooled_security_ids: Vec<String>,
    pub source_holdings: Vec<Security>,
    pub destination_holdings: Vec<Security>,
    pub transaction: Transaction,
    pub deal: Deal,
}

#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    async fn load<T: LedgerRecord>(&self, key: &str) -> Result<Option<T>, AppError> {
        match self.store.get(key).await? {
            Some(bytes) => Ok(Some(codec::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn require<T: LedgerRecord>(&self, key: &str, what: &str) -> Result<T, AppError> {
        self.load(key)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{what} not found")))
    }

    pub async fn create_account(&self, account: &Account) -> Result<(), AppError> {
        let key = keys::account(&account.account_number);
        if self.store.get(&key).await?.is_some() {
            return Err(AppError::Validation(format!(
                "account {} already exists",
                account.account_number
            )));
        }

        let mut batch = WriteBatch::new();
        batch
            .put(key, codec::encode(account)?)
            .index_add(keys::ACCOUNT_INDEX, account.account_number.as_str());
        self.store.apply(batch).await
    }

    pub async fn create_deal(&self, deal: &Deal) -> Result<(), AppError> {
        let key = keys::deal(&deal.deal_id);
        if self.store.get(&key).await?.is_some() {
            return Err(AppError::Validation(format!(
                "deal {} already exists",
                deal.deal_id
            )));
        }

        let mut batch = WriteBatch::new();
        batch
            .put(key, codec::encode(deal)?)
            .index_add(keys::DEAL_INDEX, deal.deal_id.as_str());
        self.store.apply(batch).await
    }

    /// Record a new transaction and attach it to its deal.
    pub async fn create_transaction(&self, transaction: &Transaction) -> Result<(), AppError> {
        let mut deal: Deal = self
            .require(
                &keys::deal(&transaction.deal_id),
                &format!("deal {}", transaction.deal_id),
            )
            .await?;
        if deal.transactions.contains(&transaction.transaction_id) {
            return Err(AppError::Validation(format!(
                "transaction {} already exists",
                transaction.transaction_id
            )));
        }
        if transaction.rqv <= Decimal::ZERO {
            return Err(AppError::Validation(format!(
                "transaction {} must have a positive RQV",
                transaction.transaction_id
            )));
        }
        deal.transactions.push(transaction.transaction_id.clone());

        let mut batch = WriteBatch::new();
        batch
            .put(
                keys::transaction(&transaction.transaction_id),
                codec::encode(transaction)?,
            )
            .put(keys::deal(&deal.deal_id), codec::encode(&deal)?)
            .index_add(
                keys::TRANSACTION_INDEX,
                transaction.transaction_id.as_str(),
            );
        self.store.apply(batch).await
    }

    /// Rewrite the pooled holdings of both accounts and record the run's
    /// outcome on the transaction and deal, all in one batch.
    ///
    /// Any store failure is reported as [`AppError::Commit`].
    pub async fn commit_allocation(&self, commit: &AllocationCommit) -> Result<(), AppError> {
        let source: Account = self
            .require(
                &keys::account(&commit.source_account),
                &format!("account {}", commit.source_account),
            )
            .await?;
        let destination: Account = self
            .require(
                &keys::account(&commit.destination_account),
                &format!("account {}", commit.destination_account),
            )
            .await?;

        let pooled: HashSet<&str> = commit
            .pooled_security_ids
            .iter()
            .map(String::as_str)
            .collect();

        let mut batch = WriteBatch::new();
        stage_holdings(&mut batch, source, &pooled, &commit.source_holdings)?;
        stage_holdings(&mut batch, destination, &pooled, &commit.destination_holdings)?;
        batch
            .put(
                keys::transaction(&commit.transaction.transaction_id),
                codec::encode(&commit.transaction)?,
            )
            .put(keys::deal(&commit.deal.deal_id), codec::encode(&commit.deal)?);

        let ops = batch.len();
        self.store
            .apply(batch)
            .await
            .map_err(|e| AppError::Commit(e.to_string()))?;

        tracing::info!(
            transaction_id = %commit.transaction.transaction_id,
            source = %commit.source_account,
            destination = %commit.destination_account,
            ops,
            "Allocation committed"
        );
        Ok(())
    }
}

/// Replace the pooled holdings of `account` with `holdings`, keeping every
/// other holding and the original listing order.
fn stage_holdings(
    batch: &mut WriteBatch,
    mut account: Account,
    pooled: &HashSet<&str>,
    holdings: &[Security],
) -> Result<(), AppError> {
    for security_id in &account.securities {
        if pooled.contains(security_id.as_str()) {
            batch.delete(keys::holding(&account.account_number, security_id));
        }
    }
    account
        .securities
        .retain(|id| !pooled.contains(id.as_str()));

    for holding in holdings {
        if holding.quantity <= Decimal::ZERO {
            continue;
        }
        if holding.account_number != account.account_number {
            return Err(AppError::Internal(format!(
                "holding {} is tagged for account {} but staged into {}",
                holding.security_id, holding.account_number, account.account_number
            )));
        }
        if !account.securities.contains(&holding.security_id) {
            account.securities.push(holding.security_id.clone());
        }
        batch.put(
            keys::holding(&account.account_number, &holding.security_id),
            codec::encode(holding)?,
        );
    }

    batch.put(keys::account(&account.account_number), codec::encode(&account)?);
    Ok(())
}

#[async_trait]
impl DealService for Ledger {
    async fn get_deal(&self, deal_id: &str) -> Result<Deal, AppError> {
        self.require(&keys::deal(deal_id), &format!("deal {deal_id}"))
            .await
    }

    async fn get_transaction(&self, transaction_id: &str) -> Result<Transaction, AppError> {
        self.require(
            &keys::transaction(transaction_id),
            &format!("transaction {transaction_id}"),
        )
        .await
    }

    async fn update_transaction(&self, transaction: &Transaction) -> Result<(), AppError> {
        let key = keys::transaction(&transaction.transaction_id);
        if self.store.get(&key).await?.is_none() {
            return Err(AppError::NotFound(format!(
                "transaction {} not found",
                transaction.transaction_id
            )));
        }
        self.store.put(&key, codec::encode(transaction)?).await
    }

    async fn update_transaction_allocation_status(
        &self,
        transaction_id: &str,
        status: AllocationStatus,
        compliance: Option<ComplianceStatus>,
    ) -> Result<Transaction, AppError> {
        let mut transaction = self.get_transaction(transaction_id).await?;
        transaction.allocation_status = status;
        if let Some(compliance) = compliance {
            transaction.compliance_status = compliance;
        }
        self.store
            .put(
                &keys::transaction(transaction_id),
                codec::encode(&transaction)?,
            )
            .await?;

        tracing::debug!(transaction_id, status = %status, "Allocation status updated");
        Ok(transaction)
    }

    async fn compare_and_set_allocation_status(
        &self,
        transaction_id: &str,
        expected: AllocationStatus,
        status: AllocationStatus,
    ) -> Result<bool, AppError> {
        let mut transaction = self.get_transaction(transaction_id).await?;
        if transaction.allocation_status != expected {
            tracing::warn!(
                transaction_id,
                expected = %expected,
                found = %transaction.allocation_status,
                "Allocation status changed underneath, not overwriting"
            );
            return Ok(false);
        }

        transaction.allocation_status = status;
        self.store
            .put(
                &keys::transaction(transaction_id),
                codec::encode(&transaction)?,
            )
            .await?;
        Ok(true)
    }

    async fn transactions_by_party(
        &self,
        party: &str,
        role: Role,
    ) -> Result<Vec<Transaction>, AppError> {
        let mut transactions = Vec::new();
        for transaction_id in self.store.index_members(keys::TRANSACTION_INDEX).await? {
            let Some(transaction) = self
                .load::<Transaction>(&keys::transaction(&transaction_id))
                .await?
            else {
                tracing::warn!(transaction_id = %transaction_id, "Indexed transaction missing");
                continue;
            };
            let counterparty = match role {
                Role::Pledger => &transaction.pledger,
                Role::Pledgee => &transaction.pledgee,
            };
            if counterparty == party {
                transactions.push(transaction);
            }
        }
        Ok(transactions)
    }
}

#[async_trait]
impl AccountService for Ledger {
    async fn get_account(&self, account_number: &str) -> Result<Account, AppError> {
        self.require(
            &keys::account(account_number),
            &format!("account {account_number}"),
        )
        .await
    }

    async fn get_securities_by_account(
        &self,
        account_number: &str,
    ) -> Result<Vec<Security>, AppError> {
        let account = self.get_account(account_number).await?;

        let mut securities = Vec::with_capacity(account.securities.len());
        for security_id in &account.securities {
            match self
                .load::<Security>(&keys::holding(account_number, security_id))
                .await?
            {
                Some(security) => securities.push(security),
                None => tracing::warn!(
                    account_number,
                    security_id = %security_id,
                    "Listed holding missing from ledger"
                ),
            }
        }
        Ok(securities)
    }

    async fn add_security(&self, security: &Security) -> Result<(), AppError> {
        if security.quantity <= Decimal::ZERO {
            return Err(AppError::Validation(format!(
                "holding {} must have a positive quantity",
                security.security_id
            )));
        }

        let mut account = self.get_account(&security.account_number).await?;
        let key = keys::holding(&account.account_number, &security.security_id);

        let holding = match self.load::<Security>(&key).await? {
            Some(mut existing) => {
                existing.quantity += security.quantity;
                existing.market_price = security.market_price;
                existing
            }
            None => security.clone(),
        };
        if !account.securities.contains(&security.security_id) {
            account.securities.push(security.security_id.clone());
        }

        let mut batch = WriteBatch::new();
        batch
            .put(key, codec::encode(&holding)?)
            .put(keys::account(&account.account_number), codec::encode(&account)?);
        self.store.apply(batch).await
    }

    async fn remove_all_securities_from_account(
        &self,
        account_number: &str,
    ) -> Result<(), AppError> {
        let mut account = self.get_account(account_number).await?;

        let mut batch = WriteBatch::new();
        for security_id in account.securities.drain(..) {
            batch.delete(keys::holding(account_number, &security_id));
        }
        batch.put(keys::account(account_number), codec::encode(&account)?);
        self.store.apply(batch).await
    }
}
