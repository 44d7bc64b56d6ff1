//! In-process ledger store used for local runs and tests.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use collateral_common::AppError;

use crate::store::{LedgerStore, WriteBatch, WriteOp};

#[derive(Default)]
struct State {
    records: HashMap<String, Vec<u8>>,
    indexes: HashMap<String, BTreeSet<String>>,
}

impl State {
    fn apply(&mut self, op: WriteOp) {
        match op {
            WriteOp::Put { key, value } => {
                self.records.insert(key, value);
            }
            WriteOp::Delete { key } => {
                self.records.remove(&key);
            }
            WriteOp::IndexAdd { index, member } => {
                self.indexes.entry(index).or_default().insert(member);
            }
            WriteOp::IndexRemove { index, member } => {
                if let Some(members) = self.indexes.get_mut(&index) {
                    members.remove(&member);
                }
            }
        }
    }
}

/// `HashMap`-backed store. A whole batch is applied under one write lock.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    reject_batches: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent batch fail without applying anything.
    pub fn reject_batches(&self, reject: bool) {
        self.reject_batches.store(reject, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AppError> {
        Ok(self.state.read().await.records.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), AppError> {
        self.state
            .write()
            .await
            .records
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.state.write().await.records.remove(key);
        Ok(())
    }

    async fn index_members(&self, index: &str) -> Result<Vec<String>, AppError> {
        Ok(self
            .state
            .read()
            .await
            .indexes
            .get(index)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn apply(&self, batch: WriteBatch) -> Result<(), AppError> {
        if self.reject_batches.load(Ordering::SeqCst) {
            return Err(AppError::Unavailable(
                "memory store is rejecting batches".to_string(),
            ));
        }

        let mut state = self.state.write().await;
        for op in batch.into_ops() {
            state.apply(op);
        }
        Ok(())
    }
}
