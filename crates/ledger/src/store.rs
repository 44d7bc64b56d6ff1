//! Backend contract for the ledger.
//!
//! Stores are plain byte key-value maps plus named membership indexes.
//! Multi-key changes go through [`WriteBatch`], which a backend must apply
//! all-or-nothing.

use async_trait::async_trait;

use collateral_common::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
    IndexAdd { index: String, member: String },
    IndexRemove { index: String, member: String },
}

/// Ordered set of writes applied atomically.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<String>, value: Vec<u8>) -> &mut Self {
        self.ops.push(WriteOp::Put {
            key: key.into(),
            value,
        });
        self
    }

    pub fn delete(&mut self, key: impl Into<String>) -> &mut Self {
        self.ops.push(WriteOp::Delete { key: key.into() });
        self
    }

    pub fn index_add(&mut self, index: impl Into<String>, member: impl Into<String>) -> &mut Self {
        self.ops.push(WriteOp::IndexAdd {
            index: index.into(),
            member: member.into(),
        });
        self
    }

    pub fn index_remove(
        &mut self,
        index: impl Into<String>,
        member: impl Into<String>,
    ) -> &mut Self {
        self.ops.push(WriteOp::IndexRemove {
            index: index.into(),
            member: member.into(),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AppError>;

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), AppError>;

    async fn delete(&self, key: &str) -> Result<(), AppError>;

    /// Members of an index, sorted ascending.
    async fn index_members(&self, index: &str) -> Result<Vec<String>, AppError>;

    /// Apply every op in the batch, or none of them.
    async fn apply(&self, batch: WriteBatch) -> Result<(), AppError>;
}
