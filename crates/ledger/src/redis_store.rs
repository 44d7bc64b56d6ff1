//! Redis-backed ledger store.
//!
//! Records are plain string keys; indexes are Redis sets. Batches run as a
//! `MULTI`/`EXEC` pipeline so either every command lands or none does.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::Client;
use redis::aio::ConnectionManager;

use collateral_common::AppError;

use crate::store::{LedgerStore, WriteBatch, WriteOp};

#[derive(Clone)]
pub struct RedisStore {
    redis: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis and wrap the connection manager.
    pub async fn connect(redis_url: &str) -> Result<Self, AppError> {
        let client = Client::open(redis_url)?;
        let redis = ConnectionManager::new(client).await?;

        tracing::info!("Connected to Redis");
        Ok(Self { redis })
    }

    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl LedgerStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AppError> {
        let mut redis = self.redis.clone();
        let value: Option<Vec<u8>> = redis.get(key).await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), AppError> {
        let mut redis = self.redis.clone();
        let _: () = redis.set(key, value).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        let mut redis = self.redis.clone();
        let _: () = redis.del(key).await?;
        Ok(())
    }

    async fn index_members(&self, index: &str) -> Result<Vec<String>, AppError> {
        let mut redis = self.redis.clone();
        let mut members: Vec<String> = redis.smembers(index).await?;
        members.sort();
        Ok(members)
    }

    async fn apply(&self, batch: WriteBatch) -> Result<(), AppError> {
        if batch.is_empty() {
            return Ok(());
        }

        let ops = batch.len();
        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in batch.into_ops() {
            match op {
                WriteOp::Put { key, value } => {
                    pipe.set(key, value).ignore();
                }
                WriteOp::Delete { key } => {
                    pipe.del(key).ignore();
                }
                WriteOp::IndexAdd { index, member } => {
                    pipe.sadd(index, member).ignore();
                }
                WriteOp::IndexRemove { index, member } => {
                    pipe.srem(index, member).ignore();
                }
            }
        }

        let mut redis = self.redis.clone();
        let _: () = pipe.query_async(&mut redis).await?;

        tracing::debug!(ops, "Applied ledger batch");
        Ok(())
    }
}
