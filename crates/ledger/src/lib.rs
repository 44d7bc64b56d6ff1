//! Key-value ledger holding accounts, holdings, deals and transactions.
//!
//! - `store` defines the backend contract and atomic write batches
//! - `memory` / `redis_store` are the two backends
//! - `codec` wraps every record in a versioned JSON envelope
//! - `repository` exposes the deal and account services on top of a store

pub mod codec;
pub mod keys;
pub mod memory;
pub mod redis_store;
pub mod repository;
pub mod store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use repository::{AccountService, AllocationCommit, DealService, Ledger};
pub use store::{LedgerStore, WriteBatch, WriteOp};
