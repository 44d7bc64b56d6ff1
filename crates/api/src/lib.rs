//! HTTP surface of the collateral allocation service.
//!
//! Endpoints:
//! - GET  /health
//! - POST /api/allocations: run one margin call allocation
//! - POST /api/accounts/updated: re-evaluate pending allocations for a party
//! - GET  /api/transactions/{id}: current transaction record

pub mod routes;
pub mod state;
