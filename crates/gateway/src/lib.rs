//! HTTP collaborators for allocation runs.
//!
//! [`HttpGateway`] implements the engine's ruleset, market data and FX
//! source traits over a shared `reqwest` client. Every call is bounded by a
//! request timeout and retried with exponential backoff while the failure is
//! transient.

pub mod client;
pub mod fx;
pub mod market_data;
pub mod retry;
pub mod ruleset;

pub use client::HttpGateway;
pub use retry::RetryPolicy;
