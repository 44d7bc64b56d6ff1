//! Shared types, errors and configuration for the collateral allocation services.

pub mod config;
pub mod error;
pub mod types;

pub use error::AppError;
