//! Core domain types and logic.

pub mod price;
pub mod price_table;
pub mod estimator;
pub mod weights;
pub mod optimizer;
pub mod allocator;
pub mod prediction;
pub mod rebalance;
pub mod equity;
pub mod backtest;
pub mod metrics;
pub mod strategy;
pub mod universe;
pub mod config_validation;
pub mod error;
