//! Copy-trading bot core: leader trade ingestion, validation,
//! copy-sizing, time-windowed aggregation, and order-mirroring
//! execution, plus the resilience primitives (error taxonomy, retrying
//! fetcher, circuit breaker registry, balance probe) it all runs on.

pub mod aggregator;
pub mod balance;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod order_client;
pub mod persistence;
pub mod resilience;
pub mod sizing;
pub mod validator;
