//! Custodial deposit-wallet engine for account-based ledgers.
//!
//! Watches a pool of derived deposit addresses for incoming transfers,
//! reconciles balances, sweeps funds into a master treasury address, and
//! serves withdrawals through a serialized broadcast pipeline, tolerating
//! unreliable load-balanced RPC endpoints.

/// Transports, normalized types, and the pool-backed client
pub mod chain;
/// Engine configuration and tuning constants
pub mod config;
/// Top-level error type
pub mod error;
/// Key derivation and signing seam
pub mod keystore;
/// Outbound webhook notifications
pub mod notify;
/// RPC endpoint racing and leasing
pub mod provider;
/// Gateway-facing operations facade
pub mod service;
/// Persisted address store and deposit cache
pub mod store;
/// The block-cursor sync engine
pub mod sync;
/// Scheduler-owned periodic tasks
pub mod tasks;
pub mod utils;
/// Wallet lock and the withdrawal queue
pub mod withdraw;

pub use error::EngineError;
