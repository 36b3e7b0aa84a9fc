//! Chain Synchronization Module
//!
//! Core logic for keeping the wallet in step with the chain head:
//!
//! - `cursor`: the monotonic, persisted block cursor and its shared state.
//! - `deposits`: deposit extraction from normalized blocks and the
//!   confirmation/credit/notify pipeline behind the DepositCache.
//! - `engine`: the catch-up / live-follow state machine driving both.

/// Persisted block cursor
pub mod cursor;
/// Deposit extraction and crediting
pub mod deposits;
/// Catch-up / live-follow state machine
pub mod engine;

pub use cursor::{BlockCursor, CursorState};
pub use deposits::{DepositEvent, DepositProcessor, extract_deposits};
pub use engine::{CycleOutcome, SyncEngine, plan_batch};
