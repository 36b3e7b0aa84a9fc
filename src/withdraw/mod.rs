/// Reentrancy guard with hysteresis release
pub mod lock;
/// Single-inflight FIFO broadcast queue
pub mod queue;

pub use lock::WalletLock;
pub use queue::{SendOutcome, WithdrawalQueue};
