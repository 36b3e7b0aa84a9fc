//! Wallet lock with hysteresis.
//!
//! Engaged on every broadcast attempt and released only after several
//! consecutive unlock signals from later successful sync cycles. The gap
//! keeps balance reads from observing an in-flight, unconfirmed spend.

use std::sync::Mutex;
use tracing::debug;

pub struct WalletLock {
    state: Mutex<LockState>,
    threshold: u32,
}

struct LockState {
    locked: bool,
    unlock_signals: u32,
}

impl WalletLock {
    pub fn new(threshold: u32) -> Self {
        Self {
            state: Mutex::new(LockState {
                locked: false,
                unlock_signals: 0,
            }),
            threshold: threshold.max(1),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock().unwrap().locked
    }

    /// Engage the lock for a broadcast attempt. Resets any accumulated
    /// unlock progress.
    pub fn engage(&self) {
        let mut state = self.state.lock().unwrap();
        state.locked = true;
        state.unlock_signals = 0;
        debug!("Wallet lock engaged");
    }

    /// Record one unlock signal; clears the lock once the hysteresis
    /// threshold is reached.
    pub fn signal_unlock(&self) {
        let mut state = self.state.lock().unwrap();
        if !state.locked {
            return;
        }
        state.unlock_signals += 1;
        if state.unlock_signals >= self.threshold {
            state.locked = false;
            state.unlock_signals = 0;
            debug!("Wallet lock released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needs_three_signals_to_clear() {
        let lock = WalletLock::new(3);
        lock.engage();
        lock.signal_unlock();
        lock.signal_unlock();
        assert!(lock.is_locked());
        lock.signal_unlock();
        assert!(!lock.is_locked());
    }

    #[test]
    fn engaging_resets_progress() {
        let lock = WalletLock::new(3);
        lock.engage();
        lock.signal_unlock();
        lock.signal_unlock();
        lock.engage();
        lock.signal_unlock();
        lock.signal_unlock();
        assert!(lock.is_locked());
        lock.signal_unlock();
        assert!(!lock.is_locked());
    }

    #[test]
    fn signals_without_lock_are_ignored() {
        let lock = WalletLock::new(3);
        for _ in 0..10 {
            lock.signal_unlock();
        }
        assert!(!lock.is_locked());
        lock.engage();
        assert!(lock.is_locked());
    }
}
