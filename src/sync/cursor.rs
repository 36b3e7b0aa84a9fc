//! Process-wide block cursor.
//!
//! The cursor only ever moves forward. `advance_to` refuses lower or
//! equal heights, so a failed batch retried from the same position can
//! never rewind persisted progress.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockCursor {
    pub height: u64,
    /// Unix timestamp of the last advancement, for the staleness watchdog.
    pub last_advance_unix: i64,
}

pub struct CursorState {
    inner: Mutex<Option<BlockCursor>>,
}

impl CursorState {
    pub fn new(initial: Option<BlockCursor>) -> Self {
        Self {
            inner: Mutex::new(initial),
        }
    }

    pub fn snapshot(&self) -> Option<BlockCursor> {
        *self.inner.lock().unwrap()
    }

    pub fn height(&self) -> Option<u64> {
        self.inner.lock().unwrap().map(|c| c.height)
    }

    /// Advance to `height`, returning the new snapshot, or `None` when
    /// the move would not be strictly forward.
    pub fn advance_to(&self, height: u64) -> Option<BlockCursor> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(current) = *inner {
            if height <= current.height {
                return None;
            }
        }
        let cursor = BlockCursor {
            height,
            last_advance_unix: Utc::now().timestamp(),
        };
        *inner = Some(cursor);
        Some(cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_only_forward() {
        let state = CursorState::new(None);
        assert!(state.advance_to(10).is_some());
        assert!(state.advance_to(10).is_none());
        assert!(state.advance_to(9).is_none());
        assert_eq!(state.height(), Some(10));
        assert!(state.advance_to(11).is_some());
        assert_eq!(state.height(), Some(11));
    }

    #[test]
    fn restores_from_persisted_value() {
        let state = CursorState::new(Some(BlockCursor {
            height: 500,
            last_advance_unix: 1,
        }));
        assert!(state.advance_to(400).is_none());
        assert_eq!(state.height(), Some(500));
    }
}
