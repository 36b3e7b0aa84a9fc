//! Staleness watchdog.
//!
//! Compares block-height progress against wall-clock progress. A stall
//! is declared only when both the block deficit and the time since the
//! last cursor advance exceed their thresholds; the response is a flush
//! and a non-zero exit so an external supervisor restarts the process.
//! A stuck provider lease or subscription is not safely unwindable in
//! place.

use crate::chain::ChainClient;
use crate::store::{AddressStore, DepositCache};
use crate::sync::CursorState;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, warn};

/// Pure stall decision: both thresholds must be exceeded.
pub fn is_stalled(block_deficit: u64, elapsed_secs: i64, min_deficit: u64, min_secs: i64) -> bool {
    block_deficit >= min_deficit && elapsed_secs >= min_secs
}

pub struct HealthMonitor {
    client: Arc<ChainClient>,
    cursor: Arc<CursorState>,
    cache: Arc<DepositCache>,
    store: Arc<dyn AddressStore>,
    min_deficit: u64,
    min_secs: i64,
}

impl HealthMonitor {
    pub fn new(
        client: Arc<ChainClient>,
        cursor: Arc<CursorState>,
        cache: Arc<DepositCache>,
        store: Arc<dyn AddressStore>,
        min_deficit: u64,
        min_secs: i64,
    ) -> Self {
        Self {
            client,
            cursor,
            cache,
            store,
            min_deficit,
            min_secs,
        }
    }

    pub async fn check(&self) {
        let Some(cursor) = self.cursor.snapshot() else {
            return;
        };
        let head = match self.client.get_height().await {
            Ok(head) => head,
            Err(e) => {
                warn!("Health check skipped, height unavailable: {}", e);
                return;
            }
        };

        let deficit = head.saturating_sub(cursor.height);
        let elapsed = Utc::now().timestamp() - cursor.last_advance_unix;
        if !is_stalled(deficit, elapsed, self.min_deficit, self.min_secs) {
            return;
        }

        error!(
            "Sync stalled: {} blocks behind, no advance for {}s. Flushing state and exiting",
            deficit, elapsed
        );
        if let Err(e) = self.cache.flush().await {
            error!("Failed to flush deposit cache: {}", e);
        }
        if let Err(e) = self.store.flush().await {
            error!("Failed to flush address store: {}", e);
        }
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stall_requires_both_thresholds() {
        // Thresholds: 5 blocks and 180 seconds.
        assert!(is_stalled(8, 200, 5, 180));
        assert!(!is_stalled(8, 60, 5, 180));
        assert!(!is_stalled(3, 600, 5, 180));
        assert!(is_stalled(5, 180, 5, 180));
    }
}
