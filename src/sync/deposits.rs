//! Deposit extraction and crediting.
//!
//! Extraction turns a normalized block into the deposits addressed to
//! managed addresses. Crediting re-verifies the transaction on-chain
//! after a grace period, refreshes the receiving balance, records the
//! txid, and fires the notification. The DepositCache membership check
//! before and after the wait is what makes notification at-most-once
//! under duplicate block delivery.

use crate::chain::{Block, ChainClient, TxStatus};
use crate::config::{BALANCE_SETTLE_SECS, CONFIRM_GRACE_SECS, STATUS_RETRIES, STATUS_RETRY_SECS};
use crate::error::EngineError;
use crate::notify::{DepositNotification, Notifier};
use crate::store::{AddressStore, DepositCache};
use crate::utils::to_decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// One qualifying transfer output, produced per block, consumed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositEvent {
    pub txid: String,
    pub from: Option<String>,
    pub to: String,
    pub amount: u64,
}

/// Filter a block's transfers down to deposits into managed addresses.
///
/// Transfers into the master address are consolidation traffic, not
/// deposits, and are never re-notified.
pub async fn extract_deposits(
    block: &Block,
    store: &Arc<dyn AddressStore>,
    master_address: &str,
) -> Result<Vec<DepositEvent>, EngineError> {
    let mut events = Vec::new();
    for op in &block.transfers {
        if op.to == master_address {
            continue;
        }
        if !store.verify(&op.to).await? {
            continue;
        }
        events.push(DepositEvent {
            txid: op.txid.clone(),
            from: op.from.clone(),
            to: op.to.clone(),
            amount: op.amount,
        });
    }
    Ok(events)
}

pub struct DepositProcessor {
    client: Arc<ChainClient>,
    store: Arc<dyn AddressStore>,
    cache: Arc<DepositCache>,
    notifier: Arc<dyn Notifier>,
}

impl DepositProcessor {
    pub fn new(
        client: Arc<ChainClient>,
        store: Arc<dyn AddressStore>,
        cache: Arc<DepositCache>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            client,
            store,
            cache,
            notifier,
        }
    }

    /// Drive one deposit to its terminal state: credited, abandoned, or
    /// short-circuited as processed.
    pub async fn process(&self, event: DepositEvent) {
        if self.cache.has(&event.txid) {
            return;
        }
        info!("Processing transaction {}", event.txid);
        sleep(Duration::from_secs(CONFIRM_GRACE_SECS)).await;

        for attempt in 1..=STATUS_RETRIES {
            match self.client.tx_status(&event.txid).await {
                Ok(TxStatus::Confirmed) => {
                    self.credit(&event).await;
                    return;
                }
                Ok(TxStatus::Pending) => {
                    if attempt == STATUS_RETRIES {
                        warn!(
                            "Txid {} still not found after {} checks, abandoning deposit",
                            event.txid, STATUS_RETRIES
                        );
                        return;
                    }
                    info!("Txid {} not found, rechecking in {}s", event.txid, STATUS_RETRY_SECS);
                    sleep(Duration::from_secs(STATUS_RETRY_SECS)).await;
                }
                Ok(TxStatus::Failed) => {
                    warn!("Txid {} failed on-chain, marking processed", event.txid);
                    self.cache.add(&event.txid);
                    return;
                }
                Err(e) => {
                    // Anything but not-found is not worth re-driving.
                    warn!("Verification of {} failed ({}), marking processed", event.txid, e);
                    self.cache.add(&event.txid);
                    return;
                }
            }
        }
    }

    async fn credit(&self, event: &DepositEvent) {
        sleep(Duration::from_secs(BALANCE_SETTLE_SECS)).await;

        let balance = match self.client.get_balance(&event.to).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!("Balance read for {} failed ({}), marking processed", event.to, e);
                self.cache.add(&event.txid);
                return;
            }
        };
        if let Err(e) = self.store.set_balance(&event.to, balance, None).await {
            warn!("Balance update for {} failed ({}), marking processed", event.to, e);
            self.cache.add(&event.txid);
            return;
        }

        // The atomic insert decides which of any racing processors for a
        // re-delivered block gets to notify.
        if !self.cache.add(&event.txid) {
            return;
        }
        info!(
            "Transaction found: {} credited {} to {}",
            event.txid, event.amount, event.to
        );
        self.notifier.notify(DepositNotification {
            hash: event.txid.clone(),
            amount: to_decimal(event.amount, self.client.decimals()),
            token: self.client.asset().to_string(),
            to: event.to.clone(),
            from: event.from.clone(),
        });
    }
}
