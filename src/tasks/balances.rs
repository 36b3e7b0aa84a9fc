//! Periodic reconciliation of cached balances against the chain.

use crate::chain::ChainClient;
use crate::store::AddressStore;
use std::sync::Arc;
use tracing::{info, warn};

pub struct BalanceRefresher {
    client: Arc<ChainClient>,
    store: Arc<dyn AddressStore>,
}

impl BalanceRefresher {
    pub fn new(client: Arc<ChainClient>, store: Arc<dyn AddressStore>) -> Self {
        Self { client, store }
    }

    /// Re-read every managed address's on-chain balance into the store.
    /// A provider failure aborts the pass; the next tick retries.
    pub async fn refresh_all(&self) {
        info!("Updating balances");
        let last = match self.store.last_index().await {
            Ok(last) => last,
            Err(e) => {
                warn!("Balance refresh aborted: {}", e);
                return;
            }
        };
        for index in 1..=last {
            let addr = match self.store.get_address(index, false).await {
                Ok(Some(addr)) => addr,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Balance refresh aborted at index {}: {}", index, e);
                    return;
                }
            };
            match self.client.get_balance(&addr.address).await {
                Ok(balance) => {
                    if let Err(e) = self.store.set_balance(&addr.address, balance, None).await {
                        warn!("Failed to store balance for {}: {}", addr.address, e);
                    }
                }
                Err(e) => {
                    warn!("Balance refresh aborted at {}: {}", addr.address, e);
                    return;
                }
            }
        }
    }
}
