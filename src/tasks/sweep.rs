//! Consolidation sweeps into the master address.

use crate::chain::ChainClient;
use crate::error::EngineError;
use crate::store::AddressStore;
use crate::utils::format_token_amount;
use crate::withdraw::{SendOutcome, WithdrawalQueue};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared by the periodic scheduler and the manual sweep operations.
pub struct Sweeper {
    store: Arc<dyn AddressStore>,
    client: Arc<ChainClient>,
    queue: WithdrawalQueue,
    dust_threshold: u64,
}

impl Sweeper {
    pub fn new(
        store: Arc<dyn AddressStore>,
        client: Arc<ChainClient>,
        queue: WithdrawalQueue,
        dust_threshold: u64,
    ) -> Self {
        Self {
            store,
            client,
            queue,
            dust_threshold,
        }
    }

    /// Sweep one address's full on-chain balance to the master.
    pub async fn sweep_address(&self, address: &str) -> Result<SendOutcome, EngineError> {
        let master = self.store.get_master().await?;
        if address == master.address {
            return Ok(SendOutcome::NotSent);
        }
        let balance = self.client.get_balance(address).await?;
        if balance == 0 {
            info!("Not enough balance to sweep from {}", address);
            return Ok(SendOutcome::NotSent);
        }
        info!(
            "Sweeping {} from {} to master {}",
            format_token_amount(balance, self.client.decimals()),
            address,
            master.address
        );
        Ok(self.queue.send(address, &master.address, balance, true).await)
    }

    /// Sweep every managed address above the dust threshold. Sweeps run
    /// concurrently; they only contend on the broadcast queue itself.
    pub async fn sweep_all(&self) -> Result<usize, EngineError> {
        let last = self.store.last_index().await?;
        let mut targets = Vec::new();
        for index in 1..=last {
            if let Some(addr) = self.store.get_address(index, true).await? {
                if addr.balance >= self.dust_threshold.max(1) {
                    targets.push(addr.address);
                }
            }
        }

        let sweeps = targets.iter().map(|address| self.sweep_address(address));
        let swept = join_all(sweeps)
            .await
            .into_iter()
            .filter(|outcome| matches!(outcome, Ok(SendOutcome::Sent { .. })))
            .count();
        Ok(swept)
    }

    /// Periodic entry point; failures are logged and retried next tick.
    pub async fn run_periodic(&self) {
        match self.sweep_all().await {
            Ok(0) => {}
            Ok(swept) => info!("Swept {} addresses", swept),
            Err(e) => warn!("Sweep pass failed: {}", e),
        }
    }
}
