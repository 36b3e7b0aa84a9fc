//! The block-cursor state machine.
//!
//! Every pass re-evaluates the deficit between the chain head and the
//! persisted cursor and picks one of two modes:
//!
//! - **Catch-up** (deficit > 2): fetch a capped batch of blocks in
//!   bounded concurrent chunks, extract and queue every transfer, then
//!   persist the cursor once for the whole batch. A failure anywhere
//!   leaves the cursor where it was; the next pass retries the same
//!   range against a freshly leased provider. Re-delivered blocks are
//!   harmless because deposit processing is deduplicated by txid.
//! - **Live-follow** (deficit <= 2): prefer the transport's push
//!   subscription and process each pushed block like a polled one,
//!   advancing the cursor per block; fall back to polling when the
//!   transport has no subscription. Each followed block or successful
//!   idle pass feeds one unlock signal to the wallet lock.

use crate::chain::{Block, ChainClient, ChainError};
use crate::config::{
    BATCH_FAST, BATCH_NORMAL, FAST_SYNC_THRESHOLD, FETCH_CHUNK, LIVE_FOLLOW_THRESHOLD,
    LIVE_POLL_SECS, PROVIDER_RETRY_SECS, START_OFFSET,
};
use crate::error::EngineError;
use crate::store::{AddressStore, DepositCache};
use crate::sync::cursor::CursorState;
use crate::sync::deposits::{DepositProcessor, extract_deposits};
use crate::withdraw::WalletLock;
use futures::future::join_all;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// What a sync pass did, deciding how soon the next one runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Blocks were committed; keep catching up immediately.
    Advanced,
    /// Caught up with the head; switch to live-follow.
    Idle,
}

enum PushOutcome {
    Continue,
    /// A gap or stale push means the subscription cannot be trusted;
    /// return to catch-up.
    ResyncNeeded,
}

/// Batch size for one catch-up pass given the current deficit.
pub fn plan_batch(deficit: u64) -> u64 {
    if deficit > FAST_SYNC_THRESHOLD {
        deficit.min(BATCH_FAST)
    } else {
        deficit.min(BATCH_NORMAL)
    }
}

pub struct SyncEngine {
    client: Arc<ChainClient>,
    store: Arc<dyn AddressStore>,
    cache: Arc<DepositCache>,
    processor: Arc<DepositProcessor>,
    lock: Arc<WalletLock>,
    cursor: Arc<CursorState>,
    master_address: String,
}

impl SyncEngine {
    pub fn new(
        client: Arc<ChainClient>,
        store: Arc<dyn AddressStore>,
        cache: Arc<DepositCache>,
        processor: Arc<DepositProcessor>,
        lock: Arc<WalletLock>,
        cursor: Arc<CursorState>,
        master_address: String,
    ) -> Self {
        Self {
            client,
            store,
            cache,
            processor,
            lock,
            cursor,
            master_address,
        }
    }

    /// Main loop, runs for the process lifetime.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("Starting chain synchronization");
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.run_cycle().await {
                Ok(CycleOutcome::Advanced) => {}
                Ok(CycleOutcome::Idle) => self.live_follow(&mut shutdown).await,
                Err(e) => {
                    warn!("Sync cycle failed, forcing provider refresh: {}", e);
                    if let Err(e) = self.client.refresh_provider().await {
                        warn!("Provider refresh failed: {}", e);
                    }
                    if !wait_or_shutdown(&mut shutdown, PROVIDER_RETRY_SECS).await {
                        break;
                    }
                }
            }
        }
        info!("Chain synchronization stopped");
    }

    /// One catch-up-or-idle pass. Errors leave the cursor untouched.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, EngineError> {
        let head = self.client.get_height().await?;

        let cursor = match self.cursor.height() {
            Some(height) => height,
            None => {
                let start = head.saturating_sub(START_OFFSET);
                info!("Starting at the latest block {}", start);
                if let Some(snapshot) = self.cursor.advance_to(start) {
                    self.store.save_cursor(snapshot).await?;
                }
                start
            }
        };

        let deficit = head.saturating_sub(cursor);
        if deficit <= LIVE_FOLLOW_THRESHOLD {
            self.lock.signal_unlock();
            return Ok(CycleOutcome::Idle);
        }

        self.catch_up(cursor, deficit).await?;
        self.lock.signal_unlock();
        Ok(CycleOutcome::Advanced)
    }

    /// Fetch and commit one batch. Fetches are concurrent within a chunk
    /// to bound in-flight requests; blocks are extracted in height order
    /// and the cursor is persisted only after the full batch is queued.
    async fn catch_up(&self, cursor: u64, deficit: u64) -> Result<(), EngineError> {
        let batch = plan_batch(deficit);
        let target = cursor + batch;
        info!("Syncing {} - {}", cursor + 1, target);

        let heights: Vec<u64> = (cursor + 1..=target).collect();
        for chunk in heights.chunks(FETCH_CHUNK) {
            let fetches = chunk.iter().map(|height| self.client.get_block(*height));
            for fetched in join_all(fetches).await {
                let block = fetched?;
                self.process_block(&block).await?;
            }
        }

        if let Some(snapshot) = self.cursor.advance_to(target) {
            self.store.save_cursor(snapshot).await?;
        }
        self.cache.flush().await?;
        Ok(())
    }

    /// Extract a block's deposits and hand each unseen one to the
    /// processor.
    async fn process_block(&self, block: &Block) -> Result<(), EngineError> {
        let events = extract_deposits(block, &self.store, &self.master_address).await?;
        for event in events {
            if self.cache.has(&event.txid) {
                continue;
            }
            let processor = Arc::clone(&self.processor);
            tokio::spawn(async move {
                processor.process(event).await;
            });
        }
        Ok(())
    }

    /// Follow the head until the subscription drops, a gap appears, or
    /// shutdown is requested.
    async fn live_follow(&self, shutdown: &mut watch::Receiver<bool>) {
        match self.client.subscribe_blocks().await {
            Ok(mut blocks) => {
                info!("Following new blocks via subscription");
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => return,
                        item = blocks.next() => match item {
                            Some(Ok(block)) => match self.handle_pushed_block(&block).await {
                                Ok(PushOutcome::Continue) => {}
                                Ok(PushOutcome::ResyncNeeded) => return,
                                Err(e) => {
                                    warn!("Failed to process pushed block: {}", e);
                                    if let Err(e) = self.client.refresh_provider().await {
                                        warn!("Provider refresh failed: {}", e);
                                    }
                                    return;
                                }
                            },
                            Some(Err(e)) => {
                                warn!("Block subscription error: {}", e);
                                if let Err(e) = self.client.refresh_provider().await {
                                    warn!("Provider refresh failed: {}", e);
                                }
                                return;
                            }
                            None => {
                                debug!("Block subscription ended");
                                return;
                            }
                        },
                    }
                }
            }
            Err(EngineError::Chain(ChainError::SubscriptionUnsupported)) => {
                wait_or_shutdown(shutdown, LIVE_POLL_SECS).await;
            }
            Err(e) => {
                warn!("Block subscription unavailable: {}", e);
                wait_or_shutdown(shutdown, LIVE_POLL_SECS).await;
            }
        }
    }

    async fn handle_pushed_block(&self, block: &Block) -> Result<PushOutcome, EngineError> {
        let cursor = self.cursor.height().unwrap_or(0);
        if block.height <= cursor {
            debug!("Ignoring already-processed pushed block {}", block.height);
            return Ok(PushOutcome::Continue);
        }
        if block.height > cursor + 1 {
            debug!(
                "Gap in pushed blocks ({} -> {}), returning to catch-up",
                cursor, block.height
            );
            return Ok(PushOutcome::ResyncNeeded);
        }

        self.process_block(block).await?;
        if let Some(snapshot) = self.cursor.advance_to(block.height) {
            self.store.save_cursor(snapshot).await?;
        }
        self.lock.signal_unlock();
        Ok(PushOutcome::Continue)
    }
}

/// Sleep unless shutdown fires first; returns false on shutdown.
async fn wait_or_shutdown(shutdown: &mut watch::Receiver<bool>, secs: u64) -> bool {
    tokio::select! {
        _ = shutdown.changed() => false,
        _ = sleep(Duration::from_secs(secs)) => true,
    }
}
