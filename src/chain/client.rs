//! Pool-backed chain client.
//!
//! Thin facade every component talks to: each call leases the current
//! endpoint from the provider pool and delegates to the transport. On a
//! client-observed failure the caller asks for [`ChainClient::refresh_provider`],
//! which forces a new probe race.

use crate::chain::transport::{BlockStream, ChainTransport};
use crate::chain::types::{Block, BroadcastAck, SignedTransfer, TxStatus};
use crate::error::EngineError;
use crate::provider::ProviderPool;
use std::sync::Arc;

pub struct ChainClient {
    pool: ProviderPool,
    transport: Arc<dyn ChainTransport>,
}

impl ChainClient {
    pub fn new(pool: ProviderPool, transport: Arc<dyn ChainTransport>) -> Self {
        Self { pool, transport }
    }

    pub fn asset(&self) -> &str {
        self.transport.asset()
    }

    pub fn decimals(&self) -> u32 {
        self.transport.decimals()
    }

    /// Discard the current lease and race a fresh probe round.
    pub async fn refresh_provider(&self) -> Result<(), EngineError> {
        self.pool.lease(true).await.map(|_| ())
    }

    pub async fn get_height(&self) -> Result<u64, EngineError> {
        let url = self.pool.lease(false).await?;
        Ok(self.transport.get_height(&url).await?)
    }

    pub async fn get_block(&self, height: u64) -> Result<Block, EngineError> {
        let url = self.pool.lease(false).await?;
        Ok(self.transport.get_block(&url, height).await?)
    }

    pub async fn get_balance(&self, address: &str) -> Result<u64, EngineError> {
        let url = self.pool.lease(false).await?;
        Ok(self.transport.get_balance(&url, address).await?)
    }

    pub async fn broadcast(&self, tx: &SignedTransfer) -> Result<BroadcastAck, EngineError> {
        let url = self.pool.lease(false).await?;
        Ok(self.transport.broadcast(&url, tx).await?)
    }

    pub async fn validate_address(&self, address: &str) -> Result<bool, EngineError> {
        let url = self.pool.lease(false).await?;
        Ok(self.transport.validate_address(&url, address).await?)
    }

    pub async fn tx_status(&self, txid: &str) -> Result<TxStatus, EngineError> {
        let url = self.pool.lease(false).await?;
        Ok(self.transport.tx_status(&url, txid).await?)
    }

    pub async fn subscribe_blocks(&self) -> Result<BlockStream, EngineError> {
        let url = self.pool.lease(false).await?;
        Ok(self.transport.subscribe_blocks(&url).await?)
    }
}
