use crate::chain::types::{Block, BroadcastAck, ChainError, SignedTransfer, TxStatus};
use futures_util::Stream;
use std::pin::Pin;

/// Stream of blocks pushed by a node subscription.
pub type BlockStream = Pin<Box<dyn Stream<Item = Result<Block, ChainError>> + Send>>;

/// The one capability interface every chain backend implements.
///
/// Transports are stateless over the endpoint: every call takes the URL
/// leased from the provider pool, so a lease swap needs no client rebuild.
#[async_trait::async_trait]
pub trait ChainTransport: Send + Sync {
    /// Asset symbol this transport filters transfers for.
    fn asset(&self) -> &str;

    /// Base-unit decimals of the asset.
    fn decimals(&self) -> u32;

    /// Cheap liveness probe returning the node's reported chain height.
    async fn probe(&self, url: &str) -> Result<u64, ChainError>;

    async fn get_height(&self, url: &str) -> Result<u64, ChainError>;

    async fn get_block(&self, url: &str, height: u64) -> Result<Block, ChainError>;

    /// Balance of an address in base units.
    async fn get_balance(&self, url: &str, address: &str) -> Result<u64, ChainError>;

    async fn broadcast(&self, url: &str, tx: &SignedTransfer) -> Result<BroadcastAck, ChainError>;

    async fn validate_address(&self, url: &str, address: &str) -> Result<bool, ChainError>;

    async fn tx_status(&self, url: &str, txid: &str) -> Result<TxStatus, ChainError>;

    /// Push subscription to new blocks, where the node offers one.
    ///
    /// Transports without one return [`ChainError::SubscriptionUnsupported`]
    /// and the sync engine falls back to polling.
    async fn subscribe_blocks(&self, url: &str) -> Result<BlockStream, ChainError>;
}
