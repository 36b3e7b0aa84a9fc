use crate::chain::ChainError;
use crate::keystore::KeyError;
use crate::store::StoreError;

/// Top-level error type for engine operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no provider available")]
    NoProviderAvailable,

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("keystore error: {0}")]
    Key(#[from] KeyError),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
