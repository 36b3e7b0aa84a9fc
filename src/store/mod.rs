/// Managed address / settings persistence
pub mod address_store;
/// Bounded processed-txid cache
pub mod deposit_cache;

pub use address_store::{AddressStore, FileAddressStore, ManagedAddress, MasterRecord};
pub use deposit_cache::DepositCache;

use crate::keystore::KeyError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown address: {0}")]
    UnknownAddress(String),

    #[error("master record missing")]
    MasterMissing,

    #[error("key error: {0}")]
    Key(#[from] KeyError),
}
