//! Normalized chain types shared by every transport.

use serde::{Deserialize, Serialize};

/// A block reduced to the transfer operations the engine cares about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub transfers: Vec<TransferOp>,
}

/// A single transfer-type output already filtered to the target asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferOp {
    pub txid: String,
    /// Sending address when the wire format exposes one.
    pub from: Option<String>,
    pub to: String,
    /// Amount in base units.
    pub amount: u64,
}

/// On-chain status of a previously observed or broadcast transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Confirmed,
    /// Not found yet; may still land.
    Pending,
    /// Rejected by the chain.
    Failed,
}

/// Result of submitting a signed transfer to a node.
#[derive(Debug, Clone)]
pub struct BroadcastAck {
    pub accepted: bool,
    pub txid: String,
}

/// A transfer signed and serialized by the key store, opaque to the
/// engine beyond its id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedTransfer {
    pub txid: String,
    /// Hex-encoded raw payload.
    pub raw: String,
    /// Hex-encoded signature over the payload digest.
    pub signature: String,
}

/// Error types for transport operations
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("transaction not found")]
    TxNotFound,

    #[error("block subscription not supported by this transport")]
    SubscriptionUnsupported,
}
