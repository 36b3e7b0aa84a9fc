/// Pool-backed client facade
pub mod client;
/// NEO-style JSON-RPC transport
pub mod json_rpc;
/// TRON-style REST transport
pub mod rest;
/// Capability interface implemented by every transport
pub mod transport;
/// Normalized wire types
pub mod types;

pub use client::ChainClient;
pub use json_rpc::JsonRpcTransport;
pub use rest::RestTransport;
pub use transport::{BlockStream, ChainTransport};
pub use types::{Block, BroadcastAck, ChainError, SignedTransfer, TransferOp, TxStatus};
