//!
//! JSON-RPC transport for NEO-style nodes.
//!
//! Speaks the classic `getblockcount` / `getblock` / `sendrawtransaction`
//! method set over HTTP and, for live-follow, a WebSocket `block_added`
//! subscription. All responses are normalized into [`Block`] /
//! [`TransferOp`] before they leave this module.

use crate::chain::transport::{BlockStream, ChainTransport};
use crate::chain::types::{Block, BroadcastAck, ChainError, SignedTransfer, TransferOp, TxStatus};
use crate::utils::to_base_units;
use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error};

/// Transaction type carrying plain asset transfers.
const TRANSFER_TX_TYPE: &str = "ContractTransaction";

pub struct JsonRpcTransport {
    http_client: Client,
    asset: String,
    asset_id: Option<String>,
    decimals: u32,
}

impl JsonRpcTransport {
    pub fn new(asset: String, asset_id: Option<String>, decimals: u32) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http_client,
            asset,
            asset_id,
            decimals,
        }
    }

    /// Execute a single JSON-RPC call and unwrap the response envelope.
    async fn call(&self, url: &str, method: &str, params: Value) -> Result<Value, ChainError> {
        let request_body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1,
        });

        let response = self
            .http_client
            .post(url)
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ChainError::Rpc(format!("HTTP error: {}", response.status())));
        }

        let response_json: Value = response.json().await?;

        if let Some(err) = response_json.get("error") {
            let message = err
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown RPC error");
            return Err(ChainError::Rpc(message.to_string()));
        }

        response_json
            .get("result")
            .cloned()
            .ok_or_else(|| ChainError::MalformedResponse("missing result field".to_string()))
    }
}

/// Normalize a verbose block object into the transfers of the target asset.
fn parse_block(block: &Value, asset_id: Option<&str>, decimals: u32) -> Result<Block, ChainError> {
    let height = block
        .get("index")
        .and_then(|h| h.as_u64())
        .ok_or_else(|| ChainError::MalformedResponse("block missing index".to_string()))?;

    let mut transfers = Vec::new();
    if let Some(txs) = block.get("tx").and_then(|t| t.as_array()) {
        for tx in txs {
            if tx.get("type").and_then(|t| t.as_str()) != Some(TRANSFER_TX_TYPE) {
                continue;
            }
            let Some(txid) = tx.get("txid").and_then(|t| t.as_str()) else {
                return Err(ChainError::MalformedResponse(
                    "transaction missing txid".to_string(),
                ));
            };
            let Some(vouts) = tx.get("vout").and_then(|v| v.as_array()) else {
                continue;
            };
            for vout in vouts {
                if let Some(wanted) = asset_id {
                    if vout.get("asset").and_then(|a| a.as_str()) != Some(wanted) {
                        continue;
                    }
                }
                let Some(address) = vout.get("address").and_then(|a| a.as_str()) else {
                    continue;
                };
                let amount = parse_amount(vout.get("value"), decimals)?;
                transfers.push(TransferOp {
                    txid: txid.to_string(),
                    from: None,
                    to: address.to_string(),
                    amount,
                });
            }
        }
    }

    Ok(Block { height, transfers })
}

/// Output values arrive as either decimal strings or plain numbers.
fn parse_amount(value: Option<&Value>, decimals: u32) -> Result<u64, ChainError> {
    match value {
        Some(Value::String(s)) => s
            .parse::<f64>()
            .map(|v| to_base_units(v, decimals))
            .map_err(|_| ChainError::MalformedResponse(format!("bad output value: {}", s))),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(|v| to_base_units(v, decimals))
            .ok_or_else(|| ChainError::MalformedResponse("bad output value".to_string())),
        _ => Err(ChainError::MalformedResponse(
            "output missing value".to_string(),
        )),
    }
}

#[async_trait::async_trait]
impl ChainTransport for JsonRpcTransport {
    fn asset(&self) -> &str {
        &self.asset
    }

    fn decimals(&self) -> u32 {
        self.decimals
    }

    async fn probe(&self, url: &str) -> Result<u64, ChainError> {
        self.get_height(url).await
    }

    async fn get_height(&self, url: &str) -> Result<u64, ChainError> {
        let count = self
            .call(url, "getblockcount", json!([]))
            .await?
            .as_u64()
            .ok_or_else(|| ChainError::MalformedResponse("non-numeric block count".to_string()))?;
        // Block count is one past the latest index.
        Ok(count.saturating_sub(1))
    }

    async fn get_block(&self, url: &str, height: u64) -> Result<Block, ChainError> {
        let block = self.call(url, "getblock", json!([height, 1])).await?;
        parse_block(&block, self.asset_id.as_deref(), self.decimals)
    }

    async fn get_balance(&self, url: &str, address: &str) -> Result<u64, ChainError> {
        let state = match self.call(url, "getaccountstate", json!([address])).await {
            Ok(state) => state,
            // Unfunded addresses have no account state at all.
            Err(ChainError::Rpc(msg)) if msg.contains("Unknown") => return Ok(0),
            Err(e) => return Err(e),
        };

        let Some(balances) = state.get("balances").and_then(|b| b.as_array()) else {
            return Ok(0);
        };
        for entry in balances {
            let matches = match self.asset_id.as_deref() {
                Some(wanted) => entry.get("asset").and_then(|a| a.as_str()) == Some(wanted),
                None => true,
            };
            if matches {
                return parse_amount(entry.get("value"), self.decimals);
            }
        }
        Ok(0)
    }

    async fn broadcast(&self, url: &str, tx: &SignedTransfer) -> Result<BroadcastAck, ChainError> {
        let raw = format!("{}{}", tx.raw, tx.signature);
        let accepted = self
            .call(url, "sendrawtransaction", json!([raw]))
            .await?
            .as_bool()
            .unwrap_or(false);
        Ok(BroadcastAck {
            accepted,
            txid: tx.txid.clone(),
        })
    }

    async fn validate_address(&self, url: &str, address: &str) -> Result<bool, ChainError> {
        let result = self.call(url, "validateaddress", json!([address])).await?;
        Ok(result
            .get("isvalid")
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    async fn tx_status(&self, url: &str, txid: &str) -> Result<TxStatus, ChainError> {
        match self.call(url, "getrawtransaction", json!([txid, 1])).await {
            Ok(tx) => {
                if tx.get("confirmations").and_then(|c| c.as_u64()).is_some() {
                    Ok(TxStatus::Confirmed)
                } else {
                    Ok(TxStatus::Pending)
                }
            }
            Err(ChainError::Rpc(msg)) if msg.contains("Unknown transaction") => {
                Ok(TxStatus::Pending)
            }
            Err(e) => Err(e),
        }
    }

    async fn subscribe_blocks(&self, url: &str) -> Result<BlockStream, ChainError> {
        let ws_url = to_ws_url(url);
        debug!("Attempting WebSocket connection to: {}", ws_url);

        let (ws_stream, response) = connect_async(ws_url.as_str()).await?;
        debug!(
            "WebSocket connection established, response status: {}",
            response.status()
        );
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let subscribe_message = json!({
            "jsonrpc": "2.0",
            "method": "subscribe",
            "params": ["block_added"],
            "id": 1,
        });
        ws_sender
            .send(Message::Text(subscribe_message.to_string()))
            .await?;

        // Wait for the subscription ack before handing out the stream.
        if let Some(msg) = ws_receiver.next().await {
            match msg? {
                Message::Text(text) => {
                    let parsed: Value = serde_json::from_str(&text)?;
                    if parsed.get("result").is_none() {
                        return Err(ChainError::Rpc(
                            "subscription not acknowledged".to_string(),
                        ));
                    }
                }
                _ => {
                    return Err(ChainError::Rpc(
                        "unexpected message type during subscribe handshake".to_string(),
                    ));
                }
            }
        }

        let asset_id = self.asset_id.clone();
        let decimals = self.decimals;

        let stream = ws_receiver.filter_map(move |msg| {
            let asset_id = asset_id.clone();
            async move {
                match msg {
                    Ok(Message::Text(text)) => match serde_json::from_str::<Value>(&text) {
                        Ok(parsed) => {
                            if parsed.get("method").and_then(|m| m.as_str()) != Some("block_added")
                            {
                                debug!("Ignoring non-block notification");
                                return None;
                            }
                            match parsed.get("params").and_then(|p| p.get(0)) {
                                Some(block) => {
                                    Some(parse_block(block, asset_id.as_deref(), decimals))
                                }
                                None => Some(Err(ChainError::MalformedResponse(
                                    "notification missing block payload".to_string(),
                                ))),
                            }
                        }
                        Err(e) => Some(Err(ChainError::Json(e))),
                    },
                    Ok(Message::Close(_)) => {
                        debug!("Block subscription closed by node");
                        None
                    }
                    Ok(_) => None,
                    Err(e) => {
                        error!("Error in block subscription: {}", e);
                        Some(Err(ChainError::WebSocket(e)))
                    }
                }
            }
        });

        Ok(Box::pin(stream))
    }
}

fn to_ws_url(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{}/ws", rest.trim_end_matches('/'))
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{}/ws", rest.trim_end_matches('/'))
    } else {
        format!("ws://{}/ws", url.trim_end_matches('/'))
    }
}
