//! REST transport for TRON-style nodes (`/wallet/*` HTTP API).
//!
//! No push subscription exists on this API; live-follow degrades to
//! polling.

use crate::chain::transport::{BlockStream, ChainTransport};
use crate::chain::types::{Block, BroadcastAck, ChainError, SignedTransfer, TransferOp, TxStatus};
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;

/// Contract type carrying plain asset transfers.
const TRANSFER_CONTRACT: &str = "TransferContract";

pub struct RestTransport {
    http_client: Client,
    asset: String,
    decimals: u32,
}

impl RestTransport {
    pub fn new(asset: String, decimals: u32) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http_client,
            asset,
            decimals,
        }
    }

    async fn post(&self, url: &str, path: &str, body: Value) -> Result<Value, ChainError> {
        let endpoint = format!("{}/{}", url.trim_end_matches('/'), path);
        let response = self
            .http_client
            .post(&endpoint)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ChainError::Rpc(format!("HTTP error: {}", response.status())));
        }

        Ok(response.json().await?)
    }
}

fn block_height(block: &Value) -> Result<u64, ChainError> {
    block
        .pointer("/block_header/raw_data/number")
        .and_then(|n| n.as_u64())
        .ok_or_else(|| ChainError::MalformedResponse("block missing height".to_string()))
}

/// Normalize a node block into the transfer operations it contains.
fn parse_block(block: &Value) -> Result<Block, ChainError> {
    let height = block_height(block)?;

    let mut transfers = Vec::new();
    if let Some(txs) = block.get("transactions").and_then(|t| t.as_array()) {
        for tx in txs {
            let Some(contract) = tx.pointer("/raw_data/contract/0") else {
                continue;
            };
            if contract.get("type").and_then(|t| t.as_str()) != Some(TRANSFER_CONTRACT) {
                continue;
            }
            let Some(txid) = tx.get("txID").and_then(|t| t.as_str()) else {
                return Err(ChainError::MalformedResponse(
                    "transaction missing txID".to_string(),
                ));
            };
            let Some(param) = contract.pointer("/parameter/value") else {
                return Err(ChainError::MalformedResponse(
                    "transfer missing parameter value".to_string(),
                ));
            };
            let amount = param.get("amount").and_then(|a| a.as_u64()).ok_or_else(|| {
                ChainError::MalformedResponse("transfer missing amount".to_string())
            })?;
            let Some(to) = param.get("to_address").and_then(|a| a.as_str()) else {
                continue;
            };
            let from = param
                .get("owner_address")
                .and_then(|a| a.as_str())
                .map(|s| s.to_string());
            transfers.push(TransferOp {
                txid: txid.to_string(),
                from,
                to: to.to_string(),
                amount,
            });
        }
    }

    Ok(Block { height, transfers })
}

#[async_trait::async_trait]
impl ChainTransport for RestTransport {
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
        let block = self.post(url, "wallet/getnowblock", json!({})).await?;
        block_height(&block)
    }

    async fn get_block(&self, url: &str, height: u64) -> Result<Block, ChainError> {
        let block = self
            .post(url, "wallet/getblockbynum", json!({"num": height, "visible": true}))
            .await?;
        parse_block(&block)
    }

    async fn get_balance(&self, url: &str, address: &str) -> Result<u64, ChainError> {
        let account = self
            .post(
                url,
                "wallet/getaccount",
                json!({"address": address, "visible": true}),
            )
            .await?;
        // Unfunded accounts come back as an empty object.
        Ok(account.get("balance").and_then(|b| b.as_u64()).unwrap_or(0))
    }

    async fn broadcast(&self, url: &str, tx: &SignedTransfer) -> Result<BroadcastAck, ChainError> {
        let body = json!({
            "txID": tx.txid,
            "raw_data_hex": tx.raw,
            "signature": [tx.signature],
            "visible": true,
        });
        let result = self.post(url, "wallet/broadcasttransaction", body).await?;
        let accepted = result
            .get("result")
            .and_then(|r| r.as_bool())
            .unwrap_or(false);
        Ok(BroadcastAck {
            accepted,
            txid: tx.txid.clone(),
        })
    }

    async fn validate_address(&self, url: &str, address: &str) -> Result<bool, ChainError> {
        let result = self
            .post(
                url,
                "wallet/validateaddress",
                json!({"address": address, "visible": true}),
            )
            .await?;
        Ok(result
            .get("result")
            .and_then(|r| r.as_bool())
            .unwrap_or(false))
    }

    async fn tx_status(&self, url: &str, txid: &str) -> Result<TxStatus, ChainError> {
        let tx = self
            .post(url, "wallet/gettransactionbyid", json!({"value": txid}))
            .await?;
        // Unknown transactions come back as an empty object.
        if tx.as_object().map(|o| o.is_empty()).unwrap_or(true) {
            return Ok(TxStatus::Pending);
        }
        match tx.pointer("/ret/0/contractRet").and_then(|r| r.as_str()) {
            Some("SUCCESS") => Ok(TxStatus::Confirmed),
            Some(_) => Ok(TxStatus::Failed),
            None => Ok(TxStatus::Pending),
        }
    }

    async fn subscribe_blocks(&self, _url: &str) -> Result<BlockStream, ChainError> {
        Err(ChainError::SubscriptionUnsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_transfer_contracts_only() {
        let block = json!({
            "block_header": {"raw_data": {"number": 7}},
            "transactions": [
                {
                    "txID": "aa11",
                    "raw_data": {"contract": [{
                        "type": "TransferContract",
                        "parameter": {"value": {
                            "amount": 1_500_000,
                            "owner_address": "Tfrom",
                            "to_address": "Tto",
                        }},
                    }]},
                },
                {
                    "txID": "bb22",
                    "raw_data": {"contract": [{
                        "type": "TriggerSmartContract",
                        "parameter": {"value": {}},
                    }]},
                },
            ],
        });
        let parsed = parse_block(&block).unwrap();
        assert_eq!(parsed.height, 7);
        assert_eq!(parsed.transfers.len(), 1);
        assert_eq!(parsed.transfers[0].from.as_deref(), Some("Tfrom"));
        assert_eq!(parsed.transfers[0].amount, 1_500_000);
    }

    #[test]
    fn transfer_without_amount_is_malformed() {
        let block = json!({
            "block_header": {"raw_data": {"number": 7}},
            "transactions": [{
                "txID": "aa11",
                "raw_data": {"contract": [{
                    "type": "TransferContract",
                    "parameter": {"value": {"to_address": "Tto"}},
                }]},
            }],
        });
        assert!(parse_block(&block).is_err());
    }
}
