//! Gateway-facing wallet operations.
//!
//! The HTTP layer itself lives outside this crate; this facade is the
//! exact operation set it calls into. Address-format validation happens
//! here, before anything reaches the queue or the sync path.

use crate::chain::{ChainClient, ChainError, TxStatus};
use crate::config::{WITHDRAW_CONFIRM_ATTEMPTS, WITHDRAW_CONFIRM_DELAY_SECS};
use crate::error::EngineError;
use crate::store::{AddressStore, ManagedAddress, address_store::SECRET_SETTING};
use crate::sync::CursorState;
use crate::tasks::Sweeper;
use crate::utils::{generate_secret, public_ip, to_base_units};
use crate::withdraw::{SendOutcome, WithdrawalQueue};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct WalletInfo {
    pub secret: String,
    pub withdraw_url: String,
    pub master_address: String,
    pub master_private_key: String,
    pub mnemonic: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WithdrawReceipt {
    pub txid: String,
}

pub struct WalletService {
    client: Arc<ChainClient>,
    store: Arc<dyn AddressStore>,
    queue: WithdrawalQueue,
    sweeper: Arc<Sweeper>,
    cursor: Arc<CursorState>,
    http_client: reqwest::Client,
    api_port: u16,
}

impl WalletService {
    pub fn new(
        client: Arc<ChainClient>,
        store: Arc<dyn AddressStore>,
        queue: WithdrawalQueue,
        sweeper: Arc<Sweeper>,
        cursor: Arc<CursorState>,
        http_client: reqwest::Client,
        api_port: u16,
    ) -> Self {
        Self {
            client,
            store,
            queue,
            sweeper,
            cursor,
            http_client,
            api_port,
        }
    }

    /// Master credentials and the advertised withdraw URL. Provisions the
    /// shared secret on first call.
    pub async fn get_info(&self) -> Result<WalletInfo, EngineError> {
        let secret = match self.store.setting(SECRET_SETTING).await? {
            Some(secret) => secret,
            None => {
                let secret = generate_secret();
                self.store.set_setting(SECRET_SETTING, &secret).await?;
                secret
            }
        };
        let master = self.store.get_master().await?;
        let ip = public_ip(&self.http_client).await;
        Ok(WalletInfo {
            withdraw_url: format!("http://{}:{}/withdraw?key={}", ip, self.api_port, secret),
            secret,
            master_address: master.address,
            master_private_key: master.private_key.0,
            mnemonic: master.mnemonic,
        })
    }

    pub async fn new_address(&self) -> Result<ManagedAddress, EngineError> {
        Ok(self.store.create().await?)
    }

    /// Fresh on-chain master balance in base units.
    pub async fn master_balance(&self) -> Result<u64, EngineError> {
        let master = self.store.get_master().await?;
        self.client.get_balance(&master.address).await
    }

    pub fn synced_height(&self) -> Option<u64> {
        self.cursor.height()
    }

    pub async fn validate_address(&self, address: &str) -> Result<bool, EngineError> {
        self.client.validate_address(address).await
    }

    pub async fn sweep_address(&self, address: &str) -> Result<SendOutcome, EngineError> {
        self.sweeper.sweep_address(address).await
    }

    pub async fn sweep_all(&self) -> Result<usize, EngineError> {
        self.sweeper.sweep_all().await
    }

    /// Enumerate managed addresses. With balances requested, only funded
    /// addresses are returned.
    pub async fn list_addresses(
        &self,
        with_balances: bool,
    ) -> Result<Vec<ManagedAddress>, EngineError> {
        let last = self.store.last_index().await?;
        let mut addresses = Vec::new();
        for index in 1..=last {
            if let Some(addr) = self.store.get_address(index, with_balances).await? {
                if with_balances && addr.balance == 0 {
                    continue;
                }
                addresses.push(addr);
            }
        }
        Ok(addresses)
    }

    /// Withdraw from the master address, polling for on-chain visibility
    /// a bounded number of times before answering the gateway.
    pub async fn withdraw(&self, to: &str, amount: f64) -> Result<WithdrawReceipt, EngineError> {
        if !self.client.validate_address(to).await? {
            return Err(EngineError::Rejected("invalid address format".to_string()));
        }
        let amount = to_base_units(amount, self.client.decimals());
        if amount == 0 {
            return Err(EngineError::Rejected("amount below minimum unit".to_string()));
        }
        let master = self.store.get_master().await?;

        match self.queue.send(&master.address, to, amount, false).await {
            SendOutcome::NotSent => Err(EngineError::Rejected("withdrawal rejected".to_string())),
            SendOutcome::Sent { txid } => {
                for _ in 0..WITHDRAW_CONFIRM_ATTEMPTS {
                    sleep(Duration::from_secs(WITHDRAW_CONFIRM_DELAY_SECS)).await;
                    match self.client.tx_status(&txid).await {
                        Ok(TxStatus::Confirmed) => {
                            info!("Withdrawal confirmed, txid {}", txid);
                            return Ok(WithdrawReceipt { txid });
                        }
                        Ok(TxStatus::Failed) => {
                            return Err(EngineError::Rejected(
                                "transaction failed on-chain".to_string(),
                            ));
                        }
                        Ok(TxStatus::Pending) => {}
                        Err(e) => warn!("Confirmation poll failed for {}: {}", txid, e),
                    }
                }
                Err(EngineError::Chain(ChainError::TxNotFound))
            }
        }
    }
}
