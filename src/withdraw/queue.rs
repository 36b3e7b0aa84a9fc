//! Serialized broadcast pipeline.
//!
//! One worker, one broadcast in flight, strict FIFO: user withdrawals and
//! automated sweeps contend on the same channel. A task never fails out
//! of the queue on transient trouble; it retries at a fixed delay until
//! it lands, is rejected for a terminal reason, or its caller abandons
//! the reply handle.

use crate::chain::ChainClient;
use crate::config::QUEUE_RETRY_SECS;
use crate::keystore::KeyStore;
use crate::store::AddressStore;
use crate::withdraw::lock::WalletLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;
use tracing::{info, warn};

/// Outcome of a queued send. Insufficient balance and self-transfers are
/// negative results, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent { txid: String },
    NotSent,
}

struct WithdrawTask {
    from: String,
    to: String,
    amount: u64,
    force: bool,
    reply: oneshot::Sender<SendOutcome>,
}

#[derive(Clone)]
pub struct WithdrawalQueue {
    tx: mpsc::UnboundedSender<WithdrawTask>,
}

impl WithdrawalQueue {
    pub fn start(
        client: Arc<ChainClient>,
        store: Arc<dyn AddressStore>,
        keystore: Arc<dyn KeyStore>,
        lock: Arc<WalletLock>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Worker {
            client,
            store,
            keystore,
            lock,
        };
        tokio::spawn(worker.run(rx));
        Self { tx }
    }

    /// Enqueue a transfer and wait for its outcome. `force` skips the
    /// balance check (used by sweeps, which move the whole balance).
    pub async fn send(&self, from: &str, to: &str, amount: u64, force: bool) -> SendOutcome {
        let (reply, rx) = oneshot::channel();
        let task = WithdrawTask {
            from: from.to_string(),
            to: to.to_string(),
            amount,
            force,
            reply,
        };
        if self.tx.send(task).is_err() {
            warn!("Withdrawal worker is gone, rejecting send");
            return SendOutcome::NotSent;
        }
        rx.await.unwrap_or(SendOutcome::NotSent)
    }
}

struct Worker {
    client: Arc<ChainClient>,
    store: Arc<dyn AddressStore>,
    keystore: Arc<dyn KeyStore>,
    lock: Arc<WalletLock>,
}

impl Worker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<WithdrawTask>) {
        while let Some(task) = rx.recv().await {
            self.run_task(task).await;
        }
    }

    /// Drive one task to a terminal outcome, retrying transient failures
    /// at a fixed delay for as long as the caller is still waiting.
    async fn run_task(&self, task: WithdrawTask) {
        loop {
            if task.reply.is_closed() {
                warn!(
                    "Caller abandoned transfer of {} to {}, dropping task",
                    task.amount, task.to
                );
                return;
            }

            if self.lock.is_locked() {
                sleep(Duration::from_secs(QUEUE_RETRY_SECS)).await;
                continue;
            }

            if task.from == task.to || task.amount == 0 {
                let _ = task.reply.send(SendOutcome::NotSent);
                return;
            }

            let mut checked_balance = None;
            if !task.force {
                match self.client.get_balance(&task.from).await {
                    Ok(balance) if balance > task.amount => checked_balance = Some(balance),
                    Ok(balance) => {
                        info!(
                            "Not enough balance to transfer {} from {} (have {})",
                            task.amount, task.from, balance
                        );
                        let _ = task.reply.send(SendOutcome::NotSent);
                        return;
                    }
                    Err(e) => {
                        warn!("Balance check failed, retrying: {}", e);
                        let _ = self.client.refresh_provider().await;
                        sleep(Duration::from_secs(QUEUE_RETRY_SECS)).await;
                        continue;
                    }
                }
            }

            let key = match self.store.get_priv(&task.from).await {
                Ok(key) => key,
                Err(e) => {
                    warn!("No key for {}: {}", task.from, e);
                    let _ = task.reply.send(SendOutcome::NotSent);
                    return;
                }
            };
            let signed = match self.keystore.sign_transfer(
                &key,
                &task.to,
                task.amount,
                self.client.asset(),
            ) {
                Ok(signed) => signed,
                Err(e) => {
                    warn!("Signing failed for transfer to {}: {}", task.to, e);
                    let _ = task.reply.send(SendOutcome::NotSent);
                    return;
                }
            };

            self.lock.engage();
            match self.client.broadcast(&signed).await {
                Ok(ack) if ack.accepted => {
                    info!(
                        "Broadcast accepted, txid {} ({} to {})",
                        ack.txid, task.amount, task.to
                    );
                    // Optimistic debit; the next sync cycle reconciles it.
                    let remaining = checked_balance
                        .unwrap_or(task.amount)
                        .saturating_sub(task.amount);
                    if let Err(e) = self.store.set_balance(&task.from, remaining, None).await {
                        warn!("Failed to record optimistic debit: {}", e);
                    }
                    let _ = task.reply.send(SendOutcome::Sent { txid: ack.txid });
                    return;
                }
                Ok(ack) => {
                    warn!("Broadcast rejected for txid {}, retrying", ack.txid);
                }
                Err(e) => {
                    warn!("Broadcast failed, retrying: {}", e);
                    let _ = self.client.refresh_provider().await;
                }
            }
            sleep(Duration::from_secs(QUEUE_RETRY_SECS)).await;
        }
    }
}
