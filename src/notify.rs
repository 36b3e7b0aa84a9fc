//! Outbound deposit notifications.
//!
//! Delivery is fire-and-forget from the engine's point of view: `notify`
//! enqueues and returns. A single worker drains the queue in order and
//! retries each webhook POST indefinitely at a fixed delay, so a dead
//! receiver back-pressures the queue instead of dropping events.

use crate::config::NOTIFY_RETRY_SECS;
use backoff::backoff::Constant;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct DepositNotification {
    pub hash: String,
    pub amount: f64,
    pub token: String,
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: DepositNotification);
}

pub struct WebhookNotifier {
    tx: mpsc::UnboundedSender<DepositNotification>,
}

impl WebhookNotifier {
    /// Spawn the delivery worker and return the enqueue handle.
    pub fn start(notify_url: String, http_client: reqwest::Client) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<DepositNotification>();

        tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                if notify_url.is_empty() {
                    warn!(
                        "No notify URL configured, dropping notification for {}",
                        notification.hash
                    );
                    continue;
                }
                let deliver = || async {
                    let response = http_client
                        .post(&notify_url)
                        .json(&notification)
                        .send()
                        .await
                        .map_err(backoff::Error::transient)?;
                    response
                        .error_for_status()
                        .map_err(backoff::Error::transient)?;
                    Ok::<(), backoff::Error<reqwest::Error>>(())
                };
                let policy = Constant::new(Duration::from_secs(NOTIFY_RETRY_SECS));
                match backoff::future::retry(policy, deliver).await {
                    Ok(()) => {
                        info!("Notification sent with txid {}", notification.hash)
                    }
                    Err(e) => {
                        // Unreachable with a constant policy, logged for completeness.
                        error!("Giving up on notification {}: {}", notification.hash, e)
                    }
                }
            }
        });

        Self { tx }
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, notification: DepositNotification) {
        if self.tx.send(notification).is_err() {
            error!("Notification worker is gone, dropping notification");
        }
    }
}
