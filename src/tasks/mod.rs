//! Periodic task ownership.
//!
//! Every repeating job (sweep, balance refresh, health check) and the
//! sync loop itself is spawned through the [`TaskScheduler`], which owns
//! the join handles and a shared shutdown signal. Tasks are cooperative
//! loops around a ticker, not self-rescheduling recursion, so shutdown
//! can stop all of them and the process can flush state before exit.

/// On-chain balance reconciliation
pub mod balances;
/// Staleness watchdog
pub mod health;
/// Periodic consolidation sweeps
pub mod sweep;

pub use balances::BalanceRefresher;
pub use health::HealthMonitor;
pub use sweep::Sweeper;

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tracing::{debug, warn};

pub struct TaskScheduler {
    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl TaskScheduler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Spawn a long-running task that watches the shutdown signal itself.
    pub fn spawn<F, Fut>(&self, name: &'static str, task: F)
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task(self.subscribe()));
        self.handles.lock().unwrap().push((name, handle));
    }

    /// Spawn a repeating job: first run after `initial_delay`, then every
    /// `period`, until shutdown.
    pub fn spawn_repeating<F, Fut>(
        &self,
        name: &'static str,
        initial_delay: Duration,
        period: Duration,
        mut op: F,
    ) where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut shutdown = self.subscribe();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.changed() => return,
                _ = sleep(initial_delay) => {}
            }
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick resolves immediately; consume it so the
            // cadence starts now.
            ticker.tick().await;
            loop {
                op().await;
                tokio::select! {
                    _ = shutdown.changed() => return,
                    _ = ticker.tick() => {}
                }
            }
        });
        self.handles.lock().unwrap().push((name, handle));
    }

    /// Signal shutdown and wait for every task to stop.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handles: Vec<_> = self.handles.lock().unwrap().drain(..).collect();
        for (name, handle) in handles {
            if handle.await.is_err() {
                warn!("Task {} panicked during shutdown", name);
            } else {
                debug!("Task {} stopped", name);
            }
        }
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new()
    }
}
