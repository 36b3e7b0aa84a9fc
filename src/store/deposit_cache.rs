//! Bounded, persisted set of already-processed transaction ids.
//!
//! Membership here is what makes deposit notification at-most-once: a
//! txid recorded once is never notified again, including across restarts
//! and duplicate block delivery. The set is bounded FIFO; eviction only
//! forgets txids far older than any block the cursor can revisit.

use crate::store::StoreError;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

pub struct DepositCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
    path: PathBuf,
}

struct CacheInner {
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl DepositCache {
    pub async fn load(data_dir: &Path, capacity: usize) -> Result<Self, StoreError> {
        let path = data_dir.join("processed-txids.json");
        let order: VecDeque<String> = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => VecDeque::new(),
            Err(e) => return Err(e.into()),
        };
        let seen: HashSet<String> = order.iter().cloned().collect();
        info!("Loaded {} processed txids", seen.len());
        Ok(Self {
            inner: Mutex::new(CacheInner { order, seen }),
            capacity,
            path,
        })
    }

    pub fn has(&self, txid: &str) -> bool {
        self.inner.lock().unwrap().seen.contains(txid)
    }

    /// Record a txid. Returns false when it was already present; the
    /// check and the insert are one atomic step, so exactly one of any
    /// set of racing processors wins the right to notify.
    pub fn add(&self, txid: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if !inner.seen.insert(txid.to_string()) {
            return false;
        }
        inner.order.push_back(txid.to_string());
        while inner.order.len() > self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.seen.remove(&evicted);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Persist the set; called after batches and on every exit path.
    pub async fn flush(&self) -> Result<(), StoreError> {
        let serialized = {
            let inner = self.inner.lock().unwrap();
            serde_json::to_string(&inner.order)?
        };
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, serialized).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
