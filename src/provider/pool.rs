//! Provider selection for load-balanced, unevenly healthy RPC endpoints.
//!
//! Every refresh races a liveness probe against all candidates, ranks the
//! survivors by reported chain height (fresher wins) and then latency,
//! and caches the winner under a time-boxed lease. A probe that times out
//! is a non-answer, not an error: slow nodes simply drop out of the race.

use crate::chain::ChainTransport;
use crate::error::EngineError;
use futures::future::join_all;
use rand::Rng;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A candidate that answered its probe in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeProbe {
    pub url: String,
    pub latency_ms: u64,
    pub height: u64,
}

/// The currently leased endpoint. Replaced wholesale, never mutated.
#[derive(Debug, Clone)]
pub struct ProviderLease {
    pub url: String,
    pub latency_ms: u64,
    pub chain_height: u64,
    pub expires_at: Instant,
}

pub struct ProviderPool {
    transport: Arc<dyn ChainTransport>,
    candidates: Vec<String>,
    lease: Mutex<Option<ProviderLease>>,
    ping_timeout: Duration,
    lease_ttl: Duration,
}

impl ProviderPool {
    pub fn new(
        transport: Arc<dyn ChainTransport>,
        candidates: Vec<String>,
        ping_timeout: Duration,
        lease_ttl: Duration,
    ) -> Self {
        Self {
            transport,
            candidates,
            lease: Mutex::new(None),
            ping_timeout,
            lease_ttl,
        }
    }

    /// Return the leased endpoint URL, racing a fresh probe round if the
    /// lease expired or `force_refresh` is set.
    pub async fn lease(&self, force_refresh: bool) -> Result<String, EngineError> {
        if !force_refresh {
            let lease = self.lease.lock().unwrap();
            if let Some(lease) = lease.as_ref() {
                if lease.expires_at > Instant::now() {
                    return Ok(lease.url.clone());
                }
            }
        }

        let probes = self.probe_all().await;
        let Some(winner) = pick_provider(&probes) else {
            warn!("No available provider among {} candidates", self.candidates.len());
            return Err(EngineError::NoProviderAvailable);
        };

        info!(
            "Leased provider {} (height {}, {}ms)",
            winner.url, winner.height, winner.latency_ms
        );
        let url = winner.url.clone();
        let mut lease = self.lease.lock().unwrap();
        *lease = Some(ProviderLease {
            url: winner.url.clone(),
            latency_ms: winner.latency_ms,
            chain_height: winner.height,
            expires_at: Instant::now() + self.lease_ttl,
        });
        Ok(url)
    }

    /// Snapshot of the active lease, if any.
    pub fn current(&self) -> Option<ProviderLease> {
        self.lease.lock().unwrap().clone()
    }

    async fn probe_all(&self) -> Vec<NodeProbe> {
        let probes = self.candidates.iter().map(|url| {
            let transport = Arc::clone(&self.transport);
            let url = url.clone();
            let ping_timeout = self.ping_timeout;
            async move {
                let started = Instant::now();
                match tokio::time::timeout(ping_timeout, transport.probe(&url)).await {
                    Ok(Ok(height)) => Some(NodeProbe {
                        latency_ms: started.elapsed().as_millis() as u64,
                        url,
                        height,
                    }),
                    Ok(Err(e)) => {
                        debug!("Probe failed for {}: {}", url, e);
                        None
                    }
                    Err(_) => {
                        debug!("Probe timed out for {}", url);
                        None
                    }
                }
            }
        });

        join_all(probes).await.into_iter().flatten().collect()
    }
}

/// Rank probes by height (descending), then latency (ascending), and pick
/// uniformly among the candidates tied with the best on both keys so a
/// fleet of wallets does not herd onto one node.
pub fn pick_provider(probes: &[NodeProbe]) -> Option<&NodeProbe> {
    let mut ranked: Vec<&NodeProbe> = probes.iter().collect();
    if ranked.is_empty() {
        return None;
    }
    ranked.sort_by(|a, b| {
        b.height
            .cmp(&a.height)
            .then(a.latency_ms.cmp(&b.latency_ms))
    });

    let best = ranked[0];
    let top: Vec<&NodeProbe> = ranked
        .into_iter()
        .take_while(|p| p.height == best.height && p.latency_ms == best.latency_ms)
        .collect();
    if top.len() == 1 {
        return Some(top[0]);
    }
    let idx = rand::rng().random_range(0..top.len());
    Some(top[idx])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(url: &str, latency_ms: u64, height: u64) -> NodeProbe {
        NodeProbe {
            url: url.to_string(),
            latency_ms,
            height,
        }
    }

    #[test]
    fn equal_heights_pick_lowest_latency() {
        let probes = vec![
            probe("http://a", 50, 1000),
            probe("http://b", 10, 1000),
            probe("http://c", 30, 1000),
        ];
        assert_eq!(pick_provider(&probes).unwrap().url, "http://b");
    }

    #[test]
    fn height_dominates_latency() {
        let probes = vec![probe("http://slow", 400, 1001), probe("http://fast", 5, 990)];
        assert_eq!(pick_provider(&probes).unwrap().url, "http://slow");
    }

    #[test]
    fn ties_stay_within_top_group() {
        let probes = vec![
            probe("http://a", 10, 1000),
            probe("http://b", 10, 1000),
            probe("http://worse", 90, 1000),
        ];
        for _ in 0..32 {
            let picked = pick_provider(&probes).unwrap();
            assert_ne!(picked.url, "http://worse");
        }
    }

    #[test]
    fn no_survivors_means_no_provider() {
        assert!(pick_provider(&[]).is_none());
    }
}
