//! Engine configuration.
//!
//! Structural constants (batch sizes, retry counts) live here as plain
//! constants; empirically tuned timing knobs are part of [`EngineConfig`]
//! so deployments can override them without a rebuild.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Deficit at or below which the engine is considered live-following.
pub const LIVE_FOLLOW_THRESHOLD: u64 = 2;
/// Deficit above which fast-sync batching kicks in.
pub const FAST_SYNC_THRESHOLD: u64 = 100;
/// Catch-up batch cap in normal mode.
pub const BATCH_NORMAL: u64 = 10;
/// Catch-up batch cap in fast-sync mode.
pub const BATCH_FAST: u64 = 100;
/// Maximum concurrent block fetches per commit chunk.
pub const FETCH_CHUNK: usize = 10;
/// Blocks behind the head a fresh wallet starts at.
pub const START_OFFSET: u64 = 5;

/// Confirmation grace period before a deposit is first re-verified.
pub const CONFIRM_GRACE_SECS: u64 = 3;
/// Settle delay between a confirmed status and the balance re-read.
pub const BALANCE_SETTLE_SECS: u64 = 5;
/// How many times a not-yet-found transaction is re-checked.
pub const STATUS_RETRIES: u32 = 10;
pub const STATUS_RETRY_SECS: u64 = 10;

/// Fixed delay between withdrawal queue retries.
pub const QUEUE_RETRY_SECS: u64 = 5;
/// Delay before the sync loop retries after a provider failure.
pub const PROVIDER_RETRY_SECS: u64 = 10;
/// Poll spacing while live-following without a block subscription.
pub const LIVE_POLL_SECS: u64 = 5;
/// Fixed delay between webhook delivery retries.
pub const NOTIFY_RETRY_SECS: u64 = 5;

/// Bound on the processed-txid cache before oldest entries are evicted.
pub const DEPOSIT_CACHE_CAPACITY: usize = 50_000;
/// Synchronous confirmation polls before a withdrawal response is returned.
pub const WITHDRAW_CONFIRM_ATTEMPTS: u32 = 3;
pub const WITHDRAW_CONFIRM_DELAY_SECS: u64 = 3;

/// Which wire protocol the chain transport speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// NEO-style JSON-RPC node (supports a WebSocket block subscription).
    JsonRpc,
    /// TRON-style REST node (polling only).
    Rest,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub transport: TransportKind,
    /// Candidate RPC endpoints raced by the provider pool.
    pub providers: Vec<String>,
    /// Asset symbol used in notifications.
    pub asset: String,
    /// Base-unit decimals of the asset.
    pub decimals: u32,
    /// Chain-side asset identifier for transfer filtering, where the
    /// wire format needs one (NEO-style vout asset hashes).
    pub asset_id: Option<String>,
    /// Webhook endpoint deposit notifications are POSTed to.
    pub notify_url: String,
    pub data_dir: PathBuf,
    /// Port the external gateway serves the withdraw endpoint on, used
    /// only to build the advertised withdraw URL.
    pub api_port: u16,
    /// Human-readable part for derived deposit addresses.
    pub address_hrp: String,
    /// Minimum balance (base units) worth sweeping.
    pub dust_threshold: u64,
    pub tuning: Tuning,
}

/// Empirically tuned timers and thresholds, kept configurable rather
/// than derived.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Tuning {
    pub unlock_hysteresis: u32,
    pub ping_timeout_secs: u64,
    pub lease_secs: u64,
    pub sweep_interval_secs: u64,
    pub refresh_initial_secs: u64,
    pub refresh_interval_secs: u64,
    pub health_interval_secs: u64,
    pub stall_block_deficit: u64,
    pub stall_secs: i64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            unlock_hysteresis: 3,
            ping_timeout_secs: 5,
            lease_secs: 600,
            sweep_interval_secs: 30,
            refresh_initial_secs: 10,
            refresh_interval_secs: 75,
            health_interval_secs: 180,
            stall_block_deficit: 5,
            stall_secs: 180,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::JsonRpc,
            providers: Vec::new(),
            asset: "NEO".to_string(),
            decimals: 0,
            asset_id: None,
            notify_url: String::new(),
            data_dir: PathBuf::from("data"),
            api_port: 8080,
            address_hrp: "dw".to_string(),
            dust_threshold: 1,
            tuning: Tuning::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self, crate::error::EngineError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            crate::error::EngineError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            crate::error::EngineError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.tuning.ping_timeout_secs)
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.tuning.lease_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.tuning.sweep_interval_secs)
    }

    pub fn refresh_initial(&self) -> Duration {
        Duration::from_secs(self.tuning.refresh_initial_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.tuning.refresh_interval_secs)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.tuning.health_interval_secs)
    }
}
