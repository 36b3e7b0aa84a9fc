//! Shared harness for integration tests: an in-memory chain transport
//! with programmable blocks and failures, a counting notifier, and a
//! fully wired engine over a temp-dir store.

use deposit_wallet_engine::chain::{
    Block, BlockStream, BroadcastAck, ChainClient, ChainError, ChainTransport, SignedTransfer,
    TransferOp, TxStatus,
};
use deposit_wallet_engine::keystore::{HdKeyStore, KeyStore};
use deposit_wallet_engine::notify::{DepositNotification, Notifier};
use deposit_wallet_engine::provider::ProviderPool;
use deposit_wallet_engine::store::{AddressStore, DepositCache, FileAddressStore, MasterRecord};
use deposit_wallet_engine::sync::{CursorState, DepositProcessor, SyncEngine};
use deposit_wallet_engine::withdraw::{WalletLock, WithdrawalQueue};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const PHRASE: &str =
    "legal winner thank year wave sausage worth useful legal winner thank yellow";

pub struct MockChain {
    pub height: u64,
    pub blocks: HashMap<u64, Block>,
    pub balances: HashMap<String, u64>,
    pub statuses: HashMap<String, TxStatus>,
    pub default_status: TxStatus,
    /// Heights whose fetch fails until removed.
    pub fail_blocks: HashSet<u64>,
    pub invalid_addresses: HashSet<String>,
    /// Fail the next N broadcasts with an RPC error.
    pub broadcast_fail_times: u32,
    pub broadcast_attempts: u32,
    pub broadcasts: Vec<SignedTransfer>,
    /// Pushed-block payload handed out by the first subscribe call.
    pub subscription: Option<Vec<Block>>,
    pub probe_heights: HashMap<String, u64>,
    pub probe_fail: HashSet<String>,
    pub probe_count: u32,
    pub fetch_log: Vec<u64>,
    fetch_inflight: u32,
    pub max_fetch_inflight: u32,
    broadcast_inflight: u32,
    pub max_broadcast_inflight: u32,
}

impl MockChain {
    pub fn new(height: u64) -> Self {
        Self {
            height,
            blocks: HashMap::new(),
            balances: HashMap::new(),
            statuses: HashMap::new(),
            default_status: TxStatus::Confirmed,
            fail_blocks: HashSet::new(),
            invalid_addresses: HashSet::new(),
            broadcast_fail_times: 0,
            broadcast_attempts: 0,
            broadcasts: Vec::new(),
            subscription: None,
            probe_heights: HashMap::new(),
            probe_fail: HashSet::new(),
            probe_count: 0,
            fetch_log: Vec::new(),
            fetch_inflight: 0,
            max_fetch_inflight: 0,
            broadcast_inflight: 0,
            max_broadcast_inflight: 0,
        }
    }

    /// Insert a block carrying a single transfer.
    pub fn put_transfer_block(&mut self, height: u64, txid: &str, to: &str, amount: u64) {
        self.blocks.insert(
            height,
            Block {
                height,
                transfers: vec![TransferOp {
                    txid: txid.to_string(),
                    from: Some("sender".to_string()),
                    to: to.to_string(),
                    amount,
                }],
            },
        );
    }
}

pub struct MockTransport {
    pub chain: Arc<Mutex<MockChain>>,
    asset: String,
    decimals: u32,
}

impl MockTransport {
    pub fn new(chain: Arc<Mutex<MockChain>>, asset: &str, decimals: u32) -> Self {
        Self {
            chain,
            asset: asset.to_string(),
            decimals,
        }
    }
}

#[async_trait::async_trait]
impl ChainTransport for MockTransport {
    fn asset(&self) -> &str {
        &self.asset
    }

    fn decimals(&self) -> u32 {
        self.decimals
    }

    async fn probe(&self, url: &str) -> Result<u64, ChainError> {
        let mut chain = self.chain.lock().unwrap();
        chain.probe_count += 1;
        if chain.probe_fail.contains(url) {
            return Err(ChainError::Rpc("probe refused".to_string()));
        }
        Ok(chain.probe_heights.get(url).copied().unwrap_or(chain.height))
    }

    async fn get_height(&self, _url: &str) -> Result<u64, ChainError> {
        Ok(self.chain.lock().unwrap().height)
    }

    async fn get_block(&self, _url: &str, height: u64) -> Result<Block, ChainError> {
        {
            let mut chain = self.chain.lock().unwrap();
            chain.fetch_log.push(height);
            chain.fetch_inflight += 1;
            chain.max_fetch_inflight = chain.max_fetch_inflight.max(chain.fetch_inflight);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        let mut chain = self.chain.lock().unwrap();
        chain.fetch_inflight -= 1;
        if chain.fail_blocks.contains(&height) {
            return Err(ChainError::Rpc(format!("block {} unavailable", height)));
        }
        Ok(chain.blocks.get(&height).cloned().unwrap_or(Block {
            height,
            transfers: Vec::new(),
        }))
    }

    async fn get_balance(&self, _url: &str, address: &str) -> Result<u64, ChainError> {
        Ok(self
            .chain
            .lock()
            .unwrap()
            .balances
            .get(address)
            .copied()
            .unwrap_or(0))
    }

    async fn broadcast(
        &self,
        _url: &str,
        tx: &SignedTransfer,
    ) -> Result<BroadcastAck, ChainError> {
        {
            let mut chain = self.chain.lock().unwrap();
            chain.broadcast_inflight += 1;
            chain.max_broadcast_inflight =
                chain.max_broadcast_inflight.max(chain.broadcast_inflight);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        let mut chain = self.chain.lock().unwrap();
        chain.broadcast_inflight -= 1;
        chain.broadcast_attempts += 1;
        if chain.broadcast_fail_times > 0 {
            chain.broadcast_fail_times -= 1;
            return Err(ChainError::Rpc("node rejected connection".to_string()));
        }
        chain.broadcasts.push(tx.clone());
        Ok(BroadcastAck {
            accepted: true,
            txid: tx.txid.clone(),
        })
    }

    async fn validate_address(&self, _url: &str, address: &str) -> Result<bool, ChainError> {
        Ok(!self
            .chain
            .lock()
            .unwrap()
            .invalid_addresses
            .contains(address))
    }

    async fn tx_status(&self, _url: &str, txid: &str) -> Result<TxStatus, ChainError> {
        let chain = self.chain.lock().unwrap();
        Ok(chain
            .statuses
            .get(txid)
            .copied()
            .unwrap_or(chain.default_status))
    }

    async fn subscribe_blocks(&self, _url: &str) -> Result<BlockStream, ChainError> {
        let taken = self.chain.lock().unwrap().subscription.take();
        match taken {
            Some(blocks) => {
                let items: Vec<Result<Block, ChainError>> =
                    blocks.into_iter().map(Ok).collect();
                Ok(Box::pin(futures_util::stream::iter(items)))
            }
            None => Err(ChainError::SubscriptionUnsupported),
        }
    }
}

#[derive(Default)]
pub struct CountingNotifier {
    pub sent: Mutex<Vec<DepositNotification>>,
}

impl Notifier for CountingNotifier {
    fn notify(&self, notification: DepositNotification) {
        self.sent.lock().unwrap().push(notification);
    }
}

impl CountingNotifier {
    pub fn count_for(&self, txid: &str) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.hash == txid)
            .count()
    }

    pub fn total(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

/// Decode a signed transfer's payload back into JSON for assertions.
pub fn decode_payload(tx: &SignedTransfer) -> serde_json::Value {
    let bytes = hex::decode(&tx.raw).unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub struct TestEngine {
    pub _dir: tempfile::TempDir,
    pub chain: Arc<Mutex<MockChain>>,
    pub client: Arc<ChainClient>,
    pub store: Arc<dyn AddressStore>,
    pub cache: Arc<DepositCache>,
    pub lock: Arc<WalletLock>,
    pub cursor: Arc<CursorState>,
    pub engine: Arc<SyncEngine>,
    pub queue: WithdrawalQueue,
    pub notifier: Arc<CountingNotifier>,
    pub keystore: Arc<dyn KeyStore>,
    pub master: MasterRecord,
}

/// Wire a full engine over the mock transport and a temp-dir store.
pub async fn build_engine(chain: MockChain, unlock_hysteresis: u32) -> TestEngine {
    let dir = tempfile::tempdir().unwrap();
    let chain = Arc::new(Mutex::new(chain));

    let keystore: Arc<dyn KeyStore> = Arc::new(HdKeyStore::from_mnemonic(PHRASE, "dw").unwrap());
    let store: Arc<dyn AddressStore> = Arc::new(
        FileAddressStore::open(dir.path(), Arc::clone(&keystore))
            .await
            .unwrap(),
    );
    let cache = Arc::new(DepositCache::load(dir.path(), 10_000).await.unwrap());

    let transport = Arc::new(MockTransport::new(Arc::clone(&chain), "NEO", 0));
    let pool = ProviderPool::new(
        transport.clone(),
        vec!["mock://node".to_string()],
        Duration::from_secs(5),
        Duration::from_secs(600),
    );
    let client = Arc::new(ChainClient::new(pool, transport));

    let master = store.get_master().await.unwrap();
    let cursor = Arc::new(CursorState::new(None));
    let lock = Arc::new(WalletLock::new(unlock_hysteresis));
    let queue = WithdrawalQueue::start(
        Arc::clone(&client),
        Arc::clone(&store),
        Arc::clone(&keystore),
        Arc::clone(&lock),
    );
    let notifier = Arc::new(CountingNotifier::default());
    let processor = Arc::new(DepositProcessor::new(
        Arc::clone(&client),
        Arc::clone(&store),
        Arc::clone(&cache),
        notifier.clone() as Arc<dyn Notifier>,
    ));
    let engine = Arc::new(SyncEngine::new(
        Arc::clone(&client),
        Arc::clone(&store),
        Arc::clone(&cache),
        processor,
        Arc::clone(&lock),
        Arc::clone(&cursor),
        master.address.clone(),
    ));

    TestEngine {
        _dir: dir,
        chain,
        client,
        store,
        cache,
        lock,
        cursor,
        engine,
        queue,
        notifier,
        keystore,
        master,
    }
}

impl TestEngine {
    /// Pin the cursor at a known height before driving cycles.
    pub fn set_cursor(&self, height: u64) {
        self.cursor.advance_to(height).unwrap();
    }

    /// Create a managed deposit address.
    pub async fn new_address(&self) -> String {
        self.store.create().await.unwrap().address
    }

    /// Background task feeding unlock signals, standing in for the sync
    /// cycles that normally produce them.
    pub fn spawn_unlock_signaller(&self) -> tokio::task::JoinHandle<()> {
        let lock = Arc::clone(&self.lock);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(1)).await;
                lock.signal_unlock();
            }
        })
    }
}
