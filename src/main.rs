use deposit_wallet_engine::chain::{ChainClient, ChainTransport, JsonRpcTransport, RestTransport};
use deposit_wallet_engine::config::{DEPOSIT_CACHE_CAPACITY, EngineConfig, TransportKind};
use deposit_wallet_engine::keystore::{HdKeyStore, KeyStore};
use deposit_wallet_engine::notify::{Notifier, WebhookNotifier};
use deposit_wallet_engine::provider::ProviderPool;
use deposit_wallet_engine::service::WalletService;
use deposit_wallet_engine::store::{AddressStore, DepositCache, FileAddressStore};
use deposit_wallet_engine::sync::{CursorState, DepositProcessor, SyncEngine};
use deposit_wallet_engine::tasks::{BalanceRefresher, HealthMonitor, Sweeper, TaskScheduler};
use deposit_wallet_engine::withdraw::{WalletLock, WithdrawalQueue};

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::time())
        .init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.json".to_string());
    let cfg = match EngineConfig::load(Path::new(&config_path)) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load config: {}", e);
            std::process::exit(2);
        }
    };
    if cfg.providers.is_empty() {
        error!("No providers configured");
        std::process::exit(2);
    }

    info!("Starting deposit wallet engine for {}", cfg.asset);
    info!("Checking wallet...");

    let keystore: Arc<dyn KeyStore> = match FileAddressStore::stored_mnemonic(&cfg.data_dir) {
        Some(mnemonic) => match HdKeyStore::from_mnemonic(&mnemonic, &cfg.address_hrp) {
            Ok(keystore) => Arc::new(keystore),
            Err(e) => {
                error!("Failed to load wallet mnemonic: {}", e);
                std::process::exit(1);
            }
        },
        None => {
            info!("Generating new wallet mnemonic");
            match HdKeyStore::generate(&cfg.address_hrp) {
                Ok(keystore) => Arc::new(keystore),
                Err(e) => {
                    error!("Failed to generate wallet: {}", e);
                    std::process::exit(1);
                }
            }
        }
    };

    info!("Loading wallet...");
    let store: Arc<dyn AddressStore> =
        match FileAddressStore::open(&cfg.data_dir, Arc::clone(&keystore)).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                error!("Failed to open address store: {}", e);
                std::process::exit(1);
            }
        };
    let cache = match DepositCache::load(&cfg.data_dir, DEPOSIT_CACHE_CAPACITY).await {
        Ok(cache) => Arc::new(cache),
        Err(e) => {
            error!("Failed to load deposit cache: {}", e);
            std::process::exit(1);
        }
    };

    let transport: Arc<dyn ChainTransport> = match cfg.transport {
        TransportKind::JsonRpc => Arc::new(JsonRpcTransport::new(
            cfg.asset.clone(),
            cfg.asset_id.clone(),
            cfg.decimals,
        )),
        TransportKind::Rest => Arc::new(RestTransport::new(cfg.asset.clone(), cfg.decimals)),
    };
    let pool = ProviderPool::new(
        Arc::clone(&transport),
        cfg.providers.clone(),
        cfg.ping_timeout(),
        cfg.lease_ttl(),
    );
    let client = Arc::new(ChainClient::new(pool, transport));

    let master = match store.get_master().await {
        Ok(master) => master,
        Err(e) => {
            error!("Failed to read master record: {}", e);
            std::process::exit(1);
        }
    };
    info!("Master address {}", master.address);

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .expect("Failed to create HTTP client");
    let notifier: Arc<dyn Notifier> = Arc::new(WebhookNotifier::start(
        cfg.notify_url.clone(),
        http_client.clone(),
    ));

    let initial_cursor = match store.cursor().await {
        Ok(cursor) => cursor,
        Err(e) => {
            error!("Failed to read cursor: {}", e);
            std::process::exit(1);
        }
    };
    let cursor = Arc::new(CursorState::new(initial_cursor));

    let lock = Arc::new(WalletLock::new(cfg.tuning.unlock_hysteresis));
    let queue = WithdrawalQueue::start(
        Arc::clone(&client),
        Arc::clone(&store),
        Arc::clone(&keystore),
        Arc::clone(&lock),
    );

    let processor = Arc::new(DepositProcessor::new(
        Arc::clone(&client),
        Arc::clone(&store),
        Arc::clone(&cache),
        notifier,
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
    let sweeper = Arc::new(Sweeper::new(
        Arc::clone(&store),
        Arc::clone(&client),
        queue.clone(),
        cfg.dust_threshold,
    ));
    let refresher = Arc::new(BalanceRefresher::new(Arc::clone(&client), Arc::clone(&store)));
    let health = Arc::new(HealthMonitor::new(
        Arc::clone(&client),
        Arc::clone(&cursor),
        Arc::clone(&cache),
        Arc::clone(&store),
        cfg.tuning.stall_block_deficit,
        cfg.tuning.stall_secs,
    ));

    let service = WalletService::new(
        Arc::clone(&client),
        Arc::clone(&store),
        queue.clone(),
        Arc::clone(&sweeper),
        Arc::clone(&cursor),
        http_client,
        cfg.api_port,
    );
    match service.get_info().await {
        Ok(wallet_info) => info!("Withdraw URL: {}", wallet_info.withdraw_url),
        Err(e) => error!("Failed to provision wallet info: {}", e),
    }

    let scheduler = TaskScheduler::new();
    {
        let engine = Arc::clone(&engine);
        scheduler.spawn("sync", move |shutdown| engine.run(shutdown));
    }
    {
        let sweeper = Arc::clone(&sweeper);
        scheduler.spawn_repeating(
            "sweep",
            cfg.sweep_interval(),
            cfg.sweep_interval(),
            move || {
                let sweeper = Arc::clone(&sweeper);
                async move { sweeper.run_periodic().await }
            },
        );
    }
    {
        let refresher = Arc::clone(&refresher);
        scheduler.spawn_repeating(
            "balances",
            cfg.refresh_initial(),
            cfg.refresh_interval(),
            move || {
                let refresher = Arc::clone(&refresher);
                async move { refresher.refresh_all().await }
            },
        );
    }
    {
        let health = Arc::clone(&health);
        scheduler.spawn_repeating(
            "health",
            cfg.health_interval(),
            cfg.health_interval(),
            move || {
                let health = Arc::clone(&health);
                async move { health.check().await }
            },
        );
    }

    wait_for_signal().await;

    info!("Signal received, saving store before exit");
    scheduler.shutdown().await;
    if let Err(e) = cache.flush().await {
        error!("Failed to flush deposit cache: {}", e);
    }
    if let Err(e) = store.flush().await {
        error!("Failed to flush address store: {}", e);
    }
    info!("Shutdown complete");
}

#[cfg(unix)]
async fn wait_for_signal() {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("Failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("SIGINT signal received"),
        _ = sigterm.recv() => info!("SIGTERM signal received"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("SIGINT signal received");
}
