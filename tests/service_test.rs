mod common;

use common::{MockChain, build_engine, decode_payload};
use deposit_wallet_engine::EngineError;
use deposit_wallet_engine::chain::{ChainError, TxStatus};
use deposit_wallet_engine::service::WalletService;
use deposit_wallet_engine::tasks::Sweeper;
use std::sync::Arc;

fn service_over(harness: &common::TestEngine) -> (WalletService, Arc<Sweeper>) {
    let sweeper = Arc::new(Sweeper::new(
        Arc::clone(&harness.store),
        Arc::clone(&harness.client),
        harness.queue.clone(),
        1,
    ));
    let service = WalletService::new(
        Arc::clone(&harness.client),
        Arc::clone(&harness.store),
        harness.queue.clone(),
        Arc::clone(&sweeper),
        Arc::clone(&harness.cursor),
        reqwest::Client::new(),
        8080,
    );
    (service, sweeper)
}

#[tokio::test(start_paused = true)]
async fn withdraw_confirms_and_debits() {
    let harness = build_engine(MockChain::new(10), 1).await;
    harness
        .chain
        .lock()
        .unwrap()
        .balances
        .insert(harness.master.address.clone(), 100);
    let (service, _) = service_over(&harness);

    let receipt = service.withdraw("dw1dest", 30.0).await.unwrap();
    let chain = harness.chain.lock().unwrap();
    assert_eq!(chain.broadcasts.len(), 1);
    assert_eq!(chain.broadcasts[0].txid, receipt.txid);
    drop(chain);

    let cached = harness
        .store
        .get_address(0, true)
        .await
        .unwrap()
        .unwrap()
        .balance;
    assert_eq!(cached, 70);
}

#[tokio::test(start_paused = true)]
async fn withdraw_rejects_bad_address_before_the_queue() {
    let harness = build_engine(MockChain::new(10), 1).await;
    harness
        .chain
        .lock()
        .unwrap()
        .invalid_addresses
        .insert("notanaddress".to_string());
    let (service, _) = service_over(&harness);

    let err = service.withdraw("notanaddress", 5.0).await.unwrap_err();
    assert!(matches!(err, EngineError::Rejected(_)));
    assert!(harness.chain.lock().unwrap().broadcasts.is_empty());
}

#[tokio::test(start_paused = true)]
async fn withdraw_that_never_lands_reports_not_found() {
    let harness = build_engine(MockChain::new(10), 1).await;
    {
        let mut chain = harness.chain.lock().unwrap();
        chain.balances.insert(harness.master.address.clone(), 100);
        chain.default_status = TxStatus::Pending;
    }
    let (service, _) = service_over(&harness);

    let err = service.withdraw("dw1dest", 5.0).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Chain(ChainError::TxNotFound)
    ));
    // The broadcast itself went out; only confirmation was missing.
    assert_eq!(harness.chain.lock().unwrap().broadcasts.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn sweep_all_consolidates_funded_addresses_to_master() {
    let harness = build_engine(MockChain::new(10), 1).await;
    let funded_one = harness.new_address().await;
    let funded_two = harness.new_address().await;
    let empty = harness.new_address().await;
    {
        let mut chain = harness.chain.lock().unwrap();
        chain.balances.insert(funded_one.clone(), 40);
        chain.balances.insert(funded_two.clone(), 25);
    }
    // Cached balances drive the sweep candidate list.
    harness.store.set_balance(&funded_one, 40, None).await.unwrap();
    harness.store.set_balance(&funded_two, 25, None).await.unwrap();
    harness.store.set_balance(&empty, 0, None).await.unwrap();
    let signaller = harness.spawn_unlock_signaller();
    let (service, _) = service_over(&harness);

    let swept = service.sweep_all().await.unwrap();
    assert_eq!(swept, 2);

    let chain = harness.chain.lock().unwrap();
    assert_eq!(chain.max_broadcast_inflight, 1);
    assert_eq!(chain.broadcasts.len(), 2);
    let mut amounts = Vec::new();
    for tx in &chain.broadcasts {
        let payload = decode_payload(tx);
        assert_eq!(payload["to"].as_str().unwrap(), harness.master.address);
        amounts.push(payload["amount"].as_u64().unwrap());
    }
    amounts.sort_unstable();
    assert_eq!(amounts, vec![25, 40]);
    drop(chain);
    signaller.abort();
}

#[tokio::test(start_paused = true)]
async fn listing_with_balances_hides_unfunded_addresses() {
    let harness = build_engine(MockChain::new(10), 1).await;
    let funded = harness.new_address().await;
    let _unfunded = harness.new_address().await;
    harness.store.set_balance(&funded, 12, None).await.unwrap();
    let (service, _) = service_over(&harness);

    let all = service.list_addresses(false).await.unwrap();
    assert_eq!(all.len(), 2);

    let funded_only = service.list_addresses(true).await.unwrap();
    assert_eq!(funded_only.len(), 1);
    assert_eq!(funded_only[0].address, funded);
    assert_eq!(funded_only[0].balance, 12);
}
