use chrono::{Duration, Utc};
use ledger_common::Usd;
use ledger_engine::{
    db_types::{DepositStatus, DepositType, NewDeposit},
    events::EventProducers,
    traits::{
        CheckoutState,
        CompleteDepositResult,
        DepositQueryFilter,
        DepositWatcher,
        GatewayStatus,
        IncomingTransfer,
        RailError,
        ReceivingAddress,
    },
    DepositMonitor,
    LedgerDatabase,
};
use serde_json::json;
use support::{
    mocks::{stripe_gateway, MockGateway, MockWatcher},
    prepare_env::{balance, setup, tear_down, usd, HASH_A, HASH_B},
};

mod support;

fn usdt_deposit(user_id: i64, hint: &str, address: &str) -> NewDeposit {
    NewDeposit::new(user_id, usd(hint), DepositType::Usdt).with_metadata(json!({ "address": address }))
}

fn quiet_stripe() -> MockGateway {
    let mut stripe = stripe_gateway();
    stripe.expect_check_status().never();
    stripe
}

#[tokio::test]
async fn usdt_deposit_expires_after_the_window() {
    let db = setup().await;
    let deposit = db.insert_deposit(usdt_deposit(1, "0", "0xabc1")).await.unwrap();
    let mut watcher = MockWatcher::new();
    watcher.expect_incoming_transfers().withf(|address| address == "0xabc1").returning(|_| Ok(vec![]));
    watcher.expect_confirmed_amount().never();
    let monitor = DepositMonitor::new(db.clone(), watcher, quiet_stripe(), EventProducers::default());

    let summary = monitor.tick_at(deposit.created_at + Duration::minutes(30)).await.unwrap();
    assert_eq!(summary.examined, 1);
    let waiting = db.fetch_deposit(deposit.id).await.unwrap().unwrap();
    assert_eq!(waiting.status, DepositStatus::Pending);
    assert!(waiting.metadata.get("checked_at").is_some());

    let summary = monitor.tick_at(deposit.created_at + Duration::minutes(61)).await.unwrap();
    assert_eq!(summary.updated, 1);
    let expired = db.fetch_deposit(deposit.id).await.unwrap().unwrap();
    assert_eq!(expired.status, DepositStatus::Failed);
    assert_eq!(expired.metadata["failure_reason"], "expired");
    assert_eq!(expired.metadata["address"], "0xabc1");
    assert_eq!(balance(&db, 1).await, usd("0"));

    // Failed deposits are no longer polled
    assert!(monitor.tick().await.unwrap().is_idle());
    tear_down(db).await;
}

#[tokio::test]
async fn usdt_deposit_is_credited_with_the_on_chain_amount() {
    let db = setup().await;
    let deposit = db.insert_deposit(usdt_deposit(3, "10", "0xabc2")).await.unwrap();
    let mut watcher = MockWatcher::new();
    watcher.expect_incoming_transfers().returning(|_| {
        Ok(vec![
            IncomingTransfer { tx_hash: HASH_B.to_string(), block_number: 100 },
            IncomingTransfer { tx_hash: HASH_A.to_uppercase().replace("0X", "0x"), block_number: 120 },
        ])
    });
    watcher.expect_confirmed_amount().withf(|hash| hash == HASH_A).times(1).returning(|_| Ok(Some(usd("12.5"))));
    let monitor = DepositMonitor::new(db.clone(), watcher, quiet_stripe(), EventProducers::default());
    let summary = monitor.tick().await.unwrap();
    assert_eq!(summary.updated, 1);

    let deposit = db.fetch_deposit(deposit.id).await.unwrap().unwrap();
    assert_eq!(deposit.status, DepositStatus::Complete);
    assert_eq!(deposit.amount, usd("12.5"));
    assert_eq!(deposit.tx_hash.as_deref(), Some(HASH_A));
    assert_eq!(deposit.metadata["block_number"], 120);
    assert_eq!(balance(&db, 3).await, usd("12.5"));
    tear_down(db).await;
}

#[tokio::test]
async fn one_transfer_credits_one_deposit() {
    let db = setup().await;
    let first = db.insert_deposit(usdt_deposit(4, "0", "0xabc3")).await.unwrap();
    let second = db.insert_deposit(usdt_deposit(4, "0", "0xabc4")).await.unwrap();
    let mut watcher = MockWatcher::new();
    watcher
        .expect_incoming_transfers()
        .returning(|_| Ok(vec![IncomingTransfer { tx_hash: HASH_A.to_string(), block_number: 7 }]));
    watcher.expect_confirmed_amount().returning(|_| Ok(Some(usd("25"))));
    let monitor = DepositMonitor::new(db.clone(), watcher, quiet_stripe(), EventProducers::default());
    let summary = monitor.tick().await.unwrap();
    assert_eq!(summary.examined, 2);
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.skipped, 1);

    let first = db.fetch_deposit(first.id).await.unwrap().unwrap();
    let second = db.fetch_deposit(second.id).await.unwrap().unwrap();
    assert_eq!(first.status, DepositStatus::Complete);
    assert_eq!(second.status, DepositStatus::Pending);
    assert!(second.tx_hash.is_none());
    assert_eq!(second.metadata["skipped_tx_hash"], HASH_A);
    assert_eq!(balance(&db, 4).await, usd("25"));

    // Direct attempts to reuse the hash are refused too
    let again = db.complete_deposit(second.id, usd("25"), Some(HASH_A), json!({})).await.unwrap();
    let duplicate_of = match again {
        CompleteDepositResult::DuplicateTxHash { other_deposit_id } => other_deposit_id,
        other => panic!("Expected a duplicate, got {other:?}"),
    };
    assert_eq!(duplicate_of, first.id);
    tear_down(db).await;
}

#[tokio::test]
async fn unconfirmed_transfer_waits() {
    let db = setup().await;
    let deposit = db.insert_deposit(usdt_deposit(6, "0", "0xabc5")).await.unwrap();
    let mut watcher = MockWatcher::new();
    watcher
        .expect_incoming_transfers()
        .returning(|_| Ok(vec![IncomingTransfer { tx_hash: HASH_B.to_string(), block_number: 9 }]));
    watcher.expect_confirmed_amount().returning(|_| Ok(None));
    let monitor = DepositMonitor::new(db.clone(), watcher, quiet_stripe(), EventProducers::default());
    monitor.tick().await.unwrap();
    let deposit = db.fetch_deposit(deposit.id).await.unwrap().unwrap();
    assert_eq!(deposit.status, DepositStatus::Pending);
    assert_eq!(deposit.metadata["pending_tx_hash"], HASH_B);
    tear_down(db).await;
}

#[tokio::test]
async fn unconfirmed_transfer_does_not_outlive_the_window() {
    let db = setup().await;
    let deposit = db.insert_deposit(usdt_deposit(7, "5", "0xabc6")).await.unwrap();
    let mut watcher = MockWatcher::new();
    // Seen in the mempool, never mined
    watcher
        .expect_incoming_transfers()
        .returning(|_| Ok(vec![IncomingTransfer { tx_hash: HASH_B.to_string(), block_number: 0 }]));
    watcher.expect_confirmed_amount().returning(|_| Ok(None));
    let monitor = DepositMonitor::new(db.clone(), watcher, quiet_stripe(), EventProducers::default());

    monitor.tick_at(deposit.created_at + Duration::minutes(59)).await.unwrap();
    let waiting = db.fetch_deposit(deposit.id).await.unwrap().unwrap();
    assert_eq!(waiting.status, DepositStatus::Pending);

    let summary = monitor.tick_at(deposit.created_at + Duration::days(7)).await.unwrap();
    assert_eq!(summary.updated, 1);
    let expired = db.fetch_deposit(deposit.id).await.unwrap().unwrap();
    assert_eq!(expired.status, DepositStatus::Failed);
    assert_eq!(expired.metadata["failure_reason"], "expired");
    assert_eq!(expired.metadata["pending_tx_hash"], HASH_B);
    assert!(expired.tx_hash.is_none());
    assert_eq!(balance(&db, 7).await, usd("0"));
    tear_down(db).await;
}

/// Panics for one address, fails for another and reports a confirmed transfer everywhere else.
struct UnrulyWatcher;

impl DepositWatcher for UnrulyWatcher {
    async fn create_deposit_address(&self, deposit_id: i64) -> Result<ReceivingAddress, RailError> {
        Err(RailError::Unsupported(format!("address for deposit #{deposit_id}")))
    }

    async fn incoming_transfers(&self, address: &str) -> Result<Vec<IncomingTransfer>, RailError> {
        match address {
            "0xpanic" => panic!("malformed transfer list"),
            "0xerror" => Err(RailError::InvalidResponse("truncated body".into())),
            _ => Ok(vec![IncomingTransfer { tx_hash: HASH_A.to_string(), block_number: 11 }]),
        }
    }

    async fn confirmed_amount(&self, _tx_hash: &str) -> Result<Option<Usd>, RailError> {
        Ok(Some(usd("8")))
    }
}

#[tokio::test]
async fn one_bad_row_does_not_stop_the_tick() {
    let db = setup().await;
    let panicking = db.insert_deposit(usdt_deposit(8, "0", "0xpanic")).await.unwrap();
    let failing = db.insert_deposit(usdt_deposit(8, "0", "0xerror")).await.unwrap();
    let healthy = db.insert_deposit(usdt_deposit(8, "0", "0xfine")).await.unwrap();
    let monitor = DepositMonitor::new(db.clone(), UnrulyWatcher, quiet_stripe(), EventProducers::default());

    let summary = monitor.tick().await.unwrap();
    assert_eq!(summary.examined, 3);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.updated, 1);
    assert_eq!(db.fetch_deposit(panicking.id).await.unwrap().unwrap().status, DepositStatus::Pending);
    assert_eq!(db.fetch_deposit(failing.id).await.unwrap().unwrap().status, DepositStatus::Pending);
    assert_eq!(db.fetch_deposit(healthy.id).await.unwrap().unwrap().status, DepositStatus::Complete);
    assert_eq!(balance(&db, 8).await, usd("8"));

    // The next tick still reaches the rows that misbehaved
    let summary = monitor.tick().await.unwrap();
    assert_eq!(summary.examined, 2);
    assert_eq!(summary.failed, 2);
    tear_down(db).await;
}

#[tokio::test]
async fn deposit_without_address_is_alerted() {
    let db = setup().await;
    let deposit = db.insert_deposit(NewDeposit::new(6, usd("0"), DepositType::Usdt)).await.unwrap();
    let mut watcher = MockWatcher::new();
    watcher.expect_incoming_transfers().never();
    let monitor = DepositMonitor::new(db.clone(), watcher, quiet_stripe(), EventProducers::default());
    let summary = monitor.tick().await.unwrap();
    assert_eq!(summary.alerts, 1);
    assert_eq!(db.fetch_deposit(deposit.id).await.unwrap().unwrap().status, DepositStatus::Pending);
    tear_down(db).await;
}

#[tokio::test]
async fn stripe_deposits_follow_the_session() {
    let db = setup().await;
    let paid = NewDeposit::new(9, usd("30"), DepositType::Stripe).with_external_id("cs_dep_paid");
    let paid = db.insert_deposit(paid).await.unwrap();
    let expired = NewDeposit::new(9, usd("40"), DepositType::Stripe).with_external_id("cs_dep_expired");
    let expired = db.insert_deposit(expired).await.unwrap();
    let open = NewDeposit::new(9, usd("50"), DepositType::Stripe).with_external_id("cs_dep_open");
    let open = db.insert_deposit(open).await.unwrap();
    // Stripe deposits have no expiry of their own, however old they are
    let old = NewDeposit::new(9, usd("60"), DepositType::Stripe)
        .with_external_id("cs_dep_old")
        .with_created_at(Utc::now() - Duration::days(3));
    let old = db.insert_deposit(old).await.unwrap();

    let mut stripe = stripe_gateway();
    stripe.expect_check_status().returning(|id| {
        let state = match id {
            "cs_dep_paid" => CheckoutState::new(GatewayStatus::Paid, "paid").with_amount(usd("30"), "usd"),
            "cs_dep_expired" => CheckoutState::new(GatewayStatus::Expired, "expired"),
            _ => CheckoutState::new(GatewayStatus::Pending, "open"),
        };
        Ok(state)
    });
    let mut watcher = MockWatcher::new();
    watcher.expect_incoming_transfers().never();
    let monitor = DepositMonitor::new(db.clone(), watcher, stripe, EventProducers::default());
    let summary = monitor.tick().await.unwrap();
    assert_eq!(summary.examined, 4);
    assert_eq!(summary.updated, 2);

    assert_eq!(db.fetch_deposit(paid.id).await.unwrap().unwrap().status, DepositStatus::Complete);
    let expired = db.fetch_deposit(expired.id).await.unwrap().unwrap();
    assert_eq!(expired.status, DepositStatus::Failed);
    assert_eq!(expired.metadata["failure_reason"], "expired");
    assert_eq!(db.fetch_deposit(open.id).await.unwrap().unwrap().status, DepositStatus::Pending);
    assert_eq!(db.fetch_deposit(old.id).await.unwrap().unwrap().status, DepositStatus::Pending);
    assert_eq!(balance(&db, 9).await, usd("30"));

    let complete = db
        .fetch_deposits(DepositQueryFilter::default().with_user_id(9).with_status(DepositStatus::Complete))
        .await
        .unwrap();
    assert_eq!(complete.len(), 1);
    tear_down(db).await;
}
