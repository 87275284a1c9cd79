use chrono::{Duration, Utc};
use ledger_engine::{
    db_types::{NewWithdrawal, WithdrawalStatus},
    events::EventProducers,
    traits::{PayoutReceipt, PayoutStatus, RailError, TransitionResult, TxStatus, WithdrawalQueryFilter},
    LedgerDatabase,
    LedgerError,
    WithdrawalDispatcher,
    WithdrawalPoller,
};
use serde_json::json;
use support::{
    mocks::payout_rail,
    prepare_env::{balance, fund, setup, tear_down, usd, ADDRESS, HASH_A, HASH_B},
};

mod support;

fn new_withdrawal(user_id: i64, amount: &str) -> NewWithdrawal {
    NewWithdrawal::new(user_id, usd(amount), ADDRESS)
        .with_metadata(json!({ "address": ADDRESS, "original_amount": amount, "fee_percentage": "0" }))
}

#[tokio::test]
async fn completed_payout_is_dispatched_once() {
    let db = setup().await;
    fund(&db, 1, "150").await;
    let withdrawal = db.insert_withdrawal(new_withdrawal(1, "100")).await.unwrap();
    assert_eq!(withdrawal.status, WithdrawalStatus::Pending);
    // Pending withdrawals are already committed outflows
    assert_eq!(balance(&db, 1).await, usd("50"));

    let mut rail = payout_rail();
    rail.expect_send()
        .withf(|dest, amount, key| dest == ADDRESS && *amount == usd("100") && key == "withdrawal-1")
        .times(1)
        .returning(|_, _, _| Ok(PayoutReceipt::new(Some(HASH_A.to_string()), PayoutStatus::Complete)));
    let dispatcher = WithdrawalDispatcher::new(db.clone(), rail, EventProducers::default());
    let summary = dispatcher.tick().await.unwrap();
    assert_eq!(summary.updated, 1);

    let withdrawal = db.fetch_withdrawal(withdrawal.id).await.unwrap().unwrap();
    assert_eq!(withdrawal.status, WithdrawalStatus::Complete);
    assert_eq!(withdrawal.external_id.as_deref(), Some(HASH_A));
    assert_eq!(withdrawal.metadata["original_amount"], "100");
    assert_eq!(withdrawal.metadata["request_id"], "withdrawal-1");
    assert!(withdrawal.metadata.get("completed_at").is_some());
    assert_eq!(balance(&db, 1).await, usd("50"));

    // Nothing is pending any more, so the rail is not called again
    let summary = dispatcher.tick().await.unwrap();
    assert!(summary.is_idle());
    tear_down(db).await;
}

#[tokio::test]
async fn oldest_pending_withdrawal_goes_first() {
    let db = setup().await;
    fund(&db, 1, "30").await;
    let older = new_withdrawal(1, "10").with_created_at(Utc::now() - Duration::minutes(5));
    let newer = db.insert_withdrawal(new_withdrawal(1, "12")).await.unwrap();
    let older = db.insert_withdrawal(older).await.unwrap();

    let mut rail = payout_rail();
    rail.expect_send()
        .withf(|_, amount, _| *amount == usd("10"))
        .times(1)
        .returning(|_, _, _| Ok(PayoutReceipt::new(Some(HASH_A.to_string()), PayoutStatus::Complete)));
    let dispatcher = WithdrawalDispatcher::new(db.clone(), rail, EventProducers::default());
    dispatcher.tick().await.unwrap();
    assert_eq!(db.fetch_withdrawal(older.id).await.unwrap().unwrap().status, WithdrawalStatus::Complete);
    assert_eq!(db.fetch_withdrawal(newer.id).await.unwrap().unwrap().status, WithdrawalStatus::Pending);
    tear_down(db).await;
}

#[tokio::test]
async fn unconfirmed_payout_is_delayed_then_confirmed() {
    let db = setup().await;
    fund(&db, 5, "40").await;
    let withdrawal = db.insert_withdrawal(new_withdrawal(5, "25")).await.unwrap();
    let mut rail = payout_rail();
    rail.expect_send().times(1).returning(|_, _, _| {
        Ok(PayoutReceipt::new(Some(HASH_B.to_string()), PayoutStatus::Pending).with_error("replacement underpriced"))
    });
    let dispatcher = WithdrawalDispatcher::new(db.clone(), rail, EventProducers::default());
    dispatcher.tick().await.unwrap();
    let delayed = db.fetch_withdrawal(withdrawal.id).await.unwrap().unwrap();
    assert_eq!(delayed.status, WithdrawalStatus::Delayed);
    assert_eq!(delayed.external_id.as_deref(), Some(HASH_B));
    assert_eq!(delayed.metadata["error"], "replacement underpriced");
    assert_eq!(balance(&db, 5).await, usd("15"));

    let mut rail = payout_rail();
    rail.expect_transaction_status().withf(|hash| hash == HASH_B).times(1).returning(|_| Ok(TxStatus::Pending));
    let poller = WithdrawalPoller::new(db.clone(), rail, EventProducers::default());
    let summary = poller.tick().await.unwrap();
    assert_eq!(summary.examined, 1);
    assert_eq!(summary.updated, 0);
    assert_eq!(db.fetch_withdrawal(withdrawal.id).await.unwrap().unwrap().status, WithdrawalStatus::Delayed);

    let mut rail = payout_rail();
    rail.expect_transaction_status().times(1).returning(|_| Ok(TxStatus::Complete));
    let poller = WithdrawalPoller::new(db.clone(), rail, EventProducers::default());
    let summary = poller.tick().await.unwrap();
    assert_eq!(summary.updated, 1);
    let confirmed = db.fetch_withdrawal(withdrawal.id).await.unwrap().unwrap();
    assert_eq!(confirmed.status, WithdrawalStatus::Complete);
    assert_eq!(confirmed.external_id.as_deref(), Some(HASH_B));
    assert_eq!(confirmed.metadata["address"], ADDRESS);
    assert!(confirmed.metadata.get("confirmed_at").is_some());
    assert_eq!(balance(&db, 5).await, usd("15"));
    tear_down(db).await;
}

#[tokio::test]
async fn failed_payout_returns_the_funds() {
    let db = setup().await;
    fund(&db, 5, "40").await;
    let withdrawal = db.insert_withdrawal(new_withdrawal(5, "25")).await.unwrap();
    db.transition_withdrawal(
        withdrawal.id,
        WithdrawalStatus::Pending,
        WithdrawalStatus::Delayed,
        Some(HASH_A),
        json!({ "error": "timeout" }),
    )
    .await
    .unwrap();
    let mut rail = payout_rail();
    rail.expect_transaction_status().returning(|_| Ok(TxStatus::Failed));
    let poller = WithdrawalPoller::new(db.clone(), rail, EventProducers::default());
    poller.tick().await.unwrap();
    let failed = db.fetch_withdrawal(withdrawal.id).await.unwrap().unwrap();
    assert_eq!(failed.status, WithdrawalStatus::Failed);
    assert!(failed.metadata.get("failed_at").is_some());
    assert_eq!(balance(&db, 5).await, usd("40"));
    tear_down(db).await;
}

#[tokio::test]
async fn payout_without_a_valid_hash_is_dead_lettered() {
    let db = setup().await;
    fund(&db, 8, "10").await;
    let withdrawal = db.insert_withdrawal(new_withdrawal(8, "10")).await.unwrap();
    assert_eq!(balance(&db, 8).await, usd("0"));
    let mut rail = payout_rail();
    rail.expect_send()
        .times(1)
        .returning(|_, _, _| Ok(PayoutReceipt::new(Some("0xdeadbeef".to_string()), PayoutStatus::Complete)));
    let dispatcher = WithdrawalDispatcher::new(db.clone(), rail, EventProducers::default());
    dispatcher.tick().await.unwrap();
    let errored = db.fetch_withdrawal(withdrawal.id).await.unwrap().unwrap();
    assert_eq!(errored.status, WithdrawalStatus::Error);
    assert!(errored.external_id.is_none());
    assert_eq!(errored.metadata["invalid_tx_hash"], "0xdeadbeef");
    // Errored withdrawals are not outflows
    assert_eq!(balance(&db, 8).await, usd("10"));
    assert!(dispatcher.tick().await.unwrap().is_idle());
    tear_down(db).await;
}

#[tokio::test]
async fn rail_timeout_leaves_withdrawal_pending() {
    let db = setup().await;
    fund(&db, 1, "10").await;
    let withdrawal = db.insert_withdrawal(new_withdrawal(1, "5")).await.unwrap();
    let mut rail = payout_rail();
    rail.expect_send().times(1).returning(|_, _, _| Err(RailError::Timeout("sidecar did not answer".into())));
    let dispatcher = WithdrawalDispatcher::new(db.clone(), rail, EventProducers::default());
    let summary = dispatcher.tick().await.unwrap();
    assert_eq!(summary.failed, 1);
    let withdrawal = db.fetch_withdrawal(withdrawal.id).await.unwrap().unwrap();
    assert_eq!(withdrawal.status, WithdrawalStatus::Pending);
    assert_eq!(withdrawal.metadata.get("error"), None);
    tear_down(db).await;
}

#[tokio::test]
async fn withdrawal_without_destination_is_alerted() {
    let db = setup().await;
    fund(&db, 1, "10").await;
    let withdrawal = NewWithdrawal::new(1, usd("5"), ADDRESS).with_metadata(json!({ "note": "address lost" }));
    let withdrawal = db.insert_withdrawal(withdrawal).await.unwrap();
    let mut rail = payout_rail();
    rail.expect_send().never();
    let dispatcher = WithdrawalDispatcher::new(db.clone(), rail, EventProducers::default());
    let summary = dispatcher.tick().await.unwrap();
    assert_eq!(summary.alerts, 1);
    let withdrawal = db.fetch_withdrawal(withdrawal.id).await.unwrap().unwrap();
    assert_eq!(withdrawal.status, WithdrawalStatus::Error);
    assert_eq!(withdrawal.metadata["note"], "address lost");
    tear_down(db).await;
}

#[tokio::test]
async fn delayed_withdrawal_without_hash_is_alerted_not_advanced() {
    let db = setup().await;
    fund(&db, 1, "20").await;
    let broken = db.insert_withdrawal(new_withdrawal(1, "5")).await.unwrap();
    db.transition_withdrawal(broken.id, WithdrawalStatus::Pending, WithdrawalStatus::Delayed, None, json!({}))
        .await
        .unwrap();
    let good = db.insert_withdrawal(new_withdrawal(1, "6")).await.unwrap();
    db.transition_withdrawal(good.id, WithdrawalStatus::Pending, WithdrawalStatus::Delayed, Some(HASH_A), json!({}))
        .await
        .unwrap();

    let mut rail = payout_rail();
    rail.expect_transaction_status().withf(|hash| hash == HASH_A).times(1).returning(|_| Ok(TxStatus::Complete));
    let poller = WithdrawalPoller::new(db.clone(), rail, EventProducers::default());
    let summary = poller.tick().await.unwrap();
    assert_eq!(summary.examined, 2);
    assert_eq!(summary.alerts, 1);
    assert_eq!(summary.updated, 1);
    assert_eq!(db.fetch_withdrawal(broken.id).await.unwrap().unwrap().status, WithdrawalStatus::Delayed);
    assert_eq!(db.fetch_withdrawal(good.id).await.unwrap().unwrap().status, WithdrawalStatus::Complete);
    tear_down(db).await;
}

#[tokio::test]
async fn long_unconfirmed_withdrawal_raises_an_alert() {
    let db = setup().await;
    fund(&db, 1, "20").await;
    let withdrawal = db.insert_withdrawal(new_withdrawal(1, "5")).await.unwrap();
    db.transition_withdrawal(
        withdrawal.id,
        WithdrawalStatus::Pending,
        WithdrawalStatus::Delayed,
        Some(HASH_A),
        json!({}),
    )
    .await
    .unwrap();
    let mut rail = payout_rail();
    rail.expect_transaction_status().times(2).returning(|_| Ok(TxStatus::Pending));
    let poller = WithdrawalPoller::new(db.clone(), rail, EventProducers::default());
    let soon = poller.tick_at(Utc::now() + Duration::hours(1)).await.unwrap();
    assert_eq!(soon.alerts, 0);
    let later = poller.tick_at(Utc::now() + Duration::hours(25)).await.unwrap();
    assert_eq!(later.alerts, 1);
    // Never failed automatically
    assert_eq!(db.fetch_withdrawal(withdrawal.id).await.unwrap().unwrap().status, WithdrawalStatus::Delayed);
    tear_down(db).await;
}

#[tokio::test]
async fn withdrawal_state_machine_is_enforced() {
    let db = setup().await;
    fund(&db, 1, "20").await;
    let withdrawal = db.insert_withdrawal(new_withdrawal(1, "5")).await.unwrap();
    let id = withdrawal.id;
    use WithdrawalStatus::*;

    let err = db.transition_withdrawal(id, Pending, Failed, None, json!({})).await.unwrap_err();
    assert!(matches!(err, LedgerError::IllegalTransition { from: Pending, to: Failed }));

    let result = db.transition_withdrawal(id, Pending, Complete, Some(HASH_A), json!({})).await.unwrap();
    assert!(result.is_applied());
    // A stale writer that still believes the withdrawal is pending is refused
    let result = db.transition_withdrawal(id, Pending, Delayed, Some(HASH_B), json!({})).await.unwrap();
    assert!(matches!(result, TransitionResult::Conflict(Complete)));
    let err = db.transition_withdrawal(id, Complete, Failed, None, json!({})).await.unwrap_err();
    assert!(matches!(err, LedgerError::IllegalTransition { .. }));

    // Terminal statuses are sticky even for writers that bypass the ledger API
    let raw = sqlx::query("UPDATE withdrawal SET status = 'pending' WHERE id = $1").bind(id).execute(db.pool()).await;
    assert!(raw.is_err());
    let withdrawal = db.fetch_withdrawal(id).await.unwrap().unwrap();
    assert_eq!(withdrawal.status, Complete);
    assert_eq!(withdrawal.external_id.as_deref(), Some(HASH_A));
    tear_down(db).await;
}

#[tokio::test]
async fn withdrawals_cannot_overdraw() {
    let db = setup().await;
    fund(&db, 1, "20").await;
    db.insert_withdrawal(new_withdrawal(1, "15")).await.unwrap();
    let err = db.insert_withdrawal(new_withdrawal(1, "10")).await.unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
    let pending = db
        .fetch_withdrawals(WithdrawalQueryFilter::default().with_user_id(1).with_status(WithdrawalStatus::Pending))
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(balance(&db, 1).await, usd("5"));
    tear_down(db).await;
}
