use ledger_common::Usd;
use ledger_engine::{
    db_types::{
        DepositType,
        InvoiceType,
        NewDeposit,
        NewInvoice,
        NewReward,
        NewWithdrawal,
        PaymentStatus,
        WithdrawalStatus,
    },
    BalanceApi,
    BalanceError,
    BalanceManagement,
    CheckoutApi,
    CheckoutError,
    InvoiceOrder,
    LedgerDatabase,
    SqliteDatabase,
};
use serde_json::json;
use support::prepare_env::{balance, fund, setup, stripe_invoice, tear_down, usd, ADDRESS, HASH_A, HASH_B};

mod support;

fn order(buyer_id: i64, seller_id: i64, price: &str) -> InvoiceOrder {
    InvoiceOrder {
        buyer_id,
        seller_id,
        searchable_id: 501,
        price: usd(price),
        description: "Signed print".into(),
        metadata: json!({ "selections": [{ "id": 1, "qty": 1 }] }),
    }
}

async fn withdrawal_in(
    db: &SqliteDatabase,
    user_id: i64,
    amount: &str,
    path: &[(WithdrawalStatus, Option<&str>)],
) {
    let withdrawal = db.insert_withdrawal(NewWithdrawal::new(user_id, usd(amount), ADDRESS)).await.unwrap();
    let mut from = WithdrawalStatus::Pending;
    for (to, hash) in path {
        let result = db.transition_withdrawal(withdrawal.id, from, *to, *hash, json!({})).await.unwrap();
        assert!(result.is_applied());
        from = *to;
    }
}

#[tokio::test]
async fn balance_is_the_sum_of_its_contributions() {
    let db = setup().await;
    let seller = 10;

    // A completed card sale and one still waiting on the gateway
    let sale = NewInvoice::new(11, seller, 1, usd("49.98"), InvoiceType::Stripe)
        .with_fee(usd("1.80"))
        .with_external_id("cs_bal_2");
    let sale = db.insert_invoice(sale).await.unwrap();
    db.upsert_payment_for_invoice(sale.id, PaymentStatus::Complete, json!({})).await.unwrap();
    let unpaid = NewInvoice::new(11, seller, 2, usd("5.00"), InvoiceType::Stripe)
        .with_fee(usd("0.20"))
        .with_external_id("cs_bal_3");
    let unpaid = db.insert_invoice(unpaid).await.unwrap();
    db.upsert_payment_for_invoice(unpaid.id, PaymentStatus::Pending, json!({})).await.unwrap();
    assert_eq!(balance(&db, seller).await, usd("48.18"));

    fund(&db, seller, "10").await;

    let deposit = db.insert_deposit(NewDeposit::new(seller, usd("20"), DepositType::Stripe)).await.unwrap();
    db.complete_deposit(deposit.id, usd("20"), None, json!({})).await.unwrap();
    let failed = db.insert_deposit(NewDeposit::new(seller, usd("15"), DepositType::Stripe)).await.unwrap();
    db.fail_deposit(failed.id, json!({ "failure_reason": "expired" })).await.unwrap();
    db.insert_deposit(NewDeposit::new(seller, usd("7"), DepositType::Stripe)).await.unwrap();
    assert_eq!(balance(&db, seller).await, usd("78.18"));

    use WithdrawalStatus::*;
    withdrawal_in(&db, seller, "5", &[]).await;
    withdrawal_in(&db, seller, "3", &[(Delayed, Some(HASH_A))]).await;
    withdrawal_in(&db, seller, "2", &[(Complete, Some(HASH_B))]).await;
    withdrawal_in(&db, seller, "4", &[(Error, None)]).await;
    withdrawal_in(&db, seller, "1", &[(Delayed, Some(HASH_A)), (Failed, None)]).await;
    assert_eq!(balance(&db, seller).await, usd("68.18"));

    let checkout = CheckoutApi::new(db.clone());
    let (invoice, payment) = checkout.pay_with_balance(order(seller, 12, "7.25")).await.unwrap();
    assert_eq!(invoice.invoice_type, InvoiceType::Balance);
    assert_eq!(payment.status, PaymentStatus::Complete);
    assert_eq!(payment.fee, Usd::ZERO);
    assert_eq!(balance(&db, seller).await, usd("60.93"));
    assert_eq!(balance(&db, 12).await, usd("7.25"));
    // The card buyer is not affected by their own card payment
    assert_eq!(balance(&db, 11).await, usd("0"));

    let entries = db.fetch_balance_entries(seller).await.unwrap();
    let total: Usd = entries.iter().map(|e| e.signed_amount()).sum();
    assert_eq!(total, usd("60.93"));
    // sale, fee, reward, deposit, three committed withdrawals and one purchase
    assert_eq!(entries.len(), 8);
    tear_down(db).await;
}

#[tokio::test]
async fn balance_purchases_cannot_overdraw() {
    let db = setup().await;
    fund(&db, 20, "5").await;
    let checkout = CheckoutApi::new(db.clone());
    let err = checkout.pay_with_balance(order(20, 21, "5.01")).await.unwrap_err();
    match err {
        CheckoutError::Balance(BalanceError::InsufficientFunds { available, required }) => {
            assert_eq!(available, usd("5"));
            assert_eq!(required, usd("5.01"));
        },
        e => panic!("Unexpected error: {e}"),
    }
    checkout.pay_with_balance(order(20, 21, "5.00")).await.unwrap();
    assert_eq!(balance(&db, 20).await, usd("0"));
    assert_eq!(balance(&db, 21).await, usd("5"));
    tear_down(db).await;
}

#[tokio::test]
async fn sufficiency_check_arguments() {
    let db = setup().await;
    fund(&db, 30, "12.34").await;
    let api = BalanceApi::new(db.clone());
    let err = api.validate_sufficient_balance(30, "eur", usd("1")).await.unwrap_err();
    assert!(matches!(err, BalanceError::InvalidArgument(_)));
    let err = api.validate_sufficient_balance(30, "usd", usd("-1")).await.unwrap_err();
    assert!(matches!(err, BalanceError::InvalidArgument(_)));
    let err = api.validate_sufficient_balance(30, "usd", usd("12.35")).await.unwrap_err();
    assert!(matches!(err, BalanceError::InsufficientFunds { .. }));
    let available = api.validate_sufficient_balance(30, "USD", usd("12.34")).await.unwrap();
    assert_eq!(available, usd("12.34"));
    let sheet = api.calculate_balance(31).await.unwrap();
    assert_eq!(sheet.get("usd"), Usd::ZERO);
    tear_down(db).await;
}

#[tokio::test]
async fn writes_are_visible_on_every_connection() {
    let db = setup().await;
    let reward = db.insert_reward(NewReward::new(40, usd("1.50"))).await.unwrap();
    // Read from several tasks at once so the pool hands out more than one connection
    let readers = (0..6)
        .map(|_| {
            let db = db.clone();
            tokio::spawn(async move { db.fetch_rewards(40).await })
        })
        .collect::<Vec<_>>();
    for reader in readers {
        let rewards = reader.await.unwrap().unwrap();
        assert_eq!(rewards.len(), 1);
        assert_eq!(rewards[0].id, reward.id);
    }
    let invoice = stripe_invoice(&db, "12.00", "0.50", "cs_visible_1").await;
    let (a, b) = tokio::join!(db.fetch_invoice(invoice.id), db.fetch_invoice(invoice.id));
    assert!(a.unwrap().is_some());
    assert!(b.unwrap().is_some());
    let deposit = db.insert_deposit(NewDeposit::new(40, usd("3"), DepositType::Usdt)).await.unwrap();
    let updated = db.update_pending_deposit(deposit.id, Some(ADDRESS), json!({})).await.unwrap();
    assert!(updated.is_some());
    tear_down(db).await;
}
