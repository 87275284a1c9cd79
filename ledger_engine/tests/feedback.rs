use ledger_engine::{
    db_types::{NoteAuthor, PaymentStatus},
    FeedbackApi,
    FeedbackError,
    LedgerDatabase,
    LedgerError,
};
use serde_json::json;
use support::prepare_env::{balance, setup, stripe_invoice, tear_down, usd};

mod support;

#[tokio::test]
async fn only_the_buyer_of_a_paid_invoice_may_rate() {
    let db = setup().await;
    let invoice = stripe_invoice(&db, "12.00", "0.43", "cs_fb_1").await;
    let api = FeedbackApi::new(db.clone());

    let err = api.rate_invoice(invoice.id, 1, 5, None).await.unwrap_err();
    assert!(matches!(err, FeedbackError::NotAllowed(_)));

    db.upsert_payment_for_invoice(invoice.id, PaymentStatus::Complete, json!({})).await.unwrap();
    let err = api.rate_invoice(invoice.id, 2, 5, None).await.unwrap_err();
    assert!(matches!(err, FeedbackError::NotAllowed(_)));
    let err = api.rate_invoice(invoice.id, 1, 6, None).await.unwrap_err();
    assert!(matches!(err, FeedbackError::InvalidRequest(_)));
    let err = api.rate_invoice(9999, 1, 4, None).await.unwrap_err();
    assert!(matches!(err, FeedbackError::InvoiceNotFound(9999)));

    let rating = api.rate_invoice(invoice.id, 1, 4, Some("  Quick delivery ".into())).await.unwrap();
    assert_eq!(rating.rating, 4);
    assert_eq!(rating.review.as_deref(), Some("Quick delivery"));
    let err = api.rate_invoice(invoice.id, 1, 3, None).await.unwrap_err();
    assert!(matches!(err, FeedbackError::Ledger(LedgerError::AlreadyExists(_))));
    assert_eq!(api.ratings(invoice.id).await.unwrap().len(), 1);
    tear_down(db).await;
}

#[tokio::test]
async fn notes_are_limited_to_the_parties() {
    let db = setup().await;
    let invoice = stripe_invoice(&db, "12.00", "0.43", "cs_fb_2").await;
    let api = FeedbackApi::new(db.clone());
    let note = api.add_note(invoice.id, 1, "Please leave it at the door").await.unwrap();
    assert_eq!(note.author, NoteAuthor::Buyer);
    let note = api.add_note(invoice.id, 2, "Shipped today").await.unwrap();
    assert_eq!(note.author, NoteAuthor::Seller);
    let err = api.add_note(invoice.id, 3, "Hello").await.unwrap_err();
    assert!(matches!(err, FeedbackError::NotAllowed(_)));
    let err = api.add_note(invoice.id, 1, "   ").await.unwrap_err();
    assert!(matches!(err, FeedbackError::InvalidRequest(_)));
    let notes = api.notes(invoice.id).await.unwrap();
    let authors = notes.iter().map(|n| n.author).collect::<Vec<_>>();
    assert_eq!(authors, vec![NoteAuthor::Buyer, NoteAuthor::Seller]);
    tear_down(db).await;
}

#[tokio::test]
async fn rewards_credit_the_balance() {
    let db = setup().await;
    let api = FeedbackApi::new(db.clone());
    let err = api.grant_reward(7, usd("0"), "nothing").await.unwrap_err();
    assert!(matches!(err, FeedbackError::InvalidRequest(_)));
    let reward = api.grant_reward(7, usd("2.50"), "Referral").await.unwrap();
    assert_eq!(reward.reason.as_deref(), Some("Referral"));
    api.grant_reward(7, usd("1.25"), "Review bonus").await.unwrap();
    assert_eq!(balance(&db, 7).await, usd("3.75"));
    tear_down(db).await;
}
