use sqlx::SqliteConnection;

use crate::{
    db_types::{DepositStatus, InvoiceType, PaymentStatus, WithdrawalStatus},
    traits::BalanceEntry,
};

/// Every row that contributes to the user's balance, read in one statement.
///
/// Signs are not applied here. See [`BalanceEntry::signed_amount`].
pub async fn balance_entries(user_id: i64, conn: &mut SqliteConnection) -> Result<Vec<BalanceEntry>, sqlx::Error> {
    let entries = sqlx::query_as(
        r#"
        SELECT 'sale' AS kind, p.id AS source_id, p.amount AS amount, p.currency AS currency
          FROM payment p JOIN invoice i ON i.id = p.invoice_id
         WHERE i.seller_id = $1 AND p.status = $2
        UNION ALL
        SELECT 'fee', p.id, p.fee, p.currency
          FROM payment p JOIN invoice i ON i.id = p.invoice_id
         WHERE i.seller_id = $1 AND p.status = $2
        UNION ALL
        SELECT 'reward', r.id, r.amount, r.currency
          FROM rewards r
         WHERE r.user_id = $1
        UNION ALL
        SELECT 'deposit', d.id, d.amount, d.currency
          FROM deposit d
         WHERE d.user_id = $1 AND d.status = $3
        UNION ALL
        SELECT 'withdrawal', w.id, w.amount, w.currency
          FROM withdrawal w
         WHERE w.user_id = $1 AND w.status IN ($4, $5, $6)
        UNION ALL
        SELECT 'purchase', p.id, p.amount, p.currency
          FROM payment p JOIN invoice i ON i.id = p.invoice_id
         WHERE i.buyer_id = $1 AND p.status = $2 AND p.type = $7
        "#,
    )
    .bind(user_id)
    .bind(PaymentStatus::Complete)
    .bind(DepositStatus::Complete)
    .bind(WithdrawalStatus::Complete)
    .bind(WithdrawalStatus::Pending)
    .bind(WithdrawalStatus::Delayed)
    .bind(InvoiceType::Balance)
    .fetch_all(conn)
    .await?;
    Ok(entries)
}
