use chrono::{DateTime, Utc};
use log::{debug, trace};
use serde_json::Value;
use sqlx::{types::Json, SqliteConnection};

use super::invoices;
use crate::{
    db_types::{Invoice, Payment, PaymentStatus},
    helpers::merge_metadata,
    traits::{LedgerError, UpsertPaymentResult},
};

pub async fn fetch_payment_for_invoice(
    invoice_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, sqlx::Error> {
    let payment =
        sqlx::query_as("SELECT * FROM payment WHERE invoice_id = $1").bind(invoice_id).fetch_optional(conn).await?;
    Ok(payment)
}

/// Creates the payment row for an invoice. The amount, fee, currency and type are copied from the invoice.
pub async fn insert_payment(
    invoice: &Invoice,
    status: PaymentStatus,
    metadata: Value,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Payment, sqlx::Error> {
    let payment = sqlx::query_as(
        r#"
            INSERT INTO payment (
                invoice_id,
                amount,
                fee,
                currency,
                type,
                external_id,
                status,
                created_at,
                updated_at,
                metadata
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8, $9)
            RETURNING *;
        "#,
    )
    .bind(invoice.id)
    .bind(invoice.amount.to_string())
    .bind(invoice.fee.to_string())
    .bind(invoice.currency.as_str())
    .bind(invoice.invoice_type)
    .bind(invoice.external_id.as_deref())
    .bind(status)
    .bind(now)
    .bind(Json(metadata))
    .fetch_one(conn)
    .await?;
    Ok(payment)
}

/// Updates a payment only while it is still pending. Returns `None` if the payment was already complete.
async fn update_pending_payment(
    id: i64,
    status: PaymentStatus,
    metadata: Value,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, sqlx::Error> {
    let payment = sqlx::query_as(
        r#"
        UPDATE payment SET status = $1, metadata = $2, updated_at = $3
        WHERE id = $4 AND status = $5
        RETURNING *;
        "#,
    )
    .bind(status)
    .bind(Json(metadata))
    .bind(now)
    .bind(id)
    .bind(PaymentStatus::Pending)
    .fetch_optional(conn)
    .await?;
    Ok(payment)
}

/// Inserts or updates the payment for the invoice and keeps the invoice status in step with it.
///
/// This is not atomic on its own. Call it with a transaction.
pub async fn upsert_payment_for_invoice(
    invoice_id: i64,
    status: PaymentStatus,
    patch: Value,
    conn: &mut SqliteConnection,
) -> Result<UpsertPaymentResult, LedgerError> {
    let invoice =
        invoices::fetch_invoice(invoice_id, &mut *conn).await?.ok_or(LedgerError::InvoiceNotFound(invoice_id))?;
    let now = Utc::now();
    let result = match fetch_payment_for_invoice(invoice_id, &mut *conn).await? {
        None => {
            let payment = insert_payment(&invoice, status, patch, now, &mut *conn).await?;
            debug!("🗃️ Payment #{} created for invoice #{invoice_id} with status {status}", payment.id);
            UpsertPaymentResult::Inserted(payment)
        },
        Some(existing) if existing.status == PaymentStatus::Complete => {
            trace!("🗃️ Payment for invoice #{invoice_id} is already complete. Nothing to do.");
            return Ok(UpsertPaymentResult::AlreadyComplete(existing));
        },
        Some(existing) => {
            let metadata = merge_metadata(&existing.metadata.0, &patch);
            match update_pending_payment(existing.id, status, metadata, now, &mut *conn).await? {
                Some(payment) if payment.status == PaymentStatus::Complete => {
                    debug!("🗃️ Payment #{} for invoice #{invoice_id} is now complete", payment.id);
                    UpsertPaymentResult::Completed(payment)
                },
                Some(payment) => UpsertPaymentResult::Updated(payment),
                None => {
                    let current = fetch_payment_for_invoice(invoice_id, &mut *conn).await?.unwrap_or(existing);
                    return Ok(UpsertPaymentResult::AlreadyComplete(current));
                },
            }
        },
    };
    invoices::update_invoice_status(invoice_id, result.payment().status, conn).await?;
    Ok(result)
}
