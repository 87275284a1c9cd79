use chrono::{DateTime, Utc};
use log::trace;
use sqlx::{types::Json, SqliteConnection};

use crate::db_types::{Invoice, InvoiceType, NewInvoice, PaymentStatus};

/// Inserts a new invoice using the given connection. This is not atomic. You can embed this call inside a
/// transaction if you need to ensure atomicity, and pass `&mut *tx` as the connection argument.
pub async fn insert_invoice(invoice: NewInvoice, conn: &mut SqliteConnection) -> Result<Invoice, sqlx::Error> {
    let invoice: Invoice = sqlx::query_as(
        r#"
            INSERT INTO invoice (
                buyer_id,
                seller_id,
                searchable_id,
                amount,
                fee,
                currency,
                type,
                external_id,
                status,
                created_at,
                metadata
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *;
        "#,
    )
    .bind(invoice.buyer_id)
    .bind(invoice.seller_id)
    .bind(invoice.searchable_id)
    .bind(invoice.amount.to_string())
    .bind(invoice.fee.to_string())
    .bind(invoice.currency)
    .bind(invoice.invoice_type)
    .bind(invoice.external_id)
    .bind(PaymentStatus::Pending)
    .bind(invoice.created_at)
    .bind(Json(invoice.metadata))
    .fetch_one(conn)
    .await?;
    trace!("🗃️ Invoice #{} for {} inserted", invoice.id, invoice.amount);
    Ok(invoice)
}

pub async fn fetch_invoice(id: i64, conn: &mut SqliteConnection) -> Result<Option<Invoice>, sqlx::Error> {
    let invoice = sqlx::query_as("SELECT * FROM invoice WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(invoice)
}

/// Gateway-backed invoices created since `since` that have no completed payment, ordered oldest first.
pub async fn fetch_unreconciled_invoices(
    since: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Invoice>, sqlx::Error> {
    let invoices = sqlx::query_as(
        r#"
        SELECT * FROM invoice i
        WHERE i.created_at >= $1
          AND i.type != $2
          AND NOT EXISTS (SELECT 1 FROM payment p WHERE p.invoice_id = i.id AND p.status = $3)
        ORDER BY i.created_at ASC, i.id ASC
        "#,
    )
    .bind(since)
    .bind(InvoiceType::Balance)
    .bind(PaymentStatus::Complete)
    .fetch_all(conn)
    .await?;
    Ok(invoices)
}

/// Keeps the invoice's denormalised status in step with its payment.
pub async fn update_invoice_status(
    id: i64,
    status: PaymentStatus,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE invoice SET status = $1 WHERE id = $2").bind(status).bind(id).execute(conn).await?;
    Ok(())
}
