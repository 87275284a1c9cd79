use chrono::Utc;
use sqlx::SqliteConnection;

use crate::db_types::{InvoiceNote, NewInvoiceNote, NewRating, Rating};

pub async fn insert_rating(rating: NewRating, conn: &mut SqliteConnection) -> Result<Rating, sqlx::Error> {
    let rating = sqlx::query_as(
        r#"
            INSERT INTO rating (invoice_id, user_id, rating, review, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(rating.invoice_id)
    .bind(rating.user_id)
    .bind(rating.rating)
    .bind(rating.review)
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    Ok(rating)
}

pub async fn fetch_ratings_for_invoice(
    invoice_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Rating>, sqlx::Error> {
    let ratings = sqlx::query_as("SELECT * FROM rating WHERE invoice_id = $1 ORDER BY id ASC")
        .bind(invoice_id)
        .fetch_all(conn)
        .await?;
    Ok(ratings)
}

pub async fn insert_invoice_note(
    note: NewInvoiceNote,
    conn: &mut SqliteConnection,
) -> Result<InvoiceNote, sqlx::Error> {
    let note = sqlx::query_as(
        r#"
            INSERT INTO invoice_note (invoice_id, user_id, author, content, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(note.invoice_id)
    .bind(note.user_id)
    .bind(note.author)
    .bind(note.content)
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    Ok(note)
}

pub async fn fetch_invoice_notes(
    invoice_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<InvoiceNote>, sqlx::Error> {
    let notes = sqlx::query_as("SELECT * FROM invoice_note WHERE invoice_id = $1 ORDER BY created_at ASC, id ASC")
        .bind(invoice_id)
        .fetch_all(conn)
        .await?;
    Ok(notes)
}
