use crate::{
    db_types::{InvoiceNote, NewInvoiceNote, NewRating, Rating},
    traits::LedgerError,
};

/// Ratings and notes hang off invoices but never affect money.
#[allow(async_fn_in_trait)]
pub trait FeedbackManagement {
    /// Stores a rating. A user may rate an invoice only once; a second attempt yields `LedgerError::AlreadyExists`.
    async fn insert_rating(&self, rating: NewRating) -> Result<Rating, LedgerError>;

    async fn fetch_ratings_for_invoice(&self, invoice_id: i64) -> Result<Vec<Rating>, LedgerError>;

    async fn insert_invoice_note(&self, note: NewInvoiceNote) -> Result<InvoiceNote, LedgerError>;

    /// Notes for the invoice in the order they were written.
    async fn fetch_invoice_notes(&self, invoice_id: i64) -> Result<Vec<InvoiceNote>, LedgerError>;
}
