//! Ratings, invoice notes and rewards. None of these move money except rewards, which credit the recipient's balance.
use std::fmt::Debug;

use ledger_common::Usd;
use log::*;

use crate::{
    db_types::{Invoice, InvoiceNote, NewInvoiceNote, NewRating, NewReward, NoteAuthor, PaymentStatus, Rating, Reward},
    ledger_api::errors::FeedbackError,
    traits::{FeedbackManagement, LedgerDatabase},
};

pub const MAX_RATING: i64 = 5;

pub struct FeedbackApi<B> {
    db: B,
}

impl<B: Debug> Debug for FeedbackApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FeedbackApi ({:?})", self.db)
    }
}

impl<B> FeedbackApi<B>
where B: LedgerDatabase + FeedbackManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// Only the buyer may rate an invoice, and only once its payment has completed.
    pub async fn rate_invoice(
        &self,
        invoice_id: i64,
        user_id: i64,
        rating: i64,
        review: Option<String>,
    ) -> Result<Rating, FeedbackError> {
        if !(0..=MAX_RATING).contains(&rating) {
            return Err(FeedbackError::InvalidRequest(format!("Ratings run from 0 to {MAX_RATING}, not {rating}")));
        }
        let invoice = self.invoice(invoice_id).await?;
        if invoice.buyer_id != user_id {
            return Err(FeedbackError::NotAllowed(format!("User {user_id} did not buy invoice {invoice_id}")));
        }
        let paid = self
            .db
            .fetch_payment_for_invoice(invoice_id)
            .await?
            .map(|p| p.status == PaymentStatus::Complete)
            .unwrap_or(false);
        if !paid {
            return Err(FeedbackError::NotAllowed(format!("Invoice {invoice_id} has not been paid")));
        }
        let review = review.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
        let rating = self.db.insert_rating(NewRating { invoice_id, user_id, rating, review }).await?;
        debug!("🧾️ User {user_id} rated invoice {invoice_id} {}/{MAX_RATING}", rating.rating);
        Ok(rating)
    }

    pub async fn ratings(&self, invoice_id: i64) -> Result<Vec<Rating>, FeedbackError> {
        Ok(self.db.fetch_ratings_for_invoice(invoice_id).await?)
    }

    /// Adds a note to the invoice's thread. The author is whichever side of the sale `user_id` is on; anyone else is
    /// refused.
    pub async fn add_note(&self, invoice_id: i64, user_id: i64, content: &str) -> Result<InvoiceNote, FeedbackError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(FeedbackError::InvalidRequest("Notes cannot be empty".into()));
        }
        let invoice = self.invoice(invoice_id).await?;
        let author = if invoice.buyer_id == user_id {
            NoteAuthor::Buyer
        } else if invoice.seller_id == user_id {
            NoteAuthor::Seller
        } else {
            return Err(FeedbackError::NotAllowed(format!("User {user_id} is not a party to invoice {invoice_id}")));
        };
        let note = NewInvoiceNote { invoice_id, user_id, author, content: content.to_string() };
        Ok(self.db.insert_invoice_note(note).await?)
    }

    pub async fn notes(&self, invoice_id: i64) -> Result<Vec<InvoiceNote>, FeedbackError> {
        Ok(self.db.fetch_invoice_notes(invoice_id).await?)
    }

    /// Credits `amount` to the user's balance.
    pub async fn grant_reward(&self, user_id: i64, amount: Usd, reason: &str) -> Result<Reward, FeedbackError> {
        let amount = amount.round_cents();
        if amount <= Usd::ZERO {
            return Err(FeedbackError::InvalidRequest(format!("Rewards must be positive, not {amount}")));
        }
        let reward = self.db.insert_reward(NewReward::new(user_id, amount).with_reason(reason)).await?;
        info!("🧮️ Reward #{} of {amount} granted to user {user_id}", reward.id);
        Ok(reward)
    }

    async fn invoice(&self, invoice_id: i64) -> Result<Invoice, FeedbackError> {
        self.db.fetch_invoice(invoice_id).await?.ok_or(FeedbackError::InvoiceNotFound(invoice_id))
    }
}
