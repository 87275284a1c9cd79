//! `SqliteDatabase` is a concrete implementation of the ledger store.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the storage traits defined in the [`traits`]
//! module. Reads acquire a pooled connection for the duration of the call. Every write runs in its own transaction
//! and is committed before the method returns, so the row is visible to the next caller on any connection.
//!
//! [`traits`]: crate::traits
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use ledger_common::Usd;
use log::*;
use serde_json::{json, Value};
use sqlx::{migrate::Migrator, SqliteConnection, SqlitePool};

use super::db::{balances, db_url, deposits, feedback, invoices, new_pool, payments, rewards, withdrawals};
use crate::{
    db_types::{
        Deposit,
        DepositType,
        Invoice,
        InvoiceNote,
        InvoiceType,
        NewDeposit,
        NewInvoice,
        NewInvoiceNote,
        NewRating,
        NewReward,
        NewWithdrawal,
        Payment,
        PaymentStatus,
        Rating,
        Reward,
        Withdrawal,
        WithdrawalStatus,
    },
    helpers::timestamp,
    ledger_api::balance_objects::BalanceSheet,
    traits::{
        BalanceEntry,
        BalanceManagement,
        CompleteDepositResult,
        DepositQueryFilter,
        FeedbackManagement,
        LedgerDatabase,
        LedgerError,
        TransitionResult,
        UpsertPaymentResult,
        WithdrawalQueryFilter,
    },
};

static MIGRATOR: Migrator = sqlx::migrate!("./src/sqlite/migrations");

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

/// Fails with `InsufficientFunds` unless the user's balance in `currency` covers `required`.
async fn ensure_covered(
    user_id: i64,
    currency: &str,
    required: Usd,
    conn: &mut SqliteConnection,
) -> Result<(), LedgerError> {
    let entries = balances::balance_entries(user_id, conn).await?;
    let available = BalanceSheet::from_entries(&entries)?.get(currency);
    if available < required {
        debug!("🗃️ User {user_id} has {available} {currency}, but {required} is required");
        return Err(LedgerError::InsufficientFunds { available, required });
    }
    Ok(())
}

impl LedgerDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_invoice(&self, invoice: NewInvoice) -> Result<Invoice, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let invoice = invoices::insert_invoice(invoice, &mut tx).await?;
        tx.commit().await?;
        Ok(invoice)
    }

    async fn fetch_invoice(&self, id: i64) -> Result<Option<Invoice>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let invoice = invoices::fetch_invoice(id, &mut conn).await?;
        Ok(invoice)
    }

    async fn fetch_unreconciled_invoices(&self, since: DateTime<Utc>) -> Result<Vec<Invoice>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let invoices = invoices::fetch_unreconciled_invoices(since, &mut conn).await?;
        Ok(invoices)
    }

    async fn settle_balance_invoice(&self, invoice: NewInvoice) -> Result<(Invoice, Payment), LedgerError> {
        if invoice.invoice_type != InvoiceType::Balance {
            return Err(LedgerError::InvalidData(format!(
                "Only balance invoices can be settled from the ledger, not {}",
                invoice.invoice_type
            )));
        }
        let mut tx = self.pool.begin().await?;
        ensure_covered(invoice.buyer_id, &invoice.currency, invoice.amount, &mut tx).await?;
        let invoice = invoices::insert_invoice(invoice, &mut tx).await?;
        let metadata = json!({ "gateway": InvoiceType::Balance.as_str(), "completed_at": timestamp(Utc::now()) });
        let payment = payments::insert_payment(&invoice, PaymentStatus::Complete, metadata, Utc::now(), &mut tx).await?;
        invoices::update_invoice_status(invoice.id, PaymentStatus::Complete, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Invoice #{} settled from the balance of user {}", invoice.id, invoice.buyer_id);
        let invoice = Invoice { status: PaymentStatus::Complete, ..invoice };
        Ok((invoice, payment))
    }

    async fn fetch_payment_for_invoice(&self, invoice_id: i64) -> Result<Option<Payment>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let payment = payments::fetch_payment_for_invoice(invoice_id, &mut conn).await?;
        Ok(payment)
    }

    async fn upsert_payment_for_invoice(
        &self,
        invoice_id: i64,
        status: PaymentStatus,
        metadata: Value,
    ) -> Result<UpsertPaymentResult, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let result = payments::upsert_payment_for_invoice(invoice_id, status, metadata, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn insert_withdrawal(&self, withdrawal: NewWithdrawal) -> Result<Withdrawal, LedgerError> {
        let mut tx = self.pool.begin().await?;
        ensure_covered(withdrawal.user_id, &withdrawal.currency, withdrawal.amount, &mut tx).await?;
        let withdrawal = withdrawals::insert_withdrawal(withdrawal, &mut tx).await?;
        tx.commit().await?;
        Ok(withdrawal)
    }

    async fn fetch_withdrawal(&self, id: i64) -> Result<Option<Withdrawal>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let withdrawal = withdrawals::fetch_withdrawal(id, &mut conn).await?;
        Ok(withdrawal)
    }

    async fn fetch_oldest_withdrawal(&self, status: WithdrawalStatus) -> Result<Option<Withdrawal>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let withdrawal = withdrawals::fetch_oldest_withdrawal(status, &mut conn).await?;
        Ok(withdrawal)
    }

    async fn fetch_withdrawals(&self, filter: WithdrawalQueryFilter) -> Result<Vec<Withdrawal>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let withdrawals = withdrawals::search_withdrawals(filter, &mut conn).await?;
        Ok(withdrawals)
    }

    async fn transition_withdrawal(
        &self,
        id: i64,
        from: WithdrawalStatus,
        to: WithdrawalStatus,
        external_id: Option<&str>,
        metadata: Value,
    ) -> Result<TransitionResult, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let result = withdrawals::transition_withdrawal(id, from, to, external_id, metadata, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn insert_deposit(&self, deposit: NewDeposit) -> Result<Deposit, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let deposit = deposits::insert_deposit(deposit, &mut tx).await?;
        tx.commit().await?;
        Ok(deposit)
    }

    async fn fetch_deposit(&self, id: i64) -> Result<Option<Deposit>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let deposit = deposits::fetch_deposit(id, &mut conn).await?;
        Ok(deposit)
    }

    async fn fetch_pending_deposits(&self, deposit_type: DepositType) -> Result<Vec<Deposit>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let deposits = deposits::fetch_pending_deposits(deposit_type, &mut conn).await?;
        Ok(deposits)
    }

    async fn fetch_deposits(&self, filter: DepositQueryFilter) -> Result<Vec<Deposit>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let deposits = deposits::search_deposits(filter, &mut conn).await?;
        Ok(deposits)
    }

    async fn update_pending_deposit(
        &self,
        id: i64,
        external_id: Option<&str>,
        metadata: Value,
    ) -> Result<Option<Deposit>, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let deposit = deposits::update_pending_deposit(id, external_id, metadata, &mut tx).await?;
        tx.commit().await?;
        Ok(deposit)
    }

    async fn complete_deposit(
        &self,
        id: i64,
        amount: Usd,
        tx_hash: Option<&str>,
        metadata: Value,
    ) -> Result<CompleteDepositResult, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let result = deposits::complete_deposit(id, amount, tx_hash, metadata, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn fail_deposit(&self, id: i64, metadata: Value) -> Result<Option<Deposit>, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let deposit = deposits::fail_deposit(id, metadata, &mut tx).await?;
        tx.commit().await?;
        Ok(deposit)
    }

    async fn close(&mut self) -> Result<(), LedgerError> {
        self.pool.close().await;
        Ok(())
    }
}

impl BalanceManagement for SqliteDatabase {
    async fn fetch_balance_entries(&self, user_id: i64) -> Result<Vec<BalanceEntry>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let entries = balances::balance_entries(user_id, &mut conn).await?;
        trace!("🗃️ Fetched {} balance entries for user {user_id}", entries.len());
        Ok(entries)
    }

    async fn insert_reward(&self, reward: NewReward) -> Result<Reward, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let reward = rewards::insert_reward(reward, &mut tx).await?;
        tx.commit().await?;
        Ok(reward)
    }

    async fn fetch_rewards(&self, user_id: i64) -> Result<Vec<Reward>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let rewards = rewards::fetch_rewards(user_id, &mut conn).await?;
        Ok(rewards)
    }
}

impl FeedbackManagement for SqliteDatabase {
    async fn insert_rating(&self, rating: NewRating) -> Result<Rating, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let rating = feedback::insert_rating(rating, &mut tx).await?;
        tx.commit().await?;
        Ok(rating)
    }

    async fn fetch_ratings_for_invoice(&self, invoice_id: i64) -> Result<Vec<Rating>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let ratings = feedback::fetch_ratings_for_invoice(invoice_id, &mut conn).await?;
        Ok(ratings)
    }

    async fn insert_invoice_note(&self, note: NewInvoiceNote) -> Result<InvoiceNote, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let note = feedback::insert_invoice_note(note, &mut tx).await?;
        tx.commit().await?;
        Ok(note)
    }

    async fn fetch_invoice_notes(&self, invoice_id: i64) -> Result<Vec<InvoiceNote>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let notes = feedback::fetch_invoice_notes(invoice_id, &mut conn).await?;
        Ok(notes)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Brings the schema up to date with the migrations embedded in this crate.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        MIGRATOR.run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
