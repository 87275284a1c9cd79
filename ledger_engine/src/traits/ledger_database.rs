use chrono::{DateTime, Utc};
use ledger_common::Usd;
use serde_json::Value;
use thiserror::Error;

use crate::{
    db_types::{
        Deposit,
        DepositType,
        Invoice,
        NewDeposit,
        NewInvoice,
        NewWithdrawal,
        Payment,
        PaymentStatus,
        Withdrawal,
        WithdrawalStatus,
    },
    traits::{
        data_objects::{CompleteDepositResult, TransitionResult, UpsertPaymentResult},
        BalanceManagement,
        DepositQueryFilter,
        WithdrawalQueryFilter,
    },
};

/// The ledger store contract used by the reconciliation workers and the intake helpers.
///
/// Every method that touches more than one row does so inside a single database transaction. No implementation may
/// hold a transaction open across a call to an external rail; callers never need to.
#[allow(async_fn_in_trait)]
pub trait LedgerDatabase: Clone + BalanceManagement {
    /// The URL of the database
    fn url(&self) -> &str;

    //------------------------------------------ Invoices ------------------------------------------------------------
    async fn insert_invoice(&self, invoice: NewInvoice) -> Result<Invoice, LedgerError>;

    async fn fetch_invoice(&self, id: i64) -> Result<Option<Invoice>, LedgerError>;

    /// Gateway-backed invoices created at or after `since` that do not yet have a completed payment, oldest first.
    /// Balance-funded invoices are never returned.
    async fn fetch_unreconciled_invoices(&self, since: DateTime<Utc>) -> Result<Vec<Invoice>, LedgerError>;

    /// Stores a balance-funded invoice together with its completed payment.
    ///
    /// The buyer's balance is re-checked inside the same transaction, and `LedgerError::InsufficientFunds` is returned
    /// (and nothing is written) if it no longer covers the invoice amount.
    async fn settle_balance_invoice(&self, invoice: NewInvoice) -> Result<(Invoice, Payment), LedgerError>;

    //------------------------------------------ Payments ------------------------------------------------------------
    async fn fetch_payment_for_invoice(&self, invoice_id: i64) -> Result<Option<Payment>, LedgerError>;

    /// Creates or updates the single payment row for an invoice, in one transaction:
    /// * If no payment exists, one is inserted with the invoice's amount, fee, currency and type.
    /// * If a pending payment exists, its metadata is merged with `metadata` (existing keys are kept unless `metadata`
    ///   overrides them) and its status is set to `status`.
    /// * If the payment is already complete, nothing is written. Repeated calls are therefore harmless.
    ///
    /// The invoice's denormalised status follows the payment.
    async fn upsert_payment_for_invoice(
        &self,
        invoice_id: i64,
        status: PaymentStatus,
        metadata: Value,
    ) -> Result<UpsertPaymentResult, LedgerError>;

    //------------------------------------------ Withdrawals ---------------------------------------------------------
    /// Stores a new pending withdrawal. The user's balance must cover `amount` (fee included); this is checked inside
    /// the insert transaction so that two concurrent requests cannot both spend the same funds.
    async fn insert_withdrawal(&self, withdrawal: NewWithdrawal) -> Result<Withdrawal, LedgerError>;

    async fn fetch_withdrawal(&self, id: i64) -> Result<Option<Withdrawal>, LedgerError>;

    /// The oldest withdrawal (by creation time, then id) in the given status.
    async fn fetch_oldest_withdrawal(&self, status: WithdrawalStatus) -> Result<Option<Withdrawal>, LedgerError>;

    /// Withdrawals matching the filter, oldest first.
    async fn fetch_withdrawals(&self, filter: WithdrawalQueryFilter) -> Result<Vec<Withdrawal>, LedgerError>;

    /// Moves a withdrawal from `from` to `to` if, and only if, it is still in `from`.
    ///
    /// `metadata` is shallow-merged into the stored metadata. `external_id`, when given, replaces the stored one.
    /// Illegal transitions are rejected with `LedgerError::IllegalTransition` before anything is written. If another
    /// writer moved the row first, `TransitionResult::Conflict` is returned.
    async fn transition_withdrawal(
        &self,
        id: i64,
        from: WithdrawalStatus,
        to: WithdrawalStatus,
        external_id: Option<&str>,
        metadata: Value,
    ) -> Result<TransitionResult, LedgerError>;

    //------------------------------------------ Deposits ------------------------------------------------------------
    async fn insert_deposit(&self, deposit: NewDeposit) -> Result<Deposit, LedgerError>;

    async fn fetch_deposit(&self, id: i64) -> Result<Option<Deposit>, LedgerError>;

    /// Pending deposits of the given type, oldest first.
    async fn fetch_pending_deposits(&self, deposit_type: DepositType) -> Result<Vec<Deposit>, LedgerError>;

    async fn fetch_deposits(&self, filter: DepositQueryFilter) -> Result<Vec<Deposit>, LedgerError>;

    /// Merges `metadata` into a pending deposit and optionally sets its external id.
    /// Returns `None` if the deposit is no longer pending.
    async fn update_pending_deposit(
        &self,
        id: i64,
        external_id: Option<&str>,
        metadata: Value,
    ) -> Result<Option<Deposit>, LedgerError>;

    /// Marks a pending deposit complete with the confirmed amount.
    ///
    /// When `tx_hash` is given, the check that no other deposit already carries it happens inside the same
    /// transaction as the update.
    async fn complete_deposit(
        &self,
        id: i64,
        amount: Usd,
        tx_hash: Option<&str>,
        metadata: Value,
    ) -> Result<CompleteDepositResult, LedgerError>;

    /// Marks a pending deposit failed. Returns `None` if the deposit is no longer pending.
    async fn fail_deposit(&self, id: i64, metadata: Value) -> Result<Option<Deposit>, LedgerError>;

    /// Closes the database connection pool.
    async fn close(&mut self) -> Result<(), LedgerError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("We have an internal database engine (configuration/uptime etc.) : {0}")]
    DatabaseError(String),
    #[error("The requested invoice {0} does not exist")]
    InvoiceNotFound(i64),
    #[error("The requested withdrawal {0} does not exist")]
    WithdrawalNotFound(i64),
    #[error("The requested deposit {0} does not exist")]
    DepositNotFound(i64),
    #[error("Illegal withdrawal status change: {from} to {to}")]
    IllegalTransition { from: WithdrawalStatus, to: WithdrawalStatus },
    #[error("Cannot insert record, since it already exists. {0}")]
    AlreadyExists(String),
    #[error("Insufficient funds. {available} is available, but {required} is required")]
    InsufficientFunds { available: Usd, required: Usd },
    #[error("The ledger contains a value that cannot be interpreted. {0}")]
    InvalidData(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Database(ref err) if err.is_unique_violation() => LedgerError::AlreadyExists(e.to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => LedgerError::InvalidData(e.to_string()),
            _ => LedgerError::DatabaseError(e.to_string()),
        }
    }
}
