use ledger_common::Usd;
use thiserror::Error;

use crate::traits::{LedgerError, RailError};

#[derive(Debug, Clone, Error)]
pub enum BalanceError {
    #[error("Invalid argument. {0}")]
    InvalidArgument(String),
    #[error("Insufficient funds. {available} is available, but {required} is required")]
    InsufficientFunds { available: Usd, required: Usd },
    #[error("Could not calculate the balance. {0}")]
    LedgerError(#[from] LedgerError),
}

/// A failure that stops a worker from processing a row, or a whole tick.
#[derive(Debug, Clone, Error)]
pub enum ReconcileError {
    #[error("{0}")]
    Ledger(#[from] LedgerError),
    #[error("{0}")]
    Rail(#[from] RailError),
    #[error("Handling the row panicked. {0}")]
    RowPanicked(String),
}

impl ReconcileError {
    /// Transient failures leave the row as it was, to be retried on the next tick.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Rail(e) => e.is_transient(),
            Self::Ledger(LedgerError::DatabaseError(_)) => true,
            Self::Ledger(_) => false,
            Self::RowPanicked(_) => false,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum CheckoutError {
    #[error("Invalid request. {0}")]
    InvalidRequest(String),
    #[error("{0}")]
    Balance(#[from] BalanceError),
    #[error("{0}")]
    Ledger(LedgerError),
    #[error("The payment rail failed. {0}")]
    Rail(#[from] RailError),
}

impl From<LedgerError> for CheckoutError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientFunds { available, required } => {
                CheckoutError::Balance(BalanceError::InsufficientFunds { available, required })
            },
            e => CheckoutError::Ledger(e),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum FeedbackError {
    #[error("Invalid request. {0}")]
    InvalidRequest(String),
    #[error("The requested invoice {0} does not exist")]
    InvoiceNotFound(i64),
    #[error("Not allowed. {0}")]
    NotAllowed(String),
    #[error("{0}")]
    Ledger(#[from] LedgerError),
}
