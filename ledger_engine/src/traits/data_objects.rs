use chrono::{DateTime, Utc};
use ledger_common::Usd;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};

use crate::db_types::{Deposit, DepositStatus, DepositType, Payment, Withdrawal, WithdrawalStatus};

/// The outcome of [`crate::traits::LedgerDatabase::upsert_payment_for_invoice`].
#[derive(Debug, Clone)]
pub enum UpsertPaymentResult {
    /// No payment existed for the invoice, so one was created.
    Inserted(Payment),
    /// An existing pending payment was moved to `complete`.
    Completed(Payment),
    /// An existing pending payment had its metadata refreshed, and is still pending.
    Updated(Payment),
    /// The payment was already complete. Nothing was written.
    AlreadyComplete(Payment),
}

impl UpsertPaymentResult {
    pub fn payment(&self) -> &Payment {
        match self {
            Self::Inserted(p) | Self::Completed(p) | Self::Updated(p) | Self::AlreadyComplete(p) => p,
        }
    }

    pub fn into_payment(self) -> Payment {
        match self {
            Self::Inserted(p) | Self::Completed(p) | Self::Updated(p) | Self::AlreadyComplete(p) => p,
        }
    }

    /// True if this call is the one that made the payment complete.
    pub fn is_newly_completed(&self) -> bool {
        match self {
            Self::Inserted(p) => p.status == crate::db_types::PaymentStatus::Complete,
            Self::Completed(_) => true,
            Self::Updated(_) | Self::AlreadyComplete(_) => false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum TransitionResult {
    Applied(Withdrawal),
    /// The row was no longer in the expected status, so nothing was written. Carries the status that was found.
    Conflict(WithdrawalStatus),
}

impl TransitionResult {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

#[derive(Debug, Clone)]
pub enum CompleteDepositResult {
    Completed(Deposit),
    /// The transaction hash is already attached to another deposit. The deposit was left pending.
    DuplicateTxHash { other_deposit_id: i64 },
    /// The deposit had already left `pending`. Nothing was written.
    NotPending(Deposit),
}

//--------------------------------------   Balance entries    ---------------------------------------------------------

/// The source of a single signed contribution to a user's balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BalanceEntryKind {
    /// Gross amount of a completed payment where the user is the seller
    Sale,
    /// The platform fee recorded against one of the user's sales
    Fee,
    Reward,
    /// A completed deposit
    Deposit,
    /// A withdrawal that is complete, or still in flight
    Withdrawal,
    /// A completed balance-funded purchase where the user is the buyer
    Purchase,
}

impl BalanceEntryKind {
    pub fn is_credit(&self) -> bool {
        matches!(self, Self::Sale | Self::Reward | Self::Deposit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct BalanceEntry {
    pub kind: BalanceEntryKind,
    pub source_id: i64,
    #[sqlx(try_from = "String")]
    pub amount: Usd,
    pub currency: String,
}

impl BalanceEntry {
    pub fn new<S: Into<String>>(kind: BalanceEntryKind, source_id: i64, amount: Usd, currency: S) -> Self {
        Self { kind, source_id, amount, currency: currency.into() }
    }

    /// The entry's contribution to the balance, with the sign applied.
    pub fn signed_amount(&self) -> Usd {
        if self.kind.is_credit() {
            self.amount
        } else {
            -self.amount
        }
    }
}

//--------------------------------------    Query filters     ---------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct WithdrawalQueryFilter {
    pub user_id: Option<i64>,
    pub statuses: Vec<WithdrawalStatus>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl WithdrawalQueryFilter {
    pub fn with_user_id(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_status(mut self, status: WithdrawalStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.user_id.is_none() && self.statuses.is_empty() && self.since.is_none() && self.until.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DepositQueryFilter {
    pub user_id: Option<i64>,
    pub deposit_type: Option<DepositType>,
    pub statuses: Vec<DepositStatus>,
    pub since: Option<DateTime<Utc>>,
}

impl DepositQueryFilter {
    pub fn with_user_id(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_type(mut self, deposit_type: DepositType) -> Self {
        self.deposit_type = Some(deposit_type);
        self
    }

    pub fn with_status(mut self, status: DepositStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.user_id.is_none() && self.deposit_type.is_none() && self.statuses.is_empty() && self.since.is_none()
    }
}
