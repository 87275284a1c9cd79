use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{Deposit, Invoice, Payment, Withdrawal, WithdrawalStatus};

/// Emitted once, when a payment first reaches `complete`.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentCompletedEvent {
    pub invoice: Invoice,
    pub payment: Payment,
}

impl PaymentCompletedEvent {
    pub fn new(invoice: Invoice, payment: Payment) -> Self {
        Self { invoice, payment }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WithdrawalUpdatedEvent {
    pub old_status: WithdrawalStatus,
    pub withdrawal: Withdrawal,
}

impl WithdrawalUpdatedEvent {
    pub fn new(old_status: WithdrawalStatus, withdrawal: Withdrawal) -> Self {
        Self { old_status, withdrawal }
    }
}

/// Emitted when a deposit reaches a terminal status.
#[derive(Debug, Clone, Serialize)]
pub struct DepositUpdatedEvent {
    pub deposit: Deposit,
}

impl DepositUpdatedEvent {
    pub fn new(deposit: Deposit) -> Self {
        Self { deposit }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerEntity {
    Invoice,
    Withdrawal,
    Deposit,
}

/// A data-integrity problem that needs a human. The affected row is left exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityAlertEvent {
    pub entity: LedgerEntity,
    pub id: i64,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

impl IntegrityAlertEvent {
    pub fn new<S: Into<String>>(entity: LedgerEntity, id: i64, message: S) -> Self {
        Self { entity, id, message: message.into(), raised_at: Utc::now() }
    }
}
