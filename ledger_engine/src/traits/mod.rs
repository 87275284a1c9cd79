//! # Ledger store and payment rail contracts.
//!
//! This module defines the interface contracts between the reconciliation engine and the outside world.
//!
//! ## Ledger store
//! The ledger is the single source of truth for money in the marketplace. Backends implement
//! * [`LedgerDatabase`]: invoices, payments, withdrawals and deposits, including the composite operations that must be
//!   atomic (upserting the payment for an invoice, conditional withdrawal transitions, completing a deposit).
//! * [`BalanceManagement`]: the raw signed contributions that make up a user's balance, plus rewards.
//! * [`FeedbackManagement`]: ratings and notes attached to invoices.
//!
//! ## Rails
//! External payment processors are reached through three narrow traits. Adapters translate each rail's native
//! responses into these shapes.
//! * [`CheckoutGateway`]: card or Lightning checkouts for invoices and top-ups.
//! * [`PayoutRail`]: sends money out and reports on-chain transaction status.
//! * [`DepositWatcher`]: dedicated receiving addresses and incoming transfers.
mod balance_management;
mod data_objects;
mod feedback_management;
mod ledger_database;
mod rails;

pub use balance_management::BalanceManagement;
pub use data_objects::{
    BalanceEntry,
    BalanceEntryKind,
    CompleteDepositResult,
    DepositQueryFilter,
    TransitionResult,
    UpsertPaymentResult,
    WithdrawalQueryFilter,
};
pub use feedback_management::FeedbackManagement;
pub use ledger_database::{LedgerDatabase, LedgerError};
pub use rails::{
    CheckoutGateway,
    CheckoutRequest,
    CheckoutSession,
    CheckoutState,
    DepositWatcher,
    GatewayStatus,
    IncomingTransfer,
    PayoutRail,
    PayoutReceipt,
    PayoutStatus,
    RailError,
    ReceivingAddress,
    TxStatus,
};
