//! Marketplace Ledger Engine
//!
//! The ledger engine keeps the books for the marketplace. It records what buyers owe (invoices), what they actually
//! paid (payments), money that comes in from outside (deposits) and money that goes out (withdrawals), and derives every
//! user's balance from those rows on demand.
//!
//! The library is divided into three main sections:
//! 1. The ledger store ([`mod@sqlite`] and [`mod@traits`]). SQLite is the supported backend. The traits in
//!    [`mod@traits`] describe what a backend must provide, and also define the seams to the external payment rails
//!    (checkout gateways, the payout rail and the deposit watcher). Ledger row types live in [`mod@db_types`].
//! 2. The public API ([`mod@ledger_api`]). Balance queries, checkout creation and feedback, plus the four
//!    reconciliation workers that keep the ledger in step with the rails.
//! 3. Events ([`mod@events`]). Workers publish an event whenever money changes state, and raise an integrity alert
//!    whenever they find a row that needs a human. Hook into these with [`events::EventHooks`].
//!
//! Rail clients are not part of this crate. Anything that implements the rail traits can be plugged in.
pub mod db_types;
pub mod events;
pub mod fees;
pub mod helpers;
pub mod ledger_api;
pub mod price_cache;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use ledger_api::{
    balance_api::BalanceApi,
    balance_objects::{BalanceSheet, UserBalance},
    checkout_api::{CheckoutApi, InvoiceOrder, OpenedDeposit, OpenedInvoice},
    deposit_monitor::DepositMonitor,
    errors::{BalanceError, CheckoutError, FeedbackError, ReconcileError},
    feedback_api::FeedbackApi,
    invoice_reconciler::InvoiceReconciler,
    withdrawal_dispatcher::WithdrawalDispatcher,
    withdrawal_poller::WithdrawalPoller,
    RowOutcome,
    TickSummary,
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{
    BalanceManagement,
    CheckoutGateway,
    DepositWatcher,
    FeedbackManagement,
    LedgerDatabase,
    LedgerError,
    PayoutRail,
    RailError,
};
