//! # Ledger engine public API
//!
//! The `ledger_api` module exposes the programmatic API of the reconciliation engine. Every API object is created by
//! supplying a ledger backend (and, where needed, the rails it talks to) and is cheap to clone into a background task.
//!
//! * [`balance_api`] answers balance queries and sufficiency checks. It never writes.
//! * [`invoice_reconciler`] matches gateway-backed invoices to completed payments.
//! * [`withdrawal_dispatcher`] submits the oldest pending withdrawal to the payout rail, one per tick.
//! * [`withdrawal_poller`] re-checks `delayed` withdrawals until they settle.
//! * [`deposit_monitor`] confirms or expires pending USDT and Stripe deposits.
//! * [`checkout_api`] creates invoices, withdrawals and deposits on behalf of the request layer.
//! * [`feedback_api`] handles ratings, invoice notes and rewards.
//!
//! The four background workers share the same shape: a `tick` method that performs one pass, never holds a database
//! transaction across a rail call, catches per-row failures and reports what it did in a [`TickSummary`].
//!
//! ```rust,ignore
//! use ledger_engine::{BalanceApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! let api = BalanceApi::new(db);
//! let balance = api.get_balance(user_id).await?;
//! println!("{}", balance.usd);
//! ```
pub mod balance_api;
pub mod balance_objects;
pub mod checkout_api;
pub mod deposit_monitor;
pub mod errors;
pub mod feedback_api;
pub mod invoice_reconciler;
pub mod withdrawal_dispatcher;
pub mod withdrawal_poller;

mod tick_summary;

pub use tick_summary::{contain_row, RowOutcome, TickSummary};
