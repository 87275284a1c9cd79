//! Confirms, expires or fails pending deposits.
//!
//! ## USDT
//! A USDT deposit watches a dedicated receiving address for a bounded window (one hour by default). On each tick the
//! sidecar is asked for transfers to the address. The transfer in the highest block wins; its confirmed amount is
//! credited, whatever amount was hinted when the deposit was opened. A transaction hash is credited to at most one
//! deposit: if it is already attached elsewhere, it is recorded under `skipped_tx_hash` and the deposit stays
//! pending. Once the window has elapsed with nothing credited, the deposit fails with reason `expired`, even when a
//! transfer was seen but never confirmed. Such a transfer is kept as `pending_tx_hash`.
//!
//! ## Stripe
//! A Stripe deposit follows its checkout session. `paid` completes it, `expired` or `failed` fails it. Stripe expires
//! sessions itself, so no window is enforced here.
use chrono::{DateTime, Duration, Utc};
use ledger_common::Usd;
use log::*;
use serde_json::{json, Value};

use crate::{
    db_types::{Deposit, DepositType},
    events::{DepositUpdatedEvent, EventProducers, IntegrityAlertEvent, LedgerEntity},
    helpers::{timestamp, valid_tx_hash},
    ledger_api::{contain_row, errors::ReconcileError, RowOutcome, TickSummary},
    traits::{CheckoutGateway, CompleteDepositResult, DepositWatcher, IncomingTransfer, LedgerDatabase},
};

pub const DEFAULT_USDT_DEPOSIT_WINDOW_MINS: i64 = 60;
pub const EXPIRED_REASON: &str = "expired";

/// The transfer to credit: the one in the highest block among those with a well-formed hash.
pub fn select_transfer(transfers: &[IncomingTransfer]) -> Option<&IncomingTransfer> {
    transfers.iter().filter(|t| valid_tx_hash(Some(t.tx_hash.as_str())).is_some()).max_by_key(|t| t.block_number)
}

pub struct DepositMonitor<B, W, G> {
    db: B,
    watcher: W,
    stripe: G,
    usdt_window: Duration,
    producers: EventProducers,
}

impl<B, W, G> DepositMonitor<B, W, G>
where
    B: LedgerDatabase,
    W: DepositWatcher,
    G: CheckoutGateway,
{
    pub fn new(db: B, watcher: W, stripe: G, producers: EventProducers) -> Self {
        let usdt_window = Duration::minutes(DEFAULT_USDT_DEPOSIT_WINDOW_MINS);
        Self { db, watcher, stripe, usdt_window, producers }
    }

    pub fn with_usdt_window(mut self, window: Duration) -> Self {
        self.usdt_window = window;
        self
    }

    pub async fn tick(&self) -> Result<TickSummary, ReconcileError> {
        self.tick_at(Utc::now()).await
    }

    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<TickSummary, ReconcileError> {
        let mut summary = TickSummary::default();
        let usdt = self.db.fetch_pending_deposits(DepositType::Usdt).await?;
        let stripe = self.db.fetch_pending_deposits(DepositType::Stripe).await?;
        summary.examined = usdt.len() + stripe.len();
        for deposit in usdt {
            let result = contain_row(self.check_usdt(&deposit, now)).await;
            self.record(&mut summary, &deposit, result);
        }
        for deposit in stripe {
            let result = contain_row(self.check_stripe(&deposit, now)).await;
            self.record(&mut summary, &deposit, result);
        }
        Ok(summary)
    }

    fn record(&self, summary: &mut TickSummary, deposit: &Deposit, result: Result<RowOutcome, ReconcileError>) {
        match result {
            Ok(outcome) => summary.record(outcome),
            Err(e) if e.is_transient() => {
                warn!("🏦️ Could not check {} deposit #{}. Will retry. {e}", deposit.deposit_type, deposit.id);
                summary.record_failure();
            },
            Err(e) => {
                error!("🏦️ Could not check {} deposit #{}. {e}", deposit.deposit_type, deposit.id);
                summary.record_failure();
            },
        }
    }

    async fn check_usdt(&self, deposit: &Deposit, now: DateTime<Utc>) -> Result<RowOutcome, ReconcileError> {
        let id = deposit.id;
        let expired = now >= deposit.created_at + self.usdt_window;
        let Some(address) = deposit.receiving_address() else {
            let message = format!("USDT deposit #{id} has no receiving address");
            self.producers.raise_alert(IntegrityAlertEvent::new(LedgerEntity::Deposit, id, message)).await;
            return Ok(RowOutcome::Alerted);
        };
        let transfers = self.watcher.incoming_transfers(address).await?;
        let Some(transfer) = select_transfer(&transfers) else {
            if expired {
                return self.expire(deposit, now, json!({})).await;
            }
            trace!("🏦️ Nothing has arrived at {address} for deposit #{id} yet");
            self.db.update_pending_deposit(id, None, json!({ "checked_at": timestamp(now) })).await?;
            return Ok(RowOutcome::Unchanged);
        };
        let tx_hash = transfer.tx_hash.to_ascii_lowercase();
        let amount = match self.watcher.confirmed_amount(&tx_hash).await? {
            Some(amount) if amount > Usd::ZERO => amount,
            _ if expired => {
                info!("🏦️ Transfer {tx_hash} for deposit #{id} never confirmed within the deposit window");
                return self.expire(deposit, now, json!({ "pending_tx_hash": tx_hash })).await;
            },
            _ => {
                debug!("🏦️ Transfer {tx_hash} for deposit #{id} has no confirmed amount yet");
                let patch = json!({ "checked_at": timestamp(now), "pending_tx_hash": tx_hash });
                self.db.update_pending_deposit(id, None, patch).await?;
                return Ok(RowOutcome::Unchanged);
            },
        };
        let patch = json!({
            "confirmed_at": timestamp(now),
            "checked_at": timestamp(now),
            "block_number": transfer.block_number,
        });
        match self.db.complete_deposit(id, amount, Some(&tx_hash), patch).await? {
            CompleteDepositResult::Completed(updated) => {
                info!("🏦️ USDT deposit #{id} complete. {amount} credited to user {}", updated.user_id);
                self.producers.publish_deposit_updated(DepositUpdatedEvent::new(updated)).await;
                Ok(RowOutcome::Updated)
            },
            CompleteDepositResult::DuplicateTxHash { other_deposit_id } => {
                warn!("🏦️ Transfer {tx_hash} is already credited to deposit #{other_deposit_id}. Not crediting #{id}.");
                let patch = json!({
                    "skipped_tx_hash": tx_hash,
                    "skipped_reason": format!("already credited to deposit #{other_deposit_id}"),
                    "checked_at": timestamp(now),
                });
                self.db.update_pending_deposit(id, None, patch).await?;
                if expired {
                    return self.expire(deposit, now, json!({})).await;
                }
                Ok(RowOutcome::Skipped)
            },
            CompleteDepositResult::NotPending(current) => {
                debug!("🏦️ Deposit #{id} is already {}", current.status);
                Ok(RowOutcome::Unchanged)
            },
        }
    }

    /// Fails the deposit with reason `expired`. Fields in `extra` are recorded alongside.
    async fn expire(&self, deposit: &Deposit, now: DateTime<Utc>, extra: Value) -> Result<RowOutcome, ReconcileError> {
        let mut patch = json!({
            "failure_reason": EXPIRED_REASON,
            "expired_at": timestamp(now),
            "checked_at": timestamp(now),
        });
        if let (Some(patch), Value::Object(extra)) = (patch.as_object_mut(), extra) {
            patch.extend(extra);
        }
        self.fail(deposit, patch).await
    }

    async fn fail(&self, deposit: &Deposit, patch: Value) -> Result<RowOutcome, ReconcileError> {
        match self.db.fail_deposit(deposit.id, patch).await? {
            Some(updated) => {
                info!("🏦️ {} deposit #{} failed", updated.deposit_type, updated.id);
                self.producers.publish_deposit_updated(DepositUpdatedEvent::new(updated)).await;
                Ok(RowOutcome::Updated)
            },
            None => Ok(RowOutcome::Unchanged),
        }
    }

    async fn check_stripe(&self, deposit: &Deposit, now: DateTime<Utc>) -> Result<RowOutcome, ReconcileError> {
        let id = deposit.id;
        let Some(session_id) = deposit.external_id.as_deref() else {
            let message = format!("Stripe deposit #{id} has no checkout session");
            self.producers.raise_alert(IntegrityAlertEvent::new(LedgerEntity::Deposit, id, message)).await;
            return Ok(RowOutcome::Alerted);
        };
        let state = self.stripe.check_status(session_id).await?;
        if state.status.is_dead() {
            let patch = json!({
                "failure_reason": state.status.to_string(),
                "gateway_status": state.raw_status,
                "failed_at": timestamp(now),
            });
            return self.fail(deposit, patch).await;
        }
        if !state.status.is_paid() {
            trace!("🏦️ Stripe deposit #{id} is {}", state.raw_status);
            return Ok(RowOutcome::Unchanged);
        }
        let mut patch = json!({ "gateway_status": state.raw_status, "confirmed_at": timestamp(now) });
        if let Some(amount) = state.amount.filter(|a| *a != deposit.amount) {
            warn!("🏦️ Stripe charged {amount} for deposit #{id}, but {} was requested", deposit.amount);
            patch["gateway_amount"] = Value::from(amount.to_string());
        }
        match self.db.complete_deposit(id, deposit.amount, None, patch).await? {
            CompleteDepositResult::Completed(updated) => {
                info!("🏦️ Stripe deposit #{id} complete. {} credited to user {}", updated.amount, updated.user_id);
                self.producers.publish_deposit_updated(DepositUpdatedEvent::new(updated)).await;
                Ok(RowOutcome::Updated)
            },
            _ => Ok(RowOutcome::Unchanged),
        }
    }
}
