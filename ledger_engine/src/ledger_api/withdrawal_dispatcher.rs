//! Submits pending withdrawals to the payout rail, one per tick, oldest first.
//!
//! ```text
//!   rail response                           withdrawal becomes
//!   valid tx hash, status complete     ──►  complete
//!   valid tx hash, anything else       ──►  delayed   (the payout may still land on-chain)
//!   no valid tx hash                   ──►  error     (nothing to reconcile later)
//!   timeout / rail unavailable         ──►  pending   (untouched, retried next tick)
//! ```
//! The rail is given an idempotency key derived from the withdrawal id, so a crash between the send and the write
//! does not double-pay when the withdrawal is submitted again.
use chrono::{DateTime, Utc};
use ledger_common::USD_CURRENCY_CODE;
use log::*;
use serde_json::{json, Map, Value};

use crate::{
    db_types::{Withdrawal, WithdrawalStatus},
    events::{EventProducers, IntegrityAlertEvent, LedgerEntity, WithdrawalUpdatedEvent},
    helpers::{timestamp, valid_tx_hash},
    ledger_api::{contain_row, errors::ReconcileError, RowOutcome, TickSummary},
    traits::{LedgerDatabase, PayoutRail, PayoutReceipt, PayoutStatus, TransitionResult},
};

pub fn idempotency_key(withdrawal_id: i64) -> String {
    format!("withdrawal-{withdrawal_id}")
}

/// The status a pending withdrawal moves to given the rail's answer, along with the validated transaction hash.
pub fn classify_receipt(receipt: &PayoutReceipt) -> (WithdrawalStatus, Option<&str>) {
    match valid_tx_hash(receipt.tx_hash.as_deref()) {
        Some(hash) if receipt.status == PayoutStatus::Complete => (WithdrawalStatus::Complete, Some(hash)),
        Some(hash) => (WithdrawalStatus::Delayed, Some(hash)),
        None => (WithdrawalStatus::Error, None),
    }
}

/// Returns a description of the first problem that makes the withdrawal impossible to send.
pub fn dispatch_problem(withdrawal: &Withdrawal) -> Option<String> {
    if withdrawal.destination().is_none() {
        return Some("The withdrawal has no destination address".into());
    }
    if !withdrawal.currency.eq_ignore_ascii_case(USD_CURRENCY_CODE) {
        return Some(format!("Unsupported withdrawal currency: {}", withdrawal.currency));
    }
    let amount = withdrawal.amount_after_fee();
    if amount.is_negative() || amount.is_zero() {
        return Some(format!("The amount after fees must be positive, not {amount}"));
    }
    None
}

pub struct WithdrawalDispatcher<B, P> {
    db: B,
    rail: P,
    producers: EventProducers,
}

impl<B, P> WithdrawalDispatcher<B, P>
where
    B: LedgerDatabase,
    P: PayoutRail,
{
    pub fn new(db: B, rail: P, producers: EventProducers) -> Self {
        Self { db, rail, producers }
    }

    pub async fn tick(&self) -> Result<TickSummary, ReconcileError> {
        self.tick_at(Utc::now()).await
    }

    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<TickSummary, ReconcileError> {
        let mut summary = TickSummary::default();
        let Some(withdrawal) = self.db.fetch_oldest_withdrawal(WithdrawalStatus::Pending).await? else {
            return Ok(summary);
        };
        summary.examined = 1;
        match contain_row(self.dispatch(&withdrawal, now)).await {
            Ok(outcome) => summary.record(outcome),
            Err(e) if e.is_transient() => {
                warn!("💸️ Withdrawal #{} was not sent and stays pending. {e}", withdrawal.id);
                summary.record_failure();
            },
            Err(e) => {
                error!("💸️ Withdrawal #{} could not be dispatched. {e}", withdrawal.id);
                summary.record_failure();
            },
        }
        Ok(summary)
    }

    async fn dispatch(&self, withdrawal: &Withdrawal, now: DateTime<Utc>) -> Result<RowOutcome, ReconcileError> {
        let id = withdrawal.id;
        if let Some(problem) = dispatch_problem(withdrawal) {
            let patch = json!({ "error": problem, "errored_at": timestamp(now) });
            self.transition(withdrawal, WithdrawalStatus::Error, None, patch).await?;
            self.producers.raise_alert(IntegrityAlertEvent::new(LedgerEntity::Withdrawal, id, problem)).await;
            return Ok(RowOutcome::Alerted);
        }
        // dispatch_problem guarantees a destination
        let destination = withdrawal.destination().unwrap_or_default();
        let amount = withdrawal.amount_after_fee();
        let key = idempotency_key(id);
        debug!("💸️ Sending {amount} to {destination} for withdrawal #{id}");
        let receipt = match self.rail.send(destination, amount, &key).await {
            Ok(receipt) => receipt,
            Err(e) if e.is_transient() => return Err(e.into()),
            Err(e) => {
                warn!("💸️ {} refused withdrawal #{id}. {e}", self.rail.name());
                let patch = json!({ "error": e.to_string(), "errored_at": timestamp(now), "request_id": key });
                self.transition(withdrawal, WithdrawalStatus::Error, None, patch).await?;
                return Ok(RowOutcome::Updated);
            },
        };
        let (to, hash) = classify_receipt(&receipt);
        let patch = receipt_metadata(&receipt, to, &key, now);
        if to == WithdrawalStatus::Error {
            let message = format!("The payout rail returned no valid transaction hash for withdrawal #{id}");
            self.producers.raise_alert(IntegrityAlertEvent::new(LedgerEntity::Withdrawal, id, message)).await;
        }
        let applied = self.transition(withdrawal, to, hash, patch).await?;
        Ok(if applied { RowOutcome::Updated } else { RowOutcome::Unchanged })
    }

    async fn transition(
        &self,
        withdrawal: &Withdrawal,
        to: WithdrawalStatus,
        tx_hash: Option<&str>,
        patch: Value,
    ) -> Result<bool, ReconcileError> {
        let from = WithdrawalStatus::Pending;
        match self.db.transition_withdrawal(withdrawal.id, from, to, tx_hash, patch).await? {
            TransitionResult::Applied(updated) => {
                info!("💸️ Withdrawal #{} is now {to}", updated.id);
                self.producers.publish_withdrawal_updated(WithdrawalUpdatedEvent::new(from, updated)).await;
                Ok(true)
            },
            TransitionResult::Conflict(current) => {
                warn!("💸️ Withdrawal #{} was moved to {current} by another writer", withdrawal.id);
                Ok(false)
            },
        }
    }
}

/// Metadata recorded on the withdrawal for the rail's answer. Fields supplied at request time are preserved by the
/// merge in the ledger.
fn receipt_metadata(receipt: &PayoutReceipt, to: WithdrawalStatus, key: &str, now: DateTime<Utc>) -> Value {
    let mut patch = Map::new();
    patch.insert("request_id".into(), Value::from(key));
    match to {
        WithdrawalStatus::Complete => {
            patch.insert("completed_at".into(), timestamp(now));
        },
        WithdrawalStatus::Delayed => {
            let error = receipt.error.clone().unwrap_or_else(|| "The payout has not been confirmed yet".into());
            patch.insert("error".into(), Value::from(error));
            patch.insert("delayed_at".into(), timestamp(now));
        },
        _ => {
            let error = receipt.error.clone().unwrap_or_else(|| "No valid transaction hash was returned".into());
            patch.insert("error".into(), Value::from(error));
            patch.insert("errored_at".into(), timestamp(now));
            if let Some(raw) = &receipt.tx_hash {
                patch.insert("invalid_tx_hash".into(), Value::from(raw.as_str()));
            }
        },
    }
    if let Some(hash) = valid_tx_hash(receipt.tx_hash.as_deref()) {
        patch.insert("tx_hash".into(), Value::from(hash));
    }
    if !receipt.details.is_null() {
        patch.insert("payout_details".into(), receipt.details.clone());
    }
    Value::Object(patch)
}
