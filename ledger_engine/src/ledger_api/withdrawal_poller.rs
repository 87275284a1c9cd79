//! Re-checks `delayed` withdrawals against the payout rail until they settle.
//!
//! Each tick polls the oldest delayed withdrawal that carries a usable transaction hash. A delayed withdrawal without
//! one is a data-integrity problem: it is reported as an alert and left where it is. Delayed withdrawals are never
//! timed out automatically. Once one has been unconfirmed for longer than the alert threshold, every tick that finds
//! it still pending raises an alert so that an operator can decide what to do.
use chrono::{DateTime, Duration, Utc};
use log::*;
use serde_json::json;

use crate::{
    db_types::{Withdrawal, WithdrawalStatus},
    events::{EventProducers, IntegrityAlertEvent, LedgerEntity, WithdrawalUpdatedEvent},
    helpers::{timestamp, valid_tx_hash},
    ledger_api::{contain_row, errors::ReconcileError, RowOutcome, TickSummary},
    traits::{LedgerDatabase, PayoutRail, TransitionResult, TxStatus, WithdrawalQueryFilter},
};

pub const DEFAULT_DELAYED_ALERT_HOURS: i64 = 24;

pub struct WithdrawalPoller<B, P> {
    db: B,
    rail: P,
    alert_after: Duration,
    producers: EventProducers,
}

impl<B, P> WithdrawalPoller<B, P>
where
    B: LedgerDatabase,
    P: PayoutRail,
{
    pub fn new(db: B, rail: P, producers: EventProducers) -> Self {
        Self { db, rail, alert_after: Duration::hours(DEFAULT_DELAYED_ALERT_HOURS), producers }
    }

    pub fn with_alert_after(mut self, alert_after: Duration) -> Self {
        self.alert_after = alert_after;
        self
    }

    pub async fn tick(&self) -> Result<TickSummary, ReconcileError> {
        self.tick_at(Utc::now()).await
    }

    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<TickSummary, ReconcileError> {
        let filter = WithdrawalQueryFilter::default().with_status(WithdrawalStatus::Delayed);
        let delayed = self.db.fetch_withdrawals(filter).await?;
        let mut summary = TickSummary { examined: delayed.len(), ..Default::default() };
        let mut candidate = None;
        for withdrawal in delayed {
            if valid_tx_hash(withdrawal.external_id.as_deref()).is_none() {
                let message = format!(
                    "Withdrawal #{} is delayed but has no usable transaction hash ({:?})",
                    withdrawal.id, withdrawal.external_id
                );
                let alert = IntegrityAlertEvent::new(LedgerEntity::Withdrawal, withdrawal.id, message);
                self.producers.raise_alert(alert).await;
                summary.record(RowOutcome::Alerted);
            } else if candidate.is_none() {
                candidate = Some(withdrawal);
            }
        }
        let Some(withdrawal) = candidate else {
            return Ok(summary);
        };
        match contain_row(self.poll(&withdrawal, now)).await {
            Ok(outcome) => summary.record(outcome),
            Err(e) if e.is_transient() => {
                warn!("💸️ Could not check delayed withdrawal #{}. Will retry. {e}", withdrawal.id);
                summary.record_failure();
            },
            Err(e) => {
                error!("💸️ Could not check delayed withdrawal #{}. {e}", withdrawal.id);
                summary.record_failure();
            },
        }
        Ok(summary)
    }

    async fn poll(&self, withdrawal: &Withdrawal, now: DateTime<Utc>) -> Result<RowOutcome, ReconcileError> {
        let id = withdrawal.id;
        let Some(tx_hash) = valid_tx_hash(withdrawal.external_id.as_deref()) else {
            return Ok(RowOutcome::Skipped);
        };
        let (to, patch) = match self.rail.transaction_status(tx_hash).await? {
            TxStatus::Complete => (WithdrawalStatus::Complete, json!({ "confirmed_at": timestamp(now) })),
            TxStatus::Failed => (WithdrawalStatus::Failed, json!({ "failed_at": timestamp(now) })),
            TxStatus::Pending => {
                let age = now - withdrawal.updated_at;
                if age > self.alert_after {
                    let message =
                        format!("Withdrawal #{id} has been unconfirmed for {} hours (tx {tx_hash})", age.num_hours());
                    self.producers.raise_alert(IntegrityAlertEvent::new(LedgerEntity::Withdrawal, id, message)).await;
                    return Ok(RowOutcome::Alerted);
                }
                trace!("💸️ Withdrawal #{id} is still unconfirmed");
                return Ok(RowOutcome::Unchanged);
            },
        };
        let from = WithdrawalStatus::Delayed;
        match self.db.transition_withdrawal(id, from, to, None, patch).await? {
            TransitionResult::Applied(updated) => {
                info!("💸️ Delayed withdrawal #{id} is now {to}");
                self.producers.publish_withdrawal_updated(WithdrawalUpdatedEvent::new(from, updated)).await;
                Ok(RowOutcome::Updated)
            },
            TransitionResult::Conflict(current) => {
                warn!("💸️ Delayed withdrawal #{id} was moved to {current} by another writer");
                Ok(RowOutcome::Unchanged)
            },
        }
    }
}
