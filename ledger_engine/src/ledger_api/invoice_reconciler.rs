//! Closes the gap between "invoice created" and "payment recorded" for gateway-backed invoices.
//!
//! Each tick selects the invoices in the lookback window that do not yet have a completed payment and asks the
//! matching gateway for the checkout status. Paid invoices get their payment upserted; everything else is simply
//! still pending and is looked at again on the next tick. This worker never marks an invoice as failed.
use chrono::{DateTime, Duration, Utc};
use log::*;
use serde_json::Value;

use crate::{
    db_types::{Invoice, InvoiceType, PaymentStatus},
    events::{EventProducers, PaymentCompletedEvent},
    helpers::{pick_keys, timestamp},
    ledger_api::{contain_row, errors::ReconcileError, RowOutcome, TickSummary},
    traits::{CheckoutGateway, CheckoutState, LedgerDatabase},
};

pub const DEFAULT_INVOICE_LOOKBACK_HOURS: i64 = 24;

/// Delivery fields copied from the invoice onto the payment, so that fulfilment only needs the payment row.
const DELIVERY_KEYS: [&str; 4] = ["address", "tel", "description", "selections"];

pub struct InvoiceReconciler<B, S, L> {
    db: B,
    stripe: S,
    lightning: Option<L>,
    lookback: Duration,
    producers: EventProducers,
}

impl<B, S, L> InvoiceReconciler<B, S, L>
where
    B: LedgerDatabase,
    S: CheckoutGateway,
    L: CheckoutGateway,
{
    /// Lightning invoices are skipped when no Lightning gateway is given.
    pub fn new(db: B, stripe: S, lightning: Option<L>, producers: EventProducers) -> Self {
        let lookback = Duration::hours(DEFAULT_INVOICE_LOOKBACK_HOURS);
        Self { db, stripe, lightning, lookback, producers }
    }

    pub fn with_lookback(mut self, lookback: Duration) -> Self {
        self.lookback = lookback;
        self
    }

    pub async fn tick(&self) -> Result<TickSummary, ReconcileError> {
        self.tick_at(Utc::now()).await
    }

    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<TickSummary, ReconcileError> {
        let invoices = self.db.fetch_unreconciled_invoices(now - self.lookback).await?;
        let mut summary = TickSummary { examined: invoices.len(), ..Default::default() };
        for invoice in invoices {
            match contain_row(self.reconcile(&invoice, now)).await {
                Ok(outcome) => summary.record(outcome),
                Err(e) if e.is_transient() => {
                    warn!("🧾️ Could not check invoice #{}. Will retry on the next tick. {e}", invoice.id);
                    summary.record_failure();
                },
                Err(e) => {
                    error!("🧾️ Could not reconcile invoice #{}. {e}", invoice.id);
                    summary.record_failure();
                },
            }
        }
        Ok(summary)
    }

    /// Returns `None` when no gateway handles this invoice type.
    async fn check_status(
        &self,
        invoice: &Invoice,
        external_id: &str,
    ) -> Option<Result<(&'static str, CheckoutState), ReconcileError>> {
        let result = match invoice.invoice_type {
            InvoiceType::Stripe => self.stripe.check_status(external_id).await.map(|s| (self.stripe.name(), s)),
            InvoiceType::Lightning => {
                let gateway = self.lightning.as_ref()?;
                gateway.check_status(external_id).await.map(|s| (gateway.name(), s))
            },
            InvoiceType::Balance => return None,
        };
        Some(result.map_err(ReconcileError::from))
    }

    async fn reconcile(&self, invoice: &Invoice, now: DateTime<Utc>) -> Result<RowOutcome, ReconcileError> {
        let Some(external_id) = invoice.external_id.as_deref() else {
            trace!("🧾️ Invoice #{} has no checkout yet. Skipping.", invoice.id);
            return Ok(RowOutcome::Skipped);
        };
        let Some(result) = self.check_status(invoice, external_id).await else {
            trace!("🧾️ No gateway configured for {} invoice #{}. Skipping.", invoice.invoice_type, invoice.id);
            return Ok(RowOutcome::Skipped);
        };
        let (gateway, state) = result?;
        if !state.status.is_paid() {
            trace!("🧾️ Invoice #{} is {} ({}) at {gateway}", invoice.id, state.status, state.raw_status);
            return Ok(RowOutcome::Unchanged);
        }
        if let Some(amount) = state.amount.filter(|a| *a != invoice.amount) {
            warn!(
                "🧾️ {gateway} reports {amount} for invoice #{}, but the invoice is for {}. Keeping the invoice amount.",
                invoice.id, invoice.amount
            );
        }
        let metadata = payment_metadata(invoice, gateway, &state, now);
        let result = self.db.upsert_payment_for_invoice(invoice.id, PaymentStatus::Complete, metadata).await?;
        if !result.is_newly_completed() {
            return Ok(RowOutcome::Unchanged);
        }
        let payment = result.into_payment();
        info!("🧾️ Invoice #{} paid via {gateway}. Payment #{} recorded.", invoice.id, payment.id);
        let invoice = Invoice { status: PaymentStatus::Complete, ..invoice.clone() };
        self.producers.publish_payment_completed(PaymentCompletedEvent::new(invoice, payment)).await;
        Ok(RowOutcome::Updated)
    }
}

/// The metadata written to the payment when its invoice is found to be paid.
pub fn payment_metadata(invoice: &Invoice, gateway: &str, state: &CheckoutState, now: DateTime<Utc>) -> Value {
    let mut metadata = pick_keys(&invoice.metadata.0, &DELIVERY_KEYS);
    let mut put = |k: &str, v: Value| {
        metadata.insert(k.to_string(), v);
    };
    put("gateway", Value::from(gateway));
    put("gateway_status", Value::from(state.raw_status.as_str()));
    if let Some(id) = &invoice.external_id {
        put("external_id", Value::from(id.as_str()));
    }
    put("completed_at", timestamp(now));
    if let Some(amount) = state.amount {
        put("amount_total", Value::from(amount.to_string()));
        if amount != invoice.amount {
            put("gateway_amount", Value::from(amount.to_string()));
        }
    }
    if !state.details.is_null() {
        put("gateway_details", state.details.clone());
    }
    Value::Object(metadata)
}
