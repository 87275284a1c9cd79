use ledger_engine::events::{
    DepositUpdatedEvent,
    EventHandlers,
    EventHooks,
    IntegrityAlertEvent,
    PaymentCompletedEvent,
    WithdrawalUpdatedEvent,
};
use log::*;

const EVENT_BUFFER_SIZE: usize = 64;

/// Event handlers that write every ledger event to the log. Alerts are already logged at `error` when they are raised,
/// so the alert hook only records the timestamp for correlation.
pub fn create_logging_event_handlers() -> EventHandlers {
    let mut hooks = EventHooks::default();
    hooks
        .on_payment_completed(|ev| {
            Box::pin(async move {
                let PaymentCompletedEvent { invoice, payment } = ev;
                info!(
                    "📬️ Payment #{} completed invoice #{} ({} {}, fee {}) for seller {}",
                    payment.id, invoice.id, payment.amount, payment.currency, payment.fee, invoice.seller_id
                );
            })
        })
        .on_withdrawal_updated(|ev| {
            Box::pin(async move {
                let WithdrawalUpdatedEvent { old_status, withdrawal } = ev;
                info!(
                    "📬️ Withdrawal #{} for user {} moved from {old_status} to {}",
                    withdrawal.id, withdrawal.user_id, withdrawal.status
                );
            })
        })
        .on_deposit_updated(|ev| {
            Box::pin(async move {
                let DepositUpdatedEvent { deposit } = ev;
                info!(
                    "📬️ {} deposit #{} for user {} is now {} ({})",
                    deposit.deposit_type, deposit.id, deposit.user_id, deposit.status, deposit.amount
                );
            })
        })
        .on_integrity_alert(|ev| {
            Box::pin(async move {
                let IntegrityAlertEvent { entity, id, raised_at, .. } = ev;
                debug!("📬️ Alert for {entity:?} #{id} raised at {raised_at}");
            })
        });
    EventHandlers::new(EVENT_BUFFER_SIZE, hooks)
}
