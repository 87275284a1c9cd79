//! The scheduler. Each reconciliation worker runs on its own timer, in its own task.
//!
//! Every tick is spawned as a separate task and awaited before the next tick is scheduled, so
//! * a slow rail call delays only the worker that made it,
//! * a worker never overlaps with itself (missed ticks are delayed, not bunched up),
//! * a panic inside a tick is logged and the worker carries on with the next one.
use std::{future::Future, sync::Arc, time::Duration};

use ledger_engine::{
    events::EventProducers,
    DepositMonitor,
    InvoiceReconciler,
    ReconcileError,
    SqliteDatabase,
    TickSummary,
    WithdrawalDispatcher,
    WithdrawalPoller,
};
use log::*;
use tokio::{
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};

use crate::{
    config::{Schedule, Windows},
    integrations::{LightningGateway, StripeGateway, UsdtRail},
};

/// Runs `job` every `period` until the process exits. Do not await the returned JoinHandle, as it will run
/// indefinitely.
pub fn start_worker<F, Fut>(name: &'static str, period: Duration, job: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<TickSummary, ReconcileError>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut timer = interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("🕰️ {name} worker started. Running every {}s", period.as_secs_f32());
        loop {
            timer.tick().await;
            match tokio::spawn(job()).await {
                Ok(Ok(summary)) if summary.is_idle() => trace!("🕰️ {name}: nothing to do"),
                Ok(Ok(summary)) => info!("🕰️ {name}: {summary}"),
                Ok(Err(e)) => error!("🕰️ {name} tick failed. {e}"),
                Err(e) if e.is_panic() => error!("🕰️ {name} tick panicked. The worker will try again next tick."),
                Err(e) => warn!("🕰️ {name} tick was cancelled. {e}"),
            }
        }
    })
}

/// The rails available to the workers. Lightning is optional.
#[derive(Clone)]
pub struct Rails {
    pub stripe: StripeGateway,
    pub lightning: Option<LightningGateway>,
    pub usdt: UsdtRail,
}

/// Starts the four reconciliation workers against the given ledger and rails.
pub fn start_workers(
    db: SqliteDatabase,
    rails: Rails,
    producers: EventProducers,
    schedule: Schedule,
    windows: Windows,
) -> Vec<JoinHandle<()>> {
    let reconciler = Arc::new(
        InvoiceReconciler::new(db.clone(), rails.stripe.clone(), rails.lightning.clone(), producers.clone())
            .with_lookback(windows.invoice_lookback),
    );
    let dispatcher = Arc::new(WithdrawalDispatcher::new(db.clone(), rails.usdt.clone(), producers.clone()));
    let monitor = Arc::new(
        DepositMonitor::new(db.clone(), rails.usdt.clone(), rails.stripe.clone(), producers.clone())
            .with_usdt_window(windows.usdt_deposit_window),
    );
    let poller = Arc::new(
        WithdrawalPoller::new(db, rails.usdt, producers).with_alert_after(windows.delayed_alert_after),
    );
    vec![
        start_worker("Invoice reconciliation", schedule.invoice_check, move || {
            let reconciler = Arc::clone(&reconciler);
            async move { reconciler.tick().await }
        }),
        start_worker("Withdrawal dispatch", schedule.withdrawal_dispatch, move || {
            let dispatcher = Arc::clone(&dispatcher);
            async move { dispatcher.tick().await }
        }),
        start_worker("Deposit confirmation", schedule.deposit_check, move || {
            let monitor = Arc::clone(&monitor);
            async move { monitor.tick().await }
        }),
        start_worker("Delayed withdrawal status", schedule.delayed_withdrawal_check, move || {
            let poller = Arc::clone(&poller);
            async move { poller.tick().await }
        }),
    ]
}
