use std::{future::Future, pin::Pin, sync::Arc};

use log::*;

use crate::events::{
    DepositUpdatedEvent,
    EventHandler,
    EventProducer,
    Handler,
    IntegrityAlertEvent,
    PaymentCompletedEvent,
    WithdrawalUpdatedEvent,
};

type BoxedHook = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Default, Clone)]
pub struct EventProducers {
    pub payment_completed_producer: Vec<EventProducer<PaymentCompletedEvent>>,
    pub withdrawal_updated_producer: Vec<EventProducer<WithdrawalUpdatedEvent>>,
    pub deposit_updated_producer: Vec<EventProducer<DepositUpdatedEvent>>,
    pub integrity_alert_producer: Vec<EventProducer<IntegrityAlertEvent>>,
}

impl EventProducers {
    pub async fn publish_payment_completed(&self, event: PaymentCompletedEvent) {
        for emitter in &self.payment_completed_producer {
            emitter.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_withdrawal_updated(&self, event: WithdrawalUpdatedEvent) {
        for emitter in &self.withdrawal_updated_producer {
            emitter.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_deposit_updated(&self, event: DepositUpdatedEvent) {
        for emitter in &self.deposit_updated_producer {
            emitter.publish_event(event.clone()).await;
        }
    }

    /// Alerts are always logged, whether or not anyone subscribed to them.
    pub async fn raise_alert(&self, event: IntegrityAlertEvent) {
        error!("🚨️ Integrity alert for {:?} #{}: {}", event.entity, event.id, event.message);
        for emitter in &self.integrity_alert_producer {
            emitter.publish_event(event.clone()).await;
        }
    }
}

pub struct EventHandlers {
    pub on_payment_completed: Option<EventHandler<PaymentCompletedEvent>>,
    pub on_withdrawal_updated: Option<EventHandler<WithdrawalUpdatedEvent>>,
    pub on_deposit_updated: Option<EventHandler<DepositUpdatedEvent>>,
    pub on_integrity_alert: Option<EventHandler<IntegrityAlertEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_payment_completed = hooks.on_payment_completed.map(|f| EventHandler::new(buffer_size, f));
        let on_withdrawal_updated = hooks.on_withdrawal_updated.map(|f| EventHandler::new(buffer_size, f));
        let on_deposit_updated = hooks.on_deposit_updated.map(|f| EventHandler::new(buffer_size, f));
        let on_integrity_alert = hooks.on_integrity_alert.map(|f| EventHandler::new(buffer_size, f));
        Self { on_payment_completed, on_withdrawal_updated, on_deposit_updated, on_integrity_alert }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_payment_completed {
            result.payment_completed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_withdrawal_updated {
            result.withdrawal_updated_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_deposit_updated {
            result.deposit_updated_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_integrity_alert {
            result.integrity_alert_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_payment_completed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_withdrawal_updated {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_deposit_updated {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_integrity_alert {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_payment_completed: Option<Handler<PaymentCompletedEvent>>,
    pub on_withdrawal_updated: Option<Handler<WithdrawalUpdatedEvent>>,
    pub on_deposit_updated: Option<Handler<DepositUpdatedEvent>>,
    pub on_integrity_alert: Option<Handler<IntegrityAlertEvent>>,
}

impl EventHooks {
    pub fn on_payment_completed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PaymentCompletedEvent) -> BoxedHook) + Send + Sync + 'static {
        self.on_payment_completed = Some(Arc::new(f));
        self
    }

    pub fn on_withdrawal_updated<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(WithdrawalUpdatedEvent) -> BoxedHook) + Send + Sync + 'static {
        self.on_withdrawal_updated = Some(Arc::new(f));
        self
    }

    pub fn on_deposit_updated<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(DepositUpdatedEvent) -> BoxedHook) + Send + Sync + 'static {
        self.on_deposit_updated = Some(Arc::new(f));
        self
    }

    pub fn on_integrity_alert<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(IntegrityAlertEvent) -> BoxedHook) + Send + Sync + 'static {
        self.on_integrity_alert = Some(Arc::new(f));
        self
    }
}
