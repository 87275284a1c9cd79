//! Stateless pub-sub channel for ledger events
//!
//! Workers publish events (completed payments, withdrawal transitions, integrity alerts) through an [`EventProducer`].
//! Each [`EventHandler`] owns the receiving end and runs its hook once per event, in a separate task. Hooks only ever
//! see the event itself, never the ledger, so they can be as slow as they like without holding up a worker.
//!
//! A handler stops once every producer has been dropped and all in-flight hooks have finished.
use std::{any::type_name, future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::{sync::mpsc, task::JoinSet};

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    listener: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, listener) = mpsc::channel(buffer_size.max(1));
        Self { listener, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    /// Runs hooks until the last producer is dropped. A hook that panics is logged and does not stop the handler.
    pub async fn start_handler(self) {
        let Self { mut listener, sender, handler } = self;
        let event = short_type_name::<E>();
        debug!("📬️ {event} handler started");
        // Only producers may keep the channel open
        drop(sender);
        let mut jobs = JoinSet::new();
        while let Some(ev) = listener.recv().await {
            trace!("📬️ Handling {event}");
            jobs.spawn((handler)(ev));
            // Reap whatever has already finished so the set does not grow without bound
            while let Some(done) = jobs.try_join_next() {
                log_hook_result(event, done);
            }
        }
        debug!("📬️ All {event} producers are gone. Waiting for {} hook(s) to finish", jobs.len());
        while let Some(done) = jobs.join_next().await {
            log_hook_result(event, done);
        }
        debug!("📬️ {event} handler has shut down");
    }
}

fn log_hook_result(event: &str, result: Result<(), tokio::task::JoinError>) {
    match result {
        Ok(()) => trace!("📬️ {event} handled"),
        Err(e) if e.is_panic() => error!("📬️ A {event} hook panicked. The event was not fully handled."),
        Err(e) => warn!("📬️ A {event} hook was cancelled. {e}"),
    }
}

fn short_type_name<E>() -> &'static str {
    let full = type_name::<E>();
    full.rsplit("::").next().unwrap_or(full)
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    /// Waits for room in the channel. If the handler has gone away the event is dropped with an error log; the ledger
    /// write it describes has already been committed.
    pub async fn publish_event(&self, event: E) {
        if self.sender.send(event).await.is_err() {
            error!("📬️ No handler is listening. A {} was dropped.", short_type_name::<E>());
        }
    }
}
