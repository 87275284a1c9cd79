use std::{
    collections::HashMap,
    future::Future,
    time::{Duration, Instant},
};

use ledger_common::Usd;
use log::*;
use tokio::sync::RwLock;

/// A TTL cache for exchange rates, keyed by currency pair (e.g. `BTC_USD`).
///
/// Build one per process and share it behind an `Arc` with whichever component needs price lookups.
#[derive(Debug)]
pub struct PriceCache {
    ttl: Duration,
    prices: RwLock<HashMap<String, (Usd, Instant)>>,
}

impl PriceCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, prices: RwLock::new(HashMap::new()) }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached price if it is still fresh.
    pub async fn get(&self, pair: &str) -> Option<Usd> {
        let prices = self.prices.read().await;
        prices.get(pair).filter(|(_, fetched_at)| fetched_at.elapsed() < self.ttl).map(|(price, _)| *price)
    }

    pub async fn insert(&self, pair: &str, price: Usd) {
        let mut prices = self.prices.write().await;
        prices.insert(pair.to_string(), (price, Instant::now()));
    }

    /// Returns the cached price, or calls `fetch` and caches its result if the entry is missing or stale. Failed
    /// fetches are not cached.
    pub async fn get_or_fetch<F, Fut, E>(&self, pair: &str, fetch: F) -> Result<Usd, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Usd, E>>,
    {
        if let Some(price) = self.get(pair).await {
            trace!("💱️ {pair} cache hit: {price}");
            return Ok(price);
        }
        let price = fetch().await?;
        debug!("💱️ {pair} refreshed: {price}");
        self.insert(pair, price).await;
        Ok(price)
    }
}
