use std::{env, time::Duration as StdDuration};

use chrono::Duration;
use ledger_common::parse_env_value;
use ledger_engine::ledger_api::{
    deposit_monitor::DEFAULT_USDT_DEPOSIT_WINDOW_MINS,
    invoice_reconciler::DEFAULT_INVOICE_LOOKBACK_HOURS,
    withdrawal_poller::DEFAULT_DELAYED_ALERT_HOURS,
};
use log::*;
use rail_clients::{BtcPayConfig, StripeConfig, UsdtSidecarConfig};

const DEFAULT_RECON_HOST: &str = "127.0.0.1";
const DEFAULT_RECON_PORT: u16 = 8370;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/ledger.db";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_PRICE_CACHE_TTL: StdDuration = StdDuration::from_secs(60);
const DEFAULT_CHECKOUT_SUCCESS_URL: &str = "http://localhost:3000/checkout/success";
const DEFAULT_CHECKOUT_CANCEL_URL: &str = "http://localhost:3000/checkout/cancel";

/// How often each of the four workers runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Schedule {
    pub invoice_check: StdDuration,
    pub withdrawal_dispatch: StdDuration,
    pub deposit_check: StdDuration,
    pub delayed_withdrawal_check: StdDuration,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            invoice_check: StdDuration::from_secs(1),
            withdrawal_dispatch: StdDuration::from_secs(5),
            deposit_check: StdDuration::from_secs(30),
            delayed_withdrawal_check: StdDuration::from_secs(300),
        }
    }
}

impl Schedule {
    pub fn from_env_or_default() -> Self {
        let defaults = Self::default();
        Self {
            invoice_check: seconds_from_env("RECON_INVOICE_CHECK_INTERVAL_SECS", defaults.invoice_check),
            withdrawal_dispatch: seconds_from_env(
                "RECON_WITHDRAWAL_DISPATCH_INTERVAL_SECS",
                defaults.withdrawal_dispatch,
            ),
            deposit_check: seconds_from_env("RECON_DEPOSIT_CHECK_INTERVAL_SECS", defaults.deposit_check),
            delayed_withdrawal_check: seconds_from_env(
                "RECON_DELAYED_WITHDRAWAL_INTERVAL_SECS",
                defaults.delayed_withdrawal_check,
            ),
        }
    }
}

/// Age limits the workers apply to ledger rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Windows {
    /// Invoices older than this are no longer reconciled
    pub invoice_lookback: Duration,
    /// USDT deposits without a qualifying transfer are failed after this long
    pub usdt_deposit_window: Duration,
    /// A `delayed` withdrawal that has not moved for this long raises an alert
    pub delayed_alert_after: Duration,
}

impl Default for Windows {
    fn default() -> Self {
        Self {
            invoice_lookback: Duration::hours(DEFAULT_INVOICE_LOOKBACK_HOURS),
            usdt_deposit_window: Duration::minutes(DEFAULT_USDT_DEPOSIT_WINDOW_MINS),
            delayed_alert_after: Duration::hours(DEFAULT_DELAYED_ALERT_HOURS),
        }
    }
}

impl Windows {
    pub fn from_env_or_default() -> Self {
        let defaults = Self::default();
        let invoice_lookback = positive_from_env::<i64>("RECON_INVOICE_LOOKBACK_HOURS")
            .map(Duration::hours)
            .unwrap_or(defaults.invoice_lookback);
        let usdt_deposit_window = positive_from_env::<i64>("RECON_USDT_DEPOSIT_WINDOW_MINS")
            .map(Duration::minutes)
            .unwrap_or(defaults.usdt_deposit_window);
        let delayed_alert_after = positive_from_env::<i64>("RECON_DELAYED_ALERT_HOURS")
            .map(Duration::hours)
            .unwrap_or(defaults.delayed_alert_after);
        info!(
            "🪛️ Invoice lookback: {}h. USDT deposit window: {}m. Delayed withdrawal alert after {}h.",
            invoice_lookback.num_hours(),
            usdt_deposit_window.num_minutes(),
            delayed_alert_after.num_hours()
        );
        Self { invoice_lookback, usdt_deposit_window, delayed_alert_after }
    }
}

/// Where Stripe sends the buyer after a hosted checkout.
#[derive(Clone, Debug)]
pub struct CheckoutUrls {
    pub success_url: String,
    pub cancel_url: String,
}

impl Default for CheckoutUrls {
    fn default() -> Self {
        Self {
            success_url: DEFAULT_CHECKOUT_SUCCESS_URL.to_string(),
            cancel_url: DEFAULT_CHECKOUT_CANCEL_URL.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RailsConfig {
    pub stripe: StripeConfig,
    /// `None` disables the Lightning rail
    pub btcpay: Option<BtcPayConfig>,
    pub usdt: UsdtSidecarConfig,
    pub checkout_urls: CheckoutUrls,
    pub price_cache_ttl: StdDuration,
}

impl Default for RailsConfig {
    fn default() -> Self {
        Self {
            stripe: StripeConfig::default(),
            btcpay: None,
            usdt: UsdtSidecarConfig::default(),
            checkout_urls: CheckoutUrls::default(),
            price_cache_ttl: DEFAULT_PRICE_CACHE_TTL,
        }
    }
}

impl RailsConfig {
    pub fn from_env_or_default() -> Self {
        let success_url = env::var("RECON_CHECKOUT_SUCCESS_URL").unwrap_or_else(|_| {
            warn!("🪛️ RECON_CHECKOUT_SUCCESS_URL is not set. Using {DEFAULT_CHECKOUT_SUCCESS_URL}");
            DEFAULT_CHECKOUT_SUCCESS_URL.to_string()
        });
        let cancel_url = env::var("RECON_CHECKOUT_CANCEL_URL").unwrap_or_else(|_| {
            warn!("🪛️ RECON_CHECKOUT_CANCEL_URL is not set. Using {DEFAULT_CHECKOUT_CANCEL_URL}");
            DEFAULT_CHECKOUT_CANCEL_URL.to_string()
        });
        Self {
            stripe: StripeConfig::new_from_env_or_default(),
            btcpay: BtcPayConfig::from_env(),
            usdt: UsdtSidecarConfig::new_from_env_or_default(),
            checkout_urls: CheckoutUrls { success_url, cancel_url },
            price_cache_ttl: seconds_from_env("RECON_PRICE_CACHE_TTL_SECS", DEFAULT_PRICE_CACHE_TTL),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub max_connections: u32,
    pub schedule: Schedule,
    pub windows: Windows,
    pub rails: RailsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RECON_HOST.to_string(),
            port: DEFAULT_RECON_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            schedule: Schedule::default(),
            windows: Windows::default(),
            rails: RailsConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("RECON_HOST").ok().unwrap_or_else(|| DEFAULT_RECON_HOST.into());
        let port = env::var("RECON_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for RECON_PORT. {e} Using the default, {DEFAULT_RECON_PORT}, \
                         instead."
                    );
                    DEFAULT_RECON_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_RECON_PORT);
        let database_url = env::var("RECON_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ RECON_DATABASE_URL is not set. Using {DEFAULT_DATABASE_URL}");
            DEFAULT_DATABASE_URL.to_string()
        });
        let max_connections =
            positive_from_env::<u32>("RECON_DB_MAX_CONNECTIONS").unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);
        Self {
            host,
            port,
            database_url,
            max_connections,
            schedule: Schedule::from_env_or_default(),
            windows: Windows::from_env_or_default(),
            rails: RailsConfig::from_env_or_default(),
        }
    }
}

fn seconds_from_env(var: &str, default: StdDuration) -> StdDuration {
    positive_from_env::<u64>(var).map(StdDuration::from_secs).unwrap_or_else(|| {
        debug!("🪛️ {var} = {}s", default.as_secs());
        default
    })
}

/// Reads a strictly positive number from the environment. Missing, invalid and non-positive values yield `None`, with
/// a warning for the latter two.
fn positive_from_env<T>(var: &str) -> Option<T>
where T: std::str::FromStr + PartialOrd + Default + std::fmt::Display, T::Err: std::fmt::Display {
    match parse_env_value::<T>(env::var(var).ok()) {
        Ok(Some(v)) if v > T::default() => Some(v),
        Ok(Some(v)) => {
            warn!("🪛️ {var} must be positive, not {v}. Using the default.");
            None
        },
        Ok(None) => None,
        Err(e) => {
            warn!("🪛️ Invalid configuration value for {var}. {e}. Using the default.");
            None
        },
    }
}
