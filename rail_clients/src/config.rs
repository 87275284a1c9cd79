use std::{env, time::Duration};

use ledger_common::{parse_env_value, Secret};
use log::*;

pub const DEFAULT_STRIPE_API_URL: &str = "https://api.stripe.com";
pub const DEFAULT_USDT_SERVICE_URL: &str = "http://usdt-api:3100";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

fn timeout_from_env(var: &str, default: Duration) -> Duration {
    match parse_env_value::<u64>(env::var(var).ok()) {
        Ok(Some(secs)) => Duration::from_secs(secs),
        Ok(None) => default,
        Err(e) => {
            warn!("🪛️ {var} {e}. Using the default of {}s", default.as_secs());
            default
        },
    }
}

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub api_url: String,
    pub secret_key: Secret<String>,
    pub timeout: Duration,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self { api_url: DEFAULT_STRIPE_API_URL.to_string(), secret_key: Secret::default(), timeout: DEFAULT_TIMEOUT }
    }
}

impl StripeConfig {
    pub fn new_from_env_or_default() -> Self {
        let api_url = env::var("RECON_STRIPE_API_URL").unwrap_or_else(|_| DEFAULT_STRIPE_API_URL.to_string());
        let secret_key = Secret::new(env::var("RECON_STRIPE_SECRET_KEY").unwrap_or_else(|_| {
            warn!("🪛️ RECON_STRIPE_SECRET_KEY not set. Stripe calls will be rejected.");
            String::default()
        }));
        let timeout = timeout_from_env("RECON_STRIPE_TIMEOUT_SECS", DEFAULT_TIMEOUT);
        Self { api_url, secret_key, timeout }
    }
}

#[derive(Debug, Clone)]
pub struct BtcPayConfig {
    pub url: String,
    pub store_id: String,
    pub api_key: Secret<String>,
    pub timeout: Duration,
}

impl BtcPayConfig {
    /// Returns `None` if `RECON_BTCPAY_URL` is not set, which disables the Lightning rail.
    pub fn from_env() -> Option<Self> {
        let url = match env::var("RECON_BTCPAY_URL") {
            Ok(url) if !url.trim().is_empty() => url,
            _ => {
                info!("🪛️ RECON_BTCPAY_URL is not set. The Lightning rail is disabled.");
                return None;
            },
        };
        let store_id = env::var("RECON_BTCPAY_STORE_ID").unwrap_or_else(|_| {
            warn!("🪛️ RECON_BTCPAY_STORE_ID not set, using (probably useless) default");
            "store".to_string()
        });
        let api_key = Secret::new(env::var("RECON_BTCPAY_API_KEY").unwrap_or_else(|_| {
            warn!("🪛️ RECON_BTCPAY_API_KEY not set. BTCPay calls will be rejected.");
            String::default()
        }));
        let timeout = timeout_from_env("RECON_BTCPAY_TIMEOUT_SECS", DEFAULT_TIMEOUT);
        Some(Self { url, store_id, api_key, timeout })
    }
}

#[derive(Debug, Clone)]
pub struct UsdtSidecarConfig {
    pub url: String,
    /// Applied to payout calls. Keep this short.
    pub send_timeout: Duration,
    /// Applied to status and deposit queries.
    pub poll_timeout: Duration,
}

impl Default for UsdtSidecarConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_USDT_SERVICE_URL.to_string(),
            send_timeout: Duration::from_secs(8),
            poll_timeout: Duration::from_secs(15),
        }
    }
}

impl UsdtSidecarConfig {
    pub fn new_from_env_or_default() -> Self {
        let defaults = Self::default();
        let url = env::var("RECON_USDT_SERVICE_URL").unwrap_or_else(|_| {
            info!("🪛️ RECON_USDT_SERVICE_URL not set, using {DEFAULT_USDT_SERVICE_URL}");
            defaults.url.clone()
        });
        let send_timeout = timeout_from_env("RECON_DISPATCH_TIMEOUT_SECS", defaults.send_timeout);
        let poll_timeout = timeout_from_env("RECON_POLL_TIMEOUT_SECS", defaults.poll_timeout);
        Self { url, send_timeout, poll_timeout }
    }
}
