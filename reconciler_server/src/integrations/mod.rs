//! Adapters between the rail HTTP clients and the engine's rail traits.
//!
//! Each adapter owns one client and translates its native responses. None of them touch the ledger.
mod lightning;
mod stripe;
mod usdt;

pub use lightning::{btcpay_amount_in_usd, btcpay_status, LightningGateway};
pub use stripe::{session_state, StripeGateway};
pub use usdt::{receipt_from_response, tx_status_from, UsdtRail};
