//! HTTP clients for the external payment rails.
//!
//! Each client speaks its rail's native wire format and returns the rail's own response objects. Translating these
//! into ledger semantics is left to the caller.
mod api;
mod btcpay;
mod config;
mod error;
mod stripe;
mod usdt;

pub use btcpay::{BtcPayApi, BtcPayInvoice, NewBtcPayInvoice};
pub use config::{BtcPayConfig, StripeConfig, UsdtSidecarConfig, DEFAULT_STRIPE_API_URL, DEFAULT_USDT_SERVICE_URL};
pub use error::RailApiError;
pub use stripe::{CheckoutSession, NewCheckoutSession, StripeApi};
pub use usdt::{DepositAddress, UsdtSendResponse, UsdtSidecarApi, UsdtTransfer, UsdtTransferAmount, UsdtTxStatus};
