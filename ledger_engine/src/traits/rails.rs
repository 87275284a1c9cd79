use std::fmt::Display;

use ledger_common::Usd;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RailError {
    #[error("The rail did not respond in time. {0}")]
    Timeout(String),
    #[error("The rail is unavailable. {0}")]
    Unavailable(String),
    #[error("The rail rejected the request. {0}")]
    Rejected(String),
    #[error("The rail returned a response that could not be interpreted. {0}")]
    InvalidResponse(String),
    #[error("The rail has not been configured. {0}")]
    NotConfigured(String),
    #[error("{0} is not supported by this rail")]
    Unsupported(String),
}

impl RailError {
    /// Transient errors leave the ledger row untouched so that it is retried on the next tick.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Unavailable(_))
    }
}

//--------------------------------------   Checkout gateways  ---------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutRequest {
    pub amount: Usd,
    pub currency: String,
    /// Shown to the buyer on the hosted checkout page
    pub description: String,
    /// Our own reference for the checkout, echoed back by the gateway
    pub reference: String,
    pub metadata: Value,
}

impl CheckoutRequest {
    pub fn new(
        amount: Usd,
        currency: impl Into<String>,
        description: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            amount,
            currency: currency.into(),
            description: description.into(),
            reference: reference.into(),
            metadata: Value::Object(Default::default()),
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub external_id: String,
    /// A redirect URL for hosted checkouts
    pub redirect: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayStatus {
    Pending,
    Paid,
    Settled,
    Complete,
    Expired,
    Failed,
}

impl GatewayStatus {
    /// `paid`, `settled` and `complete` all mean the money has arrived.
    pub fn is_paid(&self) -> bool {
        matches!(self, Self::Paid | Self::Settled | Self::Complete)
    }

    pub fn is_dead(&self) -> bool {
        matches!(self, Self::Expired | Self::Failed)
    }
}

impl Display for GatewayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Settled => "settled",
            Self::Complete => "complete",
            Self::Expired => "expired",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A gateway's view of a checkout, translated into the common shape.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutState {
    pub status: GatewayStatus,
    /// The amount the gateway says was charged, when it reports one in USD.
    pub amount: Option<Usd>,
    pub currency: Option<String>,
    /// The gateway's own status label(s), kept for the audit trail
    pub raw_status: String,
    /// Extra gateway-specific fields worth keeping in payment metadata
    pub details: Value,
}

impl CheckoutState {
    pub fn new<S: Into<String>>(status: GatewayStatus, raw_status: S) -> Self {
        Self { status, amount: None, currency: None, raw_status: raw_status.into(), details: Value::Null }
    }

    pub fn with_amount<S: Into<String>>(mut self, amount: Usd, currency: S) -> Self {
        self.amount = Some(amount);
        self.currency = Some(currency.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

#[allow(async_fn_in_trait)]
pub trait CheckoutGateway {
    /// A short, stable name for logs and metadata, e.g. "stripe".
    fn name(&self) -> &'static str;

    async fn create_checkout(&self, request: CheckoutRequest) -> Result<CheckoutSession, RailError>;

    async fn check_status(&self, external_id: &str) -> Result<CheckoutState, RailError>;
}

//--------------------------------------     Payout rails     ---------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus {
    /// The rail reports the transfer as done
    Complete,
    /// Submitted, but the rail could not confirm it
    Pending,
    /// The rail reports an error. A transaction may still have been broadcast.
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct PayoutReceipt {
    /// The transaction hash exactly as the rail reported it. Validate before trusting it.
    pub tx_hash: Option<String>,
    pub status: PayoutStatus,
    pub error: Option<String>,
    /// Rail-specific fields worth keeping in withdrawal metadata
    pub details: Value,
}

impl PayoutReceipt {
    pub fn new(tx_hash: Option<String>, status: PayoutStatus) -> Self {
        Self { tx_hash, status, error: None, details: Value::Null }
    }

    pub fn with_error<S: Into<String>>(mut self, error: S) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Complete,
    Failed,
}

#[allow(async_fn_in_trait)]
pub trait PayoutRail {
    fn name(&self) -> &'static str;

    /// Sends `amount` to `destination`. The rail must treat repeated calls with the same `idempotency_key` as one
    /// payout.
    async fn send(&self, destination: &str, amount: Usd, idempotency_key: &str) -> Result<PayoutReceipt, RailError>;

    async fn transaction_status(&self, tx_hash: &str) -> Result<TxStatus, RailError>;
}

//--------------------------------------   Deposit watchers   ---------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivingAddress {
    pub address: String,
    pub index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingTransfer {
    pub tx_hash: String,
    pub block_number: u64,
}

#[allow(async_fn_in_trait)]
pub trait DepositWatcher {
    /// Derives a fresh, empty receiving address dedicated to one deposit.
    async fn create_deposit_address(&self, deposit_id: i64) -> Result<ReceivingAddress, RailError>;

    /// Transfers observed to `address`, in no particular order.
    async fn incoming_transfers(&self, address: &str) -> Result<Vec<IncomingTransfer>, RailError>;

    /// The confirmed amount moved by the transaction, or `None` if the rail cannot confirm it yet.
    async fn confirmed_amount(&self, tx_hash: &str) -> Result<Option<Usd>, RailError>;
}
