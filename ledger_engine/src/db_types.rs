use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
pub use ledger_common::{Usd, USD_CURRENCY_CODE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{types::Json, FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(String);

/// Implements `Display` and `FromStr` for a status enum using the same lowercase labels that are stored in the
/// database.
macro_rules! labelled_enum {
    ($name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($label => Ok(Self::$variant),)+
                    s => Err(ConversionError(format!("{s} is not a valid {}", stringify!($name)))),
                }
            }
        }
    };
}

//--------------------------------------     InvoiceType      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InvoiceType {
    /// Card payment through a Stripe Checkout session
    Stripe,
    /// Bitcoin Lightning payment through BTCPay Server
    Lightning,
    /// Paid from the buyer's ledger balance. Settled synchronously, never polled.
    Balance,
}

labelled_enum!(InvoiceType { Stripe => "stripe", Lightning => "lightning", Balance => "balance" });

//--------------------------------------    PaymentStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Complete,
}

labelled_enum!(PaymentStatus { Pending => "pending", Complete => "complete" });

//--------------------------------------   WithdrawalStatus   ---------------------------------------------------------
/// Withdrawal lifecycle.
///
/// ```text
///   pending ──► complete
///      │   ├──► delayed ──► complete
///      │   │       └──────► failed
///      └───┴──► error
/// ```
/// `complete` and `failed` are terminal. `error` is a dead-letter state that needs an operator; nothing in the
/// engine moves a withdrawal out of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Complete,
    Delayed,
    Failed,
    Error,
}

labelled_enum!(WithdrawalStatus {
    Pending => "pending",
    Complete => "complete",
    Delayed => "delayed",
    Failed => "failed",
    Error => "error",
});

impl WithdrawalStatus {
    pub fn can_transition_to(&self, to: WithdrawalStatus) -> bool {
        use WithdrawalStatus::*;
        matches!((self, to), (Pending, Complete | Delayed | Error) | (Delayed, Complete | Failed))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Error)
    }

    /// Withdrawals in these states count against the user's balance.
    pub fn is_committed_outflow(&self) -> bool {
        matches!(self, Self::Complete | Self::Pending | Self::Delayed)
    }
}

//--------------------------------------    DepositStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DepositStatus {
    Pending,
    Complete,
    Failed,
}

labelled_enum!(DepositStatus { Pending => "pending", Complete => "complete", Failed => "failed" });

//--------------------------------------     DepositType      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DepositType {
    /// On-chain USDT sent to a dedicated receiving address
    Usdt,
    /// Card top-up through a Stripe Checkout session
    Stripe,
}

labelled_enum!(DepositType { Usdt => "usdt", Stripe => "stripe" });

//--------------------------------------       Invoice        ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Invoice {
    pub id: i64,
    pub buyer_id: i64,
    pub seller_id: i64,
    pub searchable_id: i64,
    #[sqlx(try_from = "String")]
    pub amount: Usd,
    #[sqlx(try_from = "String")]
    pub fee: Usd,
    pub currency: String,
    #[sqlx(rename = "type")]
    pub invoice_type: InvoiceType,
    pub external_id: Option<String>,
    /// Denormalised copy of the child payment's status. The payment row is authoritative.
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub metadata: Json<Value>,
}

#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub buyer_id: i64,
    pub seller_id: i64,
    pub searchable_id: i64,
    /// What the buyer is charged, including any processing markup
    pub amount: Usd,
    /// The platform's cut, deducted from the seller's proceeds
    pub fee: Usd,
    pub currency: String,
    pub invoice_type: InvoiceType,
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub metadata: Value,
}

impl NewInvoice {
    pub fn new(buyer_id: i64, seller_id: i64, searchable_id: i64, amount: Usd, invoice_type: InvoiceType) -> Self {
        Self {
            buyer_id,
            seller_id,
            searchable_id,
            amount,
            fee: Usd::ZERO,
            currency: USD_CURRENCY_CODE.to_string(),
            invoice_type,
            external_id: None,
            created_at: Utc::now(),
            metadata: Value::Object(Default::default()),
        }
    }

    pub fn with_fee(mut self, fee: Usd) -> Self {
        self.fee = fee;
        self
    }

    pub fn with_external_id<S: Into<String>>(mut self, external_id: S) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

//--------------------------------------       Payment        ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Payment {
    pub id: i64,
    pub invoice_id: i64,
    #[sqlx(try_from = "String")]
    pub amount: Usd,
    #[sqlx(try_from = "String")]
    pub fee: Usd,
    pub currency: String,
    #[sqlx(rename = "type")]
    pub payment_type: InvoiceType,
    pub external_id: Option<String>,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: Json<Value>,
}

//--------------------------------------      Withdrawal      ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Withdrawal {
    pub id: i64,
    pub user_id: i64,
    /// The amount debited from the user's balance, fee included
    #[sqlx(try_from = "String")]
    pub amount: Usd,
    #[sqlx(try_from = "String")]
    pub fee: Usd,
    /// "usd" denotes USDT on Ethereum
    pub currency: String,
    #[sqlx(rename = "type")]
    pub withdrawal_type: String,
    /// The on-chain transaction hash, once known
    pub external_id: Option<String>,
    pub status: WithdrawalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: Json<Value>,
}

impl Withdrawal {
    /// What actually leaves the hot wallet.
    pub fn amount_after_fee(&self) -> Usd {
        self.amount - self.fee
    }

    pub fn destination(&self) -> Option<&str> {
        self.metadata.get("address").and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty())
    }
}

pub const USDT_WITHDRAWAL_TYPE: &str = "usdt";

#[derive(Debug, Clone)]
pub struct NewWithdrawal {
    pub user_id: i64,
    pub amount: Usd,
    pub fee: Usd,
    pub currency: String,
    pub withdrawal_type: String,
    pub created_at: DateTime<Utc>,
    pub metadata: Value,
}

impl NewWithdrawal {
    pub fn new(user_id: i64, amount: Usd, address: &str) -> Self {
        Self {
            user_id,
            amount,
            fee: Usd::ZERO,
            currency: USD_CURRENCY_CODE.to_string(),
            withdrawal_type: USDT_WITHDRAWAL_TYPE.to_string(),
            created_at: Utc::now(),
            metadata: serde_json::json!({ "address": address }),
        }
    }

    pub fn with_fee(mut self, fee: Usd) -> Self {
        self.fee = fee;
        self
    }

    pub fn with_currency<S: Into<String>>(mut self, currency: S) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

//--------------------------------------       Deposit        ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Deposit {
    pub id: i64,
    pub user_id: i64,
    /// For USDT deposits this is a hint until the transfer is detected, at which point the on-chain amount replaces
    /// it.
    #[sqlx(try_from = "String")]
    pub amount: Usd,
    pub currency: String,
    #[sqlx(rename = "type")]
    pub deposit_type: DepositType,
    pub external_id: Option<String>,
    pub status: DepositStatus,
    pub tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: Json<Value>,
}

impl Deposit {
    pub fn receiving_address(&self) -> Option<&str> {
        self.metadata.get("address").and_then(Value::as_str).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct NewDeposit {
    pub user_id: i64,
    pub amount: Usd,
    pub currency: String,
    pub deposit_type: DepositType,
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub metadata: Value,
}

impl NewDeposit {
    pub fn new(user_id: i64, amount: Usd, deposit_type: DepositType) -> Self {
        Self {
            user_id,
            amount,
            currency: USD_CURRENCY_CODE.to_string(),
            deposit_type,
            external_id: None,
            created_at: Utc::now(),
            metadata: Value::Object(Default::default()),
        }
    }

    pub fn with_external_id<S: Into<String>>(mut self, external_id: S) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

//--------------------------------------        Reward        ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Reward {
    pub id: i64,
    pub user_id: i64,
    #[sqlx(try_from = "String")]
    pub amount: Usd,
    pub currency: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReward {
    pub user_id: i64,
    pub amount: Usd,
    pub currency: String,
    pub reason: Option<String>,
}

impl NewReward {
    pub fn new(user_id: i64, amount: Usd) -> Self {
        Self { user_id, amount, currency: USD_CURRENCY_CODE.to_string(), reason: None }
    }

    pub fn with_reason<S: Into<String>>(mut self, reason: S) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

//--------------------------------------        Rating        ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Rating {
    pub id: i64,
    pub invoice_id: i64,
    pub user_id: i64,
    pub rating: i64,
    pub review: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRating {
    pub invoice_id: i64,
    pub user_id: i64,
    pub rating: i64,
    pub review: Option<String>,
}

//--------------------------------------     InvoiceNote      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NoteAuthor {
    Buyer,
    Seller,
}

labelled_enum!(NoteAuthor { Buyer => "buyer", Seller => "seller" });

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct InvoiceNote {
    pub id: i64,
    pub invoice_id: i64,
    pub user_id: i64,
    pub author: NoteAuthor,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewInvoiceNote {
    pub invoice_id: i64,
    pub user_id: i64,
    pub author: NoteAuthor,
    pub content: String,
}
