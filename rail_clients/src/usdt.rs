//! Client for the USDT-on-Ethereum sidecar service.
//!
//! The sidecar holds the hot wallet keys and talks to an Ethereum node. Amounts always cross this boundary as integer
//! token units (USDT has 6 decimals).
use log::*;
use reqwest::{header::HeaderMap, Method};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use crate::{api::RestClient, config::UsdtSidecarConfig, RailApiError};

/// The sidecar reports block numbers as either JSON numbers or strings depending on the endpoint.
fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where D: Deserializer<'de> {
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_u64().map(Some).ok_or_else(|| serde::de::Error::custom(format!("{n} is not a u64"))),
        Some(Value::String(s)) => s.parse::<u64>().map(Some).map_err(serde::de::Error::custom),
        Some(v) => Err(serde::de::Error::custom(format!("expected an integer, got {v}"))),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsdtSendResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_type: Option<String>,
    #[serde(default, rename = "request_id")]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsdtTxStatus {
    /// `pending`, `not_found` or `confirmed`
    pub status: String,
    /// Only meaningful once confirmed. `false` means the transaction reverted.
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub confirmations: Option<i64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub block_number: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositAddress {
    pub address: String,
    pub index: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsdtTransfer {
    pub tx_hash: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub block_number: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct TransfersResponse {
    #[serde(default)]
    transfers: Vec<UsdtTransfer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsdtTransferAmount {
    /// Token units
    #[serde(default, deserialize_with = "lenient_u64")]
    pub amount: Option<u64>,
    #[serde(default)]
    pub confirmations: Option<i64>,
}

#[derive(Clone)]
pub struct UsdtSidecarApi {
    config: UsdtSidecarConfig,
    rest: RestClient,
}

impl UsdtSidecarApi {
    pub fn new(config: UsdtSidecarConfig) -> Result<Self, RailApiError> {
        let rest = RestClient::new(&config.url, HeaderMap::new(), config.poll_timeout)?;
        Ok(Self { config, rest })
    }

    /// Submits a USDT transfer. `request_id` must be stable for a given payout so that the sidecar can reject
    /// replays.
    ///
    /// The sidecar reports failed transfers with a 5xx status *and* a JSON body that may still carry the transaction
    /// hash (the transaction was signed and broadcast, but waiting for the receipt failed). Only bodies that carry a
    /// hash are returned as `Ok`, so the caller can track the transaction. Any other non-2xx reply, including rate
    /// limiting and 5xx replies with an `error` message, is a `QueryError` and nothing was broadcast.
    pub async fn send(&self, to: &str, units: u64, request_id: &str) -> Result<UsdtSendResponse, RailApiError> {
        let body = json!({ "to": to, "amount": units, "request_id": request_id });
        debug!("[{request_id}] Sending {units} USDT units to {to}");
        let response = self
            .rest
            .request(Method::POST, &["send"])
            .json(&body)
            .timeout(self.config.send_timeout)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return RestClient::parse_response(response).await;
        }
        let text = response.text().await?;
        match serde_json::from_str::<UsdtSendResponse>(&text) {
            Ok(result) if result.tx_hash.is_some() => {
                warn!("[{request_id}] Sidecar reported a failed transfer ({status}): {:?}", result.error);
                Ok(result)
            },
            Ok(UsdtSendResponse { error: Some(message), .. }) => {
                warn!("[{request_id}] Sidecar refused the transfer ({status}): {message}");
                Err(RailApiError::QueryError { status: status.as_u16(), message })
            },
            _ => Err(RailApiError::QueryError { status: status.as_u16(), message: text }),
        }
    }

    pub async fn tx_status(&self, tx_hash: &str) -> Result<UsdtTxStatus, RailApiError> {
        trace!("Checking status of {tx_hash}");
        let req = self.rest.request(Method::GET, &["tx-status", tx_hash]);
        self.rest.execute(req).await
    }

    /// Allocates a fresh receiving address with a zero balance for the given deposit.
    pub async fn zero_balance_address(&self, deposit_id: i64) -> Result<DepositAddress, RailApiError> {
        let req = self.rest.request(Method::POST, &["zero-balance-address"]).json(&json!({ "deposit_id": deposit_id }));
        self.rest.execute(req).await
    }

    /// Lists incoming USDT transfers to `address`.
    pub async fn transfers_to(&self, address: &str) -> Result<Vec<UsdtTransfer>, RailApiError> {
        let req = self.rest.request(Method::GET, &["transfers", address]);
        let result = self.rest.execute::<TransfersResponse>(req).await?;
        Ok(result.transfers)
    }

    pub async fn transfer_amount(&self, tx_hash: &str) -> Result<UsdtTransferAmount, RailApiError> {
        let req = self.rest.request(Method::GET, &["transfer-amount", tx_hash]);
        self.rest.execute(req).await
    }
}
