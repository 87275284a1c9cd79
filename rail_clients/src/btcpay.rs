use std::str::FromStr;

use ledger_common::Usd;
use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Method,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{api::RestClient, config::BtcPayConfig, RailApiError};

/// A BTCPay Server (Greenfield API) invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BtcPayInvoice {
    pub id: String,
    /// `New`, `Processing`, `Expired`, `Invalid` or `Settled`
    pub status: String,
    #[serde(default)]
    pub additional_status: Option<String>,
    /// Decimal string in `currency` units
    pub amount: String,
    pub currency: String,
    #[serde(default)]
    pub checkout_link: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewBtcPayInvoice {
    pub amount: String,
    pub currency: String,
    pub metadata: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RateResult {
    currency_pair: String,
    #[serde(default)]
    rate: Option<String>,
    #[serde(default)]
    errors: Vec<String>,
}

#[derive(Clone)]
pub struct BtcPayApi {
    store_id: String,
    rest: RestClient,
}

impl BtcPayApi {
    pub fn new(config: BtcPayConfig) -> Result<Self, RailApiError> {
        let mut headers = HeaderMap::with_capacity(1);
        let val = HeaderValue::from_str(&format!("token {}", config.api_key.reveal()))
            .map_err(|e| RailApiError::Initialization(e.to_string()))?;
        headers.insert(AUTHORIZATION, val);
        let rest = RestClient::new(&config.url, headers, config.timeout)?;
        Ok(Self { store_id: config.store_id, rest })
    }

    pub async fn create_invoice(&self, invoice: &NewBtcPayInvoice) -> Result<BtcPayInvoice, RailApiError> {
        debug!("Creating BTCPay invoice for {} {}", invoice.amount, invoice.currency);
        let req = self.rest.request(Method::POST, &["api", "v1", "stores", &self.store_id, "invoices"]).json(invoice);
        let result = self.rest.execute::<BtcPayInvoice>(req).await?;
        info!("Created BTCPay invoice {}", result.id);
        Ok(result)
    }

    pub async fn get_invoice(&self, invoice_id: &str) -> Result<BtcPayInvoice, RailApiError> {
        trace!("Fetching BTCPay invoice {invoice_id}");
        let req = self.rest.request(Method::GET, &["api", "v1", "stores", &self.store_id, "invoices", invoice_id]);
        self.rest.execute::<BtcPayInvoice>(req).await
    }

    /// Fetches the store's current rate for `pair`, e.g. `BTC_USD`.
    pub async fn fetch_rate(&self, pair: &str) -> Result<Usd, RailApiError> {
        let req = self
            .rest
            .request(Method::GET, &["api", "v1", "stores", &self.store_id, "rates"])
            .query(&[("currencyPair", pair)]);
        let rates = self.rest.execute::<Vec<RateResult>>(req).await?;
        let result = rates
            .into_iter()
            .find(|r| r.currency_pair.eq_ignore_ascii_case(pair))
            .ok_or_else(|| RailApiError::EmptyResponse(format!("No rate for {pair}")))?;
        match result.rate {
            Some(rate) => Usd::from_str(&rate).map_err(|e| RailApiError::JsonError(e.to_string())),
            None => Err(RailApiError::EmptyResponse(format!("No rate for {pair}. {}", result.errors.join(", ")))),
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use ledger_common::Secret;
    use serde_json::json;
    use wiremock::{
        matchers::{header, method, path, query_param},
        Mock,
        MockServer,
        ResponseTemplate,
    };

    use super::*;

    fn api(url: &str) -> BtcPayApi {
        let config = BtcPayConfig {
            url: url.to_string(),
            store_id: "store1".into(),
            api_key: Secret::new("key".into()),
            timeout: Duration::from_secs(2),
        };
        BtcPayApi::new(config).unwrap()
    }

    #[tokio::test]
    async fn fetch_settled_invoice() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/stores/store1/invoices/inv42"))
            .and(header("Authorization", "token key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "inv42",
                "status": "Settled",
                "additionalStatus": "None",
                "amount": "0.00025",
                "currency": "BTC",
                "checkoutLink": "https://pay.example.com/i/inv42"
            })))
            .mount(&server)
            .await;
        let invoice = api(&server.uri()).get_invoice("inv42").await.unwrap();
        assert_eq!(invoice.status, "Settled");
        assert_eq!(invoice.amount, "0.00025");
    }

    #[tokio::test]
    async fn fetch_btc_rate() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/stores/store1/rates"))
            .and(query_param("currencyPair", "BTC_USD"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "currencyPair": "BTC_USD", "errors": [], "rate": "64000.50" }
            ])))
            .mount(&server)
            .await;
        let rate = api(&server.uri()).fetch_rate("BTC_USD").await.unwrap();
        assert_eq!(rate, Usd::from_str("64000.5").unwrap());
    }

    #[tokio::test]
    async fn missing_rate_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/stores/store1/rates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "currencyPair": "BTC_USD", "errors": ["rate source down"], "rate": null }
            ])))
            .mount(&server)
            .await;
        let err = api(&server.uri()).fetch_rate("BTC_USD").await.unwrap_err();
        assert!(matches!(err, RailApiError::EmptyResponse(_)));
    }
}
