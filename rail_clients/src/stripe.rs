use std::collections::HashMap;

use ledger_common::Usd;
use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Method,
};
use serde::{Deserialize, Serialize};

use crate::{api::RestClient, config::StripeConfig, RailApiError};

/// A Stripe Checkout session, as returned by the `checkout/sessions` endpoints. Only the fields the ledger cares
/// about are kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    /// `open`, `complete` or `expired`
    #[serde(default)]
    pub status: Option<String>,
    /// `paid`, `unpaid` or `no_payment_required`
    pub payment_status: String,
    /// In the smallest currency unit (cents)
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct NewCheckoutSession {
    pub amount: Usd,
    pub currency: String,
    pub product_name: String,
    pub success_url: String,
    pub cancel_url: String,
    pub client_reference_id: Option<String>,
    pub metadata: Vec<(String, String)>,
}

impl NewCheckoutSession {
    /// Stripe takes form-encoded bodies with bracketed keys for nested objects.
    pub fn to_form(&self) -> Result<Vec<(String, String)>, RailApiError> {
        let cents = self
            .amount
            .round_cents()
            .to_token_units(2)
            .map_err(|e| RailApiError::InvalidRequest(e.to_string()))?;
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("success_url".to_string(), self.success_url.clone()),
            ("cancel_url".to_string(), self.cancel_url.clone()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("line_items[0][price_data][currency]".to_string(), self.currency.to_lowercase()),
            ("line_items[0][price_data][unit_amount]".to_string(), cents.to_string()),
            ("line_items[0][price_data][product_data][name]".to_string(), self.product_name.clone()),
        ];
        if let Some(id) = &self.client_reference_id {
            form.push(("client_reference_id".to_string(), id.clone()));
        }
        for (k, v) in &self.metadata {
            form.push((format!("metadata[{k}]"), v.clone()));
        }
        Ok(form)
    }
}

#[derive(Clone)]
pub struct StripeApi {
    rest: RestClient,
}

impl StripeApi {
    pub fn new(config: StripeConfig) -> Result<Self, RailApiError> {
        let mut headers = HeaderMap::with_capacity(1);
        let val = HeaderValue::from_str(&format!("Bearer {}", config.secret_key.reveal()))
            .map_err(|e| RailApiError::Initialization(e.to_string()))?;
        headers.insert(AUTHORIZATION, val);
        let rest = RestClient::new(&config.api_url, headers, config.timeout)?;
        Ok(Self { rest })
    }

    pub async fn create_checkout_session(&self, session: &NewCheckoutSession) -> Result<CheckoutSession, RailApiError> {
        let form = session.to_form()?;
        debug!("Creating Stripe checkout session for {} {}", session.amount, session.currency);
        let req = self.rest.request(Method::POST, &["v1", "checkout", "sessions"]).form(&form);
        let result = self.rest.execute::<CheckoutSession>(req).await?;
        info!("Created Stripe checkout session {}", result.id);
        Ok(result)
    }

    pub async fn retrieve_checkout_session(&self, session_id: &str) -> Result<CheckoutSession, RailApiError> {
        trace!("Fetching Stripe checkout session {session_id}");
        let req = self.rest.request(Method::GET, &["v1", "checkout", "sessions", session_id]);
        self.rest.execute::<CheckoutSession>(req).await
    }
}
