use ledger_common::{Usd, USD_CURRENCY_CODE};
use ledger_engine::traits::{CheckoutGateway, CheckoutRequest, CheckoutSession, CheckoutState, GatewayStatus, RailError};
use log::*;
use rail_clients::{CheckoutSession as StripeSession, NewCheckoutSession, StripeApi};
use serde_json::{json, Value};

use crate::{config::CheckoutUrls, errors::rail_error};

#[derive(Clone)]
pub struct StripeGateway {
    api: StripeApi,
    urls: CheckoutUrls,
}

impl StripeGateway {
    pub fn new(api: StripeApi, urls: CheckoutUrls) -> Self {
        Self { api, urls }
    }
}

/// Stripe metadata is a flat string-to-string map.
fn flatten_metadata(metadata: &Value) -> Vec<(String, String)> {
    match metadata {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| {
                let v = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), v)
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Translates a Stripe Checkout session into the common checkout state.
///
/// `payment_status == "paid"` is the only signal that money arrived. A session whose `status` is `expired` can never be
/// paid. Anything else is still pending.
pub fn session_state(session: &StripeSession) -> CheckoutState {
    let status_label = session.status.as_deref().unwrap_or("unknown");
    let raw_status = format!("{status_label}/{}", session.payment_status);
    let status = if session.payment_status.eq_ignore_ascii_case("paid") {
        GatewayStatus::Paid
    } else if status_label.eq_ignore_ascii_case("expired") {
        GatewayStatus::Expired
    } else {
        GatewayStatus::Pending
    };
    let details = json!({
        "session_id": session.id,
        "payment_status": session.payment_status,
        "session_status": status_label,
    });
    let state = CheckoutState::new(status, raw_status).with_details(details);
    match (session.amount_total, session.currency.as_deref()) {
        (Some(cents), Some(currency)) if currency.eq_ignore_ascii_case(USD_CURRENCY_CODE) => {
            state.with_amount(Usd::from_cents(cents), USD_CURRENCY_CODE)
        },
        (Some(_), Some(currency)) => {
            debug!("Stripe session {} is in {currency}. Not reporting an amount.", session.id);
            state
        },
        _ => state,
    }
}

impl CheckoutGateway for StripeGateway {
    fn name(&self) -> &'static str {
        "stripe"
    }

    async fn create_checkout(&self, request: CheckoutRequest) -> Result<CheckoutSession, RailError> {
        let session = NewCheckoutSession {
            amount: request.amount,
            currency: request.currency,
            product_name: request.description,
            success_url: self.urls.success_url.clone(),
            cancel_url: self.urls.cancel_url.clone(),
            client_reference_id: Some(request.reference),
            metadata: flatten_metadata(&request.metadata),
        };
        let session = self.api.create_checkout_session(&session).await.map_err(rail_error)?;
        let redirect = session
            .url
            .ok_or_else(|| RailError::InvalidResponse(format!("Stripe session {} has no checkout URL", session.id)))?;
        debug!("Stripe checkout session {} created", session.id);
        Ok(CheckoutSession { external_id: session.id, redirect })
    }

    async fn check_status(&self, external_id: &str) -> Result<CheckoutState, RailError> {
        let session = self.api.retrieve_checkout_session(external_id).await.map_err(rail_error)?;
        Ok(session_state(&session))
    }
}
