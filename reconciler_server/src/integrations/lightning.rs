use std::{str::FromStr, sync::Arc};

use ledger_common::{Usd, USD_CURRENCY_CODE};
use ledger_engine::{
    price_cache::PriceCache,
    traits::{CheckoutGateway, CheckoutRequest, CheckoutSession, CheckoutState, GatewayStatus, RailError},
};
use log::*;
use rail_clients::{BtcPayApi, BtcPayInvoice, NewBtcPayInvoice};
use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::errors::rail_error;

const BTC_USD: &str = "BTC_USD";
const SATS_PER_BTC: i64 = 100_000_000;

/// Lightning checkouts through BTCPay Server. Invoices priced in BTC or sats are valued with the shared price cache.
#[derive(Clone)]
pub struct LightningGateway {
    api: BtcPayApi,
    prices: Arc<PriceCache>,
}

impl LightningGateway {
    pub fn new(api: BtcPayApi, prices: Arc<PriceCache>) -> Self {
        Self { api, prices }
    }

    async fn btc_price(&self) -> Result<Usd, RailError> {
        self.prices.get_or_fetch(BTC_USD, || async { self.api.fetch_rate(BTC_USD).await.map_err(rail_error) }).await
    }
}

/// BTCPay invoice statuses: `New` and `Processing` are waiting on the payment, `Settled` is final, `Expired` and
/// `Invalid` are dead.
pub fn btcpay_status(status: &str) -> GatewayStatus {
    match status.to_ascii_lowercase().as_str() {
        "settled" => GatewayStatus::Settled,
        "expired" => GatewayStatus::Expired,
        "invalid" => GatewayStatus::Failed,
        _ => GatewayStatus::Pending,
    }
}

/// The invoice amount in USD. `btc_usd` is only consulted for BTC and SATS amounts. Other currencies yield `None`.
pub fn btcpay_amount_in_usd(amount: &str, currency: &str, btc_usd: Option<Usd>) -> Result<Option<Usd>, RailError> {
    let value = Decimal::from_str(amount.trim())
        .map_err(|e| RailError::InvalidResponse(format!("BTCPay amount '{amount}' is not a number. {e}")))?;
    let btc = match currency.to_ascii_uppercase().as_str() {
        "USD" => return Ok(Some(Usd::new(value).round_cents())),
        "BTC" => value,
        "SATS" => value / Decimal::from(SATS_PER_BTC),
        _ => return Ok(None),
    };
    let price = btc_usd.ok_or_else(|| RailError::InvalidResponse("No BTC price is available".into()))?;
    let usd = price
        .checked_mul(btc)
        .ok_or_else(|| RailError::InvalidResponse(format!("{amount} {currency} at {price} USD/BTC overflows")))?;
    Ok(Some(usd.round_cents()))
}

fn raw_status(invoice: &BtcPayInvoice) -> String {
    match invoice.additional_status.as_deref() {
        Some(extra) if !extra.is_empty() && extra != "None" => format!("{}/{extra}", invoice.status),
        _ => invoice.status.clone(),
    }
}

impl CheckoutGateway for LightningGateway {
    fn name(&self) -> &'static str {
        "lightning"
    }

    async fn create_checkout(&self, request: CheckoutRequest) -> Result<CheckoutSession, RailError> {
        let mut metadata = match request.metadata {
            Value::Object(map) => map,
            _ => Default::default(),
        };
        metadata.insert("orderId".into(), Value::from(request.reference));
        metadata.insert("itemDesc".into(), Value::from(request.description));
        let invoice = NewBtcPayInvoice {
            amount: request.amount.round_cents().to_string(),
            currency: request.currency.to_uppercase(),
            metadata: Value::Object(metadata),
        };
        let invoice = self.api.create_invoice(&invoice).await.map_err(rail_error)?;
        let redirect = invoice
            .checkout_link
            .ok_or_else(|| RailError::InvalidResponse(format!("BTCPay invoice {} has no checkout link", invoice.id)))?;
        debug!("BTCPay invoice {} created", invoice.id);
        Ok(CheckoutSession { external_id: invoice.id, redirect })
    }

    async fn check_status(&self, external_id: &str) -> Result<CheckoutState, RailError> {
        let invoice = self.api.get_invoice(external_id).await.map_err(rail_error)?;
        let status = btcpay_status(&invoice.status);
        let needs_price = matches!(invoice.currency.to_ascii_uppercase().as_str(), "BTC" | "SATS");
        let btc_usd = if needs_price { Some(self.btc_price().await?) } else { None };
        let details = json!({
            "invoice_id": invoice.id,
            "amount": invoice.amount,
            "currency": invoice.currency,
            "btc_usd": btc_usd,
        });
        let state = CheckoutState::new(status, raw_status(&invoice)).with_details(details);
        match btcpay_amount_in_usd(&invoice.amount, &invoice.currency, btc_usd)? {
            Some(amount) => Ok(state.with_amount(amount, USD_CURRENCY_CODE)),
            None => Ok(state),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn usd(s: &str) -> Usd {
        Usd::from_str(s).unwrap()
    }

    #[test]
    fn statuses() {
        assert_eq!(btcpay_status("Settled"), GatewayStatus::Settled);
        assert_eq!(btcpay_status("Processing"), GatewayStatus::Pending);
        assert_eq!(btcpay_status("New"), GatewayStatus::Pending);
        assert_eq!(btcpay_status("Expired"), GatewayStatus::Expired);
        assert_eq!(btcpay_status("Invalid"), GatewayStatus::Failed);
    }

    #[test]
    fn usd_amounts_need_no_price() {
        assert_eq!(btcpay_amount_in_usd("49.98", "USD", None).unwrap(), Some(usd("49.98")));
        assert_eq!(btcpay_amount_in_usd("12", "eur", None).unwrap(), None);
    }

    #[test]
    fn bitcoin_amounts_use_the_price() {
        let price = Some(usd("64000"));
        assert_eq!(btcpay_amount_in_usd("0.001", "BTC", price).unwrap(), Some(usd("64.00")));
        assert_eq!(btcpay_amount_in_usd("78100", "SATS", price).unwrap(), Some(usd("49.98")));
        assert!(btcpay_amount_in_usd("0.001", "BTC", None).is_err());
    }

    #[test]
    fn malformed_amounts() {
        let err = btcpay_amount_in_usd("lots", "USD", None).unwrap_err();
        assert!(matches!(err, RailError::InvalidResponse(_)));
        // Decimal::MAX bitcoin cannot be valued in dollars
        let err = btcpay_amount_in_usd("79228162514264337593543950335", "BTC", Some(usd("64000"))).unwrap_err();
        assert!(matches!(err, RailError::InvalidResponse(_)));
    }

    #[test]
    fn raw_status_includes_the_exception() {
        let mut invoice = BtcPayInvoice {
            id: "inv1".into(),
            status: "Settled".into(),
            additional_status: Some("PaidOver".into()),
            amount: "10".into(),
            currency: "USD".into(),
            checkout_link: None,
            metadata: Value::Null,
        };
        assert_eq!(raw_status(&invoice), "Settled/PaidOver");
        invoice.additional_status = Some("None".into());
        assert_eq!(raw_status(&invoice), "Settled");
    }
}
