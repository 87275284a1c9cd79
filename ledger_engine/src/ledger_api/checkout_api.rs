//! Creates the rows the reconciliation workers later pick up: invoices, withdrawals and deposits.
use std::fmt::Debug;

use chrono::{Duration, Utc};
use ledger_common::{Usd, USD_CURRENCY_CODE};
use log::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    db_types::{Deposit, DepositType, Invoice, InvoiceType, NewDeposit, NewInvoice, NewWithdrawal, Payment, Withdrawal},
    fees::FeeSchedule,
    helpers::{is_valid_eth_address, merge_metadata, timestamp},
    ledger_api::{
        balance_api::BalanceApi,
        deposit_monitor::DEFAULT_USDT_DEPOSIT_WINDOW_MINS,
        errors::CheckoutError,
    },
    traits::{CheckoutGateway, CheckoutRequest, CheckoutSession, DepositWatcher, LedgerDatabase, LedgerError},
};

/// A buyer's request to pay for a searchable item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceOrder {
    pub buyer_id: i64,
    pub seller_id: i64,
    pub searchable_id: i64,
    /// The seller's price, before any processing markup
    pub price: Usd,
    pub description: String,
    /// Selections and delivery details. Copied onto the payment when it completes.
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenedInvoice {
    pub invoice: Invoice,
    pub checkout: CheckoutSession,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenedDeposit {
    pub deposit: Deposit,
    /// The checkout URL for card top-ups, or the receiving address for USDT
    pub redirect_or_address: String,
}

pub struct CheckoutApi<B> {
    db: B,
    balances: BalanceApi<B>,
    fees: FeeSchedule,
    usdt_window: Duration,
}

impl<B> Debug for CheckoutApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CheckoutApi ({:?})", self.fees)
    }
}

impl<B> CheckoutApi<B>
where B: LedgerDatabase
{
    pub fn new(db: B) -> Self {
        let balances = BalanceApi::new(db.clone());
        let usdt_window = Duration::minutes(DEFAULT_USDT_DEPOSIT_WINDOW_MINS);
        Self { db, balances, fees: FeeSchedule::default(), usdt_window }
    }

    pub fn with_fees(mut self, fees: FeeSchedule) -> Self {
        self.fees = fees;
        self
    }

    pub fn with_usdt_window(mut self, window: Duration) -> Self {
        self.usdt_window = window;
        self
    }

    pub fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    /// Opens a gateway checkout for the order and stores the invoice with the checkout's external id.
    ///
    /// The buyer is charged according to the fee schedule for `invoice_type`. Balance-funded orders go through
    /// [`Self::pay_with_balance`] instead.
    pub async fn open_invoice<G: CheckoutGateway>(
        &self,
        gateway: &G,
        invoice_type: InvoiceType,
        order: InvoiceOrder,
    ) -> Result<OpenedInvoice, CheckoutError> {
        if invoice_type == InvoiceType::Balance {
            return Err(CheckoutError::InvalidRequest("Balance invoices are settled with pay_with_balance".into()));
        }
        validate_order(&order)?;
        let charge = self.fees.invoice_charge(order.price, invoice_type);
        let reference = format!("searchable-{}-buyer-{}", order.searchable_id, order.buyer_id);
        let request = CheckoutRequest::new(charge.amount, USD_CURRENCY_CODE, order.description.as_str(), reference)
            .with_metadata(json!({
                "buyer_id": order.buyer_id,
                "seller_id": order.seller_id,
                "searchable_id": order.searchable_id,
            }));
        let checkout = gateway.create_checkout(request).await?;
        debug!("🧾️ {} checkout {} opened for {}", gateway.name(), checkout.external_id, charge.amount);
        let metadata = merge_metadata(&order.metadata, &json!({ "description": order.description }));
        let invoice = NewInvoice::new(order.buyer_id, order.seller_id, order.searchable_id, charge.amount, invoice_type)
            .with_fee(charge.fee)
            .with_external_id(checkout.external_id.as_str())
            .with_metadata(metadata);
        let invoice = self.db.insert_invoice(invoice).await?;
        info!("🧾️ Invoice #{} for {} opened via {}", invoice.id, invoice.amount, gateway.name());
        Ok(OpenedInvoice { invoice, checkout })
    }

    /// Pays for the order from the buyer's ledger balance. The invoice and its completed payment are written together,
    /// and only if the balance still covers the price at the time of writing.
    pub async fn pay_with_balance(&self, order: InvoiceOrder) -> Result<(Invoice, Payment), CheckoutError> {
        validate_order(&order)?;
        let charge = self.fees.invoice_charge(order.price, InvoiceType::Balance);
        self.balances.validate_sufficient_balance(order.buyer_id, USD_CURRENCY_CODE, charge.amount).await?;
        let metadata = merge_metadata(&order.metadata, &json!({ "description": order.description }));
        let invoice = NewInvoice::new(
            order.buyer_id,
            order.seller_id,
            order.searchable_id,
            charge.amount,
            InvoiceType::Balance,
        )
        .with_fee(charge.fee)
        .with_metadata(metadata);
        let (invoice, payment) = self.db.settle_balance_invoice(invoice).await?;
        info!("🧾️ Invoice #{} for {} paid from the balance of user {}", invoice.id, invoice.amount, invoice.buyer_id);
        Ok((invoice, payment))
    }

    /// Records a withdrawal request of `amount` (fee included) to the Ethereum address `address`.
    ///
    /// The fee and the amount that will actually be sent are recorded in the withdrawal's metadata alongside the
    /// destination, so that the dispatcher and any operator can see the whole breakdown.
    pub async fn request_withdrawal(
        &self,
        user_id: i64,
        amount: Usd,
        address: &str,
    ) -> Result<Withdrawal, CheckoutError> {
        let address = address.trim();
        if !is_valid_eth_address(address) {
            return Err(CheckoutError::InvalidRequest(format!("{address} is not a valid Ethereum address")));
        }
        let charge = self.fees.withdrawal_charge(amount);
        if charge.amount_after_fee() <= Usd::ZERO {
            return Err(CheckoutError::InvalidRequest(format!("Cannot withdraw {amount}")));
        }
        self.balances.validate_sufficient_balance(user_id, USD_CURRENCY_CODE, charge.amount).await?;
        let metadata = json!({
            "address": address,
            "original_amount": charge.amount.to_string(),
            "fee_percentage": (charge.fee_rate * Decimal::ONE_HUNDRED).normalize().to_string(),
            "fee": charge.fee.to_string(),
            "amount_after_fee": charge.amount_after_fee().to_string(),
            "requested_at": timestamp(Utc::now()),
        });
        let withdrawal =
            NewWithdrawal::new(user_id, charge.amount, address).with_fee(charge.fee).with_metadata(metadata);
        let withdrawal = self.db.insert_withdrawal(withdrawal).await?;
        info!("💸️ Withdrawal #{} of {} requested by user {user_id}", withdrawal.id, withdrawal.amount);
        Ok(withdrawal)
    }

    /// Opens a USDT deposit with a dedicated receiving address. `expected` is only a hint; whatever arrives is
    /// credited.
    pub async fn open_usdt_deposit<W: DepositWatcher>(
        &self,
        watcher: &W,
        user_id: i64,
        expected: Option<Usd>,
    ) -> Result<OpenedDeposit, CheckoutError> {
        let amount = expected.unwrap_or(Usd::ZERO);
        if amount.is_negative() {
            return Err(CheckoutError::InvalidRequest(format!("Cannot deposit {amount}")));
        }
        let deposit = self.db.insert_deposit(NewDeposit::new(user_id, amount, DepositType::Usdt)).await?;
        let address = match watcher.create_deposit_address(deposit.id).await {
            Ok(address) => address,
            Err(e) => {
                warn!("🏦️ No receiving address for deposit #{}. {e}", deposit.id);
                let patch = json!({ "failure_reason": "address_unavailable", "failed_at": timestamp(Utc::now()) });
                self.db.fail_deposit(deposit.id, patch).await?;
                return Err(e.into());
            },
        };
        let patch = json!({
            "address": address.address,
            "address_index": address.index,
            "expires_at": timestamp(deposit.created_at + self.usdt_window),
        });
        let deposit = self
            .db
            .update_pending_deposit(deposit.id, None, patch)
            .await?
            .ok_or(LedgerError::DepositNotFound(deposit.id))?;
        info!("🏦️ USDT deposit #{} for user {user_id} is watching {}", deposit.id, address.address);
        Ok(OpenedDeposit { deposit, redirect_or_address: address.address })
    }

    /// Opens a card top-up through a hosted checkout.
    pub async fn open_stripe_deposit<G: CheckoutGateway>(
        &self,
        gateway: &G,
        user_id: i64,
        amount: Usd,
    ) -> Result<OpenedDeposit, CheckoutError> {
        let amount = amount.round_cents();
        if amount <= Usd::ZERO {
            return Err(CheckoutError::InvalidRequest(format!("Cannot deposit {amount}")));
        }
        let request =
            CheckoutRequest::new(amount, USD_CURRENCY_CODE, "Balance top-up", format!("deposit-user-{user_id}"))
                .with_metadata(json!({ "user_id": user_id, "purpose": "deposit" }));
        let checkout = gateway.create_checkout(request).await?;
        let deposit = NewDeposit::new(user_id, amount, DepositType::Stripe)
            .with_external_id(checkout.external_id.as_str())
            .with_metadata(json!({ "session_id": checkout.external_id, "checkout_url": checkout.redirect }));
        let deposit = self.db.insert_deposit(deposit).await?;
        info!("🏦️ Stripe deposit #{} of {amount} opened for user {user_id}", deposit.id);
        Ok(OpenedDeposit { deposit, redirect_or_address: checkout.redirect })
    }
}

fn validate_order(order: &InvoiceOrder) -> Result<(), CheckoutError> {
    if order.price <= Usd::ZERO {
        return Err(CheckoutError::InvalidRequest(format!("The price must be positive, not {}", order.price)));
    }
    if order.buyer_id == order.seller_id {
        return Err(CheckoutError::InvalidRequest("Buyers cannot pay themselves".into()));
    }
    Ok(())
}
