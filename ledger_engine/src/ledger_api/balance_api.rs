//! Balance queries.
//!
//! A balance is never stored. It is recomputed from the ledger on every call, with decimal arithmetic throughout, so
//! it is always a deterministic function of the ledger rows.
use std::fmt::Debug;

use ledger_common::{Usd, USD_CURRENCY_CODE};
use log::*;

use crate::{
    ledger_api::{
        balance_objects::{BalanceSheet, UserBalance},
        errors::BalanceError,
    },
    traits::BalanceManagement,
};

pub const SUPPORTED_CURRENCIES: [&str; 1] = [USD_CURRENCY_CODE];

pub struct BalanceApi<B> {
    db: B,
}

impl<B: Debug> Debug for BalanceApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BalanceApi ({:?})", self.db)
    }
}

impl<B: Clone> Clone for BalanceApi<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone() }
    }
}

impl<B> BalanceApi<B>
where B: BalanceManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    /// The user's balance in every currency they hold. Either the whole calculation succeeds or an error is returned;
    /// a failure is never reported as a zero balance.
    pub async fn calculate_balance(&self, user_id: i64) -> Result<BalanceSheet, BalanceError> {
        let entries = self.db.fetch_balance_entries(user_id).await?;
        let sheet = BalanceSheet::from_entries(&entries)?;
        trace!("🧮️ User {user_id} balance from {} entries: {sheet:?}", entries.len());
        Ok(sheet)
    }

    pub async fn get_balance(&self, user_id: i64) -> Result<UserBalance, BalanceError> {
        let sheet = self.calculate_balance(user_id).await?;
        Ok(UserBalance::from(&sheet))
    }

    /// Checks that the user's balance in `currency` covers `required`, returning the available balance if it does.
    ///
    /// Fails with `InvalidArgument` for an unsupported currency or a negative amount, and with `InsufficientFunds`
    /// if the balance is too low.
    pub async fn validate_sufficient_balance(
        &self,
        user_id: i64,
        currency: &str,
        required: Usd,
    ) -> Result<Usd, BalanceError> {
        let currency = currency.to_lowercase();
        if !SUPPORTED_CURRENCIES.contains(&currency.as_str()) {
            return Err(BalanceError::InvalidArgument(format!("Unsupported currency: {currency}")));
        }
        if required.is_negative() {
            return Err(BalanceError::InvalidArgument(format!("The required amount cannot be negative: {required}")));
        }
        let available = self.calculate_balance(user_id).await?.get(&currency);
        if available < required {
            debug!("🧮️ User {user_id} has {available} {currency} but needs {required}");
            return Err(BalanceError::InsufficientFunds { available, required });
        }
        Ok(available)
    }
}
