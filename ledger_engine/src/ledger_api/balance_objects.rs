use std::collections::BTreeMap;

use ledger_common::{Usd, USD_CURRENCY_CODE};
use serde::{Deserialize, Serialize};

use crate::traits::{BalanceEntry, LedgerError};

/// A user's spendable balance in every currency they hold, keyed by lowercase currency code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BalanceSheet(BTreeMap<String, Usd>);

impl BalanceSheet {
    /// Sums the signed contributions per currency. A sum that overflows means the ledger holds nonsense, and is
    /// reported as `InvalidData` rather than a wrong balance.
    pub fn from_entries(entries: &[BalanceEntry]) -> Result<Self, LedgerError> {
        let mut sheet = BTreeMap::new();
        for entry in entries {
            let total = sheet.entry(entry.currency.to_lowercase()).or_insert(Usd::ZERO);
            *total = total.checked_add(entry.signed_amount()).ok_or_else(|| {
                let (kind, id) = (entry.kind, entry.source_id);
                LedgerError::InvalidData(format!("{kind:?} #{id} overflows the {} balance", entry.currency))
            })?;
        }
        Ok(Self(sheet))
    }

    /// The balance in `currency`, or zero if the user has never held it.
    pub fn get(&self, currency: &str) -> Usd {
        self.0.get(&currency.to_lowercase()).copied().unwrap_or(Usd::ZERO)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Usd)> {
        self.0.iter()
    }

    pub fn into_inner(self) -> BTreeMap<String, Usd> {
        self.0
    }
}

/// The balance surface consumed by the request layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBalance {
    pub usd: Usd,
}

impl From<&BalanceSheet> for UserBalance {
    fn from(sheet: &BalanceSheet) -> Self {
        Self { usd: sheet.get(USD_CURRENCY_CODE) }
    }
}
