//! Fee calculation.
//!
//! All fees are computed here and nowhere else. The computed fee is stored on the invoice or withdrawal row at
//! creation time, and everything downstream (balances in particular) reads the stored value rather than recomputing
//! it.
use ledger_common::Usd;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::db_types::InvoiceType;

/// 0.1%
pub const DEFAULT_PLATFORM_FEE_RATE: Decimal = Decimal::from_parts(1, 0, 0, false, 3);
/// 3.5%
pub const DEFAULT_STRIPE_MARKUP_RATE: Decimal = Decimal::from_parts(35, 0, 0, false, 3);
/// 0.1%
pub const DEFAULT_WITHDRAWAL_FEE_RATE: Decimal = Decimal::from_parts(1, 0, 0, false, 3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InvoiceCharge {
    /// The price the seller set
    pub base: Usd,
    /// What the buyer is charged
    pub amount: Usd,
    /// Deducted from the seller's proceeds when the payment completes
    pub fee: Usd,
}

impl InvoiceCharge {
    pub fn seller_proceeds(&self) -> Usd {
        self.amount - self.fee
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WithdrawalCharge {
    pub amount: Usd,
    pub fee: Usd,
    pub fee_rate: Decimal,
}

impl WithdrawalCharge {
    pub fn amount_after_fee(&self) -> Usd {
        self.amount - self.fee
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSchedule {
    pub platform_rate: Decimal,
    pub stripe_markup_rate: Decimal,
    pub withdrawal_rate: Decimal,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            platform_rate: DEFAULT_PLATFORM_FEE_RATE,
            stripe_markup_rate: DEFAULT_STRIPE_MARKUP_RATE,
            withdrawal_rate: DEFAULT_WITHDRAWAL_FEE_RATE,
        }
    }
}

impl FeeSchedule {
    /// * Stripe: the buyer pays the base price plus the card processing markup. The invoice fee covers the markup and
    ///   the platform fee, so the seller nets `base - platform fee`.
    /// * Lightning: the buyer pays the base price and the platform fee is deducted.
    /// * Balance: internal transfers carry no fee.
    pub fn invoice_charge(&self, base: Usd, invoice_type: InvoiceType) -> InvoiceCharge {
        let base = base.round_cents();
        let platform = base.percent(self.platform_rate);
        match invoice_type {
            InvoiceType::Stripe => {
                let markup = base.percent(self.stripe_markup_rate);
                InvoiceCharge { base, amount: base + markup, fee: markup + platform }
            },
            InvoiceType::Lightning => InvoiceCharge { base, amount: base, fee: platform },
            InvoiceType::Balance => InvoiceCharge { base, amount: base, fee: Usd::ZERO },
        }
    }

    pub fn withdrawal_charge(&self, amount: Usd) -> WithdrawalCharge {
        let amount = amount.round_cents();
        WithdrawalCharge { amount, fee: amount.percent(self.withdrawal_rate), fee_rate: self.withdrawal_rate }
    }
}
