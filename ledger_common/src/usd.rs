use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
    str::FromStr,
};

use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::op;

pub const USD_CURRENCY_CODE: &str = "usd";
/// USDT on Ethereum is a 6-decimal token.
pub const USDT_DECIMALS: u32 = 6;

//--------------------------------------        Usd         ---------------------------------------------------------
/// A US dollar amount. All ledger arithmetic happens in exact decimal; floating point never touches money.
///
/// Serialises as a decimal string, e.g. `"49.98"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Usd(Decimal);

op!(binary Usd, Add, add);
op!(binary Usd, Sub, sub);
op!(inplace Usd, AddAssign, add_assign);
op!(inplace Usd, SubAssign, sub_assign);
op!(unary Usd, Neg, neg);

impl Sum for Usd {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Value cannot be represented as a USD amount: {0}")]
pub struct UsdConversionError(String);

impl From<Decimal> for Usd {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl FromStr for Usd {
    type Err = UsdConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim()).map(Self).map_err(|e| UsdConversionError(format!("{s}: {e}")))
    }
}

impl TryFrom<String> for Usd {
    type Error = UsdConversionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Display for Usd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Usd {
    pub const ZERO: Usd = Usd(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, 2))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// `None` on overflow. Use these rather than the operators for amounts that come from outside the ledger.
    pub fn checked_add(&self, other: Usd) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(&self, other: Usd) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn checked_mul(&self, factor: Decimal) -> Option<Self> {
        self.0.checked_mul(factor).map(Self)
    }

    /// Rounds half away from zero to whole cents.
    pub fn round_cents(&self) -> Self {
        Self(self.0.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    }

    /// `rate` is a fraction, so 3.5% is `0.035`. The result is rounded to cents.
    pub fn percent(&self, rate: Decimal) -> Self {
        Self(self.0 * rate).round_cents()
    }

    /// Converts to integer token units with `decimals` places. Precision beyond `decimals` is truncated.
    pub fn to_token_units(&self, decimals: u32) -> Result<u64, UsdConversionError> {
        if self.is_negative() {
            return Err(UsdConversionError(format!("{self} is negative")));
        }
        let scale = Decimal::from(10u64.pow(decimals));
        self.0
            .checked_mul(scale)
            .and_then(|v| v.trunc().to_u64())
            .ok_or_else(|| UsdConversionError(format!("{self} overflows {decimals}-decimal token units")))
    }

    pub fn from_token_units(units: u64, decimals: u32) -> Result<Self, UsdConversionError> {
        Decimal::try_from_i128_with_scale(i128::from(units), decimals)
            .map(|d| Self(d.normalize()))
            .map_err(|e| UsdConversionError(format!("{units} units at {decimals} decimals: {e}")))
    }
}
