mod helpers;
mod secret;
mod usd;

pub mod op;

pub use helpers::{parse_boolean_flag, parse_env_value};
pub use secret::Secret;
pub use usd::{Usd, UsdConversionError, USDT_DECIMALS, USD_CURRENCY_CODE};
