use std::{fmt::Display, str::FromStr};

/// Parse a boolean flag from a string value, or return the given default value otherwise.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let value = match value {
        Some(v) => v,
        None => return default,
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

/// Parse an optional string value into `T`. Missing values yield `Ok(None)`; unparseable values yield the parse error
/// as a string so that the caller can decide whether to log and fall back to a default.
pub fn parse_env_value<T>(value: Option<String>) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: Display,
{
    match value {
        None => Ok(None),
        Some(s) => s.trim().parse::<T>().map(Some).map_err(|e| format!("'{s}' is invalid. {e}")),
    }
}
