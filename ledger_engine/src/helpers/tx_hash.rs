use std::sync::OnceLock;

use regex::Regex;

fn tx_hash_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(0x)?[0-9a-fA-F]{64}$").expect("static regex"))
}

fn eth_address_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("static regex"))
}

/// A transaction hash is valid if it is exactly 64 hex characters, after stripping an optional `0x` prefix.
/// Anything else is treated as if no hash were given at all.
pub fn is_valid_tx_hash(hash: &str) -> bool {
    tx_hash_regex().is_match(hash)
}

/// Returns the hash if it is valid, `None` otherwise.
pub fn valid_tx_hash(hash: Option<&str>) -> Option<&str> {
    hash.map(str::trim).filter(|h| is_valid_tx_hash(h))
}

pub fn is_valid_eth_address(address: &str) -> bool {
    eth_address_regex().is_match(address)
}
