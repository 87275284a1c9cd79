mod metadata;
mod tx_hash;

pub use metadata::{merge_metadata, pick_keys, timestamp};
pub use tx_hash::{is_valid_eth_address, is_valid_tx_hash, valid_tx_hash};
