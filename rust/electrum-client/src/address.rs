//! Address to script hash conversion.
//!
//! Electrum servers index outputs by the SHA-256 of their output script, with
//! the digest bytes reversed and hex-encoded.

use bitcoin::address::{Address, NetworkUnchecked};
use bitcoin::hashes::{sha256, Hash};
use electrum_core::{RpcError, ValidationError};

/// Script hash subscription key for `address`.
///
/// Accepts base58 and bech32 addresses of any network.
pub fn address_to_scripthash(address: &str) -> Result<String, RpcError> {
    let parsed: Address<NetworkUnchecked> = address
        .parse()
        .map_err(|e| ValidationError::InvalidAddress(format!("{address}: {e}")))?;

    let script = parsed.assume_checked().script_pubkey();
    let mut digest = sha256::Hash::hash(script.as_bytes()).to_byte_array();
    digest.reverse();

    Ok(sha256::Hash::from_byte_array(digest).to_string())
}
