//! Result types of the Electrum protocol methods.
//!
//! Field names follow the protocol's JSON. Optional or server-dependent members
//! carry `#[serde(default)]` so that sparse answers still decode.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Ports a server listens on for one host name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_port: Option<u16>,
}

/// Answer to `server.features`; also the argument of `server.add_peer`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerFeatures {
    #[serde(default)]
    pub genesis_hash: String,
    #[serde(default)]
    pub hosts: HashMap<String, Host>,
    #[serde(default)]
    pub protocol_max: String,
    #[serde(default)]
    pub protocol_min: String,
    /// Pruning limit in blocks, if the server prunes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pruning: Option<u64>,
    #[serde(default)]
    pub server_version: String,
    #[serde(default)]
    pub hash_function: String,
}

/// One entry of `server.peers.subscribe`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    /// IP address or onion name.
    pub addr: String,
    pub host: String,
    /// Feature strings such as `v1.4`, `s50002`, `t50001`.
    pub features: Vec<String>,
}

/// Block header at a height, with its merkle branch when a checkpoint was given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    #[serde(default)]
    pub branch: Vec<String>,
    pub header: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
}

/// A run of consecutive block headers, concatenated as hex.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeaders {
    pub count: u32,
    pub hex: String,
    pub max: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    #[serde(default)]
    pub branch: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub confirmed: f64,
    pub unconfirmed: f64,
}

/// A transaction touching a script hash, confirmed or in the mempool.
///
/// Mempool entries have a height of 0 or -1 and carry a fee.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub tx_hash: String,
    pub height: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unspent {
    pub height: u32,
    pub tx_pos: u32,
    pub tx_hash: String,
    pub value: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptSig {
    #[serde(default)]
    pub asm: String,
    #[serde(default)]
    pub hex: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    #[serde(default)]
    pub txid: String,
    #[serde(default)]
    pub vout: u32,
    #[serde(default, rename = "scriptSig", skip_serializing_if = "Option::is_none")]
    pub script_sig: Option<ScriptSig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coinbase: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub txinwitness: Vec<String>,
    #[serde(default)]
    pub sequence: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptPubKey {
    #[serde(default)]
    pub asm: String,
    #[serde(default)]
    pub hex: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TxOutput {
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub n: u32,
    #[serde(default, rename = "scriptPubKey")]
    pub script_pub_key: ScriptPubKey,
}

/// Verbose form of `blockchain.transaction.get`, as the server's node
/// reports it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transaction {
    pub blockhash: String,
    pub blocktime: u64,
    pub confirmations: u64,
    pub hash: String,
    pub hex: String,
    pub locktime: u32,
    pub size: u32,
    pub time: u64,
    pub txid: String,
    pub version: i32,
    pub vsize: u32,
    pub weight: u32,
    pub vin: Vec<TxInput>,
    pub vout: Vec<TxOutput>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub merkle: Vec<String>,
    pub block_height: u32,
    pub pos: u32,
}

/// Answer to `blockchain.transaction.id_from_pos` with the merkle flag set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionProof {
    pub tx_hash: String,
    pub merkle: Vec<String>,
}

/// Chain tip as reported by `blockchain.headers.subscribe`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderNotification {
    pub height: u32,
    pub hex: String,
}

/// Status of one masternode collateral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasternodeStatus {
    pub collateral: String,
    pub status: String,
}

/// Status change of a tracked script hash.
///
/// `status` is `None` when the script hash has no history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScripthashNotification {
    pub scripthash: String,
    pub address: String,
    pub status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sparse_transaction_decodes() {
        let tx: Transaction = serde_json::from_value(json!({"blockhash": "00ab"})).unwrap();
        assert_eq!(tx.blockhash, "00ab");
        assert!(tx.vin.is_empty());
    }

    #[test]
    fn features_skip_absent_ports() {
        let features = ServerFeatures {
            hosts: HashMap::from([(
                "host1".to_string(),
                Host {
                    tcp_port: Some(50001),
                    ssl_port: None,
                },
            )]),
            ..Default::default()
        };
        let value = serde_json::to_value(&features).unwrap();
        assert_eq!(value["hosts"]["host1"], json!({"tcp_port": 50001}));
        assert!(value.get("pruning").is_none());
    }

    #[test]
    fn mempool_entry_carries_fee() {
        let entry: HistoryEntry =
            serde_json::from_value(json!({"tx_hash": "h", "height": -1, "fee": 250})).unwrap();
        assert_eq!(entry.height, -1);
        assert_eq!(entry.fee, Some(250));
    }
}
