use electrum_core::RpcError;

use crate::types::{MerkleProof, PositionProof, Transaction};
use crate::Client;

impl Client {
    /// Submit a raw transaction (hex). Returns its transaction hash.
    pub async fn broadcast_transaction(&self, raw_tx: &str) -> Result<String, RpcError> {
        self.session
            .request("blockchain.transaction.broadcast", [raw_tx])
            .await
    }

    /// Decoded transaction, as the server's node reports it.
    pub async fn transaction(&self, tx_hash: &str) -> Result<Transaction, RpcError> {
        self.session
            .request("blockchain.transaction.get", (tx_hash, true))
            .await
    }

    /// Serialized transaction as hex.
    pub async fn raw_transaction(&self, tx_hash: &str) -> Result<String, RpcError> {
        self.session
            .request("blockchain.transaction.get", (tx_hash, false))
            .await
    }

    /// Merkle branch proving a confirmed transaction is in the block at `height`.
    pub async fn merkle_proof(&self, tx_hash: &str, height: u32) -> Result<MerkleProof, RpcError> {
        self.session
            .request("blockchain.transaction.get_merkle", (tx_hash, height))
            .await
    }

    /// Hash of the transaction at position `pos` of the block at `height`.
    pub async fn transaction_id_from_position(
        &self,
        height: u32,
        pos: u32,
    ) -> Result<String, RpcError> {
        self.session
            .request("blockchain.transaction.id_from_pos", (height, pos, false))
            .await
    }

    /// Like [`Client::transaction_id_from_position`], with the merkle branch.
    pub async fn merkle_proof_from_position(
        &self,
        height: u32,
        pos: u32,
    ) -> Result<PositionProof, RpcError> {
        self.session
            .request("blockchain.transaction.id_from_pos", (height, pos, true))
            .await
    }
}
