use electrum_core::RpcError;

use crate::types::{Balance, HistoryEntry, Unspent};
use crate::Client;

impl Client {
    /// Confirmed and unconfirmed balance of a script hash.
    pub async fn balance(&self, scripthash: &str) -> Result<Balance, RpcError> {
        self.session
            .request("blockchain.scripthash.get_balance", [scripthash])
            .await
    }

    /// Confirmed and mempool history of a script hash.
    pub async fn history(&self, scripthash: &str) -> Result<Vec<HistoryEntry>, RpcError> {
        self.session
            .request("blockchain.scripthash.get_history", [scripthash])
            .await
    }

    /// Unconfirmed transactions touching a script hash.
    pub async fn mempool(&self, scripthash: &str) -> Result<Vec<HistoryEntry>, RpcError> {
        self.session
            .request("blockchain.scripthash.get_mempool", [scripthash])
            .await
    }

    pub async fn list_unspent(&self, scripthash: &str) -> Result<Vec<Unspent>, RpcError> {
        self.session
            .request("blockchain.scripthash.listunspent", [scripthash])
            .await
    }
}
