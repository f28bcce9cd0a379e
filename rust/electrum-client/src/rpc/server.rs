use electrum_core::{RpcError, NO_PARAMS};
use serde::de::IgnoredAny;
use serde_json::Value;

use crate::types::{Peer, ServerFeatures};
use crate::{Client, CLIENT_VERSION, PROTOCOL_VERSION};

impl Client {
    /// Keep the connection alive and check that the server answers.
    pub async fn ping(&self) -> Result<(), RpcError> {
        self.session
            .request::<_, IgnoredAny>("server.ping", NO_PARAMS)
            .await?;
        Ok(())
    }

    /// Identify this client and negotiate the protocol version.
    ///
    /// Must be the first call on a connection, or the server assumes an older
    /// protocol. Returns the server software version and the negotiated
    /// protocol version.
    pub async fn server_version(&self) -> Result<(String, String), RpcError> {
        self.session
            .request("server.version", (CLIENT_VERSION, PROTOCOL_VERSION))
            .await
    }

    pub async fn server_banner(&self) -> Result<String, RpcError> {
        self.session.request("server.banner", NO_PARAMS).await
    }

    pub async fn server_donation_address(&self) -> Result<String, RpcError> {
        self.session
            .request("server.donation_address", NO_PARAMS)
            .await
    }

    pub async fn server_features(&self) -> Result<ServerFeatures, RpcError> {
        self.session.request("server.features", NO_PARAMS).await
    }

    /// Announce a server to the remote server's peer list. Servers use this;
    /// clients normally do not.
    pub async fn server_add_peer(&self, features: &ServerFeatures) -> Result<(), RpcError> {
        self.session
            .request::<_, IgnoredAny>("server.add_peer", [features])
            .await?;
        Ok(())
    }

    /// Peers the server knows about. Malformed entries are skipped.
    pub async fn server_peers(&self) -> Result<Vec<Peer>, RpcError> {
        let entries: Vec<Value> = self
            .session
            .request("server.peers.subscribe", NO_PARAMS)
            .await?;
        Ok(entries.iter().filter_map(parse_peer).collect())
    }
}

/// Decode one `[addr, host, [features...]]` tuple.
fn parse_peer(entry: &Value) -> Option<Peer> {
    let Some([addr, host, features]) = entry.as_array().map(Vec::as_slice) else {
        tracing::debug!(%entry, "bad peer data");
        return None;
    };
    let (Some(addr), Some(host)) = (addr.as_str(), host.as_str()) else {
        tracing::debug!(%entry, "bad peer address or host name");
        return None;
    };
    let Some(features) = features.as_array() else {
        tracing::debug!(%entry, "bad peer feature data");
        return None;
    };

    let features = features
        .iter()
        .filter_map(|feature| {
            let parsed = feature.as_str().map(str::to_owned);
            if parsed.is_none() {
                tracing::debug!(%feature, "bad peer feature");
            }
            parsed
        })
        .collect();

    Some(Peer {
        addr: addr.to_owned(),
        host: host.to_owned(),
        features,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn peer_tuple_parses() {
        let peer = parse_peer(&json!(["1.2.3.4", "electrum.example", ["v1.4", "s50002"]])).unwrap();
        assert_eq!(peer.addr, "1.2.3.4");
        assert_eq!(peer.host, "electrum.example");
        assert_eq!(peer.features, vec!["v1.4", "s50002"]);
    }

    #[test]
    fn malformed_peers_are_rejected() {
        assert!(parse_peer(&json!(["1.2.3.4", "host"])).is_none());
        assert!(parse_peer(&json!([1, "host", []])).is_none());
        assert!(parse_peer(&json!(["1.2.3.4", "host", "v1.4"])).is_none());
        assert!(parse_peer(&json!("1.2.3.4")).is_none());
    }

    #[test]
    fn non_string_features_are_dropped() {
        let peer = parse_peer(&json!(["a", "b", ["v1.4", 7, "p10000"]])).unwrap();
        assert_eq!(peer.features, vec!["v1.4", "p10000"]);
    }
}
