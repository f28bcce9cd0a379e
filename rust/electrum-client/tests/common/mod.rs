#![allow(dead_code)]

use std::sync::Once;

use electrum_client::{Client, SessionConfig};
use electrum_core::{MemPeer, MemTransport};
use serde_json::{json, Value};
use tokio::task::JoinHandle;

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "electrum_core=debug,electrum_client=debug".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

pub fn client() -> (Client, MemPeer) {
    init_tracing();
    let (transport, peer) = MemTransport::pair();
    (Client::new(transport, SessionConfig::default()), peer)
}

/// Answer the next request with `result`, handing back the request.
pub fn reply(peer: &MemPeer, result: Value) -> JoinHandle<Value> {
    let peer = peer.clone();
    tokio::spawn(async move {
        let request = peer.recv_json().await.expect("client sent nothing");
        peer.send_json(&json!({"jsonrpc": "2.0", "id": request["id"], "result": result}))
            .await
            .expect("peer send failed");
        request
    })
}

/// Answer the next request with a server error.
pub fn reply_error(peer: &MemPeer, code: i64, message: &str) -> JoinHandle<Value> {
    let peer = peer.clone();
    let message = message.to_owned();
    tokio::spawn(async move {
        let request = peer.recv_json().await.expect("client sent nothing");
        peer.send_json(&json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "error": {"code": code, "message": message},
        }))
        .await
        .expect("peer send failed");
        request
    })
}

pub async fn notify(peer: &MemPeer, method: &str, params: Value) {
    peer.send_json(&json!({"jsonrpc": "2.0", "method": method, "params": params}))
        .await
        .expect("peer send failed");
}
