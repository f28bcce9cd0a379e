mod common;

use std::collections::{BTreeMap, HashMap};

use common::{client, reply, reply_error};
use electrum_client::{
    Balance, BlockHeader, BlockHeaders, HistoryEntry, Host, MerkleProof, PositionProof, RpcError,
    ServerFeatures, Unspent, ValidationError, CLIENT_VERSION, PROTOCOL_VERSION,
};
use serde_json::json;

#[tokio::test]
async fn test_ping() {
    let (client, peer) = client();
    let server = reply(&peer, json!(null));

    client.ping().await.unwrap();

    let request = server.await.unwrap();
    assert_eq!(request["id"], json!(1));
    assert_eq!(request["method"], json!("server.ping"));
    assert_eq!(request["params"], json!([]));
}

#[tokio::test]
async fn test_server_version_identifies_client() {
    let (client, peer) = client();
    let server = reply(&peer, json!(["ElectrumX 1.16.0", "1.4"]));

    let (server_version, protocol) = client.server_version().await.unwrap();
    assert_eq!(server_version, "ElectrumX 1.16.0");
    assert_eq!(protocol, "1.4");

    let request = server.await.unwrap();
    assert_eq!(request["method"], json!("server.version"));
    assert_eq!(request["params"], json!([CLIENT_VERSION, PROTOCOL_VERSION]));
}

#[tokio::test]
async fn test_banner_and_donation() {
    let (client, peer) = client();

    let server = reply(&peer, json!("Welcome to Electrum!"));
    assert_eq!(client.server_banner().await.unwrap(), "Welcome to Electrum!");
    assert_eq!(server.await.unwrap()["method"], json!("server.banner"));

    let server = reply(&peer, json!("bc1q..."));
    assert_eq!(client.server_donation_address().await.unwrap(), "bc1q...");
    assert_eq!(
        server.await.unwrap()["method"],
        json!("server.donation_address")
    );
}

#[tokio::test]
async fn test_server_features_and_add_peer() {
    let (client, peer) = client();
    let expected = ServerFeatures {
        genesis_hash: "genesis".into(),
        hosts: HashMap::from([(
            "host1".to_string(),
            Host {
                tcp_port: Some(50001),
                ssl_port: Some(50002),
            },
        )]),
        protocol_max: "1.4".into(),
        protocol_min: "1.4".into(),
        pruning: None,
        server_version: "ElectrumX 1.16.0".into(),
        hash_function: "sha256".into(),
    };

    let server = reply(&peer, serde_json::to_value(&expected).unwrap());
    let features = client.server_features().await.unwrap();
    assert_eq!(features, expected);
    server.await.unwrap();

    let server = reply(&peer, json!(true));
    client.server_add_peer(&features).await.unwrap();
    let request = server.await.unwrap();
    assert_eq!(request["method"], json!("server.add_peer"));
    assert_eq!(request["params"][0]["genesis_hash"], json!("genesis"));
}

#[tokio::test]
async fn test_server_peers_skips_malformed_entries() {
    let (client, peer) = client();
    let server = reply(
        &peer,
        json!([
            ["83.212.111.114", "electrum.stoff.net", ["v1.4", "s50002", "t50001"]],
            ["bad"],
            [1, 2, 3],
            ["1.2.3.4", "onion.example", []],
        ]),
    );

    let peers = client.server_peers().await.unwrap();
    assert_eq!(server.await.unwrap()["method"], json!("server.peers.subscribe"));

    assert_eq!(peers.len(), 2);
    assert_eq!(peers[0].addr, "83.212.111.114");
    assert_eq!(peers[0].host, "electrum.stoff.net");
    assert_eq!(peers[0].features, vec!["v1.4", "s50002", "t50001"]);
    assert!(peers[1].features.is_empty());
}

#[tokio::test]
async fn test_fees() {
    let (client, peer) = client();

    let server = reply(&peer, json!(0.000123));
    assert_eq!(client.estimate_fee(6).await.unwrap(), 0.000123);
    let request = server.await.unwrap();
    assert_eq!(request["method"], json!("blockchain.estimatefee"));
    assert_eq!(request["params"], json!([6]));

    let server = reply(&peer, json!(0.00001));
    assert_eq!(client.relay_fee().await.unwrap(), 0.00001);
    assert_eq!(server.await.unwrap()["method"], json!("blockchain.relayfee"));
}

#[tokio::test]
async fn test_fee_histogram() {
    let (client, peer) = client();
    let server = reply(&peer, json!([[123, 456], [789, 101]]));

    let histogram = client.fee_histogram().await.unwrap();
    assert_eq!(histogram, BTreeMap::from([(123, 456), (789, 101)]));
    assert_eq!(
        server.await.unwrap()["method"],
        json!("mempool.get_fee_histogram")
    );
}

#[tokio::test]
async fn test_block_header() {
    let (client, peer) = client();

    let server = reply(&peer, json!("block_header"));
    let header = client.block_header(123, None).await.unwrap();
    assert_eq!(
        header,
        BlockHeader {
            header: "block_header".into(),
            ..Default::default()
        }
    );
    assert_eq!(server.await.unwrap()["params"], json!([123]));

    let expected = BlockHeader {
        branch: vec!["branch".into()],
        header: "block_header".into(),
        root: Some("root".into()),
    };
    let server = reply(&peer, serde_json::to_value(&expected).unwrap());
    assert_eq!(client.block_header(123, Some(456)).await.unwrap(), expected);
    assert_eq!(server.await.unwrap()["params"], json!([123, 456]));
}

#[tokio::test]
async fn test_block_headers() {
    let (client, peer) = client();

    let plain = json!({"count": 10, "hex": "block_headers", "max": 2016});
    let server = reply(&peer, plain);
    let headers = client.block_headers(123, 10, None).await.unwrap();
    assert_eq!(
        headers,
        BlockHeaders {
            count: 10,
            hex: "block_headers".into(),
            max: 2016,
            root: None,
            branch: vec![],
        }
    );
    let request = server.await.unwrap();
    assert_eq!(request["method"], json!("blockchain.block.headers"));
    assert_eq!(request["params"], json!([123, 10]));

    let proven = json!({
        "count": 10, "hex": "block_headers", "max": 2016,
        "root": "root", "branch": ["branch"],
    });
    let server = reply(&peer, proven);
    let headers = client.block_headers(123, 10, Some(456)).await.unwrap();
    assert_eq!(headers.root.as_deref(), Some("root"));
    assert_eq!(headers.branch, vec!["branch"]);
    assert_eq!(server.await.unwrap()["params"], json!([123, 10, 456]));
}

#[tokio::test]
async fn test_checkpoint_validation_sends_nothing() {
    let (client, peer) = client();

    let err = client.block_header(200, Some(100)).await.unwrap_err();
    assert!(matches!(
        err,
        RpcError::Validation(ValidationError::CheckpointHeight {
            highest: 200,
            checkpoint: 100
        })
    ));
    assert!(client.block_header(200, Some(200)).await.is_err());

    assert!(client.block_headers(100, 10, Some(105)).await.is_err());
    assert!(client.block_headers(100, 10, Some(110)).await.is_err());

    // Nothing reached the server: the first request it sees is this one.
    let server = reply(&peer, json!("ok"));
    assert_eq!(client.server_banner().await.unwrap(), "ok");
    assert_eq!(server.await.unwrap()["id"], json!(1));
}

#[tokio::test]
async fn test_scripthash_queries() {
    let (client, peer) = client();

    let server = reply(&peer, json!({"confirmed": 1.23, "unconfirmed": 4.56}));
    let balance = client.balance("scripthash").await.unwrap();
    assert_eq!(
        balance,
        Balance {
            confirmed: 1.23,
            unconfirmed: 4.56
        }
    );
    let request = server.await.unwrap();
    assert_eq!(request["method"], json!("blockchain.scripthash.get_balance"));
    assert_eq!(request["params"], json!(["scripthash"]));

    let server = reply(
        &peer,
        json!([{"tx_hash": "hash1", "height": 123}, {"tx_hash": "hash2", "height": 456}]),
    );
    let history = client.history("scripthash").await.unwrap();
    assert_eq!(
        history,
        vec![
            HistoryEntry {
                tx_hash: "hash1".into(),
                height: 123,
                fee: None
            },
            HistoryEntry {
                tx_hash: "hash2".into(),
                height: 456,
                fee: None
            },
        ]
    );
    server.await.unwrap();

    let server = reply(&peer, json!([{"tx_hash": "hash1", "height": 0, "fee": 123}]));
    let mempool = client.mempool("scripthash").await.unwrap();
    assert_eq!(mempool[0].fee, Some(123));
    assert_eq!(
        server.await.unwrap()["method"],
        json!("blockchain.scripthash.get_mempool")
    );

    let server = reply(
        &peer,
        json!([{"height": 123, "tx_pos": 1, "tx_hash": "hash1", "value": 100}]),
    );
    let unspent = client.list_unspent("scripthash").await.unwrap();
    assert_eq!(
        unspent,
        vec![Unspent {
            height: 123,
            tx_pos: 1,
            tx_hash: "hash1".into(),
            value: 100
        }]
    );
    assert_eq!(
        server.await.unwrap()["method"],
        json!("blockchain.scripthash.listunspent")
    );
}

#[tokio::test]
async fn test_transactions() {
    let (client, peer) = client();

    let server = reply(&peer, json!("tx_hash"));
    assert_eq!(client.broadcast_transaction("raw_tx").await.unwrap(), "tx_hash");
    let request = server.await.unwrap();
    assert_eq!(request["method"], json!("blockchain.transaction.broadcast"));
    assert_eq!(request["params"], json!(["raw_tx"]));

    let server = reply(&peer, json!({"blockhash": "block_hash", "confirmations": 3}));
    let tx = client.transaction("tx_hash").await.unwrap();
    assert_eq!(tx.blockhash, "block_hash");
    assert_eq!(tx.confirmations, 3);
    assert_eq!(server.await.unwrap()["params"], json!(["tx_hash", true]));

    let server = reply(&peer, json!("raw_tx"));
    assert_eq!(client.raw_transaction("tx_hash").await.unwrap(), "raw_tx");
    assert_eq!(server.await.unwrap()["params"], json!(["tx_hash", false]));
}

#[tokio::test]
async fn test_merkle_proofs() {
    let (client, peer) = client();

    let server = reply(
        &peer,
        json!({"merkle": ["merkle1"], "block_height": 123, "pos": 4}),
    );
    let proof = client.merkle_proof("tx_hash", 123).await.unwrap();
    assert_eq!(
        proof,
        MerkleProof {
            merkle: vec!["merkle1".into()],
            block_height: 123,
            pos: 4
        }
    );
    let request = server.await.unwrap();
    assert_eq!(request["method"], json!("blockchain.transaction.get_merkle"));
    assert_eq!(request["params"], json!(["tx_hash", 123]));

    let server = reply(&peer, json!("tx_hash"));
    assert_eq!(
        client.transaction_id_from_position(123, 456).await.unwrap(),
        "tx_hash"
    );
    assert_eq!(server.await.unwrap()["params"], json!([123, 456, false]));

    let server = reply(&peer, json!({"tx_hash": "tx_hash", "merkle": ["merkle1"]}));
    assert_eq!(
        client.merkle_proof_from_position(123, 456).await.unwrap(),
        PositionProof {
            tx_hash: "tx_hash".into(),
            merkle: vec!["merkle1".into()]
        }
    );
    assert_eq!(server.await.unwrap()["params"], json!([123, 456, true]));
}

#[tokio::test]
async fn test_server_error_surfaces() {
    let (client, peer) = client();
    let server = reply_error(&peer, 2, "daemon error: bad-txns-inputs-missingorspent");

    let err = client.broadcast_transaction("deadbeef").await.unwrap_err();
    match err {
        RpcError::Server(e) => {
            assert_eq!(e.code, 2);
            assert!(e.message.contains("missingorspent"));
        }
        other => panic!("unexpected {other:?}"),
    }
    server.await.unwrap();
    assert!(!client.is_shutdown());
}

#[tokio::test]
async fn test_calls_after_shutdown_fail_fast() {
    let (client, _peer) = client();
    client.shutdown();
    assert!(matches!(client.ping().await, Err(RpcError::Shutdown)));
    assert!(matches!(
        client.subscribe_headers().await,
        Err(RpcError::Shutdown)
    ));
}
