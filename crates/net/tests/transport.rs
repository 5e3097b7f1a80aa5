mod common;

use common::TestPki;
use pkchain_core::{Block, Operation, OperationResult, Transaction};
use pkchain_net::{
    CancellationToken, Message, NetError, PeerClient, PeerInfo, TransportConfig,
    TransportHandle, TransportListener,
};
use std::net::SocketAddr;
use std::time::Duration;

fn sample_tx() -> Transaction {
    Transaction::new(
        "client",
        Operation::Register {
            name: "alice".into(),
            public_key: "PK1".into(),
        },
        OperationResult::success(),
    )
}

async fn start(pki: &TestPki, name: &str, config: TransportConfig) -> TransportHandle {
    let creds = pki.credentials(name);
    TransportListener::new(config, &creds)
        .unwrap()
        .start(CancellationToken::new())
        .await
        .unwrap()
}

fn client(pki: &TestPki, name: &str) -> PeerClient {
    PeerClient::new(TransportConfig::local(), &pki.credentials(name)).unwrap()
}

/// An address nothing is listening on.
fn dead_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

#[tokio::test]
async fn test_send_and_receive() {
    let pki = TestPki::new();
    let mut handle = start(&pki, "alpha.local", TransportConfig::local()).await;
    let beta = client(&pki, "beta.local");

    let msg = Message::Transaction(sample_tx());
    beta.send(&PeerInfo::new("alpha.local", handle.local_addr), &msg)
        .await
        .unwrap();

    let received = tokio::time::timeout(Duration::from_secs(5), handle.inbound_rx.recv())
        .await
        .expect("timeout waiting for message")
        .expect("channel closed");
    assert_eq!(received.message, msg);
    assert!(received.from.ip().is_loopback());
    assert!(received.is_from("beta.local"));
    assert!(!received.is_from("alpha.local"));

    handle.stop().await;
}

#[tokio::test]
async fn test_request_gets_reply_on_same_connection() {
    let pki = TestPki::new();
    let mut handle = start(&pki, "alpha.local", TransportConfig::local()).await;
    let alpha = PeerInfo::new("alpha.local", handle.local_addr);

    tokio::spawn(async move {
        while let Some(inbound) = handle.inbound_rx.recv().await {
            if let Message::ChainRequest { from_id } = inbound.message {
                assert_eq!(from_id, 0);
                inbound
                    .responder
                    .reply(Message::ChainResponse(vec![Block::genesis()]));
            }
        }
    });

    let beta = client(&pki, "beta.local");
    let reply = beta
        .request(&alpha, &Message::ChainRequest { from_id: 0 })
        .await
        .unwrap();

    match reply {
        Message::ChainResponse(blocks) => {
            assert_eq!(blocks.len(), 1);
            assert_eq!(blocks[0].hash(), Block::genesis().hash());
        }
        other => panic!("unexpected reply: {:?}", other),
    }
}

#[tokio::test]
async fn test_several_messages_on_one_connection() {
    let pki = TestPki::new();
    let mut handle = start(&pki, "alpha.local", TransportConfig::local()).await;
    let beta = client(&pki, "beta.local");

    let mut conn = beta
        .connect(&PeerInfo::new("alpha.local", handle.local_addr))
        .await
        .unwrap();
    assert_eq!(conn.peer(), "alpha.local");

    let first = Message::Transaction(sample_tx());
    let second = Message::Transaction(sample_tx());
    conn.send(&first).await.unwrap();

    // The listener waits for a reply (or the responder to drop) before
    // reading the next envelope.
    let got = handle.inbound_rx.recv().await.unwrap();
    assert_eq!(got.message, first);
    drop(got.responder);

    conn.send(&second).await.unwrap();
    let got = handle.inbound_rx.recv().await.unwrap();
    assert_eq!(got.message, second);

    conn.close().await.unwrap();
}

#[tokio::test]
async fn test_untrusted_client_is_rejected() {
    let pki = TestPki::new();
    let rogue_pki = TestPki::new();
    let mut handle = start(&pki, "alpha.local", TransportConfig::local()).await;

    // Trusts nothing the listener signed and presents a foreign chain.
    let rogue = client(&rogue_pki, "rogue.local");
    let alpha = PeerInfo::new("alpha.local", handle.local_addr);
    let result = rogue
        .request(&alpha, &Message::ChainRequest { from_id: 0 })
        .await;
    assert!(result.is_err());

    let nothing =
        tokio::time::timeout(Duration::from_millis(300), handle.inbound_rx.recv()).await;
    assert!(nothing.is_err(), "untrusted message was delivered");
}

#[tokio::test]
async fn test_unreachable_peer_reports_network_unavailable() {
    let pki = TestPki::new();
    let beta = client(&pki, "beta.local");

    let err = beta
        .send(
            &PeerInfo::new("alpha.local", dead_addr()),
            &Message::Transaction(sample_tx()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, NetError::NetworkUnavailable { ref peer, .. } if peer == "alpha.local"));
    assert!(err.is_unreachable());
}

#[tokio::test]
async fn test_broadcast_collects_failures() {
    let pki = TestPki::new();
    let mut live = start(&pki, "alpha.local", TransportConfig::local()).await;
    let beta = client(&pki, "beta.local");

    let peers = vec![
        PeerInfo::new("alpha.local", live.local_addr),
        PeerInfo::new("gamma.local", dead_addr()),
    ];
    let msg = Message::Block(Block::genesis());
    let failures = beta.broadcast(&peers, &msg).await;

    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "gamma.local");

    let received = tokio::time::timeout(Duration::from_secs(5), live.inbound_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received.message, msg);
}

#[tokio::test]
async fn test_address_in_use_moves_to_retry_port() {
    let pki = TestPki::new();
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let config = TransportConfig {
        bind_addr: taken.local_addr().unwrap(),
        ..TransportConfig::local()
    };

    let handle = start(&pki, "alpha.local", config).await;
    assert_ne!(handle.local_addr, taken.local_addr().unwrap());
    assert!((1500..5000).contains(&handle.local_addr.port()));
    handle.stop().await;
}

#[tokio::test]
async fn test_address_in_use_without_retries_fails() {
    let pki = TestPki::new();
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let config = TransportConfig {
        bind_addr: taken.local_addr().unwrap(),
        bind_attempts: 1,
        ..TransportConfig::local()
    };

    let creds = pki.credentials("alpha.local");
    let result = TransportListener::new(config, &creds)
        .unwrap()
        .start(CancellationToken::new())
        .await;
    assert!(matches!(result, Err(NetError::AddressInUse { attempts: 1, .. })));
}

#[tokio::test]
async fn test_stopped_listener_refuses_connections() {
    let pki = TestPki::new();
    let handle = start(&pki, "alpha.local", TransportConfig::local()).await;
    let alpha = PeerInfo::new("alpha.local", handle.local_addr);
    handle.stop().await;

    let beta = client(&pki, "beta.local");
    let err = beta
        .send(&alpha, &Message::Transaction(sample_tx()))
        .await
        .unwrap_err();
    assert!(err.is_unreachable());
}
