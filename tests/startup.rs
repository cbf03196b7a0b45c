//! Two-node startup over loopback: bootstrap, join, then writes against the
//! leader and the follower

use axum::body::Bytes;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use replog::common::NodeIdentity;
use replog::coordinator::raft_node::RaftNode;
use replog::coordinator::ConsensusEngine;
use replog::{Error, Node, NodeConfig};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

fn config(server_id: u64, address: &str, leader: Option<String>) -> NodeConfig {
    NodeConfig {
        server_id,
        address: address.to_string(),
        leader,
        join_attempts: 1,
        join_backoff_ms: 10,
        election_timeout_ms: 2_000,
        ..Default::default()
    }
}

struct RunningNode {
    addr: SocketAddr,
    engine: Arc<RaftNode>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<replog::Result<()>>,
}

impl RunningNode {
    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.await.unwrap().unwrap();
    }
}

async fn spawn_node(config: NodeConfig) -> RunningNode {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let engine = Arc::new(RaftNode::new(config.identity()));
    let (tx, rx) = oneshot::channel::<()>();
    let node = Node::new(config, engine.clone());
    let handle = tokio::spawn(async move {
        node.serve_with_listener(listener, async move {
            let _ = rx.await;
        })
        .await
    });
    RunningNode {
        addr,
        engine,
        shutdown: Some(tx),
        handle,
    }
}

/// Stand-in leader that records join bodies and answers with `statuses` in turn.
async fn stub_leader(statuses: Vec<StatusCode>) -> (SocketAddr, Arc<Mutex<Vec<String>>>) {
    let bodies = Arc::new(Mutex::new(Vec::new()));
    let calls = Arc::new(AtomicUsize::new(0));
    let recorded = bodies.clone();
    let app = Router::new().route(
        "/join",
        post(move |body: Bytes| {
            let recorded = recorded.clone();
            let calls = calls.clone();
            let statuses = statuses.clone();
            async move {
                recorded
                    .lock()
                    .unwrap()
                    .push(String::from_utf8_lossy(&body).to_string());
                let n = calls.fetch_add(1, Ordering::SeqCst);
                statuses[n.min(statuses.len() - 1)]
            }
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, bodies)
}

#[tokio::test]
async fn first_node_bootstraps_and_serves_writes() {
    // Advertise a listener that records joins; bootstrapping must never call it
    let (advertised, joins) = stub_leader(vec![StatusCode::ACCEPTED]).await;
    let address = advertised.to_string();
    let first = spawn_node(config(1, &address, None)).await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{}/", first.addr))
        .body("hello")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::ACCEPTED);
    assert_eq!(resp.text().await.unwrap(), "hello");

    assert!(first.engine.is_leader());
    let config = first.engine.configuration().unwrap();
    assert_eq!(config.servers, vec![NodeIdentity::new(1, &address).as_server()]);
    assert!(joins.lock().unwrap().is_empty());

    drop(client);
    first.stop().await;
}

#[tokio::test]
async fn second_node_joins_first() {
    let first = spawn_node(config(1, "127.0.0.1:9001", None)).await;
    let before = loop {
        match first.engine.configuration() {
            Ok(c) => break c,
            Err(_) => tokio::time::sleep(Duration::from_millis(5)).await,
        }
    };

    let second_engine = Arc::new(RaftNode::new(NodeIdentity::new(2, "127.0.0.1:9002")));
    let second = Node::new(
        config(2, "127.0.0.1:9002", Some(first.addr.to_string())),
        second_engine.clone(),
    );
    second.start().await.unwrap();

    let after = first.engine.configuration().unwrap();
    assert!(after.id > before.id);
    assert!(after.contains(1));
    assert!(after
        .servers
        .contains(&NodeIdentity::new(2, "127.0.0.1:9002").as_server()));
    assert!(!second_engine.is_leader());

    first.stop().await;
}

#[tokio::test]
async fn write_to_follower_is_rejected() {
    let first = spawn_node(config(1, "127.0.0.1:9001", None)).await;
    let second = spawn_node(config(2, "127.0.0.1:9002", Some(first.addr.to_string()))).await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{}/", second.addr))
        .body("hello")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!resp.text().await.unwrap().is_empty());
    assert!(second.engine.entries().is_empty());
    assert!(first.engine.configuration().unwrap().contains(2));

    drop(client);
    second.stop().await;
    first.stop().await;
}

#[tokio::test]
async fn join_sends_id_and_address() {
    let (leader, bodies) = stub_leader(vec![StatusCode::ACCEPTED]).await;
    let node = Node::new(
        config(2, "127.0.0.1:9002", Some(leader.to_string())),
        Arc::new(RaftNode::new(NodeIdentity::new(2, "127.0.0.1:9002"))),
    );

    node.start().await.unwrap();
    assert_eq!(*bodies.lock().unwrap(), vec!["2,127.0.0.1:9002".to_string()]);
}

#[tokio::test]
async fn join_rejection_is_fatal_without_retry() {
    let (leader, bodies) = stub_leader(vec![StatusCode::INTERNAL_SERVER_ERROR]).await;
    let node = Node::new(
        config(2, "127.0.0.1:9002", Some(leader.to_string())),
        Arc::new(RaftNode::new(NodeIdentity::new(2, "127.0.0.1:9002"))),
    );

    let err = node.start().await.unwrap_err();
    assert!(matches!(err, Error::JoinRejected { status: 500, .. }));
    assert_eq!(bodies.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn join_ok_status_is_not_accepted() {
    let (leader, _) = stub_leader(vec![StatusCode::OK]).await;
    let node = Node::new(
        config(2, "127.0.0.1:9002", Some(leader.to_string())),
        Arc::new(RaftNode::new(NodeIdentity::new(2, "127.0.0.1:9002"))),
    );

    assert!(node.start().await.is_err());
}

#[tokio::test]
async fn join_retries_until_accepted() {
    let (leader, bodies) = stub_leader(vec![
        StatusCode::INTERNAL_SERVER_ERROR,
        StatusCode::SERVICE_UNAVAILABLE,
        StatusCode::ACCEPTED,
    ])
    .await;
    let mut cfg = config(2, "127.0.0.1:9002", Some(leader.to_string()));
    cfg.join_attempts = 5;
    let node = Node::new(
        cfg,
        Arc::new(RaftNode::new(NodeIdentity::new(2, "127.0.0.1:9002"))),
    );

    node.start().await.unwrap();
    assert_eq!(bodies.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn invalid_config_never_starts() {
    let node = Node::new(
        config(0, "127.0.0.1:9001", None),
        Arc::new(RaftNode::new(NodeIdentity::new(0, "127.0.0.1:9001"))),
    );
    assert!(matches!(node.start().await, Err(Error::InvalidConfig(_))));
}
