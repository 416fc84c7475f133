//! Two-node end-to-end tests: full TLS transport on loopback, real
//! databases, both friendship managers wired to their servers.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Mutex;

use lettered_friend::{FriendError, FriendManager};
use lettered_net::{Client, P2pServer, Registry, TransportError};
use lettered_shared::wire::{FriendInviteRequest, EVENT_FRIEND_INVITE};
use lettered_shared::{load_or_create_certificate, NodeCertificate, NodeId};
use lettered_store::Database;

struct TestNode {
    manager: FriendManager,
    identifier: String,
    node_id: NodeId,
    hostname: String,
    db: Arc<Mutex<Database>>,
}

async fn spawn_node(dir: &tempfile::TempDir, name: &str, alias: &str) -> TestNode {
    let cert: NodeCertificate = load_or_create_certificate(
        &dir.path().join(format!("{name}.cert")),
        &dir.path().join(format!("{name}.key")),
    )
    .unwrap();
    let node_id = cert.node_id().unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let hostname = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());

    let db = Arc::new(Mutex::new(
        Database::open_at(&dir.path().join(format!("{name}.db"))).unwrap(),
    ));
    let client = Client::new(&cert).unwrap();
    let manager = FriendManager::new(
        node_id.clone(),
        hostname.clone(),
        alias.to_string(),
        Arc::clone(&db),
        client,
    );

    let mut registry = Registry::new();
    let handler_manager = manager.clone();
    registry.on(
        EVENT_FRIEND_INVITE,
        move |caller: NodeId, request: FriendInviteRequest| {
            let manager = handler_manager.clone();
            async move { Ok(manager.receive_invite(&caller, &request).await?) }
        },
    );

    let server = P2pServer::new(&cert, registry).unwrap();
    tokio::spawn(async move {
        let _ = server.serve_on(listener).await;
    });

    TestNode {
        manager,
        identifier: format!("{node_id}@{hostname}"),
        node_id,
        hostname,
        db,
    }
}

async fn assert_friends(node: &TestNode, peer: &TestNode, expected_alias: &str) {
    let db = node.db.lock().await;
    assert!(
        db.friend_exists(peer.node_id.as_str()).unwrap(),
        "expected a friend row for the peer"
    );
    assert!(
        db.find_pending_request(peer.node_id.as_str())
            .unwrap()
            .is_none(),
        "no pending row may coexist with a friend row"
    );
    let friend = db
        .list_friends()
        .unwrap()
        .into_iter()
        .find(|f| f.node_id == peer.node_id.as_str())
        .unwrap();
    assert_eq!(friend.alias, expected_alias);
}

#[tokio::test]
async fn cold_invite_records_pending_on_both_sides() {
    let dir = tempfile::tempdir().unwrap();
    let a = spawn_node(&dir, "a", "Al").await;
    let b = spawn_node(&dir, "b", "Bo").await;

    a.manager.send_invite(&b.identifier).await.unwrap();

    let a_db = a.db.lock().await;
    let a_pending = a_db
        .find_pending_request(b.node_id.as_str())
        .unwrap()
        .unwrap();
    assert!(a_pending.is_initiator);
    assert_eq!(a_pending.hostname, b.hostname);
    assert!(!a_db.friend_exists(b.node_id.as_str()).unwrap());
    drop(a_db);

    let b_db = b.db.lock().await;
    let b_pending = b_db
        .find_pending_request(a.node_id.as_str())
        .unwrap()
        .unwrap();
    assert!(!b_pending.is_initiator);
    assert_eq!(b_pending.hostname, a.hostname);
    assert!(!b_db.friend_exists(a.node_id.as_str()).unwrap());
}

#[tokio::test]
async fn returned_invite_closes_friendship_on_both_sides() {
    let dir = tempfile::tempdir().unwrap();
    let a = spawn_node(&dir, "a", "Al").await;
    let b = spawn_node(&dir, "b", "Bo").await;

    a.manager.send_invite(&b.identifier).await.unwrap();
    b.manager.send_invite(&a.identifier).await.unwrap();

    assert_friends(&a, &b, "Bo").await;
    assert_friends(&b, &a, "Al").await;

    // Re-inviting an established friend is rejected locally.
    let err = a.manager.send_invite(&b.identifier).await.unwrap_err();
    assert!(matches!(err, FriendError::AlreadyFriend));
}

#[tokio::test]
async fn simultaneous_invites_converge() {
    let dir = tempfile::tempdir().unwrap();
    let a = spawn_node(&dir, "a", "Al").await;
    let b = spawn_node(&dir, "b", "Bo").await;

    let (ra, rb) = tokio::join!(
        a.manager.send_invite(&b.identifier),
        b.manager.send_invite(&a.identifier),
    );
    ra.unwrap();
    rb.unwrap();

    // Depending on the interleaving, either one handler observed the other
    // side's freshly written pending row and the pair closed immediately,
    // or both handlers ran first and both sides now hold initiator-marked
    // pending rows. In the latter case any single further invite closes
    // the friendship.
    let already_friends = a.db.lock().await.friend_exists(b.node_id.as_str()).unwrap();
    if !already_friends {
        a.manager.send_invite(&b.identifier).await.unwrap();
    }

    assert_friends(&a, &b, "Bo").await;
    assert_friends(&b, &a, "Al").await;
}

#[tokio::test]
async fn invite_to_peer_that_forgot_us_promotes_to_initiator() {
    let dir = tempfile::tempdir().unwrap();
    let a = spawn_node(&dir, "a", "Al").await;
    let b = spawn_node(&dir, "b", "Bo").await;

    // B once invited A, then wiped its database: only A remembers, as the
    // receiving side.
    {
        let a_db = a.db.lock().await;
        a_db.create_pending_request(b.node_id.as_str(), "stale-host:1", false)
            .unwrap();
    }

    a.manager.send_invite(&b.identifier).await.unwrap();

    let a_db = a.db.lock().await;
    let pending = a_db
        .find_pending_request(b.node_id.as_str())
        .unwrap()
        .unwrap();
    assert!(pending.is_initiator, "our view must promote to outbound");
    assert_eq!(pending.hostname, b.hostname, "hostname must be refreshed");
    drop(a_db);

    let b_db = b.db.lock().await;
    let b_pending = b_db
        .find_pending_request(a.node_id.as_str())
        .unwrap()
        .unwrap();
    assert!(!b_pending.is_initiator);
}

#[tokio::test]
async fn self_invite_is_rejected_without_side_effects() {
    let dir = tempfile::tempdir().unwrap();
    let a = spawn_node(&dir, "a", "Al").await;

    let err = a.manager.send_invite(&a.identifier).await.unwrap_err();
    assert!(matches!(err, FriendError::InviteSelf));

    let db = a.db.lock().await;
    assert!(db.list_friends().unwrap().is_empty());
    assert!(db.find_pending_request(a.node_id.as_str()).unwrap().is_none());
}

#[tokio::test]
async fn identity_mismatch_surfaces_and_mutates_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let a = spawn_node(&dir, "a", "Al").await;
    let b = spawn_node(&dir, "b", "Bo").await;

    // An identifier claiming a third identity answers at B's hostname.
    let imposter = load_or_create_certificate(
        &dir.path().join("c.cert"),
        &dir.path().join("c.key"),
    )
    .unwrap();
    let wrong = format!("{}@{}", imposter.node_id().unwrap(), b.hostname);

    let err = a.manager.send_invite(&wrong).await.unwrap_err();
    assert!(matches!(
        err,
        FriendError::Transport(TransportError::NodeIdMismatch { .. })
    ));

    let a_db = a.db.lock().await;
    assert!(a_db
        .find_pending_request(imposter.node_id().unwrap().as_str())
        .unwrap()
        .is_none());
    drop(a_db);

    // B never saw a frame, so it recorded nothing either.
    let b_db = b.db.lock().await;
    assert!(b_db
        .find_pending_request(a.node_id.as_str())
        .unwrap()
        .is_none());
}
