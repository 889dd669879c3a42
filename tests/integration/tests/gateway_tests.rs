//! Gateway Integration Tests
//!
//! Runs one or more gateway nodes in-process over the in-memory store and broker,
//! so no Postgres or Redis is needed.
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use integration_tests::{wait_until, TestClient, TestCluster};
use serde_json::json;
use watch_cache::keys::{self, fields, item_fields, join_request};
use watch_cache::KeyValueStore;
use watch_core::{MediaItem, Permissions, PlayerState, RoleId, RoomId, RoomMember, UserId};
use watch_gateway::protocol::{JoinRoomResponse, OpCode};

/// Start a room owned by a fresh host who is already connected and inside it
async fn hosted_room(cluster: &TestCluster, node: usize, private: bool) -> (RoomId, UserId, TestClient) {
    let host = cluster.directory.add_user("host");
    let room = cluster.directory.add_room(host, private);

    let mut client = cluster.connect(node);
    client.authenticate(host).await.unwrap();
    client.join(room).await.unwrap();
    (room, host, client)
}

/// Connect a fresh user on `node` and put them in `room`
async fn member(cluster: &TestCluster, node: usize, room: RoomId, name: &str) -> (UserId, TestClient) {
    let user = cluster.directory.add_user(name);
    let mut client = cluster.connect(node);
    client.authenticate(user).await.unwrap();
    client.join(room).await.unwrap();
    (user, client)
}

// ============================================================================
// Authentication Tests
// ============================================================================

#[tokio::test]
async fn test_authenticate_creates_session() {
    let cluster = TestCluster::start(1).await.unwrap();
    let alice = cluster.directory.add_user("alice");

    let mut client = cluster.connect(0);
    let session_id = client.authenticate(alice).await.unwrap();

    assert_eq!(session_id, client.session_id());
    assert_eq!(client.session().user_id(), alice);

    let record = cluster.store.hget_all(&keys::session(&session_id)).await.unwrap();
    assert_eq!(record.get(fields::USER_ID), Some(&alice.to_string()));
    assert_eq!(record.get(fields::ROOM_ID).map(String::as_str), Some("0"));
    assert_eq!(
        record.get(fields::NODE_ID).map(String::as_str),
        Some(cluster.node(0).node_id())
    );
    assert!(cluster
        .store
        .sismember(&keys::user_sessions(alice), &session_id)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_invalid_token_disconnects() {
    let cluster = TestCluster::start(1).await.unwrap();
    let client = cluster.connect(0);

    client
        .send(OpCode::Authenticate, &json!({ "token": "Bearer nope" }))
        .await
        .unwrap();

    assert!(client.conn.is_disconnected());
    assert!(!client.session().is_authenticated());
}

#[tokio::test]
async fn test_unknown_user_disconnects() {
    let cluster = TestCluster::start(1).await.unwrap();
    let client = cluster.connect(0);

    client
        .send(OpCode::Authenticate, &json!({ "token": "token-999999999" }))
        .await
        .unwrap();

    assert!(client.conn.is_disconnected());
}

#[tokio::test]
async fn test_packets_before_authentication_are_ignored() {
    let cluster = TestCluster::start(1).await.unwrap();
    let owner = cluster.directory.add_user("owner");
    let room = cluster.directory.add_room(owner, false);

    let mut client = cluster.connect(0);
    client.send(OpCode::JoinRoom, &room).await.unwrap();

    client.expect_none(OpCode::JoinRoom).await.unwrap();
    assert!(!client.conn.is_disconnected());
    assert!(client.session().room_id().is_zero());
}

#[tokio::test]
async fn test_second_authenticate_is_ignored() {
    let cluster = TestCluster::start(1).await.unwrap();
    let alice = cluster.directory.add_user("alice");
    let bob = cluster.directory.add_user("bob");

    let mut client = cluster.connect(0);
    let session_id = client.authenticate(alice).await.unwrap();

    client
        .send(OpCode::Authenticate, &json!({ "token": integration_tests::token_for(bob) }))
        .await
        .unwrap();

    client.expect_none(OpCode::Authenticate).await.unwrap();
    assert_eq!(client.session().user_id(), alice);
    assert_eq!(client.session_id(), session_id);
}

// ============================================================================
// Session Reclaim Tests
// ============================================================================

#[tokio::test]
async fn test_unknown_session_falls_back_to_fresh_session() {
    let cluster = TestCluster::start(1).await.unwrap();
    let alice = cluster.directory.add_user("alice");

    let mut client = cluster.connect(0);
    let session_id = client
        .authenticate_with(alice, Some("no-such-session"))
        .await
        .unwrap();

    assert_ne!(session_id, "no-such-session");
    assert!(!client.conn.is_disconnected());
}

#[tokio::test]
async fn test_reclaim_after_disconnect_rejoins_room() {
    let cluster = TestCluster::start(2).await.unwrap();
    let (room, _host, mut host_client) = hosted_room(&cluster, 0, false).await;
    let (bob, bob_client) = member(&cluster, 1, room, "bob").await;
    let session_id = bob_client.session_id();

    host_client.expect(OpCode::AddUser).await.unwrap();
    bob_client.disconnect().await;

    let removed: UserId = host_client.expect_data(OpCode::RemoveUser).await.unwrap();
    assert_eq!(removed, bob);
    let ttl = cluster.store.ttl(&keys::session(&session_id)).await.unwrap();
    assert!(ttl.is_some(), "disconnected session should be on its grace period");

    let mut reconnected = cluster.connect(0);
    let reclaimed = reconnected
        .authenticate_with(bob, Some(&session_id))
        .await
        .unwrap();
    assert_eq!(reclaimed, session_id);

    let response: JoinRoomResponse = reconnected.expect_data(OpCode::JoinRoom).await.unwrap();
    assert_eq!(response.room.id, room);
    assert_eq!(reconnected.session().room_id(), room);

    let added: RoomMember = host_client.expect_data(OpCode::AddUser).await.unwrap();
    assert_eq!(added.user.id, bob);

    assert_eq!(cluster.store.ttl(&keys::session(&session_id)).await.unwrap(), None);
    assert_eq!(
        cluster
            .store
            .hget(&keys::session(&session_id), fields::NODE_ID)
            .await
            .unwrap()
            .as_deref(),
        Some(cluster.node(0).node_id())
    );
}

#[tokio::test]
async fn test_reclaim_takes_over_live_connection() {
    let cluster = TestCluster::start(2).await.unwrap();
    let (room, _host, mut host_client) = hosted_room(&cluster, 0, false).await;
    let (bob, stale) = member(&cluster, 0, room, "bob").await;
    let session_id = stale.session_id();
    host_client.expect(OpCode::AddUser).await.unwrap();

    let mut fresh = cluster.connect(1);
    fresh.authenticate_with(bob, Some(&session_id)).await.unwrap();
    fresh.expect(OpCode::JoinRoom).await.unwrap();

    let conn = stale.conn.clone();
    assert!(wait_until(|| conn.is_disconnected()).await);
    assert!(conn.is_superseded());

    // The superseded socket only releases its local state
    stale.disconnect().await;
    host_client.expect_none(OpCode::RemoveUser).await.unwrap();
    host_client.expect_none(OpCode::AddUser).await.unwrap();

    assert!(cluster
        .store
        .sismember(&keys::room_users(room), &bob.to_string())
        .await
        .unwrap());
    assert!(cluster
        .store
        .sismember(&keys::room_user_sessions(room, bob), &session_id)
        .await
        .unwrap());
    assert!(cluster.node(0).clients().get(&session_id).is_none());
    assert!(cluster.node(1).clients().get(&session_id).is_some());
}

#[tokio::test]
async fn test_reclaim_by_another_user_is_rejected() {
    let cluster = TestCluster::start(1).await.unwrap();
    let alice = cluster.directory.add_user("alice");
    let mallory = cluster.directory.add_user("mallory");

    let mut victim = cluster.connect(0);
    let session_id = victim.authenticate(alice).await.unwrap();

    let attacker = cluster.connect(0);
    attacker
        .send(
            OpCode::Authenticate,
            &json!({ "token": integration_tests::token_for(mallory), "sessionId": session_id }),
        )
        .await
        .unwrap();

    assert!(attacker.conn.is_disconnected());
    assert!(!victim.conn.is_disconnected());
    assert_eq!(
        cluster
            .store
            .hget(&keys::session(&session_id), fields::USER_ID)
            .await
            .unwrap(),
        Some(alice.to_string())
    );
}

#[tokio::test]
async fn test_reclaim_into_deleted_room_leaves_session_outside() {
    let cluster = TestCluster::start(1).await.unwrap();
    let alice = cluster.directory.add_user("alice");
    let room = cluster.directory.add_room(alice, false);

    let mut client = cluster.connect(0);
    let session_id = client.authenticate(alice).await.unwrap();
    client.join(room).await.unwrap();
    client.disconnect().await;

    cluster.directory.remove_room(room);

    let mut reconnected = cluster.connect(0);
    let reclaimed = reconnected
        .authenticate_with(alice, Some(&session_id))
        .await
        .unwrap();
    assert_eq!(reclaimed, session_id);

    reconnected.expect_none(OpCode::JoinRoom).await.unwrap();
    assert!(reconnected.session().room_id().is_zero());
    assert!(cluster.node(0).rooms().get(room).is_none());
}

#[tokio::test]
async fn test_reclaim_store_failure_reports_error_and_disconnects() {
    let cluster = TestCluster::start(1).await.unwrap();
    let (room, _host, _host_client) = hosted_room(&cluster, 0, false).await;
    let (bob, bob_client) = member(&cluster, 0, room, "bob").await;
    let session_id = bob_client.session_id();
    bob_client.disconnect().await;

    cluster.faults.fail(&keys::session(&session_id));

    let mut reconnected = cluster.connect(0);
    reconnected
        .send(
            OpCode::Authenticate,
            &json!({
                "token": format!("Bearer {}", integration_tests::token_for(bob)),
                "sessionId": session_id,
            }),
        )
        .await
        .unwrap();

    reconnected.expect(OpCode::Error).await.unwrap();
    assert!(reconnected.conn.is_disconnected());

    // The failed read did not fall back to a fresh session
    assert!(!reconnected.session().is_authenticated());
    assert_eq!(
        cluster
            .store
            .hget(&keys::session(&session_id), fields::ROOM_ID)
            .await
            .unwrap(),
        Some(room.to_string())
    );
}

// ============================================================================
// Room Membership Tests
// ============================================================================

#[tokio::test]
async fn test_join_announces_new_member_across_nodes() {
    let cluster = TestCluster::start(2).await.unwrap();
    let (room, host, mut host_client) = hosted_room(&cluster, 0, false).await;

    let bob = cluster.directory.add_user("bob");
    let mut bob_client = cluster.connect(1);
    bob_client.authenticate(bob).await.unwrap();
    let response = bob_client.join(room).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.room.id, room);
    assert_eq!(response.members[0].user.id, bob);
    assert!(response.members.iter().any(|m| m.user.id == host));
    assert_eq!(response.permissions, Permissions::empty());

    let added: RoomMember = host_client.expect_data(OpCode::AddUser).await.unwrap();
    assert_eq!(added.user.id, bob);
    bob_client.expect_none(OpCode::AddUser).await.unwrap();

    // A second session of the same user is not a new member
    let mut second = cluster.connect(0);
    second.authenticate(bob).await.unwrap();
    second.join(room).await.unwrap();
    host_client.expect_none(OpCode::AddUser).await.unwrap();
}

#[tokio::test]
async fn test_host_gets_full_permissions() {
    let cluster = TestCluster::start(1).await.unwrap();
    let host = cluster.directory.add_user("host");
    let room = cluster.directory.add_room(host, false);

    let mut client = cluster.connect(0);
    client.authenticate(host).await.unwrap();
    let response = client.join(room).await.unwrap();

    assert_eq!(response.permissions, Permissions::ALL);
    assert!(client.session().has_permission(Permissions::MANAGE_ROLES));
}

#[tokio::test]
async fn test_join_unknown_room_is_ignored() {
    let cluster = TestCluster::start(1).await.unwrap();
    let alice = cluster.directory.add_user("alice");

    let mut client = cluster.connect(0);
    client.authenticate(alice).await.unwrap();
    client.send(OpCode::JoinRoom, &RoomId::new(424_242)).await.unwrap();

    client.expect_none(OpCode::JoinRoom).await.unwrap();
    assert!(client.session().room_id().is_zero());
}

#[tokio::test]
async fn test_leave_room_announces_removal() {
    let cluster = TestCluster::start(2).await.unwrap();
    let (room, _host, mut host_client) = hosted_room(&cluster, 0, false).await;
    let (bob, bob_client) = member(&cluster, 1, room, "bob").await;
    host_client.expect(OpCode::AddUser).await.unwrap();

    bob_client.send(OpCode::LeaveRoom, &()).await.unwrap();

    let removed: UserId = host_client.expect_data(OpCode::RemoveUser).await.unwrap();
    assert_eq!(removed, bob);
    assert!(bob_client.session().room_id().is_zero());
    assert_eq!(
        cluster
            .store
            .hget(&keys::session(&bob_client.session_id()), fields::ROOM_ID)
            .await
            .unwrap()
            .as_deref(),
        Some("0")
    );
    assert!(!cluster
        .store
        .sismember(&keys::room_users(room), &bob.to_string())
        .await
        .unwrap());
}

#[tokio::test]
async fn test_joining_another_room_leaves_the_first() {
    let cluster = TestCluster::start(1).await.unwrap();
    let (first, _host, mut host_client) = hosted_room(&cluster, 0, false).await;
    let (bob, mut bob_client) = member(&cluster, 0, first, "bob").await;
    host_client.expect(OpCode::AddUser).await.unwrap();

    let other_owner = cluster.directory.add_user("other");
    let second = cluster.directory.add_room(other_owner, false);
    let response = bob_client.join(second).await.unwrap();

    assert_eq!(response.room.id, second);
    let removed: UserId = host_client.expect_data(OpCode::RemoveUser).await.unwrap();
    assert_eq!(removed, bob);
    assert_eq!(bob_client.session().room_id(), second);
}

#[tokio::test]
async fn test_disconnect_announces_removal_after_last_session() {
    let cluster = TestCluster::start(2).await.unwrap();
    let (room, _host, mut host_client) = hosted_room(&cluster, 0, false).await;
    let (bob, first) = member(&cluster, 0, room, "bob").await;
    host_client.expect(OpCode::AddUser).await.unwrap();

    let mut second = cluster.connect(1);
    second.authenticate(bob).await.unwrap();
    second.join(room).await.unwrap();

    let first_session = first.session_id();
    first.disconnect().await;
    host_client.expect_none(OpCode::RemoveUser).await.unwrap();
    assert!(!cluster
        .store
        .sismember(&keys::user_sessions(bob), &first_session)
        .await
        .unwrap());

    second.disconnect().await;
    let removed: UserId = host_client.expect_data(OpCode::RemoveUser).await.unwrap();
    assert_eq!(removed, bob);
    assert_eq!(
        cluster.store.scard(&keys::room_user_sessions(room, bob)).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn test_disconnect_reconciles_interrupted_join() {
    let cluster = TestCluster::start(1).await.unwrap();
    let (room, _host, mut host_client) = hosted_room(&cluster, 0, false).await;

    let bob = cluster.directory.add_user("bob");
    let mut bob_client = cluster.connect(0);
    let session_id = bob_client.authenticate(bob).await.unwrap();

    // Store membership committed, local session never marked
    let batch = watch_cache::WriteBatch::new()
        .sadd(keys::room_users(room), bob.to_string())
        .sadd(keys::room_user_sessions(room, bob), session_id.clone())
        .hset(keys::session(&session_id), fields::ROOM_ID, room.to_string());
    cluster.store.apply(batch).await.unwrap();

    bob_client.disconnect().await;

    let removed: UserId = host_client.expect_data(OpCode::RemoveUser).await.unwrap();
    assert_eq!(removed, bob);
    assert!(!cluster
        .store
        .sismember(&keys::room_users(room), &bob.to_string())
        .await
        .unwrap());
}

#[tokio::test]
async fn test_leave_keeps_user_with_concurrent_session() {
    let cluster = TestCluster::start(1).await.unwrap();
    let (room, _host, mut host_client) = hosted_room(&cluster, 0, false).await;
    let (bob, bob_client) = member(&cluster, 0, room, "bob").await;
    host_client.expect(OpCode::AddUser).await.unwrap();

    // A second session of bob whose join landed in the store
    cluster
        .store
        .sadd(&keys::room_user_sessions(room, bob), "concurrent-session")
        .await
        .unwrap();

    bob_client.send(OpCode::LeaveRoom, &()).await.unwrap();

    host_client.expect_none(OpCode::RemoveUser).await.unwrap();
    assert!(cluster
        .store
        .sismember(&keys::room_users(room), &bob.to_string())
        .await
        .unwrap());
    assert_eq!(
        cluster.store.smembers(&keys::room_user_sessions(room, bob)).await.unwrap(),
        vec!["concurrent-session".to_string()]
    );
}

// ============================================================================
// Private Room Tests
// ============================================================================

#[tokio::test]
async fn test_private_room_join_request_flow() {
    let cluster = TestCluster::start(2).await.unwrap();
    let (room, _host, mut host_client) = hosted_room(&cluster, 0, true).await;

    let carol = cluster.directory.add_user("carol");
    let mut carol_client = cluster.connect(1);
    carol_client.authenticate(carol).await.unwrap();
    carol_client.send(OpCode::JoinRoom, &room).await.unwrap();

    carol_client.expect_none(OpCode::JoinRoom).await.unwrap();
    let notification = host_client.expect(OpCode::AddNotification).await.unwrap();
    assert_eq!(notification.d["type"], "joinRequest");
    assert_eq!(notification.d["data"]["id"], json!(carol));
    assert_eq!(
        cluster
            .store
            .hget(&keys::room_join_requests(room), &carol.to_string())
            .await
            .unwrap()
            .as_deref(),
        Some(join_request::PENDING)
    );

    host_client.send(OpCode::RoomJoinRequest, &carol).await.unwrap();
    let accepted: RoomId = carol_client.expect_data(OpCode::RoomJoinRequest).await.unwrap();
    assert_eq!(accepted, room);

    let response = carol_client.join(room).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(
        cluster
            .store
            .hget(&keys::room_join_requests(room), &carol.to_string())
            .await
            .unwrap(),
        None
    );

    // Only members allowed to manage the room see join requests
    let dave = cluster.directory.add_user("dave");
    let mut dave_client = cluster.connect(0);
    dave_client.authenticate(dave).await.unwrap();
    dave_client.send(OpCode::JoinRoom, &room).await.unwrap();

    host_client.expect(OpCode::AddNotification).await.unwrap();
    carol_client.expect_none(OpCode::AddNotification).await.unwrap();
}

#[tokio::test]
async fn test_pending_request_is_not_repeated() {
    let cluster = TestCluster::start(1).await.unwrap();
    let (room, _host, mut host_client) = hosted_room(&cluster, 0, true).await;

    let carol = cluster.directory.add_user("carol");
    let mut carol_client = cluster.connect(0);
    carol_client.authenticate(carol).await.unwrap();

    carol_client.send(OpCode::JoinRoom, &room).await.unwrap();
    host_client.expect(OpCode::AddNotification).await.unwrap();

    carol_client.send(OpCode::JoinRoom, &room).await.unwrap();
    host_client.expect_none(OpCode::AddNotification).await.unwrap();
    carol_client.expect_none(OpCode::JoinRoom).await.unwrap();
}

// ============================================================================
// Player Tests
// ============================================================================

#[tokio::test]
async fn test_player_state_reaches_everyone_but_sender_once() {
    let cluster = TestCluster::start(2).await.unwrap();
    let (room, _host, mut host_client) = hosted_room(&cluster, 0, false).await;
    let (_carol, mut carol_client) = member(&cluster, 0, room, "carol").await;
    let (_bob, mut bob_client) = member(&cluster, 1, room, "bob").await;

    host_client
        .send(OpCode::PlayerState, &json!({ "playing": true, "currentTime": 12.5 }))
        .await
        .unwrap();

    for client in [&mut carol_client, &mut bob_client] {
        let state: PlayerState = client.expect_data(OpCode::PlayerState).await.unwrap();
        assert!(state.playing);
        assert!((state.current_time - 12.5).abs() < f64::EPSILON);
        client.expect_none(OpCode::PlayerState).await.unwrap();
    }
    host_client.expect_none(OpCode::PlayerState).await.unwrap();

    let stored = cluster.store.hget_all(&keys::room_state(room)).await.unwrap();
    assert_eq!(stored.get("playing").map(String::as_str), Some("1"));
}

#[tokio::test]
async fn test_player_control_requires_permission() {
    let cluster = TestCluster::start(1).await.unwrap();
    let (room, _host, mut host_client) = hosted_room(&cluster, 0, false).await;
    let (_bob, mut bob_client) = member(&cluster, 0, room, "bob").await;

    bob_client
        .send(OpCode::PlayerState, &json!({ "playing": false, "currentTime": 1.0 }))
        .await
        .unwrap();
    bob_client.send(OpCode::Seek, &30.0).await.unwrap();

    host_client.expect_none(OpCode::PlayerState).await.unwrap();
    host_client.expect_none(OpCode::Seek).await.unwrap();
    bob_client.expect_none(OpCode::Error).await.unwrap();
    assert!(!bob_client.conn.is_disconnected());
}

#[tokio::test]
async fn test_seek_is_relayed() {
    let cluster = TestCluster::start(2).await.unwrap();
    let (room, _host, host_client) = hosted_room(&cluster, 0, false).await;
    let (_bob, mut bob_client) = member(&cluster, 1, room, "bob").await;

    host_client.send(OpCode::Seek, &42.0).await.unwrap();

    let time: f64 = bob_client.expect_data(OpCode::Seek).await.unwrap();
    assert!((time - 42.0).abs() < f64::EPSILON);
}

// ============================================================================
// Queue Tests
// ============================================================================

#[tokio::test]
async fn test_queue_add_plays_then_queues() {
    let cluster = TestCluster::start(2).await.unwrap();
    let (room, host, mut host_client) = hosted_room(&cluster, 0, false).await;
    let (_bob, mut bob_client) = member(&cluster, 1, room, "bob").await;

    host_client
        .send(OpCode::QueueAdd, &"https://www.youtube.com/watch?v=abc123")
        .await
        .unwrap();

    for client in [&mut host_client, &mut bob_client] {
        let playing: Option<MediaItem> = client.expect_data(OpCode::VideoSet).await.unwrap();
        let playing = playing.unwrap();
        assert_eq!(playing.url, "https://www.youtube.com/embed/abc123");
        assert_eq!(playing.author, host);
        let state: PlayerState = client.expect_data(OpCode::PlayerState).await.unwrap();
        assert!(!state.playing);
    }

    host_client
        .send(OpCode::QueueAdd, &"https://example.com/next.mp4")
        .await
        .unwrap();

    let queued: MediaItem = bob_client.expect_data(OpCode::QueueAdd).await.unwrap();
    assert_eq!(queued.url, "https://example.com/next.mp4");
    assert_eq!(cluster.store.llen(&keys::room_queue(room)).await.unwrap(), 1);

    host_client.send(OpCode::VideoSkip, &()).await.unwrap();

    let removed: String = bob_client.expect_data(OpCode::QueueRemove).await.unwrap();
    assert_eq!(removed, queued.id);
    let playing: Option<MediaItem> = bob_client.expect_data(OpCode::VideoSet).await.unwrap();
    assert_eq!(playing, Some(queued));
    assert_eq!(cluster.store.llen(&keys::room_queue(room)).await.unwrap(), 0);
}

#[tokio::test]
async fn test_skip_with_empty_queue_clears_current_item() {
    let cluster = TestCluster::start(1).await.unwrap();
    let (room, _host, mut host_client) = hosted_room(&cluster, 0, false).await;

    host_client
        .send(OpCode::QueueAdd, &"https://example.com/only.mp4")
        .await
        .unwrap();
    host_client.expect(OpCode::VideoSet).await.unwrap();

    host_client.send(OpCode::VideoSkip, &()).await.unwrap();
    let playing: Option<MediaItem> = host_client.expect_data(OpCode::VideoSet).await.unwrap();
    assert!(playing.is_none());
    assert!(!cluster.store.exists(&keys::room_current_item(room)).await.unwrap());

    // Nothing queued and nothing playing
    host_client.send(OpCode::VideoSkip, &()).await.unwrap();
    host_client.expect_none(OpCode::VideoSet).await.unwrap();
}

#[tokio::test]
async fn test_queue_remove_respects_authorship() {
    let cluster = TestCluster::start(1).await.unwrap();
    let (room, _host, mut host_client) = hosted_room(&cluster, 0, false).await;

    let bob = cluster.directory.add_user("bob");
    cluster.directory.grant(bob, room, RoleId::MEMBER);
    let mut bob_client = cluster.connect(0);
    bob_client.authenticate(bob).await.unwrap();
    bob_client.join(room).await.unwrap();

    host_client
        .send(OpCode::QueueAdd, &"https://example.com/first.mp4")
        .await
        .unwrap();
    host_client
        .send(OpCode::QueueAdd, &"https://example.com/second.mp4")
        .await
        .unwrap();
    let hosts_item: MediaItem = bob_client.expect_data(OpCode::QueueAdd).await.unwrap();
    host_client.expect(OpCode::QueueAdd).await.unwrap();

    bob_client.send(OpCode::QueueRemove, &hosts_item.id).await.unwrap();
    host_client.expect_none(OpCode::QueueRemove).await.unwrap();
    assert_eq!(cluster.store.llen(&keys::room_queue(room)).await.unwrap(), 1);

    bob_client
        .send(OpCode::QueueAdd, &"https://example.com/mine.mp4")
        .await
        .unwrap();
    let bobs_item: MediaItem = host_client.expect_data(OpCode::QueueAdd).await.unwrap();
    bob_client.send(OpCode::QueueRemove, &bobs_item.id).await.unwrap();

    let removed: String = host_client.expect_data(OpCode::QueueRemove).await.unwrap();
    assert_eq!(removed, bobs_item.id);
    bob_client.expect(OpCode::QueueRemove).await.unwrap();

    // Managers can remove anything
    host_client.send(OpCode::QueueRemove, &hosts_item.id).await.unwrap();
    let removed: String = bob_client.expect_data(OpCode::QueueRemove).await.unwrap();
    assert_eq!(removed, hosts_item.id);
    assert_eq!(cluster.store.llen(&keys::room_queue(room)).await.unwrap(), 0);

    // Already gone
    host_client.send(OpCode::QueueRemove, &hosts_item.id).await.unwrap();
    bob_client.expect_none(OpCode::QueueRemove).await.unwrap();
}

#[tokio::test]
async fn test_queue_add_requires_permission() {
    let cluster = TestCluster::start(1).await.unwrap();
    let (room, _host, mut host_client) = hosted_room(&cluster, 0, false).await;
    let (_bob, bob_client) = member(&cluster, 0, room, "bob").await;

    bob_client
        .send(OpCode::QueueAdd, &"https://example.com/nope.mp4")
        .await
        .unwrap();

    host_client.expect_none(OpCode::VideoSet).await.unwrap();
    assert!(!cluster.store.exists(&keys::room_current_item(room)).await.unwrap());
}

#[tokio::test]
async fn test_video_end_advances_after_enough_acks() {
    let cluster = TestCluster::start(1).await.unwrap();
    let (room, _host, mut host_client) = hosted_room(&cluster, 0, false).await;
    let (_bob, mut bob_client) = member(&cluster, 0, room, "bob").await;

    host_client
        .send(OpCode::QueueAdd, &"https://example.com/one.mp4")
        .await
        .unwrap();
    let current: Option<MediaItem> = bob_client.expect_data(OpCode::VideoSet).await.unwrap();
    let current = current.unwrap();
    host_client
        .send(OpCode::QueueAdd, &"https://example.com/two.mp4")
        .await
        .unwrap();
    let next: MediaItem = bob_client.expect_data(OpCode::QueueAdd).await.unwrap();

    // An ack for an item that is not playing is ignored
    bob_client.send(OpCode::VideoEnd, &"stale-item").await.unwrap();
    host_client.expect_none(OpCode::QueueRemove).await.unwrap();

    bob_client.send(OpCode::VideoEnd, &current.id).await.unwrap();
    let playing: Option<MediaItem> = bob_client.expect_data(OpCode::VideoSet).await.unwrap();
    assert_eq!(playing, Some(next));
    assert_eq!(cluster.store.scard(&keys::room_video_end_ack(room)).await.unwrap(), 0);
}

#[tokio::test]
async fn test_concurrent_video_end_advances_once() {
    let cluster = TestCluster::start(2).await.unwrap();
    let (room, _host, mut host_client) = hosted_room(&cluster, 0, false).await;
    let (_bob, mut bob_client) = member(&cluster, 1, room, "bob").await;

    for url in [
        "https://example.com/one.mp4",
        "https://example.com/two.mp4",
        "https://example.com/three.mp4",
    ] {
        host_client.send(OpCode::QueueAdd, &url).await.unwrap();
    }
    let first: Option<MediaItem> = bob_client.expect_data(OpCode::VideoSet).await.unwrap();
    let first = first.unwrap();
    let second: MediaItem = bob_client.expect_data(OpCode::QueueAdd).await.unwrap();
    let third: MediaItem = bob_client.expect_data(OpCode::QueueAdd).await.unwrap();

    let (host_sent, bob_sent) = tokio::join!(
        host_client.send(OpCode::VideoEnd, &first.id),
        bob_client.send(OpCode::VideoEnd, &first.id),
    );
    host_sent.unwrap();
    bob_sent.unwrap();

    assert_eq!(
        cluster
            .store
            .hget(&keys::room_current_item(room), item_fields::ID)
            .await
            .unwrap(),
        Some(second.id.clone())
    );
    assert_eq!(
        cluster.store.lrange(&keys::room_queue(room)).await.unwrap(),
        vec![third.id]
    );

    let playing: Option<MediaItem> = bob_client.expect_data(OpCode::VideoSet).await.unwrap();
    assert_eq!(playing, Some(second));
    bob_client.expect_none(OpCode::VideoSet).await.unwrap();
}

#[tokio::test]
async fn test_resync_replays_playback_to_local_rooms() {
    let cluster = TestCluster::start(2).await.unwrap();
    let (room, _host, mut host_client) = hosted_room(&cluster, 0, false).await;
    let (_bob, mut bob_client) = member(&cluster, 1, room, "bob").await;

    host_client
        .send(OpCode::QueueAdd, &"https://example.com/now.mp4")
        .await
        .unwrap();
    let playing: Option<MediaItem> = bob_client.expect_data(OpCode::VideoSet).await.unwrap();
    host_client
        .send(OpCode::PlayerState, &json!({ "playing": true, "currentTime": 12.0 }))
        .await
        .unwrap();
    bob_client.drain();
    host_client.drain();

    watch_gateway::handlers::resync_local_rooms(cluster.node(1)).await;

    let replayed: Option<MediaItem> = bob_client.expect_data(OpCode::VideoSet).await.unwrap();
    assert_eq!(replayed, playing);
    let state: PlayerState = bob_client.expect_data(OpCode::PlayerState).await.unwrap();
    assert!(state.playing);
    assert!(state.current_time >= 12.0);
    // Only the lagging node's sockets are resent
    host_client.expect_none(OpCode::VideoSet).await.unwrap();
}

#[tokio::test]
async fn test_joiner_receives_current_item_and_state() {
    let cluster = TestCluster::start(2).await.unwrap();
    let (room, _host, mut host_client) = hosted_room(&cluster, 0, false).await;

    host_client
        .send(OpCode::QueueAdd, &"https://example.com/now.mp4")
        .await
        .unwrap();
    host_client.expect(OpCode::VideoSet).await.unwrap();
    host_client
        .send(OpCode::PlayerState, &json!({ "playing": true, "currentTime": 5.0 }))
        .await
        .unwrap();

    let (_bob, mut bob_client) = member(&cluster, 1, room, "bob").await;
    let playing: Option<MediaItem> = bob_client.expect_data(OpCode::VideoSet).await.unwrap();
    assert_eq!(playing.unwrap().url, "https://example.com/now.mp4");
    let state: PlayerState = bob_client.expect_data(OpCode::PlayerState).await.unwrap();
    assert!(state.playing);
    assert!(state.current_time >= 5.0);
}

// ============================================================================
// Moderation Tests
// ============================================================================

#[tokio::test]
async fn test_kick_across_nodes() {
    let cluster = TestCluster::start(2).await.unwrap();
    let (room, _host, mut host_client) = hosted_room(&cluster, 0, false).await;
    let (bob, mut bob_client) = member(&cluster, 1, room, "bob").await;
    host_client.expect(OpCode::AddUser).await.unwrap();

    host_client.send(OpCode::KickUser, &bob).await.unwrap();

    bob_client.expect(OpCode::KickUser).await.unwrap();
    assert!(bob_client.session().room_id().is_zero());

    let removed: UserId = host_client.expect_data(OpCode::RemoveUser).await.unwrap();
    assert_eq!(removed, bob);
    assert!(!cluster
        .store
        .sismember(&keys::room_users(room), &bob.to_string())
        .await
        .unwrap());
    assert_eq!(
        cluster
            .store
            .hget(&keys::session(&bob_client.session_id()), fields::ROOM_ID)
            .await
            .unwrap()
            .as_deref(),
        Some("0")
    );

    // Kicked sockets stop receiving room traffic
    host_client.send(OpCode::Seek, &3.0).await.unwrap();
    bob_client.expect_none(OpCode::Seek).await.unwrap();
}

#[tokio::test]
async fn test_kick_requires_higher_rank() {
    let cluster = TestCluster::start(1).await.unwrap();
    let (room, host, mut host_client) = hosted_room(&cluster, 0, false).await;

    let bob = cluster.directory.add_user("bob");
    cluster.directory.grant(bob, room, RoleId::MANAGER);
    let mut bob_client = cluster.connect(0);
    bob_client.authenticate(bob).await.unwrap();
    bob_client.join(room).await.unwrap();

    bob_client.send(OpCode::KickUser, &host).await.unwrap();

    host_client.expect_none(OpCode::KickUser).await.unwrap();
    assert_eq!(host_client.session().room_id(), room);
}

#[tokio::test]
async fn test_kick_between_equal_ranks_changes_nothing() {
    let cluster = TestCluster::start(1).await.unwrap();
    let (room, _host, _host_client) = hosted_room(&cluster, 0, false).await;

    let mut managers = Vec::new();
    for name in ["bob", "carol"] {
        let user = cluster.directory.add_user(name);
        cluster.directory.grant(user, room, RoleId::MANAGER);
        let mut client = cluster.connect(0);
        client.authenticate(user).await.unwrap();
        client.join(room).await.unwrap();
        managers.push((user, client));
    }
    let (carol, mut carol_client) = managers.pop().unwrap();
    let (_bob, mut bob_client) = managers.pop().unwrap();
    bob_client.drain();
    carol_client.drain();

    let writes = cluster.store.write_count();
    bob_client.send(OpCode::KickUser, &carol).await.unwrap();

    carol_client.expect_none(OpCode::KickUser).await.unwrap();
    bob_client.expect_none(OpCode::RemoveUser).await.unwrap();
    assert_eq!(cluster.store.write_count(), writes);
    assert_eq!(carol_client.session().room_id(), room);
    assert!(cluster
        .store
        .sismember(&keys::room_users(room), &carol.to_string())
        .await
        .unwrap());
}

#[tokio::test]
async fn test_role_grant_and_revoke_across_nodes() {
    let cluster = TestCluster::start(2).await.unwrap();
    let (room, _host, mut host_client) = hosted_room(&cluster, 0, false).await;
    let (_carol, mut carol_client) = member(&cluster, 0, room, "carol").await;
    let (bob, mut bob_client) = member(&cluster, 1, room, "bob").await;

    let update = json!({ "userId": bob, "roleId": RoleId::MANAGER });
    host_client.send(OpCode::AddRole, &update).await.unwrap();

    let granted: Permissions = bob_client.expect_data(OpCode::UpdatePermissions).await.unwrap();
    let manager = RoleId::MANAGER.role().unwrap();
    assert_eq!(granted, manager.permissions);
    assert!(bob_client.session().roles().contains(RoleId::MANAGER));
    assert!(cluster.directory.roles_of(bob, room).contains(&RoleId::MANAGER));

    let echo = carol_client.expect(OpCode::AddRole).await.unwrap();
    assert_eq!(echo.d["userId"], json!(bob));
    host_client.expect_none(OpCode::AddRole).await.unwrap();

    host_client.send(OpCode::RemoveRole, &update).await.unwrap();

    let revoked: Permissions = bob_client.expect_data(OpCode::UpdatePermissions).await.unwrap();
    assert_eq!(revoked, Permissions::empty());
    assert!(!bob_client.session().roles().contains(RoleId::MANAGER));
    assert!(cluster.directory.roles_of(bob, room).is_empty());
    carol_client.expect(OpCode::RemoveRole).await.unwrap();
}

#[tokio::test]
async fn test_role_changes_are_bounded() {
    let cluster = TestCluster::start(1).await.unwrap();
    let (room, host, host_client) = hosted_room(&cluster, 0, false).await;

    let bob = cluster.directory.add_user("bob");
    cluster.directory.grant(bob, room, RoleId::MANAGER);
    let mut bob_client = cluster.connect(0);
    bob_client.authenticate(bob).await.unwrap();
    bob_client.join(room).await.unwrap();
    let (carol, mut carol_client) = member(&cluster, 0, room, "carol").await;

    // Nobody can hand out a role at their own rank
    host_client
        .send(OpCode::AddRole, &json!({ "userId": carol, "roleId": RoleId::HOST }))
        .await
        .unwrap();
    // Managers cannot manage roles at all
    bob_client
        .send(OpCode::AddRole, &json!({ "userId": carol, "roleId": RoleId::MEMBER }))
        .await
        .unwrap();
    // Nobody can change their own roles
    host_client
        .send(OpCode::RemoveRole, &json!({ "userId": host, "roleId": RoleId::HOST }))
        .await
        .unwrap();

    carol_client.expect_none(OpCode::UpdatePermissions).await.unwrap();
    assert!(cluster.directory.roles_of(carol, room).is_empty());
    assert!(host_client.session().roles().contains(RoleId::HOST));
}
