//! End-to-end behavior of a match room session against the in-memory
//! backend: optimistic mutations, rollback, the live reconciler, and
//! reconnect recovery.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::watch;
use tokio::time::sleep;
use uuid::Uuid;

use pitchside_client::{
    backend::{
        MatchBackend,
        memory::{FaultPoint, MemoryBackend},
    },
    config::ClientConfig,
    error::SyncError,
    model::{ChatMessage, CreateMatchRequest, GeoPoint, MatchId, MatchStatus, UserId},
    services::{chat_service, roster_service, snapshot_service, stream_service},
    session::SessionContext,
    state::{MatchSession, SharedSession},
};

fn test_config() -> ClientConfig {
    ClientConfig {
        mutation_timeout: Duration::from_secs(1),
        reconnect_initial_delay: Duration::from_millis(50),
        reconnect_max_delay: Duration::from_millis(200),
        ..ClientConfig::default()
    }
}

struct Fixture {
    memory: MemoryBackend,
    backend: Arc<dyn MatchBackend>,
    match_id: MatchId,
    host: UserId,
}

/// Host a fresh match as "Ana" with the given capacity.
async fn hosted_match(capacity: u32) -> Fixture {
    let memory = MemoryBackend::with_event_capacity(test_config().event_channel_capacity);
    let host = Uuid::new_v4();
    memory.register_profile(host, "Ana");
    let backend: Arc<dyn MatchBackend> = Arc::new(memory.clone());

    let host_session = SessionContext::signed_in(host);
    let snapshot = roster_service::host_match(
        &backend,
        &host_session,
        CreateMatchRequest {
            stadium_name: "Hackney Marshes".to_string(),
            max_players: capacity,
            location: GeoPoint {
                latitude: 51.556,
                longitude: -0.0357,
            },
            start_time: SystemTime::now() + Duration::from_secs(3_600),
        },
    )
    .await
    .expect("hosting failed");

    Fixture {
        memory,
        backend,
        match_id: snapshot.details.id,
        host,
    }
}

/// Open the hosted match as a second user with a loaded snapshot.
async fn opened_room(fixture: &Fixture, user: UserId) -> SharedSession {
    opened_room_with(fixture, user, &test_config()).await
}

async fn opened_room_with(
    fixture: &Fixture,
    user: UserId,
    config: &ClientConfig,
) -> SharedSession {
    let session = Arc::new(SessionContext::signed_in(user));
    let room = MatchSession::new(fixture.match_id, fixture.backend.clone(), session, config);
    snapshot_service::refresh(&room).await.expect("refresh failed");
    room
}

fn chat_at(fixture: &Fixture, sender: UserId, text: &str, offset: Duration) -> ChatMessage {
    ChatMessage {
        id: Uuid::new_v4(),
        match_id: fixture.match_id,
        sender_id: sender,
        text: text.to_string(),
        created_at: SystemTime::UNIX_EPOCH + offset,
        sender_name: None,
    }
}

#[tokio::test]
async fn join_and_leave_fold_into_the_confirmed_roster() {
    let fixture = hosted_match(10).await;
    let ben = Uuid::new_v4();
    let room = opened_room(&fixture, ben).await;

    let view = roster_service::join_match(&room).await.expect("join failed");
    assert!(view.joined);
    assert!(!view.roster_pending);
    assert_eq!(view.players, 2);
    assert_eq!(view.roster, vec![fixture.host, ben]);

    // Joining twice is a local precondition failure.
    assert!(matches!(
        roster_service::join_match(&room).await,
        Err(SyncError::AlreadyJoined)
    ));

    let view = roster_service::leave_match(&room)
        .await
        .expect("leave failed");
    assert!(!view.joined);
    assert_eq!(view.players, 1);
    assert_eq!(view.roster, vec![fixture.host]);

    assert!(matches!(
        roster_service::leave_match(&room).await,
        Err(SyncError::NotJoined)
    ));
}

#[tokio::test]
async fn repeated_projection_of_unchanged_state_is_identical() {
    let fixture = hosted_match(10).await;
    let ben = Uuid::new_v4();
    let room = opened_room(&fixture, ben).await;
    roster_service::join_match(&room).await.expect("join failed");
    chat_service::send_message(&room, "anyone bringing bibs?")
        .await
        .expect("send failed");

    let first = room.current_view().await.expect("no view");
    let second = room.current_view().await.expect("no view");
    assert_eq!(first, second);
}

#[tokio::test]
async fn own_messages_are_never_duplicated_by_the_stream() {
    let fixture = hosted_match(10).await;
    let ben = Uuid::new_v4();
    let room = opened_room(&fixture, ben).await;

    let (shutdown, shutdown_rx) = watch::channel(false);
    let reconciler = tokio::spawn(stream_service::run(
        room.clone(),
        test_config(),
        shutdown_rx,
    ));
    sleep(Duration::from_millis(100)).await;

    roster_service::join_match(&room).await.expect("join failed");
    let view = chat_service::send_message(&room, "on my way")
        .await
        .expect("send failed");
    assert_eq!(view.messages.len(), 1);
    assert!(!view.messages[0].pending);

    // Give the echo time to arrive; it must be discarded, not merged.
    sleep(Duration::from_millis(200)).await;
    let view = room.current_view().await.expect("no view");
    assert_eq!(view.messages.len(), 1);
    assert_eq!(view.messages[0].text, "on my way");

    shutdown.send(true).ok();
    reconciler.await.expect("reconciler panicked");
}

#[tokio::test]
async fn failed_join_restores_the_roster_exactly() {
    let fixture = hosted_match(10).await;
    let carol = Uuid::new_v4();
    fixture
        .backend
        .join_match(fixture.match_id, carol)
        .await
        .expect("seeding carol failed");

    let ben = Uuid::new_v4();
    let room = opened_room(&fixture, ben).await;
    fixture.memory.inject_fault(FaultPoint::Join, 1);

    let err = roster_service::join_match(&room)
        .await
        .expect_err("join should have failed");
    assert!(matches!(err, SyncError::Transient(_)));
    assert!(err.is_retryable());

    let view = room.current_view().await.expect("no view");
    assert_eq!(view.roster, vec![fixture.host, carol]);
    assert!(!view.joined);
    assert!(!view.roster_pending);

    // The fault was consumed; the retry goes through.
    let view = roster_service::join_match(&room).await.expect("retry failed");
    assert_eq!(view.roster, vec![fixture.host, carol, ben]);
}

#[tokio::test]
async fn out_of_order_events_render_in_timestamp_order() {
    let fixture = hosted_match(10).await;
    let ben = Uuid::new_v4();
    let room = opened_room(&fixture, ben).await;

    let (shutdown, shutdown_rx) = watch::channel(false);
    let reconciler = tokio::spawn(stream_service::run(
        room.clone(),
        test_config(),
        shutdown_rx,
    ));
    sleep(Duration::from_millis(100)).await;

    // Later timestamp delivered first.
    fixture.memory.push_message(chat_at(
        &fixture,
        fixture.host,
        "kickoff moved to 7",
        Duration::from_secs(1_000),
    ));
    sleep(Duration::from_millis(50)).await;
    fixture.memory.push_message(chat_at(
        &fixture,
        fixture.host,
        "who has the ball?",
        Duration::from_secs(500),
    ));
    sleep(Duration::from_millis(200)).await;

    let view = room.current_view().await.expect("no view");
    let texts: Vec<&str> = view.messages.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["who has the ball?", "kickoff moved to 7"]);
    assert!(view.messages.iter().all(|m| m.sender_name == "Ana"));

    shutdown.send(true).ok();
    reconciler.await.expect("reconciler panicked");
}

#[tokio::test]
async fn full_match_rejects_the_join_without_a_backend_call() {
    let fixture = hosted_match(2).await;
    let carol = Uuid::new_v4();
    fixture
        .backend
        .join_match(fixture.match_id, carol)
        .await
        .expect("seeding carol failed");

    let ben = Uuid::new_v4();
    let room = opened_room(&fixture, ben).await;
    let view = room.current_view().await.expect("no view");
    assert_eq!(view.status, MatchStatus::Full);

    let calls_before = fixture.memory.join_call_count();
    assert!(matches!(
        roster_service::join_match(&room).await,
        Err(SyncError::AlreadyFull)
    ));
    assert_eq!(fixture.memory.join_call_count(), calls_before);
}

#[tokio::test]
async fn disconnect_recovers_without_gaps_or_duplicates() {
    let fixture = hosted_match(10).await;
    let ben = Uuid::new_v4();
    let room = opened_room(&fixture, ben).await;

    let (shutdown, shutdown_rx) = watch::channel(false);
    let reconciler = tokio::spawn(stream_service::run(
        room.clone(),
        test_config(),
        shutdown_rx,
    ));
    sleep(Duration::from_millis(100)).await;

    fixture.memory.push_message(chat_at(
        &fixture,
        fixture.host,
        "before the drop",
        Duration::from_secs(100),
    ));
    sleep(Duration::from_millis(100)).await;

    fixture.memory.disconnect_thread(fixture.match_id);
    // Inserted while no subscription is live; only the re-fetched
    // snapshot can surface it.
    fixture.memory.push_message(chat_at(
        &fixture,
        fixture.host,
        "during the gap",
        Duration::from_secs(200),
    ));

    // Long enough for the backoff to elapse and the resubscribe to settle.
    sleep(Duration::from_millis(400)).await;
    fixture.memory.push_message(chat_at(
        &fixture,
        fixture.host,
        "after the reconnect",
        Duration::from_secs(300),
    ));
    sleep(Duration::from_millis(200)).await;

    let view = room.current_view().await.expect("no view");
    let texts: Vec<&str> = view.messages.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(
        texts,
        vec!["before the drop", "during the gap", "after the reconnect"]
    );

    shutdown.send(true).ok();
    reconciler.await.expect("reconciler panicked");
}

#[tokio::test]
async fn hung_join_times_out_and_rolls_back() {
    let fixture = hosted_match(10).await;
    let ben = Uuid::new_v4();
    let config = ClientConfig {
        mutation_timeout: Duration::from_millis(100),
        ..test_config()
    };
    let room = opened_room_with(&fixture, ben, &config).await;
    fixture
        .memory
        .inject_delay(FaultPoint::Join, Duration::from_secs(10));

    let err = roster_service::join_match(&room)
        .await
        .expect_err("join should have timed out");
    assert!(matches!(err, SyncError::Timeout));
    assert!(err.is_retryable());

    let view = room.current_view().await.expect("no view");
    assert_eq!(view.roster, vec![fixture.host]);
    assert!(!view.joined);
    assert!(!view.roster_pending);

    // The stalled call was abandoned; a retry settles normally.
    let view = roster_service::join_match(&room).await.expect("retry failed");
    assert_eq!(view.roster, vec![fixture.host, ben]);
}

#[tokio::test]
async fn hung_send_times_out_and_rolls_back() {
    let fixture = hosted_match(10).await;
    let ben = Uuid::new_v4();
    let config = ClientConfig {
        mutation_timeout: Duration::from_millis(100),
        ..test_config()
    };
    let room = opened_room_with(&fixture, ben, &config).await;
    fixture
        .memory
        .inject_delay(FaultPoint::Send, Duration::from_secs(10));

    let err = chat_service::send_message(&room, "anyone there?")
        .await
        .expect_err("send should have timed out");
    assert!(matches!(err, SyncError::Timeout));

    let view = room.current_view().await.expect("no view");
    assert!(view.messages.is_empty());

    let view = chat_service::send_message(&room, "anyone there?")
        .await
        .expect("retry failed");
    assert_eq!(view.messages.len(), 1);
    assert!(!view.messages[0].pending);
}

#[tokio::test]
async fn refresh_match_updates_roster_without_touching_the_thread() {
    let fixture = hosted_match(10).await;
    let ben = Uuid::new_v4();
    let room = opened_room(&fixture, ben).await;

    let carol = Uuid::new_v4();
    fixture
        .backend
        .join_match(fixture.match_id, carol)
        .await
        .expect("seeding carol failed");
    // Stored but never streamed; only a full thread refetch can surface it.
    fixture.memory.push_message(chat_at(
        &fixture,
        fixture.host,
        "unseen",
        Duration::from_secs(50),
    ));

    let view = snapshot_service::refresh_match(&room)
        .await
        .expect("roster refresh failed");
    assert_eq!(view.roster, vec![fixture.host, carol]);
    assert!(view.messages.is_empty());

    let view = snapshot_service::refresh(&room).await.expect("refresh failed");
    assert_eq!(view.messages.len(), 1);
}

#[tokio::test]
async fn blank_message_text_is_rejected_locally() {
    let fixture = hosted_match(10).await;
    let room = opened_room(&fixture, Uuid::new_v4()).await;

    assert!(matches!(
        chat_service::send_message(&room, "   ").await,
        Err(SyncError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn signed_out_sessions_cannot_mutate() {
    let fixture = hosted_match(10).await;
    let session = Arc::new(SessionContext::new());
    let room = MatchSession::new(
        fixture.match_id,
        fixture.backend.clone(),
        session,
        &test_config(),
    );
    snapshot_service::refresh(&room).await.expect("refresh failed");

    assert!(matches!(
        roster_service::join_match(&room).await,
        Err(SyncError::SignedOut)
    ));
    assert!(matches!(
        chat_service::send_message(&room, "hello").await,
        Err(SyncError::SignedOut)
    ));
}
