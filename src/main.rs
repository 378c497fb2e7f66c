//! Demo driver: two users share a match room over the in-memory backend.
//!
//! Ana hosts a match and chats; Ben joins through a fully wired session
//! with the live reconciler running, then the final projected view is
//! printed as JSON.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::Context;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use pitchside_client::{
    backend::{MatchBackend, memory::MemoryBackend},
    config::ClientConfig,
    model::{CreateMatchRequest, GeoPoint},
    services::{chat_service, roster_service, snapshot_service, stream_service},
    session::SessionContext,
    state::MatchSession,
};

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = ClientConfig::load();

    let memory = MemoryBackend::with_event_capacity(config.event_channel_capacity);
    let ana = Uuid::new_v4();
    let ben = Uuid::new_v4();
    memory.register_profile(ana, "Ana");
    memory.register_profile(ben, "Ben");
    let backend: Arc<dyn MatchBackend> = Arc::new(memory.clone());

    // Ana hosts the match.
    let ana_session = Arc::new(SessionContext::signed_in(ana));
    let snapshot = roster_service::host_match(
        &backend,
        &ana_session,
        CreateMatchRequest {
            stadium_name: "Hackney Marshes".to_string(),
            max_players: 10,
            location: GeoPoint {
                latitude: 51.556,
                longitude: -0.0357,
            },
            start_time: SystemTime::now() + Duration::from_secs(3_600),
        },
    )
    .await
    .context("hosting the match failed")?;
    let match_id = snapshot.details.id;

    // Ben opens the room with a live reconciler.
    let ben_session = Arc::new(SessionContext::signed_in(ben));
    let room = MatchSession::new(match_id, backend.clone(), ben_session, &config);
    snapshot_service::refresh(&room)
        .await
        .context("initial snapshot fetch failed")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reconciler = tokio::spawn(stream_service::run(
        room.clone(),
        config.clone(),
        shutdown_rx,
    ));

    roster_service::join_match(&room)
        .await
        .context("joining the match failed")?;
    chat_service::send_message(&room, "On my way, save me a spot")
        .await
        .context("sending a message failed")?;

    // Ana replies out of band; the reconciler picks it up.
    backend
        .send_message(match_id, ana, "See you at kickoff".to_string())
        .await
        .context("Ana's reply failed")?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let view = room
        .current_view()
        .await
        .context("no view available after the exchange")?;
    println!(
        "{}",
        serde_json::to_string_pretty(&view).context("failed to serialize the view")?
    );

    shutdown_tx.send(true).ok();
    reconciler.await.context("reconciler task panicked")?;
    Ok(())
}
