//! Supervises the thread subscription for one match session: subscribes,
//! re-fetches the authoritative snapshot, reconciles pushed events, and
//! reconnects with exponential backoff after any drop.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::{
    backend::{ThreadEvent, ThreadSubscription},
    config::ClientConfig,
    model::ChatMessage,
    services::snapshot_service,
    state::SharedSession,
};

/// Run the reconciler until `shutdown` flips to `true`.
///
/// Every (re)subscription follows the same sequence: open the push channel
/// first, then re-fetch the snapshot, so any event raced during the fetch
/// is already queued on the channel and deduplicated on merge. Events from
/// a previous subscription are tagged with a stale generation and ignored.
pub async fn run(session: SharedSession, config: ClientConfig, mut shutdown: watch::Receiver<bool>) {
    let mut delay = config.reconnect_initial_delay;

    loop {
        if *shutdown.borrow() {
            break;
        }

        let generation = session.bump_generation();
        let subscription = match session.backend().subscribe_thread(session.match_id()).await {
            Ok(subscription) => subscription,
            Err(err) => {
                warn!(error = %err, "thread subscription failed; retrying");
                if wait_or_shutdown(delay, &mut shutdown).await {
                    break;
                }
                delay = next_delay(delay, config.reconnect_max_delay);
                continue;
            }
        };

        if let Err(err) = snapshot_service::refresh(&session).await {
            warn!(error = %err, "snapshot refresh failed; retrying");
            drop(subscription);
            if wait_or_shutdown(delay, &mut shutdown).await {
                break;
            }
            delay = next_delay(delay, config.reconnect_max_delay);
            continue;
        }

        info!(match_id = %session.match_id(), "thread subscription established");
        delay = config.reconnect_initial_delay;

        let disconnected = drain_events(&session, generation, subscription, &mut shutdown).await;
        session.bump_generation();

        if !disconnected || *shutdown.borrow() {
            break;
        }
        warn!(match_id = %session.match_id(), "thread subscription dropped; reconnecting");
        if wait_or_shutdown(delay, &mut shutdown).await {
            break;
        }
        delay = next_delay(delay, config.reconnect_max_delay);
    }

    info!(match_id = %session.match_id(), "thread reconciler stopped");
}

/// Consume events until the subscription drops or shutdown is requested.
/// Returns `true` when the loop ended because of a disconnect.
async fn drain_events(
    session: &SharedSession,
    generation: u64,
    mut subscription: ThreadSubscription,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                // A dropped shutdown handle counts as a shutdown request.
                if changed.is_err() || *shutdown.borrow() {
                    return false;
                }
            }
            event = subscription.next_event() => match event {
                Some(ThreadEvent::Message(message)) => {
                    reconcile_message(session, generation, message).await;
                }
                Some(ThreadEvent::Disconnected) | None => return true,
            },
        }
    }
}

/// Merge one pushed message: drop self-echoes, fill in the sender name,
/// and insert into the thread in timestamp order.
async fn reconcile_message(session: &SharedSession, generation: u64, mut message: ChatMessage) {
    if session.session().current_user_id() == Some(message.sender_id) {
        debug!(message_id = %message.id, "discarding self-echo");
        return;
    }

    if message.sender_name.is_none() {
        message.sender_name = Some(session.resolve_name(message.sender_id).await);
    }

    session.merge_streamed(generation, message).await;
}

/// Sleep for `delay`, returning early with `true` if shutdown was
/// requested in the meantime.
async fn wait_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = sleep(delay) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

fn next_delay(current: Duration, max: Duration) -> Duration {
    (current * 2).min(max)
}
