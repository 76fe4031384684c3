//! Per-server player-list loops.
//!
//! Delta polling diffs each snapshot against the roster and publishes the
//! joins and quits. Full refresh republishes the whole list and replaces the
//! roster. Both loops stop, without error, as soon as their client is no
//! longer the registered one for the server; they never restart themselves.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use warden_core::{Roster, ServerId};

use super::registry::ConnectedClient;
use super::Shared;
use crate::events::{PlayerJoinEvent, PlayerListRefreshEvent, PlayerQuitEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollKind {
    Delta,
    FullRefresh,
}

impl PollKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Delta => "delta",
            Self::FullRefresh => "full-refresh",
        }
    }
}

pub(crate) fn spawn_delta_poller(
    shared: &Arc<Shared>,
    client: &ConnectedClient,
    period: Duration,
) -> JoinHandle<()> {
    spawn(shared, client, period, PollKind::Delta)
}

pub(crate) fn spawn_full_refresh(
    shared: &Arc<Shared>,
    client: &ConnectedClient,
    period: Duration,
) -> JoinHandle<()> {
    spawn(shared, client, period, PollKind::FullRefresh)
}

fn spawn(
    shared: &Arc<Shared>,
    client: &ConnectedClient,
    period: Duration,
    kind: PollKind,
) -> JoinHandle<()> {
    let shared = Arc::downgrade(shared);
    let server_id = client.server_id();
    let generation = client.generation();
    tokio::spawn(poll_loop(shared, server_id, generation, period, kind))
}

async fn poll_loop(
    shared: Weak<Shared>,
    server_id: ServerId,
    generation: u64,
    period: Duration,
    kind: PollKind,
) {
    debug!(server_id = %server_id, poll = kind.as_str(), ?period, "Poller started");

    // First tick after one full period; the client is registered by then.
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let Some(shared) = shared.upgrade() else {
            break;
        };
        let Some(client) = shared
            .registry
            .get(server_id)
            .filter(|c| c.generation() == generation)
        else {
            break;
        };

        let roster = match client.fetch_players().await {
            Ok(Some(roster)) => roster,
            Ok(None) => break,
            Err(e) if e.is_dial() => {
                debug!(server_id = %server_id, poll = kind.as_str(), error = %e, "Player list fetch failed");
                continue;
            }
            Err(e) => {
                warn!(server_id = %server_id, poll = kind.as_str(), error = %e, "Player list fetch failed");
                continue;
            }
        };

        // The client may have been replaced or lost while the command ran.
        let current = match kind {
            PollKind::Delta => apply_delta(&shared, server_id, generation, roster),
            PollKind::FullRefresh => publish_refresh(&shared, server_id, generation, roster),
        };
        if !current {
            break;
        }
    }

    debug!(server_id = %server_id, poll = kind.as_str(), generation, "Poller stopped");
}

/// Diffs `current` against the roster and publishes quits, then joins.
///
/// Returns false, publishing nothing, if `generation` no longer owns the
/// server.
pub(crate) fn apply_delta(
    shared: &Shared,
    server_id: ServerId,
    generation: u64,
    current: Roster,
) -> bool {
    let Some(diff) = shared
        .registry
        .reconcile_current(server_id, generation, current)
    else {
        return false;
    };
    if diff.is_empty() {
        return true;
    }

    debug!(
        server_id = %server_id,
        joined = diff.joined.len(),
        quit = diff.quit.len(),
        "Roster changed"
    );

    let at = Utc::now();
    for player in diff.quit {
        shared.events.publish_quit(&PlayerQuitEvent {
            server_id,
            player,
            at,
        });
    }
    for player in diff.joined {
        shared.events.publish_join(&PlayerJoinEvent {
            server_id,
            player,
            at,
        });
    }
    true
}

/// Replaces the roster and publishes the complete list.
///
/// Returns false, publishing nothing, if `generation` no longer owns the
/// server.
pub(crate) fn publish_refresh(
    shared: &Shared,
    server_id: ServerId,
    generation: u64,
    roster: Roster,
) -> bool {
    let players = roster.to_vec();
    if !shared.registry.replace_current(server_id, generation, roster) {
        return false;
    }
    shared.events.publish_player_list_update(&PlayerListRefreshEvent {
        server_id,
        players,
        at: Utc::now(),
    });
    true
}
