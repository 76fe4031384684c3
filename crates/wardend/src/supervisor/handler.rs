//! Per-client RCON callbacks: broadcast routing and disconnect handling.

use std::sync::{Arc, Weak};

use chrono::Utc;
use tracing::{debug, info, trace, warn};

use warden_core::{BroadcastEvent, BroadcastKind, Game, OnlinePlayer, ServerId};

use super::registry::ConnectedClient;
use super::Shared;
use crate::events::{
    ChatEvent, ModeratorActionEvent, PlayerJoinEvent, PlayerQuitEvent, ServerStatusEvent,
};
use crate::rcon::{RconError, RconEventHandler};

/// Handler installed on every client the supervisor creates.
///
/// Holds weak references only; the client owns its handler.
pub(crate) struct ClientEventHandler {
    shared: Weak<Shared>,
    client: Weak<ConnectedClient>,
    server_id: ServerId,
    generation: u64,
    game: Arc<Game>,
}

impl ClientEventHandler {
    pub fn new(shared: &Arc<Shared>, client: &Arc<ConnectedClient>) -> Self {
        Self {
            shared: Arc::downgrade(shared),
            client: Arc::downgrade(client),
            server_id: client.server_id(),
            generation: client.generation(),
            game: Arc::clone(client.game()),
        }
    }
}

impl RconEventHandler for ClientEventHandler {
    fn on_broadcast(&self, line: &str) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        if shared.registry.is_superseded(self.server_id, self.generation) {
            trace!(server_id = %self.server_id, generation = self.generation, "Broadcast from stale client");
            return;
        }
        if self.game.is_ignored(line) {
            trace!(server_id = %self.server_id, "Ignored broadcast");
            return;
        }

        match self.game.classify(line) {
            Some(event) => route_broadcast(&shared, self.server_id, &self.game, &event),
            None => trace!(server_id = %self.server_id, line, "Unclassified broadcast"),
        }
    }

    fn on_disconnect(&self, error: Option<&RconError>) {
        let Some(client) = self.client.upgrade() else {
            return;
        };
        let was_online = client.mark_lost();

        if client.is_retired() {
            debug!(server_id = %self.server_id, generation = self.generation, "RCON client closed");
            return;
        }

        match error {
            Some(e) if e.is_dial() => debug!(server_id = %self.server_id, error = %e, "RCON dial failed"),
            Some(e) => warn!(server_id = %self.server_id, error = %e, "RCON connection lost"),
            None => debug!(server_id = %self.server_id, "RCON connection closed by peer"),
        }

        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        if shared
            .registry
            .remove_generation(self.server_id, self.generation)
            .is_some()
        {
            shared.registry.drop_roster(self.server_id);
            if !was_online {
                debug!(server_id = %self.server_id, generation = self.generation, "Lost before going online");
                return;
            }
            info!(server_id = %self.server_id, "Server offline");
            shared.events.publish_server_status(&ServerStatusEvent {
                server_id: self.server_id,
                online: false,
                at: Utc::now(),
            });
        }
    }
}

/// Applies one classified broadcast: roster updates plus event publication.
pub(crate) fn route_broadcast(
    shared: &Shared,
    server_id: ServerId,
    game: &Game,
    event: &BroadcastEvent,
) {
    let at = Utc::now();

    match &event.kind {
        BroadcastKind::Join => {
            let Some(player) = player_from(game, event) else {
                trace!(server_id = %server_id, "Join broadcast without player id");
                return;
            };
            debug!(server_id = %server_id, player_id = %player.id, name = %player.name, "Player joined");
            shared.registry.add_player(server_id, player.clone());
            shared.events.publish_join(&PlayerJoinEvent {
                server_id,
                player,
                at,
            });
        }
        BroadcastKind::Quit => {
            let Some(mut player) = player_from(game, event) else {
                trace!(server_id = %server_id, "Quit broadcast without player id");
                return;
            };
            let known = shared.registry.remove_player(server_id, &player.id);
            if player.name.is_empty() {
                if let Some(known) = known {
                    player.name = known.name;
                }
            }
            debug!(server_id = %server_id, player_id = %player.id, "Player quit");
            shared.events.publish_quit(&PlayerQuitEvent {
                server_id,
                player,
                at,
            });
        }
        BroadcastKind::Chat => {
            let Some(player) = player_from(game, event) else {
                trace!(server_id = %server_id, "Chat broadcast without player id");
                return;
            };
            let message = event.field(game.message_field()).unwrap_or_default();
            shared.events.publish_chat(&ChatEvent {
                server_id,
                player,
                message: message.to_string(),
                at,
            });
        }
        BroadcastKind::ModeratorAction => {
            shared.events.publish_moderator_action(&ModeratorActionEvent {
                server_id,
                fields: event.fields.clone(),
                at,
            });
        }
        BroadcastKind::Other(name) => {
            trace!(server_id = %server_id, kind = %name, "No route for broadcast kind");
        }
    }
}

fn player_from(game: &Game, event: &BroadcastEvent) -> Option<OnlinePlayer> {
    let id = event.field(game.player_id_field())?.trim();
    if id.is_empty() {
        return None;
    }
    let name = event.field(game.player_name_field()).unwrap_or_default().trim();
    Some(OnlinePlayer::new(id, name))
}
