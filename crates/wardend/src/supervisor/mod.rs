//! Connection supervisor.
//!
//! Owns the set of live RCON clients, one per server at most, and is the
//! single source of truth for "is server X connected". It creates and tears
//! down clients, wires their callbacks into the event fabric, and runs the
//! per-server player-list loops.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐ broadcast / disconnect ┌──────────────────────┐
//! │  RconClient  │───────────────────────▶│ ClientEventHandler   │
//! │ (per server) │                        │ classify + route     │
//! └──────▲───────┘                        └──────────┬───────────┘
//!        │ execute                                   │
//! ┌──────┴───────┐     roster diff        ┌──────────▼───────────┐
//! │   pollers    │───────────────────────▶│       EventBus       │
//! │ delta / full │                        │ (one list per kind)  │
//! └──────────────┘                        └──────────────────────┘
//! ```
//!
//! # Locking
//!
//! The client and roster maps use short exclusive locks that are never held
//! across an `.await`. Creation and teardown for one server are serialized by
//! a per-server async lock, so waiting for an old client's shutdown never
//! blocks other servers.

mod handler;
mod poller;
mod registry;

pub use registry::ConnectedClient;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use warden_core::{Game, GameId, OnlinePlayer, Roster, Server, ServerId};

use crate::events::{EventBus, PlayerJoinEvent, ServerStatusEvent};
use crate::rcon::{ClientFactory, RconError};

use handler::ClientEventHandler;
use registry::ClientRegistry;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The server references a game with no configuration
    #[error("unknown game '{game}' for server {server_id}")]
    UnknownGame { server_id: ServerId, game: GameId },

    #[error(transparent)]
    Rcon(#[from] RconError),

    /// No live client for the server
    #[error("server {0} is not connected")]
    NotConnected(ServerId),

    #[error("game '{0}' has no player list support")]
    NoPlayerListCommand(GameId),

    #[error("game '{0}' has no chat command")]
    NoChatCommand(GameId),
}

impl SupervisorError {
    /// True if the underlying failure was a refused or unreachable dial.
    pub fn is_dial(&self) -> bool {
        matches!(self, Self::Rcon(e) if e.is_dial())
    }
}

// ============================================================================
// Supervisor
// ============================================================================

/// State shared between the supervisor, client handlers and pollers.
pub(crate) struct Shared {
    pub(crate) registry: ClientRegistry,
    pub(crate) events: Arc<EventBus>,
}

/// Cheap-to-clone handle to the connection supervisor.
#[derive(Clone)]
pub struct ConnectionSupervisor {
    shared: Arc<Shared>,
    games: Arc<HashMap<GameId, Arc<Game>>>,
    factory: Arc<dyn ClientFactory>,
    next_generation: Arc<AtomicU64>,
    server_locks: Arc<Mutex<HashMap<ServerId, Arc<tokio::sync::Mutex<()>>>>>,
}

impl ConnectionSupervisor {
    pub fn new(
        games: HashMap<GameId, Arc<Game>>,
        factory: Arc<dyn ClientFactory>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: ClientRegistry::default(),
                events,
            }),
            games: Arc::new(games),
            factory,
            next_generation: Arc::new(AtomicU64::new(1)),
            server_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.shared.events
    }

    pub fn game(&self, id: &GameId) -> Option<&Arc<Game>> {
        self.games.get(id)
    }

    fn server_lock(&self, id: ServerId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .server_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(id).or_default())
    }

    /// Connects to `server` and registers the new client.
    ///
    /// Any existing client for the same server is closed first, and its
    /// shutdown is awaited before it leaves the registry. On connect failure
    /// nothing is registered and no loop is started.
    ///
    /// # Errors
    ///
    /// - `SupervisorError::UnknownGame` if the server's game is not configured
    /// - `SupervisorError::Rcon` if the client cannot be built or connected
    pub async fn create_client(
        &self,
        server: &Server,
    ) -> Result<Arc<ConnectedClient>, SupervisorError> {
        let game = self
            .games
            .get(&server.game)
            .cloned()
            .ok_or_else(|| SupervisorError::UnknownGame {
                server_id: server.id,
                game: server.game.clone(),
            })?;

        let lock = self.server_lock(server.id);
        let _guard = lock.lock().await;

        if let Some(existing) = self.shared.registry.get(server.id) {
            debug!(
                server_id = %server.id,
                generation = existing.generation(),
                "Replacing existing client"
            );
            existing.shutdown().await;
            self.shared
                .registry
                .remove_generation(server.id, existing.generation());
        }

        let rcon = self.factory.create(&game, server)?;
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let client = Arc::new(ConnectedClient::new(
            server.clone(),
            Arc::clone(&game),
            generation,
            Arc::clone(&rcon),
        ));

        rcon.set_handler(Arc::new(ClientEventHandler::new(&self.shared, &client)));
        rcon.connect().await?;

        for command in game.init_commands() {
            if let Err(e) = client.execute(command).await {
                warn!(server_id = %server.id, command = %command, error = %e, "Init command failed");
            }
        }

        if let Some(period) = game.polling_interval() {
            poller::spawn_delta_poller(&self.shared, &client, period);
        }
        if let Some(period) = game.full_refresh_interval() {
            poller::spawn_full_refresh(&self.shared, &client, period);
        }

        self.shared.registry.insert(Arc::clone(&client));

        // Lost between connect and registration: undo, the watchdog retries.
        if client.is_lost() {
            self.shared.registry.remove_generation(server.id, generation);
            return Err(RconError::Closed.into());
        }

        self.seed_roster(&client).await;

        let online = client.announce_online(|| {
            self.shared.events.publish_server_status(&ServerStatusEvent {
                server_id: server.id,
                online: true,
                at: Utc::now(),
            });
        });
        if !online {
            // The disconnect handler stays quiet for a client that never
            // went online, so there is nothing to retract.
            self.shared.registry.remove_generation(server.id, generation);
            debug!(server_id = %server.id, generation, "Connection lost before going online");
            return Err(RconError::Closed.into());
        }

        info!(
            server_id = %server.id,
            server = %server.display_name(),
            game = %game.id(),
            generation,
            "Server connected"
        );

        Ok(client)
    }

    /// Replaces the roster with the live list and announces every player.
    async fn seed_roster(&self, client: &ConnectedClient) {
        let server_id = client.server_id();
        let roster = match client.fetch_players().await {
            Ok(Some(roster)) => roster,
            Ok(None) => Roster::new(),
            Err(e) => {
                warn!(server_id = %server_id, error = %e, "Initial player list failed");
                Roster::new()
            }
        };

        let at = Utc::now();
        let players = roster.to_vec();
        if !self
            .shared
            .registry
            .replace_current(server_id, client.generation(), roster)
        {
            return;
        }
        for player in players {
            self.shared.events.publish_join(&PlayerJoinEvent {
                server_id,
                player,
                at,
            });
        }
    }

    /// Removes, closes and forgets the client for `id`.
    ///
    /// Returns the removed client, if there was one.
    pub async fn delete_client(&self, id: ServerId) -> Option<Arc<ConnectedClient>> {
        let lock = self.server_lock(id);
        let _guard = lock.lock().await;

        let client = self.shared.registry.remove(id)?;
        client.shutdown().await;
        self.shared.registry.drop_roster(id);
        debug!(server_id = %id, generation = client.generation(), "Client deleted");
        Some(client)
    }

    /// All live clients.
    pub fn get_clients(&self) -> Vec<Arc<ConnectedClient>> {
        self.shared.registry.all()
    }

    /// The live client for `id`, if connected.
    pub fn get_server_client(&self, id: ServerId) -> Option<Arc<ConnectedClient>> {
        self.shared.registry.get(id)
    }

    /// Last-known roster for `id`.
    pub fn roster(&self, id: ServerId) -> Option<Roster> {
        self.shared.registry.roster(id)
    }

    /// Applies an edited server record.
    ///
    /// A live client is torn down and reported offline; the server is then
    /// reconnected with the new settings, unless its game no longer uses
    /// RCON.
    pub async fn handle_server_update(&self, server: &Server) -> Result<(), SupervisorError> {
        if self.delete_client(server.id).await.is_some() {
            info!(server_id = %server.id, "Server updated, reconnecting");
            self.shared.events.publish_server_status(&ServerStatusEvent {
                server_id: server.id,
                online: false,
                at: Utc::now(),
            });
        }

        match self.games.get(&server.game) {
            Some(game) if !game.uses_rcon() => Ok(()),
            _ => self.create_client(server).await.map(|_| ()),
        }
    }

    /// Fetches the player list now and publishes it as a refresh.
    pub async fn refresh_player_list(
        &self,
        id: ServerId,
    ) -> Result<Vec<OnlinePlayer>, SupervisorError> {
        let client = self
            .get_server_client(id)
            .ok_or(SupervisorError::NotConnected(id))?;
        let roster = client
            .fetch_players()
            .await?
            .ok_or_else(|| SupervisorError::NoPlayerListCommand(client.game().id().clone()))?;

        let players = roster.to_vec();
        if !poller::publish_refresh(&self.shared, id, client.generation(), roster) {
            return Err(SupervisorError::NotConnected(id));
        }
        Ok(players)
    }

    /// Sends a chat line to the server in the game's chat format.
    pub async fn send_chat_message(
        &self,
        id: ServerId,
        sender: &str,
        message: &str,
    ) -> Result<(), SupervisorError> {
        let client = self
            .get_server_client(id)
            .ok_or(SupervisorError::NotConnected(id))?;
        let command = client
            .game()
            .render_chat(sender, message)
            .ok_or_else(|| SupervisorError::NoChatCommand(client.game().id().clone()))?;

        client.execute(&command).await?;
        debug!(server_id = %id, sender, "Chat message sent");
        Ok(())
    }

    /// Closes every live client. Pollers stop on their next tick.
    pub async fn shutdown(&self) {
        let clients = self.get_clients();
        info!(clients = clients.len(), "Closing all RCON clients");
        for client in clients {
            self.delete_client(client.server_id()).await;
        }
    }
}
