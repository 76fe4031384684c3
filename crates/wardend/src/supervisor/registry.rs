//! Live client and roster maps.
//!
//! Both maps sit behind plain `std::sync::Mutex`es. Locks are held only for
//! the map operation itself and never across an `.await`. When both are
//! held, the client map is taken first.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use warden_core::{Game, OnlinePlayer, PlayerId, Roster, RosterDiff, Server, ServerId};

use crate::rcon::{RconClient, RconError};

// ============================================================================
// Connected Client
// ============================================================================

#[derive(Debug, Default)]
struct LinkState {
    announced: bool,
    lost: bool,
}

/// A registered, connected RCON client for one server.
pub struct ConnectedClient {
    server: Server,
    game: Arc<Game>,
    generation: u64,
    rcon: Arc<dyn RconClient>,
    /// Set before an intentional close so the disconnect callback stays quiet
    retired: AtomicBool,
    link: Mutex<LinkState>,
}

impl ConnectedClient {
    pub(crate) fn new(
        server: Server,
        game: Arc<Game>,
        generation: u64,
        rcon: Arc<dyn RconClient>,
    ) -> Self {
        Self {
            server,
            game,
            generation,
            rcon,
            retired: AtomicBool::new(false),
            link: Mutex::new(LinkState::default()),
        }
    }

    pub fn server_id(&self) -> ServerId {
        self.server.id
    }

    /// Server record the client was created from.
    pub fn server(&self) -> &Server {
        &self.server
    }

    pub fn game(&self) -> &Arc<Game> {
        &self.game
    }

    /// Process-unique creation counter; larger means newer.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Runs a command, bounded by the game's command timeout.
    pub async fn execute(&self, command: &str) -> Result<String, RconError> {
        let after = self.game.command_timeout();
        match tokio::time::timeout(after, self.rcon.execute(command)).await {
            Ok(result) => result,
            Err(_) => Err(RconError::Timeout {
                command: command.to_string(),
                after,
            }),
        }
    }

    /// Fetches and parses the current player list.
    ///
    /// Returns `Ok(None)` when the game has no player-list support.
    pub async fn fetch_players(&self) -> Result<Option<Roster>, RconError> {
        let Some(command) = self.game.player_list_command() else {
            return Ok(None);
        };
        let output = self.execute(command).await?;
        Ok(self.game.parse_player_list(&output))
    }

    /// Closes the connection and waits for teardown to finish.
    pub(crate) async fn shutdown(&self) {
        self.retired.store(true, Ordering::SeqCst);
        self.rcon.close().await;
        self.rcon.wait_shutdown().await;
    }

    pub(crate) fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    fn link(&self) -> std::sync::MutexGuard<'_, LinkState> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records that the connection is gone.
    ///
    /// Returns true if the client had already been announced online.
    pub(crate) fn mark_lost(&self) -> bool {
        let mut link = self.link();
        link.lost = true;
        link.announced
    }

    pub(crate) fn is_lost(&self) -> bool {
        self.link().lost
    }

    /// Runs `announce` and marks the client online, unless the connection
    /// is already lost.
    ///
    /// The link state stays locked while `announce` runs, so a concurrent
    /// `mark_lost` sees either "never online" or the completed announcement.
    pub(crate) fn announce_online(&self, announce: impl FnOnce()) -> bool {
        let mut link = self.link();
        if link.lost {
            return false;
        }
        link.announced = true;
        announce();
        true
    }
}

impl std::fmt::Debug for ConnectedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectedClient")
            .field("server_id", &self.server.id)
            .field("game", self.game.id())
            .field("generation", &self.generation)
            .finish()
    }
}

// ============================================================================
// Client Registry
// ============================================================================

#[derive(Default)]
pub(crate) struct ClientRegistry {
    clients: Mutex<HashMap<ServerId, Arc<ConnectedClient>>>,
    rosters: Mutex<HashMap<ServerId, Roster>>,
}

impl ClientRegistry {
    fn clients(&self) -> std::sync::MutexGuard<'_, HashMap<ServerId, Arc<ConnectedClient>>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn rosters(&self) -> std::sync::MutexGuard<'_, HashMap<ServerId, Roster>> {
        self.rosters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, id: ServerId) -> Option<Arc<ConnectedClient>> {
        self.clients().get(&id).cloned()
    }

    pub fn all(&self) -> Vec<Arc<ConnectedClient>> {
        self.clients().values().cloned().collect()
    }

    pub fn insert(&self, client: Arc<ConnectedClient>) -> Option<Arc<ConnectedClient>> {
        self.clients().insert(client.server_id(), client)
    }

    pub fn remove(&self, id: ServerId) -> Option<Arc<ConnectedClient>> {
        self.clients().remove(&id)
    }

    /// Removes the entry only if it is still the given generation.
    pub fn remove_generation(&self, id: ServerId, generation: u64) -> Option<Arc<ConnectedClient>> {
        let mut clients = self.clients();
        match clients.get(&id) {
            Some(client) if client.generation() == generation => clients.remove(&id),
            _ => None,
        }
    }

    /// True if a different generation now owns `id`.
    pub fn is_superseded(&self, id: ServerId, generation: u64) -> bool {
        self.clients()
            .get(&id)
            .is_some_and(|c| c.generation() != generation)
    }

    // ------------------------------------------------------------------------
    // Rosters
    // ------------------------------------------------------------------------

    pub fn roster(&self, id: ServerId) -> Option<Roster> {
        self.rosters().get(&id).cloned()
    }

    // Writes from pollers and seeding go through the `*_current` methods.
    // They hold the client map while touching the roster, so a disconnect
    // that has already unregistered the generation cannot be undone by a
    // late write.

    /// Replaces the roster if `generation` is still registered for `id`.
    pub fn replace_current(&self, id: ServerId, generation: u64, roster: Roster) -> bool {
        let clients = self.clients();
        if !is_generation(&clients, id, generation) {
            return false;
        }
        self.rosters().insert(id, roster);
        true
    }

    /// Reconciles the roster against `current` if `generation` is still
    /// registered and its roster exists.
    pub fn reconcile_current(
        &self,
        id: ServerId,
        generation: u64,
        current: Roster,
    ) -> Option<RosterDiff> {
        let clients = self.clients();
        if !is_generation(&clients, id, generation) {
            return None;
        }
        self.rosters().get_mut(&id).map(|r| r.reconcile(current))
    }

    pub fn drop_roster(&self, id: ServerId) {
        self.rosters().remove(&id);
    }

    /// Adds a player to an existing roster. Does nothing once it is dropped.
    pub fn add_player(&self, id: ServerId, player: OnlinePlayer) {
        if let Some(roster) = self.rosters().get_mut(&id) {
            roster.insert(player);
        }
    }

    pub fn remove_player(&self, id: ServerId, player: &PlayerId) -> Option<OnlinePlayer> {
        self.rosters().get_mut(&id).and_then(|r| r.remove(player))
    }
}

fn is_generation(
    clients: &HashMap<ServerId, Arc<ConnectedClient>>,
    id: ServerId,
    generation: u64,
) -> bool {
    clients.get(&id).is_some_and(|c| c.generation() == generation)
}
