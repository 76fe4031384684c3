//! Shared fixtures for wardend integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use warden_core::{Game, GameConfig, GameId, Server};
use wardend::events::EventBus;
use wardend::rcon::{ClientFactory, RconClient, RconError, RconEventHandler};

// ============================================================================
// Game Fixtures
// ============================================================================

pub const GAME: &str = "mordhau";
pub const PLAYER_LIST_COMMAND: &str = "playerlist";

pub const JOIN_PATTERN: &str =
    r"^Login: (?P<name>.+) \((?P<playfabid>[0-9A-F]+)\) logged in$";
pub const QUIT_PATTERN: &str =
    r"^Login: (?P<name>.+) \((?P<playfabid>[0-9A-F]+)\) logged out$";
pub const CHAT_PATTERN: &str =
    r"^Chat: (?P<playfabid>[0-9A-F]+), (?P<name>[^:]+): (?P<message>.*)$";
pub const KICK_PATTERN: &str = r"^Kick: (?P<admin>\w+) kicked (?P<target>\w+)$";
pub const PLAYER_LIST_PATTERN: &str = r"(?m)^(?P<playfabid>[0-9A-F]+), (?P<name>[^,\r\n]+), \d+ ms$";

/// Game configuration with broadcasts, player lists and chat enabled.
pub fn game_config(polling_secs: Option<u64>, full_refresh_secs: Option<u64>) -> GameConfig {
    let mut patterns = BTreeMap::new();
    patterns.insert("join".to_string(), JOIN_PATTERN.to_string());
    patterns.insert("quit".to_string(), QUIT_PATTERN.to_string());
    patterns.insert("chat".to_string(), CHAT_PATTERN.to_string());
    patterns.insert("moderator-action".to_string(), KICK_PATTERN.to_string());

    GameConfig {
        broadcasts: true,
        broadcast_patterns: patterns,
        ignored_patterns: vec![r"^Keeping client alive".to_string()],
        player_list_command: Some(PLAYER_LIST_COMMAND.to_string()),
        player_list_pattern: Some(PLAYER_LIST_PATTERN.to_string()),
        polling_interval_secs: polling_secs,
        full_refresh_interval_secs: full_refresh_secs,
        init_commands: vec!["listen allon".to_string()],
        chat_command: Some("say {sender}: {message}".to_string()),
        ..GameConfig::default()
    }
}

pub fn games(config: GameConfig) -> HashMap<GameId, Arc<Game>> {
    let game = Game::compile(GAME, config).expect("compile test game");
    let mut games = HashMap::new();
    games.insert(game.id().clone(), Arc::new(game));
    games
}

pub fn server(id: u64) -> Server {
    Server::new(id, format!("127.0.0.1:{}", 7000 + id), "secret", GAME)
}

/// Renders player-list output in the fixture pattern's format.
pub fn player_list(players: &[(&str, &str)]) -> String {
    let mut out = format!("There are currently {} players:\n", players.len());
    for (id, name) in players {
        out.push_str(&format!("{id}, {name}, 30 ms\n"));
    }
    out
}

// ============================================================================
// Fake RCON
// ============================================================================

/// How long `wait_shutdown` takes to finish.
pub const SHUTDOWN_DELAY: Duration = Duration::from_millis(20);

/// Scripted RCON client.
///
/// Player-list outputs are consumed front to back; the last one repeats.
/// Connects and completed shutdowns are written to the factory's journal as
/// `connect:<n>` and `shutdown-done:<n>`, where `n` counts clients from 1 in
/// creation order.
pub struct FakeRcon {
    pub server_id: u64,
    pub number: usize,
    fail_connect: bool,
    journal: Arc<Mutex<Vec<String>>>,
    drop_on_player_list: Arc<AtomicBool>,
    handler: Mutex<Option<Arc<dyn RconEventHandler>>>,
    player_lists: Arc<Mutex<VecDeque<String>>>,
    commands: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl FakeRcon {
    fn handler(&self) -> Option<Arc<dyn RconEventHandler>> {
        self.handler.lock().unwrap().clone()
    }

    /// Pushes an unsolicited line as the game server would.
    pub fn push_broadcast(&self, line: &str) {
        if let Some(handler) = self.handler() {
            handler.on_broadcast(line);
        }
    }

    /// Simulates the remote side dropping the connection.
    pub fn drop_connection(&self) {
        if let Some(handler) = self.handler() {
            handler.on_disconnect(Some(&RconError::Closed));
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RconClient for FakeRcon {
    fn set_handler(&self, handler: Arc<dyn RconEventHandler>) {
        *self.handler.lock().unwrap() = Some(handler);
    }

    async fn connect(&self) -> Result<(), RconError> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("connect:{}", self.number));
        if self.fail_connect {
            return Err(RconError::Dial {
                address: format!("127.0.0.1:{}", 7000 + self.server_id),
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
            });
        }
        Ok(())
    }

    async fn execute(&self, command: &str) -> Result<String, RconError> {
        if self.is_closed() {
            return Err(RconError::Closed);
        }
        self.commands.lock().unwrap().push(command.to_string());

        if command == PLAYER_LIST_COMMAND {
            let output = {
                let mut lists = self.player_lists.lock().unwrap();
                if lists.len() > 1 {
                    lists.pop_front().unwrap_or_default()
                } else {
                    lists.front().cloned().unwrap_or_default()
                }
            };
            // The reply still arrives, but the link drops while it is in flight.
            if self.drop_on_player_list.swap(false, Ordering::SeqCst) {
                self.drop_connection();
            }
            return Ok(output);
        }
        Ok(String::new())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        // Real clients report a local close through the handler as well.
        if let Some(handler) = self.handler() {
            handler.on_disconnect(None);
        }
    }

    async fn wait_shutdown(&self) {
        tokio::time::sleep(SHUTDOWN_DELAY).await;
        self.journal
            .lock()
            .unwrap()
            .push(format!("shutdown-done:{}", self.number));
    }
}

/// Factory that records every client it builds.
#[derive(Default)]
pub struct FakeFactory {
    clients: Mutex<Vec<Arc<FakeRcon>>>,
    connect_failures: AtomicUsize,
    player_lists: Arc<Mutex<VecDeque<String>>>,
    journal: Arc<Mutex<Vec<String>>>,
    drop_on_player_list: Arc<AtomicBool>,
}

impl FakeFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The next `count` clients fail to connect.
    pub fn fail_next_connects(&self, count: usize) {
        self.connect_failures.store(count, Ordering::SeqCst);
    }

    /// Appends player-list outputs to the shared script.
    pub fn script_player_lists(&self, outputs: impl IntoIterator<Item = String>) {
        self.player_lists.lock().unwrap().extend(outputs);
    }

    /// The next player-list command on any client drops its connection.
    pub fn drop_during_next_player_list(&self) {
        self.drop_on_player_list.store(true, Ordering::SeqCst);
    }

    /// Connects and finished shutdowns across all clients, in order.
    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }

    pub fn created(&self) -> Vec<Arc<FakeRcon>> {
        self.clients.lock().unwrap().clone()
    }

    pub fn last(&self) -> Arc<FakeRcon> {
        self.created().last().cloned().expect("no client created")
    }
}

impl ClientFactory for FakeFactory {
    fn create(&self, _game: &Game, server: &Server) -> Result<Arc<dyn RconClient>, RconError> {
        let fail_connect = self
            .connect_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        let mut clients = self.clients.lock().unwrap();
        let client = Arc::new(FakeRcon {
            server_id: server.id.get(),
            number: clients.len() + 1,
            fail_connect,
            journal: Arc::clone(&self.journal),
            drop_on_player_list: Arc::clone(&self.drop_on_player_list),
            handler: Mutex::new(None),
            player_lists: Arc::clone(&self.player_lists),
            commands: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });
        clients.push(Arc::clone(&client));
        Ok(client)
    }
}

// ============================================================================
// Event Recorder
// ============================================================================

/// Records every published event as a compact string.
#[derive(Clone, Default)]
pub struct EventLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    pub fn attach(bus: &EventBus) -> Self {
        let log = Self::default();

        let l = log.clone();
        bus.subscribe_join(move |e| l.push(format!("join:{}:{}", e.server_id, e.player.id)));
        let l = log.clone();
        bus.subscribe_quit(move |e| {
            l.push(format!("quit:{}:{}:{}", e.server_id, e.player.id, e.player.name))
        });
        let l = log.clone();
        bus.subscribe_chat(move |e| {
            l.push(format!("chat:{}:{}:{}", e.server_id, e.player.id, e.message))
        });
        let l = log.clone();
        bus.subscribe_chat_send(move |e| {
            l.push(format!("chat-send:{}:{}:{}", e.server_id, e.user_id, e.message))
        });
        let l = log.clone();
        bus.subscribe_player_list_update(move |e| {
            l.push(format!("refresh:{}:{}", e.server_id, e.players.len()))
        });
        let l = log.clone();
        bus.subscribe_server_status(move |e| {
            let state = if e.online { "online" } else { "offline" };
            l.push(format!("status:{}:{state}", e.server_id))
        });
        let l = log.clone();
        bus.subscribe_moderator_action(move |e| {
            let target = e.fields.get("target").cloned().unwrap_or_default();
            l.push(format!("moderator:{}:{target}", e.server_id))
        });

        log
    }

    fn push(&self, entry: String) {
        self.entries.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    /// Returns and clears the recorded entries.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.entries.lock().unwrap())
    }
}
