//! Configuration management for the warden daemon.
//!
//! Loaded from a single TOML file:
//!
//! ```toml
//! [daemon]
//! watchdog_interval_secs = 5
//!
//! [hub]
//! bind = "127.0.0.1:8787"
//! user_header = "x-warden-user"
//!
//! [games.mordhau]
//! broadcasts = true
//! player_list_command = "playerlist"
//! player_list_pattern = '(?m)^(?P<playfabid>[0-9A-F]+), (?P<name>[^,]+),'
//! polling_interval_secs = 10
//!
//! [games.mordhau.broadcast_patterns]
//! join = '^Login: (?P<date>\S+): (?P<name>.+) \((?P<playfabid>[0-9A-F]+)\) logged in$'
//!
//! [[servers]]
//! id = 1
//! name = "EU #1"
//! address = "10.0.0.5:7779"
//! password = "secret"
//! game = "mordhau"
//!
//! [users]
//! "moderator-1" = "Alice"
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use warden_core::{DomainError, Game, GameConfig, GameId, Server, ServerId, UserId};

use crate::hub::DEFAULT_USER_HEADER;
use crate::repository::{StaticServerRepository, StaticUserDirectory};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "WARDEN_CONFIG";

/// Config file used when neither `--config` nor the environment names one.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/warden/warden.toml";

fn default_watchdog_interval() -> u64 {
    5
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_user_header() -> String {
    DEFAULT_USER_HEADER.to_string()
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Game(#[from] DomainError),

    #[error("server {server_id} references unknown game '{game}'")]
    UnknownGame { server_id: ServerId, game: GameId },

    #[error("server id {0} is used more than once")]
    DuplicateServer(ServerId),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Daemon loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonSettings {
    /// Seconds between fleet watchdog passes
    #[serde(default = "default_watchdog_interval")]
    pub watchdog_interval_secs: u64,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            watchdog_interval_secs: default_watchdog_interval(),
        }
    }
}

/// Push hub settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubSettings {
    /// Address the WebSocket listener binds to
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Trusted header carrying the moderator's user id
    #[serde(default = "default_user_header")]
    pub user_header: String,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            user_header: default_user_header(),
        }
    }
}

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub daemon: DaemonSettings,
    pub hub: HubSettings,
    pub games: BTreeMap<GameId, GameConfig>,
    pub servers: Vec<Server>,
    pub users: BTreeMap<UserId, String>,
}

impl Config {
    /// Reads, parses and validates a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    /// Parses and validates TOML text.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks everything that can be checked without touching the network.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.daemon.watchdog_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "daemon.watchdog_interval_secs",
                reason: "must be greater than zero".to_string(),
            });
        }

        let header = self.hub.user_header.trim();
        if header.is_empty() || !header.bytes().all(is_header_char) {
            return Err(ConfigError::Invalid {
                field: "hub.user_header",
                reason: format!("'{}' is not a valid header name", self.hub.user_header),
            });
        }

        let games = self.compile_games()?;

        let mut seen = HashSet::new();
        for server in &self.servers {
            if !seen.insert(server.id) {
                return Err(ConfigError::DuplicateServer(server.id));
            }
            if !games.contains_key(&server.game) {
                return Err(ConfigError::UnknownGame {
                    server_id: server.id,
                    game: server.game.clone(),
                });
            }
        }

        Ok(())
    }

    /// Compiles every game configuration.
    pub fn compile_games(&self) -> Result<HashMap<GameId, Arc<Game>>, ConfigError> {
        self.games
            .iter()
            .map(|(id, config)| {
                let game = Game::compile(id.clone(), config.clone())?;
                Ok((id.clone(), Arc::new(game)))
            })
            .collect()
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.daemon.watchdog_interval_secs)
    }

    pub fn server_repository(&self) -> StaticServerRepository {
        StaticServerRepository::new(self.servers.iter().cloned())
    }

    pub fn user_directory(&self) -> StaticUserDirectory {
        StaticUserDirectory::new(
            self.users
                .iter()
                .map(|(id, name)| (id.clone(), name.clone())),
        )
    }
}

fn is_header_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[daemon]
watchdog_interval_secs = 3

[hub]
bind = "0.0.0.0:9000"

[games.mordhau]
broadcasts = true
player_list_command = "playerlist"
player_list_pattern = '(?m)^(?P<playfabid>[0-9A-F]+), (?P<name>[^,]+),'
polling_interval_secs = 10
init_commands = ["listen login"]

[games.mordhau.broadcast_patterns]
join = '^Login: (?P<date>\S+): (?P<name>.+) \((?P<playfabid>[0-9A-F]+)\) logged in$'

[[servers]]
id = 1
name = "EU #1"
address = "10.0.0.5:7779"
password = "secret"
game = "mordhau"

[users]
"moderator-1" = "Alice"
"#;

    #[test]
    fn test_parse_sample() {
        let config = Config::parse(SAMPLE).unwrap();

        assert_eq!(config.watchdog_interval(), Duration::from_secs(3));
        assert_eq!(config.hub.bind, "0.0.0.0:9000");
        assert_eq!(config.hub.user_header, DEFAULT_USER_HEADER);
        assert_eq!(config.servers.len(), 1);
        assert_eq!(config.servers[0].display_name(), "EU #1");

        let games = config.compile_games().unwrap();
        let game = games.get(&GameId::new("mordhau")).unwrap();
        assert_eq!(game.init_commands(), ["listen login".to_string()]);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.daemon.watchdog_interval_secs, 5);
        assert_eq!(config.hub.bind, "127.0.0.1:8787");
        assert!(config.servers.is_empty());
    }

    #[test]
    fn test_unknown_game_rejected() {
        let err = Config::parse(
            r#"
[[servers]]
id = 1
address = "a:1"
game = "chivalry"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownGame { .. }));
    }

    #[test]
    fn test_duplicate_server_rejected() {
        let err = Config::parse(
            r#"
[games.mordhau]

[[servers]]
id = 1
address = "a:1"
game = "mordhau"

[[servers]]
id = 1
address = "b:1"
game = "mordhau"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateServer(id) if id == ServerId::new(1)));
    }

    #[test]
    fn test_bad_pattern_rejected() {
        let err = Config::parse(
            r#"
[games.mordhau]
ignored_patterns = ["(unclosed"]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Game(DomainError::InvalidPattern { .. })));
    }

    #[test]
    fn test_bad_header_rejected() {
        let err = Config::parse("[hub]\nuser_header = \"x user\"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "hub.user_header", .. }));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.users.get(&UserId::new("moderator-1")).map(String::as_str), Some("Alice"));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
