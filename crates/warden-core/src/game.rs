//! Per-game configuration.
//!
//! Each supported game describes how to talk to its servers: which command
//! lists players, which patterns recognize pushed broadcasts, how often to
//! poll. [`GameConfig`] is the raw, deserializable form; [`Game`] is the
//! validated form with every pattern compiled once at load time.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::broadcast::{classify, BroadcastEvent, BroadcastKind, IgnoreList, PatternSet};
use crate::error::{DomainError, DomainResult};
use crate::player::Roster;

/// Default group name carrying the player identifier.
pub const DEFAULT_PLAYER_ID_FIELD: &str = "playfabid";

/// Default group name carrying the player display name.
pub const DEFAULT_PLAYER_NAME_FIELD: &str = "name";

/// Default group name carrying a chat message body.
pub const DEFAULT_MESSAGE_FIELD: &str = "message";

/// Default bound on a single RCON command round trip.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 5;

// ============================================================================
// Game Identifier
// ============================================================================

/// Identifier of a supported game (e.g. "mordhau").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(String);

impl GameId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for GameId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for GameId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ============================================================================
// Raw Configuration
// ============================================================================

/// Raw game configuration as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Whether servers of this game are managed over RCON at all
    pub use_rcon: bool,

    /// Whether the game pushes broadcast lines worth classifying
    pub broadcasts: bool,

    /// Broadcast pattern name -> regex with named capture groups
    pub broadcast_patterns: BTreeMap<String, String>,

    /// Regexes for noise lines dropped before classification
    pub ignored_patterns: Vec<String>,

    /// Command that lists online players
    pub player_list_command: Option<String>,

    /// Regex matched repeatedly against the player-list output
    pub player_list_pattern: Option<String>,

    /// Delta polling interval; absent or zero disables polling
    pub polling_interval_secs: Option<u64>,

    /// Full-refresh interval; absent or zero disables it
    pub full_refresh_interval_secs: Option<u64>,

    /// Commands run once after every successful connect
    pub init_commands: Vec<String>,

    /// Chat command template with `{sender}` and `{message}` placeholders
    pub chat_command: Option<String>,

    pub player_id_field: String,
    pub player_name_field: String,
    pub message_field: String,

    /// Upper bound for one command round trip
    pub command_timeout_secs: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            use_rcon: true,
            broadcasts: false,
            broadcast_patterns: BTreeMap::new(),
            ignored_patterns: Vec::new(),
            player_list_command: None,
            player_list_pattern: None,
            polling_interval_secs: None,
            full_refresh_interval_secs: None,
            init_commands: Vec::new(),
            chat_command: None,
            player_id_field: DEFAULT_PLAYER_ID_FIELD.to_string(),
            player_name_field: DEFAULT_PLAYER_NAME_FIELD.to_string(),
            message_field: DEFAULT_MESSAGE_FIELD.to_string(),
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
        }
    }
}

// ============================================================================
// Compiled Game
// ============================================================================

/// Validated game configuration with compiled patterns.
///
/// Immutable for the lifetime of the process; shared behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Game {
    id: GameId,
    config: GameConfig,
    broadcast_patterns: PatternSet,
    ignored: IgnoreList,
    player_list_pattern: Option<Regex>,
}

impl Game {
    /// Compiles and validates a raw configuration.
    ///
    /// # Errors
    ///
    /// - `DomainError::InvalidPattern` if any regex fails to compile
    /// - `DomainError::MissingCaptureGroup` if the player-list pattern or a
    ///   join/quit pattern lacks the player id group, or the player-list
    ///   pattern lacks the name group
    pub fn compile(id: impl Into<GameId>, config: GameConfig) -> DomainResult<Self> {
        let id = id.into();

        let mut broadcast_patterns = PatternSet::new();
        for (name, source) in &config.broadcast_patterns {
            let regex = compile_pattern(&id, name, source)?;
            let kind = BroadcastKind::from_name(name);
            if matches!(kind, BroadcastKind::Join | BroadcastKind::Quit) {
                require_group(&id, name, &regex, &config.player_id_field)?;
            }
            broadcast_patterns.insert(kind, regex);
        }

        let ignored = config
            .ignored_patterns
            .iter()
            .enumerate()
            .map(|(i, source)| compile_pattern(&id, &format!("ignored[{i}]"), source))
            .collect::<DomainResult<Vec<_>>>()?;

        let player_list_pattern = match &config.player_list_pattern {
            Some(source) => {
                let regex = compile_pattern(&id, "player_list", source)?;
                require_group(&id, "player_list", &regex, &config.player_id_field)?;
                require_group(&id, "player_list", &regex, &config.player_name_field)?;
                Some(regex)
            }
            None => None,
        };

        debug!(
            game = %id,
            broadcast_patterns = broadcast_patterns.len(),
            ignored_patterns = ignored.len(),
            has_player_list = player_list_pattern.is_some(),
            "Compiled game configuration"
        );

        Ok(Self {
            id,
            config,
            broadcast_patterns,
            ignored: IgnoreList::new(ignored),
            player_list_pattern,
        })
    }

    pub fn id(&self) -> &GameId {
        &self.id
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn uses_rcon(&self) -> bool {
        self.config.use_rcon
    }

    pub fn init_commands(&self) -> &[String] {
        &self.config.init_commands
    }

    pub fn player_list_command(&self) -> Option<&str> {
        self.config.player_list_command.as_deref()
    }

    /// True if player lists can be both fetched and parsed.
    pub fn can_list_players(&self) -> bool {
        self.config.player_list_command.is_some() && self.player_list_pattern.is_some()
    }

    /// Delta polling interval, if polling is enabled.
    pub fn polling_interval(&self) -> Option<Duration> {
        positive_secs(self.config.polling_interval_secs).filter(|_| self.can_list_players())
    }

    /// Full-refresh interval, if periodic refresh is enabled.
    pub fn full_refresh_interval(&self) -> Option<Duration> {
        positive_secs(self.config.full_refresh_interval_secs).filter(|_| self.can_list_players())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.config.command_timeout_secs.max(1))
    }

    pub fn player_id_field(&self) -> &str {
        &self.config.player_id_field
    }

    pub fn player_name_field(&self) -> &str {
        &self.config.player_name_field
    }

    pub fn message_field(&self) -> &str {
        &self.config.message_field
    }

    /// True if the line is known noise.
    pub fn is_ignored(&self, line: &str) -> bool {
        self.ignored.is_ignored(line)
    }

    /// Classifies a broadcast line; `None` when broadcasts are disabled.
    pub fn classify(&self, line: &str) -> Option<BroadcastEvent> {
        if !self.config.broadcasts {
            return None;
        }
        classify(line, &self.broadcast_patterns)
    }

    /// Parses player-list output; `None` when no pattern is configured.
    pub fn parse_player_list(&self, output: &str) -> Option<Roster> {
        self.player_list_pattern.as_ref().map(|pattern| {
            Roster::parse(
                output,
                pattern,
                &self.config.player_id_field,
                &self.config.player_name_field,
            )
        })
    }

    /// Renders the chat command for a message; `None` if chat is unsupported.
    ///
    /// Line breaks in either value are flattened so one message can never
    /// smuggle a second console command.
    pub fn render_chat(&self, sender: &str, message: &str) -> Option<String> {
        let template = self.config.chat_command.as_deref()?;
        Some(
            template
                .replace("{sender}", &single_line(sender))
                .replace("{message}", &single_line(message)),
        )
    }
}

fn compile_pattern(game: &GameId, name: &str, source: &str) -> DomainResult<Regex> {
    Regex::new(source).map_err(|e| DomainError::InvalidPattern {
        game: game.clone(),
        name: name.to_string(),
        reason: e.to_string(),
    })
}

fn require_group(game: &GameId, name: &str, regex: &Regex, group: &str) -> DomainResult<()> {
    if regex.capture_names().flatten().any(|n| n == group) {
        Ok(())
    } else {
        Err(DomainError::MissingCaptureGroup {
            game: game.clone(),
            name: name.to_string(),
            group: group.to_string(),
        })
    }
}

fn positive_secs(secs: Option<u64>) -> Option<Duration> {
    secs.filter(|s| *s > 0).map(Duration::from_secs)
}

fn single_line(s: &str) -> String {
    s.replace(['\r', '\n'], " ")
}
