//! Game server records and type-safe identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::GameId;

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Unique identifier for a managed game server.
///
/// Assigned by the server repository; stable for the lifetime of the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(u64);

impl ServerId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ServerId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

// ============================================================================
// Server Record
// ============================================================================

/// A game server the fleet should be connected to.
///
/// Read-only to the daemon. The record is re-fetched from the repository
/// before every reconnect attempt because address or credentials may have
/// been edited in the meantime.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    /// Repository identifier
    pub id: ServerId,

    /// Human-readable name shown to moderators
    #[serde(default)]
    pub name: String,

    /// RCON endpoint as `host:port`
    pub address: String,

    /// RCON password
    #[serde(default)]
    pub password: String,

    /// Game this server runs; selects the game configuration
    pub game: GameId,
}

impl Server {
    /// Creates a server record.
    pub fn new(
        id: impl Into<ServerId>,
        address: impl Into<String>,
        password: impl Into<String>,
        game: impl Into<GameId>,
    ) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            address: address.into(),
            password: password.into(),
            game: game.into(),
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Name for log lines and UI, falling back to the address.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.address
        } else {
            &self.name
        }
    }
}

// Manual Debug so the password never ends up in logs.
impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("address", &self.address)
            .field("password", &"<redacted>")
            .field("game", &self.game)
            .finish()
    }
}
