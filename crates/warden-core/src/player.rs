//! Online players and per-server rosters.
//!
//! A [`Roster`] is the last-known set of players on one server. Successive
//! snapshots are diffed to derive join and quit events when the game cannot
//! push them in real time, or when the pushed stream has silently desynced.

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Game-side player identifier (PlayFab id, SteamID64, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PlayerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A player currently connected to a server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OnlinePlayer {
    pub id: PlayerId,
    pub name: String,
}

impl OnlinePlayer {
    pub fn new(id: impl Into<PlayerId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

// ============================================================================
// Roster
// ============================================================================

/// Players that joined or quit between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterDiff {
    pub joined: Vec<OnlinePlayer>,
    pub quit: Vec<OnlinePlayer>,
}

impl RosterDiff {
    pub fn is_empty(&self) -> bool {
        self.joined.is_empty() && self.quit.is_empty()
    }
}

/// Snapshot of the players online on one server, keyed by player id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    players: BTreeMap<PlayerId, OnlinePlayer>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a player. Returns the previous entry.
    pub fn insert(&mut self, player: OnlinePlayer) -> Option<OnlinePlayer> {
        self.players.insert(player.id.clone(), player)
    }

    /// Removes a player by id.
    pub fn remove(&mut self, id: &PlayerId) -> Option<OnlinePlayer> {
        self.players.remove(id)
    }

    pub fn get(&self, id: &PlayerId) -> Option<&OnlinePlayer> {
        self.players.get(id)
    }

    pub fn contains(&self, id: &PlayerId) -> bool {
        self.players.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Iterates players in id order.
    pub fn players(&self) -> impl Iterator<Item = &OnlinePlayer> {
        self.players.values()
    }

    /// Returns the players as an owned list, in id order.
    pub fn to_vec(&self) -> Vec<OnlinePlayer> {
        self.players.values().cloned().collect()
    }

    /// Computes the difference from `self` (previous) to `current`.
    ///
    /// A player id lands in at most one of `joined` / `quit`: ids present in
    /// both snapshots are unchanged even if the display name differs.
    pub fn diff(&self, current: &Roster) -> RosterDiff {
        let joined = current
            .players
            .values()
            .filter(|p| !self.players.contains_key(&p.id))
            .cloned()
            .collect();

        let quit = self
            .players
            .values()
            .filter(|p| !current.players.contains_key(&p.id))
            .cloned()
            .collect();

        RosterDiff { joined, quit }
    }

    /// Diffs against `current`, then adopts `current` as the new snapshot.
    ///
    /// The diff is always taken against the prior snapshot.
    pub fn reconcile(&mut self, current: Roster) -> RosterDiff {
        let diff = self.diff(&current);
        *self = current;
        diff
    }

    /// Parses player-list command output.
    ///
    /// Every match of `pattern` contributes one player, read from the
    /// `id_field` and `name_field` named groups. Matches missing either group
    /// are skipped; malformed output simply yields fewer players.
    pub fn parse(output: &str, pattern: &Regex, id_field: &str, name_field: &str) -> Self {
        let mut roster = Self::new();

        for captures in pattern.captures_iter(output) {
            let (Some(id), Some(name)) = (captures.name(id_field), captures.name(name_field)) else {
                continue;
            };
            let id = id.as_str().trim();
            if id.is_empty() {
                continue;
            }
            roster.insert(OnlinePlayer::new(id, name.as_str().trim()));
        }

        roster
    }
}

impl FromIterator<OnlinePlayer> for Roster {
    fn from_iter<I: IntoIterator<Item = OnlinePlayer>>(iter: I) -> Self {
        let mut roster = Self::new();
        for player in iter {
            roster.insert(player);
        }
        roster
    }
}
