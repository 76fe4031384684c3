//! Warden Core - Shared domain types for game server moderation
//!
//! This crate provides the pure domain layer shared by the daemon
//! (wardend) and the push protocol: server records, per-game configuration,
//! player rosters, moderator identities, and broadcast classification.
//!
//! Nothing here performs I/O. All code follows the panic-free policy: no
//! `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`, or
//! direct indexing `[i]` outside of tests.

pub mod broadcast;
pub mod error;
pub mod game;
pub mod player;
pub mod server;
pub mod user;

// Re-exports for convenience
pub use broadcast::{classify, BroadcastEvent, BroadcastKind, IgnoreList, PatternSet};
pub use error::{DomainError, DomainResult};
pub use game::{Game, GameConfig, GameId};
pub use player::{OnlinePlayer, PlayerId, Roster, RosterDiff};
pub use server::{Server, ServerId};
pub use user::UserId;
