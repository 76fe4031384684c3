//! Warden Daemon - RCON fleet supervisor and moderator push hub
//!
//! This crate provides the runtime side of warden:
//! - `supervisor` - one RCON client per server, broadcast routing, player-list polling
//! - `reconnect` / `watchdog` - bringing dropped servers back
//! - `events` - typed publish/subscribe fabric
//! - `hub` - WebSocket push hub for moderator clients
//! - `config` / `repository` - configuration and external data boundaries
//!
//! The RCON wire protocol is not implemented here; embedders supply it
//! through [`rcon::ClientFactory`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        wardend                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌───────────────┐   reconnect   ┌──────────────────────┐   │
//! │  │ FleetWatchdog │──────────────▶│ ConnectionSupervisor │   │
//! │  └───────────────┘               └──────────┬───────────┘   │
//! │                                             │ events        │
//! │                                             ▼               │
//! │  ┌───────────────┐   bridge      ┌──────────────────────┐   │
//! │  │   HubActor    │◀──────────────│      EventBus        │   │
//! │  │ (WebSockets)  │               └──────────────────────┘   │
//! │  └───────┬───────┘                                          │
//! │          │ moderator chat ──▶ EventBus + supervisor         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! Production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Poisoned locks are recovered, closed channels are reported as errors
//! - Subscriber panics are caught and logged

pub mod config;
pub mod daemon;
pub mod events;
pub mod hub;
pub mod rcon;
pub mod reconnect;
pub mod repository;
pub mod supervisor;
pub mod watchdog;

pub use config::{Config, ConfigError};
pub use daemon::{Daemon, SupervisorChatSink};
pub use events::EventBus;
pub use hub::{HubHandle, HubServer};
pub use supervisor::{ConnectedClient, ConnectionSupervisor, SupervisorError};
