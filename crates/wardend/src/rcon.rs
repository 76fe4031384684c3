//! Boundary to the RCON protocol client.
//!
//! The wire protocol itself lives outside this crate. The supervisor only
//! needs to connect, run commands, and be told about pushed lines and
//! dropped connections, which is what these traits describe.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use warden_core::{Game, Server};

/// Errors reported by an RCON client.
#[derive(Debug, Error)]
pub enum RconError {
    /// TCP connect to the server failed
    #[error("failed to dial {address}: {source}")]
    Dial {
        address: String,
        #[source]
        source: io::Error,
    },

    /// The server rejected the password
    #[error("authentication rejected by {address}")]
    Auth { address: String },

    /// A command did not complete in time
    #[error("command '{command}' timed out after {after:?}")]
    Timeout { command: String, after: Duration },

    /// The connection is closed
    #[error("connection closed")]
    Closed,

    /// The server sent something the client could not make sense of
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl RconError {
    /// True for connection-refused style failures, expected while a server
    /// is down.
    pub fn is_dial(&self) -> bool {
        matches!(self, Self::Dial { .. })
    }
}

/// Receives unsolicited traffic from one RCON connection.
///
/// Callbacks run on the protocol client's own task and must not block.
pub trait RconEventHandler: Send + Sync {
    /// A line the server pushed without being asked.
    fn on_broadcast(&self, line: &str);

    /// The connection ended. `None` means it was closed locally.
    fn on_disconnect(&self, error: Option<&RconError>);
}

/// One live connection to one game server.
#[async_trait]
pub trait RconClient: Send + Sync {
    /// Installs the event handler. Called once, before `connect`.
    fn set_handler(&self, handler: Arc<dyn RconEventHandler>);

    /// Dials and authenticates.
    async fn connect(&self) -> Result<(), RconError>;

    /// Runs one command and returns its output.
    async fn execute(&self, command: &str) -> Result<String, RconError>;

    /// Starts closing the connection.
    async fn close(&self);

    /// Resolves once the connection is fully torn down.
    async fn wait_shutdown(&self);
}

/// Builds protocol clients for a given game and server.
pub trait ClientFactory: Send + Sync {
    fn create(&self, game: &Game, server: &Server) -> Result<Arc<dyn RconClient>, RconError>;
}
