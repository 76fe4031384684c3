//! Real-time push hub for moderator clients.
//!
//! One dispatch loop owns every connected socket's write half. Registration,
//! removal and every outbound write go through its command channel and are
//! processed one at a time in arrival order, which serializes writes per
//! socket without any per-socket locking.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐   register / unregister   ┌─────────────────────┐
//! │ read loops  │──────────────────────────▶│      HubActor       │
//! │ (per client)│   pong via send-to-client │ HashMap<ClientId,   │
//! └──────┬──────┘                           │   write half>       │
//!        │ chat                             └──────────▲──────────┘
//!        ▼                                             │ broadcast
//! ┌─────────────┐                           ┌──────────┴──────────┐
//! │  ChatSink   │                           │  EventBus bridge    │
//! └─────────────┘                           └─────────────────────┘
//! ```

mod actor;
mod bridge;
mod commands;
mod connection;
mod handle;
mod server;

pub use actor::{HubActor, WRITE_TIMEOUT};
pub use bridge::bridge_events;
pub use commands::{ClientSink, HubCommand, UserFilter};
pub use handle::HubHandle;
pub use server::{HubServer, DEFAULT_USER_HEADER};

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::info;

use warden_core::UserId;
use warden_protocol::{ChatRequest, ProtocolError};

/// Command channel capacity.
pub const COMMAND_BUFFER: usize = 256;

/// Identifier of one hub connection. Monotonic per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum HubError {
    #[error("failed to encode message: {0}")]
    Encode(#[from] ProtocolError),

    /// The dispatch loop has stopped
    #[error("hub is closed")]
    Closed,

    /// The command buffer is full (non-blocking sends only)
    #[error("hub command buffer is full")]
    Full,

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// Receives chat lines typed by moderators.
///
/// `user` is the authenticated sender, never taken from the payload.
pub trait ChatSink: Send + Sync {
    fn send_chat(&self, user: &UserId, request: ChatRequest);
}

/// Spawns the dispatch loop and returns a handle to it.
pub fn spawn_hub(chat_sink: Arc<dyn ChatSink>) -> HubHandle {
    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    let actor = HubActor::new(rx);
    tokio::spawn(actor.run());
    info!("Push hub started");
    HubHandle::new(tx, chat_sink)
}
