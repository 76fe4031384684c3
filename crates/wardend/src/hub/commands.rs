//! Commands processed by the hub dispatch loop.

use std::fmt;
use std::pin::Pin;

use futures::Sink;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use warden_core::UserId;

use super::ClientId;

/// Write half of a moderator socket.
pub type ClientSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;

/// Predicate deciding which users receive a filtered broadcast.
pub type UserFilter = Box<dyn Fn(&UserId) -> bool + Send>;

/// Frames are JSON text, encoded once by the handle before queuing.
pub enum HubCommand {
    Register {
        client_id: ClientId,
        user_id: UserId,
        sink: ClientSink,
    },

    /// Drop a client and close its socket
    Unregister { client_id: ClientId },

    /// Deliver to every client
    Broadcast { text: String },

    /// Deliver to clients whose user passes `filter`
    BroadcastFiltered { text: String, filter: UserFilter },

    /// Deliver to every connection of one user
    SendDirect { user_id: UserId, text: String },

    /// Deliver to one connection
    SendToClient { client_id: ClientId, text: String },

    Count { respond_to: oneshot::Sender<usize> },
}

impl fmt::Debug for HubCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Register {
                client_id, user_id, ..
            } => f
                .debug_struct("Register")
                .field("client_id", client_id)
                .field("user_id", user_id)
                .finish_non_exhaustive(),
            Self::Unregister { client_id } => f
                .debug_struct("Unregister")
                .field("client_id", client_id)
                .finish(),
            Self::Broadcast { text } => f.debug_struct("Broadcast").field("text", text).finish(),
            Self::BroadcastFiltered { text, .. } => f
                .debug_struct("BroadcastFiltered")
                .field("text", text)
                .finish_non_exhaustive(),
            Self::SendDirect { user_id, text } => f
                .debug_struct("SendDirect")
                .field("user_id", user_id)
                .field("text", text)
                .finish(),
            Self::SendToClient { client_id, text } => f
                .debug_struct("SendToClient")
                .field("client_id", client_id)
                .field("text", text)
                .finish(),
            Self::Count { .. } => f.debug_struct("Count").finish_non_exhaustive(),
        }
    }
}
