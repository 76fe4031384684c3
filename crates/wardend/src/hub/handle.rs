//! Client interface for the hub dispatch loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::WebSocketStream;
use tracing::debug;

use warden_core::UserId;
use warden_protocol::OutboundMessage;

use super::commands::HubCommand;
use super::connection::read_loop;
use super::{ChatSink, ClientId, HubError};

/// Cheap-to-clone handle to the push hub.
///
/// Async methods wait for room in the command buffer. The `try_*` variants
/// never wait and are meant for synchronous callers such as event-bus
/// subscribers.
#[derive(Clone)]
pub struct HubHandle {
    sender: mpsc::Sender<HubCommand>,
    chat_sink: Arc<dyn ChatSink>,
    next_client_id: Arc<AtomicU64>,
}

impl HubHandle {
    pub(crate) fn new(sender: mpsc::Sender<HubCommand>, chat_sink: Arc<dyn ChatSink>) -> Self {
        Self {
            sender,
            chat_sink,
            next_client_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub(crate) fn chat_sink(&self) -> &Arc<dyn ChatSink> {
        &self.chat_sink
    }

    /// Registers an upgraded socket for `user_id` and starts its read loop.
    ///
    /// The client is registered before this returns, so any later broadcast
    /// reaches it.
    pub async fn create_client<S>(
        &self,
        user_id: UserId,
        socket: WebSocketStream<S>,
    ) -> Result<ClientId, HubError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let client_id = ClientId::new(self.next_client_id.fetch_add(1, Ordering::Relaxed));
        let (sink, stream) = socket.split();

        self.send(HubCommand::Register {
            client_id,
            user_id: user_id.clone(),
            sink: Box::pin(sink),
        })
        .await?;

        debug!(client_id = %client_id, user_id = %user_id, "Starting hub read loop");
        tokio::spawn(read_loop(client_id, user_id, stream, self.clone()));
        Ok(client_id)
    }

    /// Removes a client and closes its socket.
    pub async fn unregister(&self, client_id: ClientId) -> Result<(), HubError> {
        self.send(HubCommand::Unregister { client_id }).await
    }

    /// Sends `message` to every connected client.
    pub async fn broadcast(&self, message: &OutboundMessage) -> Result<(), HubError> {
        let text = message.to_json()?;
        self.send(HubCommand::Broadcast { text }).await
    }

    /// Sends `message` to every client whose user passes `filter`.
    pub async fn broadcast_server_message(
        &self,
        message: &OutboundMessage,
        filter: impl Fn(&UserId) -> bool + Send + 'static,
    ) -> Result<(), HubError> {
        let text = message.to_json()?;
        self.send(HubCommand::BroadcastFiltered {
            text,
            filter: Box::new(filter),
        })
        .await
    }

    /// Sends `message` to every connection of `user_id`.
    pub async fn send_direct_message(
        &self,
        user_id: UserId,
        message: &OutboundMessage,
    ) -> Result<(), HubError> {
        let text = message.to_json()?;
        self.send(HubCommand::SendDirect { user_id, text }).await
    }

    /// Sends `message` to one connection.
    pub async fn send_to_client(
        &self,
        client_id: ClientId,
        message: &OutboundMessage,
    ) -> Result<(), HubError> {
        let text = message.to_json()?;
        self.send(HubCommand::SendToClient { client_id, text }).await
    }

    /// Number of registered clients.
    pub async fn client_count(&self) -> Result<usize, HubError> {
        let (tx, rx) = oneshot::channel();
        self.send(HubCommand::Count { respond_to: tx }).await?;
        rx.await.map_err(|_| HubError::Closed)
    }

    pub fn try_broadcast(&self, message: &OutboundMessage) -> Result<(), HubError> {
        let text = message.to_json()?;
        self.try_send(HubCommand::Broadcast { text })
    }

    pub fn try_broadcast_server_message(
        &self,
        message: &OutboundMessage,
        filter: impl Fn(&UserId) -> bool + Send + 'static,
    ) -> Result<(), HubError> {
        let text = message.to_json()?;
        self.try_send(HubCommand::BroadcastFiltered {
            text,
            filter: Box::new(filter),
        })
    }

    async fn send(&self, cmd: HubCommand) -> Result<(), HubError> {
        self.sender.send(cmd).await.map_err(|_| HubError::Closed)
    }

    fn try_send(&self, cmd: HubCommand) -> Result<(), HubError> {
        self.sender.try_send(cmd).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => HubError::Full,
            mpsc::error::TrySendError::Closed(_) => HubError::Closed,
        })
    }
}
