//! Hub dispatch loop - owns every client's write half.

use std::collections::HashMap;
use std::time::Duration;

use futures::SinkExt;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use warden_core::UserId;

use super::commands::{ClientSink, HubCommand};
use super::ClientId;

/// Upper bound for one frame write before the client is dropped.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

struct HubClient {
    user_id: UserId,
    sink: ClientSink,
}

/// The hub actor.
///
/// Runs on a single task; all registry mutation and all socket writes
/// happen here, in command arrival order.
pub struct HubActor {
    receiver: mpsc::Receiver<HubCommand>,
    clients: HashMap<ClientId, HubClient>,
}

impl HubActor {
    pub fn new(receiver: mpsc::Receiver<HubCommand>) -> Self {
        Self {
            receiver,
            clients: HashMap::new(),
        }
    }

    /// Processes commands until every handle is dropped, then closes all
    /// remaining sockets.
    pub async fn run(mut self) {
        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd).await;
        }

        let remaining = self.clients.len();
        for (client_id, client) in self.clients.drain() {
            close_client(client_id, client).await;
        }
        info!(closed = remaining, "Hub dispatch loop stopped");
    }

    async fn handle_command(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Register {
                client_id,
                user_id,
                sink,
            } => {
                debug!(client_id = %client_id, user_id = %user_id, total = self.clients.len() + 1, "Hub client registered");
                self.clients.insert(client_id, HubClient { user_id, sink });
            }
            HubCommand::Unregister { client_id } => {
                if let Some(client) = self.clients.remove(&client_id) {
                    debug!(client_id = %client_id, user_id = %client.user_id, "Hub client unregistered");
                    close_client(client_id, client).await;
                }
            }
            HubCommand::Broadcast { text } => {
                let targets = self.clients.keys().copied().collect();
                self.deliver(targets, Message::text(text)).await;
            }
            HubCommand::BroadcastFiltered { text, filter } => {
                let targets = self
                    .clients
                    .iter()
                    .filter(|(_, c)| filter(&c.user_id))
                    .map(|(id, _)| *id)
                    .collect();
                self.deliver(targets, Message::text(text)).await;
            }
            HubCommand::SendDirect { user_id, text } => {
                let targets = self
                    .clients
                    .iter()
                    .filter(|(_, c)| c.user_id == user_id)
                    .map(|(id, _)| *id)
                    .collect();
                self.deliver(targets, Message::text(text)).await;
            }
            HubCommand::SendToClient { client_id, text } => {
                self.deliver(vec![client_id], Message::text(text)).await;
            }
            HubCommand::Count { respond_to } => {
                let _ = respond_to.send(self.clients.len());
            }
        }
    }

    /// Writes `frame` to each target; clients whose write fails are dropped.
    async fn deliver(&mut self, targets: Vec<ClientId>, frame: Message) {
        let mut failed = Vec::new();

        for client_id in targets {
            let Some(client) = self.clients.get_mut(&client_id) else {
                continue;
            };
            match timeout(WRITE_TIMEOUT, client.sink.send(frame.clone())).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(client_id = %client_id, error = %e, "Hub write failed, dropping client");
                    failed.push(client_id);
                }
                Err(_) => {
                    warn!(client_id = %client_id, "Hub write timed out, dropping client");
                    failed.push(client_id);
                }
            }
        }

        for client_id in failed {
            if let Some(client) = self.clients.remove(&client_id) {
                close_client(client_id, client).await;
            }
        }
    }
}

async fn close_client(client_id: ClientId, mut client: HubClient) {
    match timeout(CLOSE_TIMEOUT, client.sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(client_id = %client_id, error = %e, "Error closing hub socket"),
        Err(_) => debug!(client_id = %client_id, "Timed out closing hub socket"),
    }
}
