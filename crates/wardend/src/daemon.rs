//! Daemon wiring: supervisor, event fabric, push hub and watchdog.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use warden_core::UserId;
use warden_protocol::ChatRequest;

use crate::config::{Config, ConfigError};
use crate::events::{ChatSendEvent, EventBus};
use crate::hub::{bridge_events, spawn_hub, ChatSink, HubError, HubHandle, HubServer};
use crate::rcon::ClientFactory;
use crate::reconnect::{ReconnectSupervisor, ReconnectTracker};
use crate::repository::{AccessPolicy, AllowAll, ServerRepository, UserDirectory};
use crate::supervisor::ConnectionSupervisor;
use crate::watchdog::FleetWatchdog;

/// Sends moderator chat to game servers through the supervisor and echoes it
/// to the other moderators as a chat-send event.
pub struct SupervisorChatSink {
    supervisor: ConnectionSupervisor,
    users: Arc<dyn UserDirectory>,
}

impl SupervisorChatSink {
    pub fn new(supervisor: ConnectionSupervisor, users: Arc<dyn UserDirectory>) -> Self {
        Self { supervisor, users }
    }
}

impl ChatSink for SupervisorChatSink {
    fn send_chat(&self, user: &UserId, request: ChatRequest) {
        let sender = self
            .users
            .display_name(user)
            .unwrap_or_else(|| user.to_string());

        info!(
            user_id = %user,
            sender = %sender,
            server_id = %request.server_id,
            message = %request.message,
            "Moderator chat"
        );

        self.supervisor.events().publish_chat_send(&ChatSendEvent {
            server_id: request.server_id,
            user_id: user.clone(),
            sender: sender.clone(),
            message: request.message.clone(),
            at: Utc::now(),
        });

        let supervisor = self.supervisor.clone();
        tokio::spawn(async move {
            if let Err(e) = supervisor
                .send_chat_message(request.server_id, &sender, &request.message)
                .await
            {
                warn!(server_id = %request.server_id, error = %e, "Failed to deliver moderator chat");
            }
        });
    }
}

/// A fully wired daemon.
///
/// Must be built inside a tokio runtime; construction spawns the hub
/// dispatch loop.
pub struct Daemon {
    config: Config,
    supervisor: ConnectionSupervisor,
    repository: Arc<dyn ServerRepository>,
    hub: HubHandle,
    reconnect: ReconnectSupervisor,
    cancel_token: CancellationToken,
}

impl Daemon {
    /// Wires a daemon from config, using `factory` for RCON clients.
    pub fn new(
        config: Config,
        factory: Arc<dyn ClientFactory>,
        cancel_token: CancellationToken,
    ) -> Result<Self, ConfigError> {
        let repository: Arc<dyn ServerRepository> = Arc::new(config.server_repository());
        let users: Arc<dyn UserDirectory> = Arc::new(config.user_directory());
        Self::with_parts(config, factory, repository, users, Arc::new(AllowAll), cancel_token)
    }

    /// Wires a daemon around externally provided collaborators.
    pub fn with_parts(
        config: Config,
        factory: Arc<dyn ClientFactory>,
        repository: Arc<dyn ServerRepository>,
        users: Arc<dyn UserDirectory>,
        policy: Arc<dyn AccessPolicy>,
        cancel_token: CancellationToken,
    ) -> Result<Self, ConfigError> {
        let games = config.compile_games()?;
        let events = Arc::new(EventBus::new());
        let supervisor = ConnectionSupervisor::new(games, factory, Arc::clone(&events));

        let chat_sink = Arc::new(SupervisorChatSink::new(supervisor.clone(), users));
        let hub = spawn_hub(chat_sink);
        bridge_events(&events, hub.clone(), policy);

        let reconnect = ReconnectSupervisor::new(
            supervisor.clone(),
            Arc::clone(&repository),
            Arc::new(ReconnectTracker::new()),
            cancel_token.clone(),
        );

        Ok(Self {
            config,
            supervisor,
            repository,
            hub,
            reconnect,
            cancel_token,
        })
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor {
        &self.supervisor
    }

    pub fn events(&self) -> &Arc<EventBus> {
        self.supervisor.events()
    }

    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }

    /// Starts the fleet watchdog; it connects every configured server.
    pub fn spawn_watchdog(&self) -> JoinHandle<()> {
        let watchdog = FleetWatchdog::new(
            self.supervisor.clone(),
            Arc::clone(&self.repository),
            self.reconnect.clone(),
            self.config.watchdog_interval(),
            self.cancel_token.clone(),
        );
        tokio::spawn(watchdog.run())
    }

    /// Binds the hub listener from config and runs it until cancelled.
    pub async fn serve_hub(&self) -> Result<(), HubError> {
        let server = HubServer::bind(
            &self.config.hub.bind,
            self.config.hub.user_header.clone(),
            self.hub.clone(),
            self.cancel_token.clone(),
        )
        .await?;
        server.run().await;
        Ok(())
    }

    /// Cancels background loops and closes every RCON client.
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();
        self.supervisor.shutdown().await;
        info!("Daemon stopped");
    }
}
