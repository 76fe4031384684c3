//! Fleet watchdog.
//!
//! Periodically compares the servers that should be connected with the live
//! registry and starts a reconnect loop for every gap that does not already
//! have one. It never closes or touches a live connection.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::reconnect::ReconnectSupervisor;
use crate::repository::ServerRepository;
use crate::supervisor::ConnectionSupervisor;

pub const DEFAULT_WATCHDOG_INTERVAL: Duration = Duration::from_secs(5);

pub struct FleetWatchdog {
    supervisor: ConnectionSupervisor,
    repository: Arc<dyn ServerRepository>,
    reconnect: ReconnectSupervisor,
    period: Duration,
    cancel: CancellationToken,
}

impl FleetWatchdog {
    pub fn new(
        supervisor: ConnectionSupervisor,
        repository: Arc<dyn ServerRepository>,
        reconnect: ReconnectSupervisor,
        period: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            supervisor,
            repository,
            reconnect,
            period,
            cancel,
        }
    }

    /// Ticks until cancelled.
    pub async fn run(self) {
        info!(period = ?self.period, "Fleet watchdog starting");
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.check().await;
                }
            }
        }

        info!("Fleet watchdog stopped");
    }

    /// One reconciliation pass. Returns the number of reconnect loops started.
    pub async fn check(&self) -> usize {
        let servers = match self.repository.list().await {
            Ok(servers) => servers,
            Err(e) => {
                warn!(error = %e, "Watchdog could not list servers");
                return 0;
            }
        };

        let mut started = 0;
        for server in servers {
            let managed = self
                .supervisor
                .game(&server.game)
                .is_some_and(|game| game.uses_rcon());
            if !managed {
                continue;
            }
            if self.supervisor.get_server_client(server.id).is_some() {
                continue;
            }
            if !self.reconnect.tracker().try_begin(server.id) {
                continue;
            }

            debug!(server_id = %server.id, "Server offline, starting reconnect");
            tokio::spawn(self.reconnect.clone().run(server.id));
            started += 1;
        }

        started
    }
}
