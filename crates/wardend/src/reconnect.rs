//! Reconnect supervisor.
//!
//! One retry loop per disconnected server. Each attempt re-reads the server
//! record, since the address or password may have been edited while the
//! server was down. Delays grow by half each attempt up to a ceiling, and
//! there is no give-up state: the loop ends when a client exists, on
//! shutdown, or when the server has been deleted.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use warden_core::ServerId;

use crate::repository::ServerRepository;
use crate::supervisor::ConnectionSupervisor;

/// Delay before the first attempt.
pub const INITIAL_DELAY: Duration = Duration::from_secs(5);

/// Upper bound for the delay between attempts.
pub const MAX_DELAY: Duration = Duration::from_secs(120);

const BACKOFF_FACTOR: f64 = 1.5;

/// Next delay after `current`: scaled, rounded to whole seconds, capped.
pub fn next_delay(current: Duration) -> Duration {
    let secs = (current.as_secs_f64() * BACKOFF_FACTOR).round();
    Duration::from_secs_f64(secs.min(MAX_DELAY.as_secs_f64()))
}

// ============================================================================
// In-Progress Tracking
// ============================================================================

/// Set of servers with a retry loop in flight.
#[derive(Debug, Default)]
pub struct ReconnectTracker {
    in_progress: Mutex<HashSet<ServerId>>,
}

impl ReconnectTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `id` as in progress. Returns false if it already was.
    pub fn try_begin(&self, id: ServerId) -> bool {
        self.in_progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id)
    }

    pub fn finish(&self, id: ServerId) {
        self.in_progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    pub fn is_in_progress(&self, id: ServerId) -> bool {
        self.in_progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&id)
    }

    pub fn len(&self) -> usize {
        self.in_progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Clears the in-progress mark however the loop exits.
struct InProgressGuard {
    tracker: Arc<ReconnectTracker>,
    server_id: ServerId,
}

impl Drop for InProgressGuard {
    fn drop(&mut self) {
        self.tracker.finish(self.server_id);
    }
}

// ============================================================================
// Reconnect Supervisor
// ============================================================================

/// How a retry loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectOutcome {
    /// This loop created the client
    Connected,
    /// Someone else connected the server first
    AlreadyConnected,
    /// The repository no longer knows the server
    Deleted,
    /// Process shutdown
    Cancelled,
}

#[derive(Clone)]
pub struct ReconnectSupervisor {
    supervisor: ConnectionSupervisor,
    repository: Arc<dyn ServerRepository>,
    tracker: Arc<ReconnectTracker>,
    cancel: CancellationToken,
}

impl ReconnectSupervisor {
    pub fn new(
        supervisor: ConnectionSupervisor,
        repository: Arc<dyn ServerRepository>,
        tracker: Arc<ReconnectTracker>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            supervisor,
            repository,
            tracker,
            cancel,
        }
    }

    pub fn tracker(&self) -> &Arc<ReconnectTracker> {
        &self.tracker
    }

    /// Runs the retry loop for a server already marked in progress.
    ///
    /// The mark is cleared when the loop ends.
    pub async fn run(self, server_id: ServerId) -> ReconnectOutcome {
        let _guard = InProgressGuard {
            tracker: Arc::clone(&self.tracker),
            server_id,
        };

        debug!(server_id = %server_id, "Reconnect loop started");
        let mut delay = INITIAL_DELAY;
        let mut attempt: u32 = 0;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return ReconnectOutcome::Cancelled,
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;

            if self.supervisor.get_server_client(server_id).is_some() {
                debug!(server_id = %server_id, "Server already connected, stopping reconnect");
                return ReconnectOutcome::AlreadyConnected;
            }

            match self.repository.get_by_id(server_id).await {
                Ok(Some(server)) => match self.supervisor.create_client(&server).await {
                    Ok(_) => {
                        info!(server_id = %server_id, attempt, "Reconnected");
                        return ReconnectOutcome::Connected;
                    }
                    Err(e) if e.is_dial() => {
                        debug!(server_id = %server_id, attempt, error = %e, "Reconnect failed");
                    }
                    Err(e) => {
                        warn!(server_id = %server_id, attempt, error = %e, "Reconnect failed");
                    }
                },
                Ok(None) => {
                    info!(server_id = %server_id, "Server deleted, stopping reconnect");
                    return ReconnectOutcome::Deleted;
                }
                Err(e) => {
                    warn!(server_id = %server_id, error = %e, "Failed to load server for reconnect");
                }
            }

            delay = next_delay(delay);
        }
    }
}
