//! Event dispatch fabric.
//!
//! Typed subscriber lists, one per event kind. Subscribers are wired once at
//! startup and never removed. Publishing calls every subscriber of that kind
//! synchronously, in registration order, on the publisher's task.
//!
//! A subscriber that panics is logged and skipped; the remaining subscribers
//! still receive the event.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tracing::error;

use warden_core::{OnlinePlayer, ServerId, UserId};

// ============================================================================
// Events
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerJoinEvent {
    pub server_id: ServerId,
    pub player: OnlinePlayer,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerQuitEvent {
    pub server_id: ServerId,
    pub player: OnlinePlayer,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEvent {
    pub server_id: ServerId,
    pub player: OnlinePlayer,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Chat a moderator sent to a game server, under their display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSendEvent {
    pub server_id: ServerId,
    pub user_id: UserId,
    pub sender: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Complete player list, published by full refreshes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerListRefreshEvent {
    pub server_id: ServerId,
    pub players: Vec<OnlinePlayer>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStatusEvent {
    pub server_id: ServerId,
    pub online: bool,
    pub at: DateTime<Utc>,
}

/// A moderation action reported by the game server, with the raw captured
/// fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeratorActionEvent {
    pub server_id: ServerId,
    pub fields: BTreeMap<String, String>,
    pub at: DateTime<Utc>,
}

// ============================================================================
// Subscriber Lists
// ============================================================================

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Append-only list of callbacks for one event kind.
pub struct SubscriberList<E> {
    kind: &'static str,
    callbacks: RwLock<Vec<Callback<E>>>,
}

impl<E> SubscriberList<E> {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            callbacks: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, callback: impl Fn(&E) + Send + Sync + 'static) {
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    pub fn len(&self) -> usize {
        self.callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers `event` to every subscriber.
    ///
    /// The list is snapshotted first so a subscriber may subscribe further
    /// callbacks without deadlocking; those only see later events.
    pub fn publish(&self, event: &E) {
        let callbacks: Vec<Callback<E>> = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for (index, callback) in callbacks.iter().enumerate() {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                error!(event = self.kind, subscriber = index, "Event subscriber panicked");
            }
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// One subscriber list per event kind, shared behind an `Arc`.
pub struct EventBus {
    join: SubscriberList<PlayerJoinEvent>,
    quit: SubscriberList<PlayerQuitEvent>,
    chat: SubscriberList<ChatEvent>,
    chat_send: SubscriberList<ChatSendEvent>,
    player_list_update: SubscriberList<PlayerListRefreshEvent>,
    server_status: SubscriberList<ServerStatusEvent>,
    moderator_action: SubscriberList<ModeratorActionEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            join: SubscriberList::new("player-join"),
            quit: SubscriberList::new("player-quit"),
            chat: SubscriberList::new("chat"),
            chat_send: SubscriberList::new("chat-send"),
            player_list_update: SubscriberList::new("player-list-refresh"),
            server_status: SubscriberList::new("server-status"),
            moderator_action: SubscriberList::new("moderator-action"),
        }
    }

    pub fn subscribe_join(&self, f: impl Fn(&PlayerJoinEvent) + Send + Sync + 'static) {
        self.join.subscribe(f);
    }

    pub fn subscribe_quit(&self, f: impl Fn(&PlayerQuitEvent) + Send + Sync + 'static) {
        self.quit.subscribe(f);
    }

    pub fn subscribe_chat(&self, f: impl Fn(&ChatEvent) + Send + Sync + 'static) {
        self.chat.subscribe(f);
    }

    pub fn subscribe_chat_send(&self, f: impl Fn(&ChatSendEvent) + Send + Sync + 'static) {
        self.chat_send.subscribe(f);
    }

    pub fn subscribe_player_list_update(
        &self,
        f: impl Fn(&PlayerListRefreshEvent) + Send + Sync + 'static,
    ) {
        self.player_list_update.subscribe(f);
    }

    pub fn subscribe_server_status(&self, f: impl Fn(&ServerStatusEvent) + Send + Sync + 'static) {
        self.server_status.subscribe(f);
    }

    pub fn subscribe_moderator_action(
        &self,
        f: impl Fn(&ModeratorActionEvent) + Send + Sync + 'static,
    ) {
        self.moderator_action.subscribe(f);
    }

    pub fn publish_join(&self, event: &PlayerJoinEvent) {
        self.join.publish(event);
    }

    pub fn publish_quit(&self, event: &PlayerQuitEvent) {
        self.quit.publish(event);
    }

    pub fn publish_chat(&self, event: &ChatEvent) {
        self.chat.publish(event);
    }

    pub fn publish_chat_send(&self, event: &ChatSendEvent) {
        self.chat_send.publish(event);
    }

    pub fn publish_player_list_update(&self, event: &PlayerListRefreshEvent) {
        self.player_list_update.publish(event);
    }

    pub fn publish_server_status(&self, event: &ServerStatusEvent) {
        self.server_status.publish(event);
    }

    pub fn publish_moderator_action(&self, event: &ModeratorActionEvent) {
        self.moderator_action.publish(event);
    }

    /// Total subscribers across all kinds.
    pub fn subscriber_count(&self) -> usize {
        self.join.len()
            + self.quit.len()
            + self.chat.len()
            + self.chat_send.len()
            + self.player_list_update.len()
            + self.server_status.len()
            + self.moderator_action.len()
    }
}
