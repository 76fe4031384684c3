//! Outbound message types pushed from the hub to moderator clients.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_core::{OnlinePlayer, PlayerId, ServerId, UserId};

use crate::parse::ProtocolError;

/// Body of `player-join` and `player-quit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerEventBody {
    pub server_id: ServerId,
    pub player_id: PlayerId,
    pub name: String,
    pub at: DateTime<Utc>,
}

/// Body of `player-list-refresh`: the complete online list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerListBody {
    pub server_id: ServerId,
    pub players: Vec<OnlinePlayer>,
    pub at: DateTime<Utc>,
}

/// Body of `server-status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatusBody {
    pub server_id: ServerId,
    pub online: bool,
}

/// Body of `chat`: one in-game chat line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEventBody {
    pub server_id: ServerId,
    pub player_id: PlayerId,
    pub name: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Body of `chat-send`: chat a moderator sent to a game server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSendBody {
    pub server_id: ServerId,
    pub user_id: UserId,
    /// Display name the line was sent under
    pub sender: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Body of `moderator-action`: fields captured from the game's broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeratorActionBody {
    pub server_id: ServerId,
    pub fields: BTreeMap<String, String>,
    pub at: DateTime<Utc>,
}

/// Body of `infraction-create`.
///
/// Produced by the moderation layer; the hub only relays it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfractionBody {
    pub server_id: ServerId,
    pub player_id: PlayerId,
    /// Infraction type (ban, kick, mute, warn, ...)
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Messages sent from the hub to moderator clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "kebab-case")]
pub enum OutboundMessage {
    /// Reply to `ping`; body is always the empty string
    Pong(String),
    PlayerJoin(PlayerEventBody),
    PlayerQuit(PlayerEventBody),
    PlayerListRefresh(PlayerListBody),
    ServerStatus(ServerStatusBody),
    InfractionCreate(InfractionBody),
    Chat(ChatEventBody),
    ChatSend(ChatSendBody),
    ModeratorAction(ModeratorActionBody),
}

impl OutboundMessage {
    /// Creates a pong response.
    pub fn pong() -> Self {
        Self::Pong(String::new())
    }

    /// Creates a player join notification.
    pub fn player_join(server_id: ServerId, player: &OnlinePlayer, at: DateTime<Utc>) -> Self {
        Self::PlayerJoin(PlayerEventBody {
            server_id,
            player_id: player.id.clone(),
            name: player.name.clone(),
            at,
        })
    }

    /// Creates a player quit notification.
    pub fn player_quit(server_id: ServerId, player: &OnlinePlayer, at: DateTime<Utc>) -> Self {
        Self::PlayerQuit(PlayerEventBody {
            server_id,
            player_id: player.id.clone(),
            name: player.name.clone(),
            at,
        })
    }

    /// Creates a full player list notification.
    pub fn player_list_refresh(
        server_id: ServerId,
        players: Vec<OnlinePlayer>,
        at: DateTime<Utc>,
    ) -> Self {
        Self::PlayerListRefresh(PlayerListBody {
            server_id,
            players,
            at,
        })
    }

    /// Creates a server online/offline notification.
    pub fn server_status(server_id: ServerId, online: bool) -> Self {
        Self::ServerStatus(ServerStatusBody { server_id, online })
    }

    /// Creates an infraction notification.
    pub fn infraction_create(body: InfractionBody) -> Self {
        Self::InfractionCreate(body)
    }

    /// Creates a chat notification.
    pub fn chat(
        server_id: ServerId,
        player: &OnlinePlayer,
        message: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self::Chat(ChatEventBody {
            server_id,
            player_id: player.id.clone(),
            name: player.name.clone(),
            message: message.into(),
            at,
        })
    }

    /// Creates a moderator chat notification.
    pub fn chat_send(
        server_id: ServerId,
        user_id: &UserId,
        sender: impl Into<String>,
        message: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self::ChatSend(ChatSendBody {
            server_id,
            user_id: user_id.clone(),
            sender: sender.into(),
            message: message.into(),
            at,
        })
    }

    /// Creates a moderator action notification.
    pub fn moderator_action(
        server_id: ServerId,
        fields: BTreeMap<String, String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self::ModeratorAction(ModeratorActionBody {
            server_id,
            fields,
            at,
        })
    }

    /// Wire name of the message type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Pong(_) => "pong",
            Self::PlayerJoin(_) => "player-join",
            Self::PlayerQuit(_) => "player-quit",
            Self::PlayerListRefresh(_) => "player-list-refresh",
            Self::ServerStatus(_) => "server-status",
            Self::InfractionCreate(_) => "infraction-create",
            Self::Chat(_) => "chat",
            Self::ChatSend(_) => "chat-send",
            Self::ModeratorAction(_) => "moderator-action",
        }
    }

    /// Server the message concerns, if any.
    pub fn server_id(&self) -> Option<ServerId> {
        match self {
            Self::Pong(_) => None,
            Self::PlayerJoin(b) | Self::PlayerQuit(b) => Some(b.server_id),
            Self::PlayerListRefresh(b) => Some(b.server_id),
            Self::ServerStatus(b) => Some(b.server_id),
            Self::InfractionCreate(b) => Some(b.server_id),
            Self::Chat(b) => Some(b.server_id),
            Self::ChatSend(b) => Some(b.server_id),
            Self::ModeratorAction(b) => Some(b.server_id),
        }
    }

    /// Encodes the message as a JSON text frame.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::from)
    }
}
