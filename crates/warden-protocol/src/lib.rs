//! Warden Protocol - Wire protocol for the moderator push hub
//!
//! Every frame exchanged with a moderator client is a JSON envelope
//! `{"type": <string>, "body": <any>}`. Clients send `ping` and `chat`;
//! the hub pushes player, chat, status and infraction events, and echoes
//! moderator chat back as `chat-send`.

pub mod message;
pub mod parse;

pub use message::{
    ChatEventBody, ChatSendBody, InfractionBody, ModeratorActionBody, OutboundMessage,
    PlayerEventBody, PlayerListBody, ServerStatusBody,
};
pub use parse::{parse_inbound, ChatRequest, Envelope, InboundMessage, ProtocolError};
