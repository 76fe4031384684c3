//! Forwards event-bus traffic to moderator clients.

use std::sync::Arc;

use tracing::warn;

use warden_protocol::OutboundMessage;

use super::handle::HubHandle;
use crate::events::EventBus;
use crate::repository::AccessPolicy;

/// Subscribes the hub to every event kind.
///
/// Chat, in-game or sent by a moderator, goes only to users the policy
/// allows for that server; everything else goes to all clients. Subscribers
/// run synchronously on the publisher's task, so messages are queued without
/// waiting and dropped with a warning if the hub is saturated.
pub fn bridge_events(events: &EventBus, hub: HubHandle, policy: Arc<dyn AccessPolicy>) {
    let h = hub.clone();
    events.subscribe_join(move |e| {
        forward(&h, &OutboundMessage::player_join(e.server_id, &e.player, e.at));
    });

    let h = hub.clone();
    events.subscribe_quit(move |e| {
        forward(&h, &OutboundMessage::player_quit(e.server_id, &e.player, e.at));
    });

    let h = hub.clone();
    events.subscribe_player_list_update(move |e| {
        forward(
            &h,
            &OutboundMessage::player_list_refresh(e.server_id, e.players.clone(), e.at),
        );
    });

    let h = hub.clone();
    events.subscribe_server_status(move |e| {
        forward(&h, &OutboundMessage::server_status(e.server_id, e.online));
    });

    let h = hub.clone();
    events.subscribe_moderator_action(move |e| {
        forward(
            &h,
            &OutboundMessage::moderator_action(e.server_id, e.fields.clone(), e.at),
        );
    });

    let (h, p) = (hub.clone(), Arc::clone(&policy));
    events.subscribe_chat(move |e| {
        let message = OutboundMessage::chat(e.server_id, &e.player, e.message.clone(), e.at);
        forward_chat(&h, &p, &message);
    });

    events.subscribe_chat_send(move |e| {
        let message = OutboundMessage::chat_send(
            e.server_id,
            &e.user_id,
            e.sender.clone(),
            e.message.clone(),
            e.at,
        );
        forward_chat(&hub, &policy, &message);
    });
}

/// Sends to the users allowed to see chat on the message's server.
fn forward_chat(hub: &HubHandle, policy: &Arc<dyn AccessPolicy>, message: &OutboundMessage) {
    let Some(server_id) = message.server_id() else {
        return;
    };
    let policy = Arc::clone(policy);
    if let Err(e) =
        hub.try_broadcast_server_message(message, move |user| policy.can_view_chat(user, server_id))
    {
        warn!(kind = message.kind(), error = %e, "Dropped hub message");
    }
}

fn forward(hub: &HubHandle, message: &OutboundMessage) {
    if let Err(e) = hub.try_broadcast(message) {
        warn!(kind = message.kind(), error = %e, "Dropped hub message");
    }
}
