//! Per-connection read loop.

use futures::stream::SplitStream;
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::error::ProtocolError as WsProtocolError;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, trace, warn};

use warden_core::UserId;
use warden_protocol::{parse_inbound, InboundMessage, OutboundMessage};

use super::handle::HubHandle;
use super::ClientId;

/// Reads frames until the peer goes away, then unregisters the client.
///
/// End of stream and close frames with code normal or going-away are a
/// clean exit. Any other read error is logged and ends the connection.
pub(crate) async fn read_loop<S>(
    client_id: ClientId,
    user_id: UserId,
    mut stream: SplitStream<WebSocketStream<S>>,
    hub: HubHandle,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        match stream.next().await {
            None => {
                debug!(client_id = %client_id, "Hub client sent EOF");
                break;
            }
            Some(Ok(Message::Text(text))) => {
                handle_text(client_id, &user_id, text.as_str(), &hub).await;
            }
            Some(Ok(Message::Close(frame))) => {
                match frame.map(|f| f.code) {
                    None | Some(CloseCode::Normal) | Some(CloseCode::Away) => {
                        debug!(client_id = %client_id, "Hub client closed connection");
                    }
                    Some(code) => {
                        warn!(client_id = %client_id, code = u16::from(code), "Hub client closed with error code");
                    }
                }
                break;
            }
            // Control and binary frames carry nothing for us.
            Some(Ok(_)) => {}
            Some(Err(
                WsError::ConnectionClosed
                | WsError::AlreadyClosed
                | WsError::Protocol(WsProtocolError::ResetWithoutClosingHandshake),
            )) => {
                debug!(client_id = %client_id, "Hub client disconnected");
                break;
            }
            Some(Err(e)) => {
                warn!(client_id = %client_id, error = %e, "Hub read failed");
                break;
            }
        }
    }

    if hub.unregister(client_id).await.is_err() {
        debug!(client_id = %client_id, "Hub already stopped");
    }
}

async fn handle_text(client_id: ClientId, user_id: &UserId, text: &str, hub: &HubHandle) {
    match parse_inbound(text) {
        Ok(Some(InboundMessage::Ping)) => {
            if let Err(e) = hub.send_to_client(client_id, &OutboundMessage::pong()).await {
                debug!(client_id = %client_id, error = %e, "Failed to queue pong");
            }
        }
        Ok(Some(InboundMessage::Chat(request))) => {
            hub.chat_sink().send_chat(user_id, request);
        }
        Ok(None) => {
            trace!(client_id = %client_id, "Ignoring unknown message type");
        }
        Err(e) => {
            trace!(client_id = %client_id, error = %e, "Dropping malformed frame");
        }
    }
}
