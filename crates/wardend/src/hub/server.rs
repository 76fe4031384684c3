//! WebSocket listener for moderator clients.
//!
//! Authentication happens upstream: the reverse proxy in front of warden
//! injects the moderator's user id as a request header. Upgrades without
//! that header are refused with 401.

use std::io;
use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use warden_core::UserId;

use super::handle::HubHandle;
use super::HubError;

/// Header carrying the authenticated user id.
pub const DEFAULT_USER_HEADER: &str = "x-warden-user";

pub struct HubServer {
    listener: TcpListener,
    user_header: String,
    hub: HubHandle,
    cancel_token: CancellationToken,
}

impl HubServer {
    /// Binds the listener.
    pub async fn bind(
        address: &str,
        user_header: impl Into<String>,
        hub: HubHandle,
        cancel_token: CancellationToken,
    ) -> Result<Self, HubError> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|source| HubError::Bind {
                address: address.to_string(),
                source,
            })?;

        Ok(Self {
            listener,
            user_header: user_header.into().to_ascii_lowercase(),
            hub,
            cancel_token,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until the cancellation token fires.
    pub async fn run(self) {
        match self.listener.local_addr() {
            Ok(addr) => info!(address = %addr, "Hub server listening"),
            Err(_) => info!("Hub server listening"),
        }

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Hub server shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let hub = self.hub.clone();
                            let header = self.user_header.clone();
                            tokio::spawn(accept_connection(stream, peer, header, hub));
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }
    }
}

async fn accept_connection(stream: TcpStream, peer: SocketAddr, user_header: String, hub: HubHandle) {
    let mut user: Option<UserId> = None;

    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        match user_from_request(request, &user_header) {
            Some(id) => {
                user = Some(id);
                Ok(response)
            }
            None => Err(unauthorized()),
        }
    };

    let socket = match accept_hdr_async(stream, callback).await {
        Ok(socket) => socket,
        Err(e) => {
            debug!(peer = %peer, error = %e, "WebSocket upgrade rejected");
            return;
        }
    };

    let Some(user) = user else {
        return;
    };

    match hub.create_client(user.clone(), socket).await {
        Ok(client_id) => {
            info!(peer = %peer, client_id = %client_id, user_id = %user, "Moderator connected");
        }
        Err(e) => warn!(peer = %peer, error = %e, "Failed to register hub client"),
    }
}

fn user_from_request(request: &Request, header: &str) -> Option<UserId> {
    request
        .headers()
        .get(header)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(UserId::from)
}

fn unauthorized() -> ErrorResponse {
    let mut response = ErrorResponse::new(Some("missing user identity".to_string()));
    *response.status_mut() = StatusCode::UNAUTHORIZED;
    response
}
