//! WebSocket transport over TCP.
//!
//! Thin wrapper around a Tokio [`TcpListener`] and `tokio-tungstenite`'s
//! server handshake. Accepting a TCP connection and upgrading it are split so
//! the accept loop never waits on a slow client's HTTP upgrade.
//!
//! # Capabilities
//!
//! - Text and binary frames in both directions
//! - Transport-level ping/pong (answered automatically by tungstenite on the
//!   client side, surfaced to the server as `Message::Pong`)
//! - Close frames and forced termination (dropping the stream)

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{WebSocketStream, accept_async};

use crate::error::ServerError;

/// An upgraded WebSocket connection.
pub type WsStream = WebSocketStream<TcpStream>;

/// WebSocket listener.
pub struct WsTransport {
    listener: TcpListener,
}

impl WsTransport {
    /// Create and bind a new WebSocket transport.
    pub async fn bind(address: &str) -> Result<Self, ServerError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid bind address '{address}': {e}")))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Transport(format!("failed to bind {addr}: {e}")))?;

        tracing::info!("WebSocket transport bound to {}", addr);

        Ok(Self { listener })
    }

    /// Accept a new TCP connection.
    ///
    /// This method waits until a connection is available. The WebSocket
    /// handshake has not happened yet; call [`PendingConnection::upgrade`].
    pub async fn accept(&self) -> Result<PendingConnection, ServerError> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(|e| ServerError::Transport(format!("accept failed: {e}")))?;

        Ok(PendingConnection { stream, peer })
    }

    /// Local address the transport is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::Transport(format!("failed to get local address: {e}")))
    }
}

/// A TCP connection awaiting its WebSocket upgrade.
pub struct PendingConnection {
    stream: TcpStream,
    peer: SocketAddr,
}

impl PendingConnection {
    /// Remote address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Perform the server side of the WebSocket handshake.
    pub async fn upgrade(self) -> Result<WsStream, ServerError> {
        let peer = self.peer;
        accept_async(self.stream)
            .await
            .map_err(|e| ServerError::Protocol(format!("websocket upgrade from {peer} failed: {e}")))
    }
}
