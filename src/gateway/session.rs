//! One subscriber's WebSocket session
//!
//! Lifecycle: `Connecting` until registered, `Registered` while notifications
//! flow, `Closed` once the peer goes away or the dispatcher drops the client.
//! `Closed` is terminal; a reconnecting client gets a new session.

use crate::registry::{subscriber_channel, ClientRegistry};
use futures::{SinkExt, StreamExt};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info};

/// A send or close that takes longer than this counts as a broken transport
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Registered,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Registered => write!(f, "registered"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// Registers the connection, forwards notifications and watches for the
/// peer going away. Returns once the session is closed and unregistered.
pub async fn run<S>(ws: WebSocketStream<S>, peer: SocketAddr, registry: ClientRegistry)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut state = ConnectionState::Connecting;
    debug!("Subscriber {} {}", peer, state);

    let (handle, mut notifications) = subscriber_channel();
    let (mut sink, mut inbound) = ws.split();
    let id = registry.register(handle);
    state = ConnectionState::Registered;
    info!(
        "Client {} ({}) {} (total: {})",
        id,
        peer,
        state,
        registry.size()
    );

    let reason = loop {
        tokio::select! {
            incoming = inbound.next() => match incoming {
                None => break "peer disconnected".to_string(),
                Some(Err(e)) => break format!("read error: {e}"),
                Some(Ok(Message::Close(_))) => break "peer sent close".to_string(),
                // Inbound payloads carry no meaning; reading only detects disconnects
                Some(Ok(_)) => {}
            },
            note = notifications.recv() => match note {
                Some(note) => {
                    let send = sink.send(Message::text(note.as_str()));
                    match tokio::time::timeout(SEND_TIMEOUT, send).await {
                        Ok(Ok(())) => debug!("Sent {} to client {}", note.as_str(), id),
                        Ok(Err(e)) => break format!("write error: {e}"),
                        Err(_) => break "write timed out".to_string(),
                    }
                }
                None => break "dropped by dispatcher".to_string(),
            },
        }
    };

    registry.unregister(id);
    if tokio::time::timeout(SEND_TIMEOUT, sink.close()).await.is_err() {
        debug!("Client {} did not take the close frame, dropping socket", id);
    }
    state = ConnectionState::Closed;
    info!(
        "Client {} ({}) {}: {} (total: {})",
        id,
        peer,
        state,
        reason,
        registry.size()
    );
}
