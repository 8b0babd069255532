//! Registry of connected live-update subscribers
//!
//! Each subscriber is represented by a [`ClientHandle`]: the sending half of
//! a one-slot channel whose receiving half ([`NotificationStream`]) belongs to
//! the connection task. Dropping the handle closes the stream, which is how
//! the registry closes a connection it has given up on.

use crate::error::VigilError;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, error::TrySendError};

/// Notification tokens sent to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    /// A new report was published
    Reload,
}

impl Notification {
    /// Wire form of the token
    pub fn as_str(&self) -> &'static str {
        match self {
            Notification::Reload => "reload",
        }
    }
}

/// Identifier assigned to a subscriber on registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Registry-side end of a subscriber connection
#[derive(Debug)]
pub struct ClientHandle {
    tx: mpsc::Sender<Notification>,
}

impl ClientHandle {
    /// Hands a token to the connection without waiting.
    ///
    /// Fails when the connection is gone or has not yet taken the previous
    /// token; both mean the client should be dropped.
    pub fn offer(&self, notification: Notification) -> Result<(), VigilError> {
        self.tx.try_send(notification).map_err(|e| match e {
            TrySendError::Full(_) => {
                VigilError::ConnectionError("client not ready for notification".to_string())
            }
            TrySendError::Closed(_) => {
                VigilError::ConnectionError("connection closed".to_string())
            }
        })
    }
}

/// Connection-side end: yields tokens until the registry drops the client
#[derive(Debug)]
pub struct NotificationStream {
    rx: mpsc::Receiver<Notification>,
}

impl NotificationStream {
    /// Next token, or `None` once the registry has released this client
    pub async fn recv(&mut self) -> Option<Notification> {
        self.rx.recv().await
    }
}

/// Creates the two ends of a subscriber channel with a single hand-off slot
pub fn subscriber_channel() -> (ClientHandle, NotificationStream) {
    let (tx, rx) = mpsc::channel(1);
    (ClientHandle { tx }, NotificationStream { rx })
}

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: u64,
    clients: HashMap<ClientId, ClientHandle>,
}

/// Thread-safe set of subscribers.
///
/// Built once at startup and cloned into every connection handler; clones
/// share the same set.
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber and returns its id
    pub fn register(&self, handle: ClientHandle) -> ClientId {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.next_id += 1;
        let id = ClientId(inner.next_id);
        inner.clients.insert(id, handle);
        id
    }

    /// Removes a subscriber. Returns whether it was still registered.
    pub fn unregister(&self, id: ClientId) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.clients.remove(&id).is_some()
    }

    /// Number of registered subscribers
    pub fn size(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.clients.len()
    }

    /// Visits every subscriber under one lock, dropping those for which `keep`
    /// returns false. Returns how many were dropped.
    pub fn retain<F>(&self, mut keep: F) -> usize
    where
        F: FnMut(ClientId, &ClientHandle) -> bool,
    {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let before = inner.clients.len();
        inner.clients.retain(|id, handle| keep(*id, handle));
        before - inner.clients.len()
    }
}
