//! Client struct definition
//!
//! A connected WebSocket client as seen by the notification hub: its
//! outbound channel and the sessions it is watching.

use std::collections::HashSet;

use tokio::sync::mpsc;

use crate::error::SendError;
use crate::message::ServerMessage;
use crate::types::{ClientId, SessionId};

/// Connected client information
#[derive(Debug)]
pub struct Client {
    /// Unique identifier for this connection
    pub id: ClientId,
    /// Server → Client message channel
    pub sender: mpsc::Sender<ServerMessage>,
    /// Sessions whose events this client receives
    pub watching: HashSet<SessionId>,
}

impl Client {
    /// Create a new client with the given ID and sender channel
    pub fn new(id: ClientId, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id,
            sender,
            watching: HashSet::new(),
        }
    }

    /// Queue a message without waiting
    ///
    /// A slow client loses the message instead of stalling the hub.
    pub fn notify(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.sender.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::ChannelFull,
            mpsc::error::TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }

    /// Start watching a session; returns false if already watching
    pub fn watch(&mut self, session_id: SessionId) -> bool {
        self.watching.insert(session_id)
    }

    /// Stop watching a session; returns false if not watching
    pub fn unwatch(&mut self, session_id: SessionId) -> bool {
        self.watching.remove(&session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_creation() {
        let (tx, _rx) = mpsc::channel(32);
        let client = Client::new(ClientId::new(), tx);

        assert!(client.watching.is_empty());
    }

    #[tokio::test]
    async fn test_client_watch() {
        let (tx, _rx) = mpsc::channel(32);
        let mut client = Client::new(ClientId::new(), tx);
        let session = SessionId::new();

        assert!(client.watch(session));
        assert!(!client.watch(session));
        assert!(client.unwatch(session));
        assert!(!client.unwatch(session));
    }

    #[tokio::test]
    async fn test_notify_full_and_closed() {
        let (tx, rx) = mpsc::channel(1);
        let client = Client::new(ClientId::new(), tx);
        let msg = ServerMessage::Connected {
            client_id: client.id.to_string(),
        };

        client.notify(msg.clone()).unwrap();
        assert!(matches!(client.notify(msg.clone()), Err(SendError::ChannelFull)));

        drop(rx);
        assert!(matches!(client.notify(msg), Err(SendError::ChannelClosed)));
    }
}
