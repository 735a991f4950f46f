//! NotificationHub actor implementation
//!
//! Fans session events out to the connections watching each session.
//! Uses the Actor pattern: `HubServer` owns all subscription state and
//! processes `HubCommand`s from a channel; `HubHandle` is the cheap,
//! cloneable front door used by connection handlers.

use std::collections::{HashMap, HashSet};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::error::SendError;
use crate::message::{ServerMessage, SessionEvent};
use crate::types::{ClientId, SessionId};

/// Publish side of the hub, as seen by callers of the engine
///
/// Fire-and-forget: delivery is best-effort, at most once. `version` is the
/// snapshot version the event describes.
pub trait NotificationHub: Send + Sync {
    fn publish(&self, session_id: SessionId, version: u64, event: SessionEvent);
}

/// Commands sent to the HubServer actor
#[derive(Debug)]
pub enum HubCommand {
    /// New client connected
    Connect {
        client_id: ClientId,
        sender: mpsc::Sender<ServerMessage>,
    },
    /// Client disconnected
    Disconnect { client_id: ClientId },
    /// Subscribe a client to a session's events
    Watch {
        client_id: ClientId,
        session_id: SessionId,
    },
    /// Unsubscribe a client from a session's events
    Unwatch {
        client_id: ClientId,
        session_id: SessionId,
    },
    /// Deliver an event to every watcher of a session
    Publish {
        session_id: SessionId,
        version: u64,
        event: SessionEvent,
    },
}

/// The notification hub actor
///
/// Keeps both directions of the subscription relation so disconnects and
/// publishes are both O(watchers).
pub struct HubServer {
    /// All connected clients: ClientId -> Client
    clients: HashMap<ClientId, Client>,
    /// Watchers per session: SessionId -> ClientIds
    topics: HashMap<SessionId, HashSet<ClientId>>,
    /// Command receiver channel
    receiver: mpsc::Receiver<HubCommand>,
}

impl HubServer {
    /// Create a new HubServer with the given command receiver
    pub fn new(receiver: mpsc::Receiver<HubCommand>) -> Self {
        Self {
            clients: HashMap::new(),
            topics: HashMap::new(),
            receiver,
        }
    }

    /// Create a hub and the handle that talks to it
    pub fn channel(buffer: usize) -> (Self, HubHandle) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(rx), HubHandle { sender: tx })
    }

    /// Run the hub event loop
    ///
    /// Continuously receives and processes commands until all senders are dropped.
    pub async fn run(mut self) {
        info!("NotificationHub started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("NotificationHub shutting down");
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Connect { client_id, sender } => {
                self.clients.insert(client_id, Client::new(client_id, sender));
                debug!("Hub clients: {}", self.clients.len());
            }
            HubCommand::Disconnect { client_id } => self.handle_disconnect(client_id),
            HubCommand::Watch {
                client_id,
                session_id,
            } => self.handle_watch(client_id, session_id),
            HubCommand::Unwatch {
                client_id,
                session_id,
            } => self.handle_unwatch(client_id, session_id),
            HubCommand::Publish {
                session_id,
                version,
                event,
            } => self.handle_publish(session_id, version, event),
        }
    }

    fn handle_disconnect(&mut self, client_id: ClientId) {
        let Some(client) = self.clients.remove(&client_id) else {
            return;
        };

        for session_id in &client.watching {
            self.drop_watcher(*session_id, client_id);
        }

        debug!(
            "Hub clients: {}, watched sessions: {}",
            self.clients.len(),
            self.topics.len()
        );
    }

    fn handle_watch(&mut self, client_id: ClientId, session_id: SessionId) {
        let Some(client) = self.clients.get_mut(&client_id) else {
            return;
        };

        if client.watch(session_id) {
            self.topics.entry(session_id).or_default().insert(client_id);
            debug!("Client {} watching session {}", client_id, session_id);
        }
    }

    fn handle_unwatch(&mut self, client_id: ClientId, session_id: SessionId) {
        let Some(client) = self.clients.get_mut(&client_id) else {
            return;
        };

        if client.unwatch(session_id) {
            self.drop_watcher(session_id, client_id);
        }
    }

    fn handle_publish(&self, session_id: SessionId, version: u64, event: SessionEvent) {
        let Some(watchers) = self.topics.get(&session_id) else {
            return;
        };

        for client_id in watchers {
            let Some(client) = self.clients.get(client_id) else {
                continue;
            };
            let msg = ServerMessage::Event {
                session_id,
                version,
                event: event.clone(),
            };
            match client.notify(msg) {
                Ok(()) => {}
                Err(SendError::ChannelFull) => {
                    warn!("Dropped event for slow client {}", client_id);
                }
                Err(SendError::ChannelClosed) => {
                    debug!("Client {} gone before event delivery", client_id);
                }
            }
        }
    }

    /// Helper: remove one watcher, dropping the topic when it empties
    fn drop_watcher(&mut self, session_id: SessionId, client_id: ClientId) {
        if let Some(watchers) = self.topics.get_mut(&session_id) {
            watchers.remove(&client_id);
            if watchers.is_empty() {
                self.topics.remove(&session_id);
            }
        }
    }
}

/// Cloneable sender side of the hub
#[derive(Debug, Clone)]
pub struct HubHandle {
    sender: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    /// Register a connection's outbound channel
    pub async fn connect(
        &self,
        client_id: ClientId,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<(), SendError> {
        self.send(HubCommand::Connect { client_id, sender }).await
    }

    pub async fn disconnect(&self, client_id: ClientId) -> Result<(), SendError> {
        self.send(HubCommand::Disconnect { client_id }).await
    }

    pub async fn watch(&self, client_id: ClientId, session_id: SessionId) -> Result<(), SendError> {
        self.send(HubCommand::Watch {
            client_id,
            session_id,
        })
        .await
    }

    pub async fn unwatch(
        &self,
        client_id: ClientId,
        session_id: SessionId,
    ) -> Result<(), SendError> {
        self.send(HubCommand::Unwatch {
            client_id,
            session_id,
        })
        .await
    }

    async fn send(&self, cmd: HubCommand) -> Result<(), SendError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| SendError::ChannelClosed)
    }
}

impl NotificationHub for HubHandle {
    fn publish(&self, session_id: SessionId, version: u64, event: SessionEvent) {
        let cmd = HubCommand::Publish {
            session_id,
            version,
            event,
        };
        if let Err(e) = self.sender.try_send(cmd) {
            warn!("Dropped event for session {}: {}", session_id, e);
        }
    }
}
