//! WebSocket connection handler
//!
//! Handles individual client connections: WebSocket handshake, message
//! parsing, and translating each request into one engine or registry call.
//! After a successful session mutation the handler replies to the caller
//! and then publishes exactly one event through the notification hub.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::directory::PlayerRegistry;
use crate::engine::SessionEngine;
use crate::error::{AppError, EngineError};
use crate::hub::{HubHandle, NotificationHub};
use crate::message::{ClientMessage, ServerMessage, SessionEvent, SessionView};
use crate::session::Session;
use crate::types::{ClientId, JoinCode, PlayerId, SessionId};

/// Outbound queue depth per connection
const CLIENT_BUFFER_SIZE: usize = 32;

/// Shared state every connection works against
pub struct ServerContext {
    pub engine: SessionEngine,
    pub registry: Arc<PlayerRegistry>,
    pub hub: HubHandle,
}

/// Event to publish: session, snapshot version, payload
pub type Published = (SessionId, u64, SessionEvent);

/// A reply plus the event to publish once it is sent
pub type Outcome = (ServerMessage, Option<Published>);

/// Handle a new TCP connection
///
/// Performs WebSocket handshake, sets up bidirectional communication,
/// and manages the connection lifecycle.
pub async fn handle_connection(stream: TcpStream, ctx: Arc<ServerContext>) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let client_id = ClientId::new();
    info!("Client {} connected from {}", client_id, peer_addr);

    // Server -> client messages: replies from this task, events from the hub
    let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(CLIENT_BUFFER_SIZE);

    if ctx.hub.connect(client_id, msg_tx.clone()).await.is_err() {
        error!("Failed to register client {} - hub closed", client_id);
        return Err(AppError::ChannelSend);
    }

    let connected_msg = ServerMessage::Connected {
        client_id: client_id.to_string(),
    };
    let json = serde_json::to_string(&connected_msg)?;
    ws_sender.send(Message::Text(json.into())).await?;

    // Spawn read task (WebSocket -> engine)
    let read_ctx = ctx.clone();
    let read_task = tokio::spawn(async move {
        while let Some(msg_result) = ws_receiver.next().await {
            match msg_result {
                Ok(Message::Text(text)) => {
                    let reply = match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(client_msg) => {
                            handle_message(&read_ctx, client_id, client_msg).await
                        }
                        Err(e) => {
                            warn!("Invalid JSON from {}: {}", client_id, e);
                            (AppError::from(e).into(), None)
                        }
                    };
                    if !deliver(&read_ctx, &msg_tx, reply).await {
                        debug!("Outbound channel closed, ending read task for {}", client_id);
                        break;
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!("Client {} sent close frame", client_id);
                    break;
                }
                Ok(Message::Ping(_)) => {
                    // Pong is handled automatically by tungstenite
                    debug!("Ping from {}", client_id);
                }
                Ok(_) => {
                    // Binary or other message types - ignore
                }
                Err(e) => {
                    error!("WebSocket error for {}: {}", client_id, e);
                    break;
                }
            }
        }
        debug!("Read task ended for {}", client_id);
    });

    // Spawn write task (ServerMessage -> WebSocket)
    let write_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                }
            }
        }
        debug!("Write task ended for client");

        let _ = ws_sender.close().await;
    });

    // Wait for either task to complete
    tokio::select! {
        _ = read_task => {
            debug!("Read task completed for {}", client_id);
        }
        _ = write_task => {
            debug!("Write task completed for {}", client_id);
        }
    }

    let _ = ctx.hub.disconnect(client_id).await;

    info!("Client {} disconnected", client_id);

    Ok(())
}

/// Send the reply, then publish the event it carries
///
/// Returns false once the connection's outbound channel is closed.
async fn deliver(ctx: &ServerContext, msg_tx: &mpsc::Sender<ServerMessage>, outcome: Outcome) -> bool {
    let (reply, event) = outcome;
    let open = msg_tx.send(reply).await.is_ok();
    if let Some((session_id, version, event)) = event {
        ctx.hub.publish(session_id, version, event);
    }
    open
}

/// Run one request, turning failures into error replies
pub async fn handle_message(ctx: &ServerContext, client_id: ClientId, msg: ClientMessage) -> Outcome {
    match dispatch(ctx, client_id, msg).await {
        Ok(outcome) => outcome,
        Err(e) => {
            debug!("Request from {} rejected: {}", client_id, e);
            (e.into(), None)
        }
    }
}

async fn dispatch(
    ctx: &ServerContext,
    client_id: ClientId,
    msg: ClientMessage,
) -> Result<Outcome, AppError> {
    match msg {
        ClientMessage::Register { name } => {
            let player = ctx.registry.register(&name)?;
            info!("Player {} registered as '{}'", player.id, player.name);
            Ok((ServerMessage::Registered { player }, None))
        }
        ClientMessage::Rename { player_id, name } => {
            let player = ctx.registry.rename(player_id, &name)?;
            info!("Player {} renamed to '{}'", player.id, player.name);
            Ok((ServerMessage::Registered { player }, None))
        }
        ClientMessage::GetPlayer { player_id } => {
            let player = ctx.registry.get(player_id)?;
            Ok((ServerMessage::Player { player }, None))
        }
        ClientMessage::ListPlayers => {
            let players = ctx.registry.list()?;
            Ok((ServerMessage::Players { players }, None))
        }
        ClientMessage::RemovePlayer { player_id } => {
            let player = ctx.registry.remove(player_id)?;
            info!("Player {} ('{}') removed", player.id, player.name);
            Ok((ServerMessage::PlayerRemoved { player_id }, None))
        }
        ClientMessage::CreateSession { host_id } => {
            let mut rng = StdRng::from_entropy();
            let session = ctx.engine.create_session(host_id, &mut rng)?;
            info!(
                "Player {} created session {} ({})",
                host_id, session.id, session.join_code
            );
            watch(ctx, client_id, session.id).await;
            Ok(changed(&session, SessionEvent::players_changed))
        }
        ClientMessage::JoinSession {
            join_code,
            player_id,
        } => {
            let join_code = JoinCode::from_string(join_code);
            if join_code.as_str().is_empty() {
                return Err(AppError::InvalidRequest("join_code is required".to_string()));
            }
            let session = ctx.engine.join_session(&join_code, player_id)?;
            info!("Player {} joined session {}", player_id, session.id);
            watch(ctx, client_id, session.id).await;
            Ok(changed(&session, SessionEvent::players_changed))
        }
        ClientMessage::StartSession {
            session_id,
            host_id,
            spy_count,
        } => {
            let spy_count = spy_count
                .ok_or_else(|| AppError::InvalidRequest("spy_count is required".to_string()))?;
            let mut rng = StdRng::from_entropy();
            let session = ctx
                .engine
                .start_session(session_id, host_id, spy_count, &mut rng)
                .await?;
            info!(
                "Session {} started with {} players, {} spies",
                session.id,
                session.players.len(),
                spy_count
            );
            Ok(changed(&session, SessionEvent::round_started))
        }
        ClientMessage::AdvanceTurn {
            session_id,
            host_id,
        } => {
            let session = ctx.engine.advance_turn(session_id, host_id)?;
            debug!("Session {} at turn {}", session.id, session.turn_index);
            Ok(changed(&session, SessionEvent::turn_advanced))
        }
        ClientMessage::GetSession { session_id } => {
            let session = ctx.engine.get_session(session_id)?;
            Ok((snapshot(&session), None))
        }
        ClientMessage::GetRole {
            session_id,
            player_id,
        } => {
            let session = ctx.engine.get_session(session_id)?;
            Ok((role(&session, player_id)?, None))
        }
        ClientMessage::RegenerateTheme { session_id } => {
            let session = ctx.engine.regenerate_theme(session_id).await?;
            info!("Session {} rethemed", session.id);
            Ok(changed(&session, SessionEvent::theme_changed))
        }
        ClientMessage::EndSession {
            session_id,
            host_id,
        } => {
            let session = ctx.engine.end_session(session_id, host_id)?;
            info!("Session {} finished after {} turns", session.id, session.turn_index);
            Ok(changed(&session, SessionEvent::round_ended))
        }
        ClientMessage::AttachImage {
            session_id,
            host_id,
            image_ref,
        } => {
            if image_ref.trim().is_empty() {
                return Err(AppError::InvalidRequest("image_ref is required".to_string()));
            }
            let session = ctx.engine.attach_image(session_id, host_id, image_ref)?;
            Ok(changed(&session, SessionEvent::image_changed))
        }
        ClientMessage::Watch { session_id } => {
            let session = ctx.engine.get_session(session_id)?;
            watch(ctx, client_id, session.id).await;
            Ok((snapshot(&session), None))
        }
        ClientMessage::Unwatch { session_id } => {
            if ctx.hub.unwatch(client_id, session_id).await.is_err() {
                return Err(AppError::ChannelSend);
            }
            Ok((ServerMessage::Unwatched { session_id }, None))
        }
    }
}

async fn watch(ctx: &ServerContext, client_id: ClientId, session_id: SessionId) {
    if ctx.hub.watch(client_id, session_id).await.is_err() {
        warn!("Hub closed; {} will not receive events for {}", client_id, session_id);
    }
}

fn snapshot(session: &Session) -> ServerMessage {
    ServerMessage::Session {
        session: SessionView::from(session),
    }
}

fn role(session: &Session, player_id: PlayerId) -> Result<ServerMessage, AppError> {
    if !session.contains(player_id) {
        return Err(EngineError::UnknownPlayer(player_id).into());
    }
    Ok(ServerMessage::Role {
        session_id: session.id,
        player_id,
        spy: session.is_spy(player_id),
        word: session.word_for(player_id).map(str::to_string),
    })
}

fn changed(session: &Session, event: fn(&Session) -> SessionEvent) -> Outcome {
    (
        snapshot(session),
        Some((session.id, session.version, event(session))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::time::timeout;

    use crate::config::EngineConfig;
    use crate::hub::HubServer;
    use crate::message::ErrorCode;
    use crate::session::SessionState;
    use crate::store::MemorySessionStore;
    use crate::theme::CatalogThemeProvider;

    fn context() -> Arc<ServerContext> {
        let registry = Arc::new(PlayerRegistry::new());
        let engine = SessionEngine::new(
            Arc::new(MemorySessionStore::new()),
            Arc::new(CatalogThemeProvider::with_seed(vec!["Casino".into()], 1)),
            registry.clone(),
            EngineConfig::default(),
        );
        let (hub, handle) = HubServer::channel(64);
        tokio::spawn(hub.run());
        Arc::new(ServerContext {
            engine,
            registry,
            hub: handle,
        })
    }

    async fn connect(ctx: &ServerContext) -> (ClientId, mpsc::Sender<ServerMessage>, mpsc::Receiver<ServerMessage>) {
        let client_id = ClientId::new();
        let (tx, rx) = mpsc::channel(CLIENT_BUFFER_SIZE);
        ctx.hub.connect(client_id, tx.clone()).await.unwrap();
        (client_id, tx, rx)
    }

    async fn request(
        ctx: &ServerContext,
        client_id: ClientId,
        tx: &mpsc::Sender<ServerMessage>,
        msg: ClientMessage,
    ) {
        let outcome = handle_message(ctx, client_id, msg).await;
        assert!(deliver(ctx, tx, outcome).await);
    }

    async fn next(rx: &mut mpsc::Receiver<ServerMessage>) -> ServerMessage {
        timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("timed out waiting for message")
            .expect("channel closed")
    }

    fn session_of(msg: ServerMessage) -> SessionView {
        match msg {
            ServerMessage::Session { session } => session,
            other => panic!("Expected session reply, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_round_flow_over_messages() {
        let ctx = context();
        let host = ctx.registry.register("Host").unwrap().id;
        let guest = ctx.registry.register("Guest").unwrap().id;
        let (host_conn, host_tx, mut host_rx) = connect(&ctx).await;
        let (guest_conn, guest_tx, mut guest_rx) = connect(&ctx).await;

        request(&ctx, host_conn, &host_tx, ClientMessage::CreateSession { host_id: host }).await;
        let created = session_of(next(&mut host_rx).await);
        assert!(matches!(
            next(&mut host_rx).await,
            ServerMessage::Event { event: SessionEvent::PlayersChanged { .. }, .. }
        ));

        request(
            &ctx,
            guest_conn,
            &guest_tx,
            ClientMessage::JoinSession {
                join_code: created.join_code.to_lowercase(),
                player_id: guest,
            },
        )
        .await;
        assert_eq!(session_of(next(&mut guest_rx).await).players, vec![host, guest]);
        // Both watchers see the join
        for rx in [&mut host_rx, &mut guest_rx] {
            match next(rx).await {
                ServerMessage::Event {
                    event: SessionEvent::PlayersChanged { players },
                    ..
                } => assert_eq!(players, vec![host, guest]),
                other => panic!("Unexpected message: {:?}", other),
            }
        }

        request(
            &ctx,
            host_conn,
            &host_tx,
            ClientMessage::StartSession {
                session_id: created.id,
                host_id: host,
                spy_count: Some(1),
            },
        )
        .await;
        let started = session_of(next(&mut host_rx).await);
        assert_eq!(started.state, SessionState::Running);
        assert_eq!(started.theme.as_deref(), Some("Casino"));
        assert!(matches!(
            next(&mut guest_rx).await,
            ServerMessage::Event {
                event: SessionEvent::RoundStarted { spy_count: Some(1), .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_spy_count_rejected_before_engine() {
        let ctx = context();
        let host = ctx.registry.register("Host").unwrap().id;
        let (conn, tx, mut rx) = connect(&ctx).await;

        request(&ctx, conn, &tx, ClientMessage::CreateSession { host_id: host }).await;
        let created = session_of(next(&mut rx).await);
        let _event = next(&mut rx).await;

        request(
            &ctx,
            conn,
            &tx,
            ClientMessage::StartSession {
                session_id: created.id,
                host_id: host,
                spy_count: None,
            },
        )
        .await;
        match next(&mut rx).await {
            ServerMessage::Error { code, .. } => assert_eq!(code, ErrorCode::InvalidRequest),
            other => panic!("Unexpected message: {:?}", other),
        }
        assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_failed_operation_publishes_nothing() {
        let ctx = context();
        let host = ctx.registry.register("Host").unwrap().id;
        let (conn, tx, mut rx) = connect(&ctx).await;

        request(&ctx, conn, &tx, ClientMessage::CreateSession { host_id: host }).await;
        let created = session_of(next(&mut rx).await);
        let _event = next(&mut rx).await;

        request(
            &ctx,
            conn,
            &tx,
            ClientMessage::AdvanceTurn {
                session_id: created.id,
                host_id: host,
            },
        )
        .await;
        match next(&mut rx).await {
            ServerMessage::Error { code, .. } => assert_eq!(code, ErrorCode::InvalidState),
            other => panic!("Unexpected message: {:?}", other),
        }
        assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_register_name_taken() {
        let ctx = context();
        let (conn, tx, mut rx) = connect(&ctx).await;

        request(&ctx, conn, &tx, ClientMessage::Register { name: "Ann".into() }).await;
        assert!(matches!(next(&mut rx).await, ServerMessage::Registered { .. }));

        request(&ctx, conn, &tx, ClientMessage::Register { name: "Ann".into() }).await;
        match next(&mut rx).await {
            ServerMessage::Error { code, .. } => assert_eq!(code, ErrorCode::NameTaken),
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_player_lookup_list_and_remove() {
        let ctx = context();
        let (conn, tx, mut rx) = connect(&ctx).await;
        let bob = ctx.registry.register("Bob").unwrap();
        ctx.registry.register("Alice").unwrap();

        request(&ctx, conn, &tx, ClientMessage::GetPlayer { player_id: bob.id }).await;
        match next(&mut rx).await {
            ServerMessage::Player { player } => assert_eq!(player, bob),
            other => panic!("Unexpected message: {:?}", other),
        }

        request(&ctx, conn, &tx, ClientMessage::ListPlayers).await;
        match next(&mut rx).await {
            ServerMessage::Players { players } => {
                let names: Vec<&str> = players.iter().map(|p| p.name.as_str()).collect();
                assert_eq!(names, vec!["Alice", "Bob"]);
            }
            other => panic!("Unexpected message: {:?}", other),
        }

        request(&ctx, conn, &tx, ClientMessage::RemovePlayer { player_id: bob.id }).await;
        match next(&mut rx).await {
            ServerMessage::PlayerRemoved { player_id } => assert_eq!(player_id, bob.id),
            other => panic!("Unexpected message: {:?}", other),
        }

        // Gone for lookups and for session operations alike
        request(&ctx, conn, &tx, ClientMessage::GetPlayer { player_id: bob.id }).await;
        match next(&mut rx).await {
            ServerMessage::Error { code, .. } => assert_eq!(code, ErrorCode::PlayerNotFound),
            other => panic!("Unexpected message: {:?}", other),
        }
        request(&ctx, conn, &tx, ClientMessage::CreateSession { host_id: bob.id }).await;
        match next(&mut rx).await {
            ServerMessage::Error { code, .. } => assert_eq!(code, ErrorCode::UnknownPlayer),
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_event_carries_snapshot_version() {
        let ctx = context();
        let host = ctx.registry.register("Host").unwrap().id;
        let guest = ctx.registry.register("Guest").unwrap().id;
        let (conn, tx, mut rx) = connect(&ctx).await;

        request(&ctx, conn, &tx, ClientMessage::CreateSession { host_id: host }).await;
        let created = session_of(next(&mut rx).await);
        match next(&mut rx).await {
            ServerMessage::Event { version, .. } => assert_eq!(version, created.version),
            other => panic!("Unexpected message: {:?}", other),
        }

        request(
            &ctx,
            conn,
            &tx,
            ClientMessage::JoinSession {
                join_code: created.join_code.clone(),
                player_id: guest,
            },
        )
        .await;
        let joined = session_of(next(&mut rx).await);
        assert_eq!(joined.version, created.version + 1);
        match next(&mut rx).await {
            ServerMessage::Event {
                session_id,
                version,
                ..
            } => {
                assert_eq!(session_id, created.id);
                assert_eq!(version, joined.version);
            }
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_role_reveals_own_word() {
        let ctx = context();
        let host = ctx.registry.register("Host").unwrap().id;
        let guest = ctx.registry.register("Guest").unwrap().id;
        let (conn, tx, mut rx) = connect(&ctx).await;

        request(&ctx, conn, &tx, ClientMessage::CreateSession { host_id: host }).await;
        let created = session_of(next(&mut rx).await);
        let _event = next(&mut rx).await;
        let join_code = JoinCode::from_string(created.join_code.clone());
        ctx.engine.join_session(&join_code, guest).unwrap();

        // Before the round nobody holds a word
        request(
            &ctx,
            conn,
            &tx,
            ClientMessage::GetRole {
                session_id: created.id,
                player_id: guest,
            },
        )
        .await;
        match next(&mut rx).await {
            ServerMessage::Role { spy, word, .. } => {
                assert!(!spy);
                assert!(word.is_none());
            }
            other => panic!("Unexpected message: {:?}", other),
        }

        request(
            &ctx,
            conn,
            &tx,
            ClientMessage::StartSession {
                session_id: created.id,
                host_id: host,
                spy_count: Some(1),
            },
        )
        .await;
        let started = session_of(next(&mut rx).await);
        let _event = next(&mut rx).await;
        let civilian = started.civilian_word.clone().unwrap();
        let spy_word = started.spy_word.clone().unwrap();

        for player in [host, guest] {
            request(
                &ctx,
                conn,
                &tx,
                ClientMessage::GetRole {
                    session_id: created.id,
                    player_id: player,
                },
            )
            .await;
            match next(&mut rx).await {
                ServerMessage::Role { spy, word, .. } => {
                    assert_eq!(spy, started.spy_ids.contains(&player));
                    let expected = if spy { &spy_word } else { &civilian };
                    assert_eq!(word.as_ref(), Some(expected));
                }
                other => panic!("Unexpected message: {:?}", other),
            }
        }

        request(
            &ctx,
            conn,
            &tx,
            ClientMessage::GetRole {
                session_id: created.id,
                player_id: PlayerId::new(),
            },
        )
        .await;
        match next(&mut rx).await {
            ServerMessage::Error { code, .. } => assert_eq!(code, ErrorCode::UnknownPlayer),
            other => panic!("Unexpected message: {:?}", other),
        }
    }
}
