use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config;
use crate::error::{Rejection, SessionError, StaleReference};
use crate::game::{self, GameCommand, RoomHandle, Registry};
use crate::types::*;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
}

/// Build the router: `/ws` for game traffic, `/health` for probes.
pub fn build_app(registry: Arc<Registry>) -> Router {
    let origins = registry.config().allowed_origins.clone();
    let state = AppState { registry };

    let app = Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .with_state(state);

    if origins.is_empty() {
        return app;
    }
    let allowed = origins
        .iter()
        .filter_map(|o| o.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();
    app.layer(CorsLayer::new().allow_origin(AllowOrigin::list(allowed)))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "carquiz",
        "version": env!("CARGO_PKG_VERSION"),
        "rooms": state.registry.room_count(),
    }))
}

fn origin_allowed(allowed: &[String], headers: &HeaderMap) -> bool {
    if allowed.is_empty() {
        return true;
    }
    match headers.get(header::ORIGIN).and_then(|o| o.to_str().ok()) {
        Some(origin) => allowed.iter().any(|a| a == origin),
        None => true,
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> impl IntoResponse {
    if !origin_allowed(&state.registry.config().allowed_origins, &headers) {
        tracing::warn!("Rejected WebSocket from disallowed origin");
        return StatusCode::FORBIDDEN.into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// One WebSocket's view of the room it is attached to.
struct Connection {
    socket_id: String,
    out_tx: mpsc::Sender<ServerMsg>,
    room_id: Option<String>,
    forwarder: Option<JoinHandle<()>>,
}

impl Connection {
    async fn send(&self, msg: ServerMsg) {
        let _ = self.out_tx.send(msg).await;
    }

    async fn reject(&self, code: &str, message: String) {
        self.send(ServerMsg::Rejected {
            code: code.to_string(),
            message,
        })
        .await;
    }

    async fn reject_command(&self, rejection: Rejection) {
        self.reject(rejection.code(), rejection.to_string()).await;
    }

    /// Queue `cmd` for `room_id`. Only the attached room's events reach this
    /// socket, so commands for any other room are refused here.
    async fn command(&self, registry: &Registry, room_id: &str, cmd: GameCommand) {
        let Some(handle) = registry.room(room_id) else {
            self.reject_command(Rejection::RoomNotFound).await;
            return;
        };
        if self.room_id.as_deref() != Some(room_id) {
            self.reject_command(StaleReference::NotJoined.into()).await;
            return;
        }
        if handle.cmd_tx.send(cmd).await.is_err() {
            self.reject_command(Rejection::RoomNotFound).await;
        }
    }

    /// Subscribe to `handle`'s events, then ask the room to admit this socket.
    /// Subscribing first guarantees the room's resync snapshot is not missed.
    async fn attach(&mut self, registry: &Registry, handle: RoomHandle, slot: Option<Slot>) {
        if self.room_id.as_deref() != Some(handle.room_id.as_str()) {
            self.detach(registry).await;
        }
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }

        let rx = handle.event_tx.subscribe();
        self.forwarder = Some(tokio::spawn(forward_events(
            rx,
            self.socket_id.clone(),
            self.out_tx.clone(),
        )));
        self.room_id = Some(handle.room_id.clone());

        let _ = handle
            .cmd_tx
            .send(GameCommand::Join {
                socket_id: self.socket_id.clone(),
                slot,
            })
            .await;
    }

    async fn detach(&mut self, registry: &Registry) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
        if let Some(room_id) = self.room_id.take() {
            let _ = registry
                .send(&room_id, GameCommand::Leave {
                    socket_id: self.socket_id.clone(),
                })
                .await;
        }
    }
}

async fn forward_events(
    mut event_rx: broadcast::Receiver<game::GameEvent>,
    socket_id: String,
    out_tx: mpsc::Sender<ServerMsg>,
) {
    loop {
        match event_rx.recv().await {
            Ok(event) => {
                if let Some(msg) = event.for_socket(&socket_id) {
                    if out_tx.send(msg.clone()).await.is_err() {
                        return;
                    }
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Socket {} lagged, {} events skipped", socket_id, skipped);
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let registry = state.registry;

    let socket_id = uuid::Uuid::new_v4().to_string();
    tracing::info!("WebSocket connected: {}", socket_id);

    let idle_timeout = registry.config().socket_idle_timeout();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMsg>(256);
    let writer = tokio::spawn(async move {
        let mut ping = tokio::time::interval(idle_timeout / 2);
        ping.tick().await;
        loop {
            let frame = tokio::select! {
                msg = out_rx.recv() => {
                    let Some(msg) = msg else { return };
                    match serde_json::to_string(&msg) {
                        Ok(json) => Message::Text(json.into()),
                        Err(e) => {
                            tracing::error!("Failed to encode message: {}", e);
                            continue;
                        }
                    }
                }
                _ = ping.tick() => Message::Ping(Default::default()),
            };
            if sender.send(frame).await.is_err() {
                return;
            }
        }
    });

    let mut conn = Connection {
        socket_id: socket_id.clone(),
        out_tx,
        room_id: None,
        forwarder: None,
    };

    // Process incoming messages. Pongs count as activity.
    loop {
        let msg = match tokio::time::timeout(idle_timeout, receiver.next()).await {
            Ok(Some(Ok(msg))) => msg,
            Ok(_) => break,
            Err(_) => {
                tracing::info!("WebSocket {} idle for {:?}, closing", socket_id, idle_timeout);
                break;
            }
        };
        let Message::Text(text) = msg else { continue };

        let client_msg: ClientMsg = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("Invalid message from {}: {}", socket_id, e);
                conn.reject("malformed", e.to_string()).await;
                continue;
            }
        };

        match client_msg {
            ClientMsg::ListQuizzes => {
                conn.send(ServerMsg::QuizList {
                    quizzes: registry.quizzes().to_vec(),
                })
                .await;
            }

            ClientMsg::CreateRoom {
                quiz,
                players,
                turn_policy,
            } => {
                let quiz = match quiz {
                    QuizRef::Stored { quiz_id } => registry
                        .find_quiz(&quiz_id)
                        .cloned()
                        .ok_or(SessionError::QuizNotFound(quiz_id)),
                    QuizRef::Inline(quiz) => Ok(quiz),
                };
                let created = quiz
                    .and_then(|quiz| game::create_room(&registry, quiz, players, turn_policy));

                match created {
                    Ok(handle) => {
                        conn.send(ServerMsg::RoomCreated {
                            room_id: handle.room_id.clone(),
                        })
                        .await;
                        conn.attach(&registry, handle, None).await;
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Room creation failed for {}: {}",
                            socket_id,
                            config::truncate_for_log(&e.to_string(), 300)
                        );
                        conn.reject(e.code(), e.to_string()).await;
                    }
                }
            }

            ClientMsg::JoinRoom { room_id, slot } => match registry.room(&room_id) {
                Some(handle) => conn.attach(&registry, handle, slot).await,
                None => conn.reject_command(Rejection::RoomNotFound).await,
            },

            ClientMsg::SubmitAnswer {
                room_id,
                slot,
                question_index,
                display_position,
            } => {
                let cmd = GameCommand::SubmitAnswer {
                    socket_id: socket_id.clone(),
                    slot,
                    question_index,
                    display_position,
                };
                conn.command(&registry, &room_id, cmd).await;
            }

            ClientMsg::EndGame { room_id } => {
                let cmd = GameCommand::EndGame {
                    socket_id: socket_id.clone(),
                };
                conn.command(&registry, &room_id, cmd).await;
            }

            ClientMsg::Restart { room_id } => {
                let cmd = GameCommand::Restart {
                    socket_id: socket_id.clone(),
                };
                conn.command(&registry, &room_id, cmd).await;
            }
        }
    }

    // Socket disconnected
    tracing::info!("WebSocket disconnected: {}", socket_id);
    conn.detach(&registry).await;
    writer.abort();
}
