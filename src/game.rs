use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use rand::Rng;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use crate::config::{self, GameConfig};
use crate::error::{Rejection, SessionError, StaleReference};
use crate::session::{QuizSession, SessionEvent, SessionSettings};
use crate::timer::FeedbackTimer;
use crate::types::*;

/// Commands a connection (or the room itself) sends to a room task.
#[derive(Debug, Clone)]
pub enum GameCommand {
    Join {
        socket_id: String,
        slot: Option<Slot>,
    },
    SubmitAnswer {
        socket_id: String,
        slot: Slot,
        question_index: usize,
        display_position: usize,
    },
    EndGame {
        socket_id: String,
    },
    Restart {
        socket_id: String,
    },
    Leave {
        socket_id: String,
    },
    FeedbackElapsed {
        question_index: usize,
    },
    IdleCheck,
}

/// Events broadcast from a room to its connections.
#[derive(Debug, Clone)]
pub enum GameEvent {
    /// Send a message to a specific socket.
    SendTo { socket_id: String, msg: ServerMsg },
    /// Broadcast a message to all sockets in the room.
    Broadcast { msg: ServerMsg },
}

impl GameEvent {
    /// The message for `socket_id`, if this event addresses it.
    pub fn for_socket(&self, socket_id: &str) -> Option<&ServerMsg> {
        match self {
            Self::SendTo { socket_id: target, msg } if target == socket_id => Some(msg),
            Self::SendTo { .. } => None,
            Self::Broadcast { msg } => Some(msg),
        }
    }
}

fn create_room_code() -> String {
    let mut rng = rand::rng();
    (0..6).map(|_| char::from(b'0' + rng.random_range(0..10))).collect()
}

/// The internal state of a running room.
struct RoomState {
    room_id: String,
    session: QuizSession,
    /// socket_id -> claimed player slot
    connections: HashMap<String, Option<Slot>>,
    idle_since: Option<Instant>,
    idle_ttl: Duration,
    cmd_tx: mpsc::WeakSender<GameCommand>,
}

impl RoomState {
    fn broadcast(&self, tx: &broadcast::Sender<GameEvent>, msg: ServerMsg) {
        let _ = tx.send(GameEvent::Broadcast { msg });
    }

    fn send_to(&self, tx: &broadcast::Sender<GameEvent>, socket_id: &str, msg: ServerMsg) {
        let _ = tx.send(GameEvent::SendTo {
            socket_id: socket_id.to_string(),
            msg,
        });
    }

    fn broadcast_events(&self, tx: &broadcast::Sender<GameEvent>, events: Vec<SessionEvent>) {
        for event in events {
            self.broadcast(tx, event.into());
        }
    }

    fn reject(&self, tx: &broadcast::Sender<GameEvent>, socket_id: &str, rejection: Rejection) {
        tracing::debug!(
            "Room {}: rejected command from {}: {}",
            self.room_id,
            socket_id,
            rejection
        );
        self.send_to(tx, socket_id, ServerMsg::Rejected {
            code: rejection.code().to_string(),
            message: rejection.to_string(),
        });
    }

    fn claimed_slot(&self, socket_id: &str) -> Option<Option<Slot>> {
        self.connections.get(socket_id).copied()
    }

    /// Arm the auto-advance timer if the last command opened feedback.
    fn arm_timer_if_feedback(&mut self) {
        if self.session.phase() != Phase::ShowingFeedback {
            return;
        }
        let Some(cmd_tx) = self.cmd_tx.upgrade() else {
            return;
        };
        let question_index = self.session.question_index();
        let timer = FeedbackTimer::spawn(
            self.session.settings().feedback_delay,
            question_index,
            cmd_tx,
            GameCommand::FeedbackElapsed { question_index },
        );
        self.session.arm_feedback_timer(timer);
    }

    fn schedule_idle_check(&mut self) {
        self.idle_since = Some(Instant::now());
        let Some(cmd_tx) = self.cmd_tx.upgrade() else {
            return;
        };
        let ttl = self.idle_ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let _ = cmd_tx.send(GameCommand::IdleCheck).await;
        });
    }
}

/// Registry holds all active rooms. Created at process start and cleared on shutdown.
pub struct Registry {
    /// room_id -> handle
    pub rooms: dashmap::DashMap<String, RoomHandle>,
    config: GameConfig,
    quizzes: Vec<QuizWithId>,
}

#[derive(Clone, Debug)]
pub struct RoomHandle {
    pub room_id: String,
    pub cmd_tx: mpsc::Sender<GameCommand>,
    pub event_tx: broadcast::Sender<GameEvent>,
}

impl Registry {
    pub fn new(config: GameConfig, quizzes: Vec<QuizWithId>) -> Arc<Self> {
        Arc::new(Self {
            rooms: dashmap::DashMap::new(),
            config,
            quizzes,
        })
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn quizzes(&self) -> &[QuizWithId] {
        &self.quizzes
    }

    pub fn find_quiz(&self, quiz_id: &str) -> Option<&Quiz> {
        self.quizzes
            .iter()
            .find(|q| q.id == quiz_id)
            .map(|q| &q.quiz)
    }

    pub fn room(&self, room_id: &str) -> Option<RoomHandle> {
        self.rooms.get(room_id).map(|h| h.clone())
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Queue a command for a room.
    pub async fn send(&self, room_id: &str, cmd: GameCommand) -> Result<(), Rejection> {
        let handle = self.room(room_id).ok_or(Rejection::RoomNotFound)?;
        handle
            .cmd_tx
            .send(cmd)
            .await
            .map_err(|_| Rejection::RoomNotFound)
    }

    pub fn remove_room(&self, room_id: &str) {
        self.rooms.remove(room_id);
    }

    /// Drop every room. Room tasks exit once their command channels close.
    pub fn clear(&self) {
        self.rooms.clear();
    }
}

/// Validate and start a new room for `quiz` and `roster`.
pub fn create_room(
    registry: &Arc<Registry>,
    quiz: Quiz,
    roster: Vec<String>,
    turn_policy: Option<TurnPolicy>,
) -> Result<RoomHandle, SessionError> {
    let config = registry.config();
    let settings = SessionSettings {
        topic: quiz.topic,
        language: quiz.language,
        turn_policy: turn_policy.unwrap_or(config.turn_policy),
        feedback_delay: config.feedback_delay(),
    };
    let session = QuizSession::new(settings, roster, Arc::new(quiz.questions))?;
    spawn_room(registry, session)
}

/// Register `session` as a new room and spawn its task. Returns the room handle.
pub fn spawn_room(
    registry: &Arc<Registry>,
    session: QuizSession,
) -> Result<RoomHandle, SessionError> {
    let max_rooms = registry.config().max_rooms;
    if registry.room_count() >= max_rooms {
        return Err(SessionError::TooManyRooms(max_rooms));
    }

    let (cmd_tx, cmd_rx) = mpsc::channel(256);
    let (event_tx, _) = broadcast::channel(256);

    let handle = loop {
        let code = create_room_code();
        if let Entry::Vacant(vacant) = registry.rooms.entry(code.clone()) {
            let handle = RoomHandle {
                room_id: code,
                cmd_tx: cmd_tx.clone(),
                event_tx: event_tx.clone(),
            };
            vacant.insert(handle.clone());
            break handle;
        }
    };
    let room_id = handle.room_id.clone();

    // Concurrent creations may both pass the check above.
    if registry.room_count() > max_rooms {
        registry.remove_room(&room_id);
        return Err(SessionError::TooManyRooms(max_rooms));
    }

    tracing::info!(
        "Room {} created for session {} (topic: {})",
        room_id,
        session.id(),
        config::truncate_for_log(&session.settings().topic, 100)
    );

    let mut state = RoomState {
        room_id,
        session,
        connections: HashMap::new(),
        idle_since: None,
        idle_ttl: registry.config().room_idle_ttl(),
        cmd_tx: cmd_tx.downgrade(),
    };
    state.schedule_idle_check();

    tokio::spawn(room_task(state, cmd_rx, event_tx, Arc::clone(registry)));

    Ok(handle)
}

async fn room_task(
    mut state: RoomState,
    mut cmd_rx: mpsc::Receiver<GameCommand>,
    event_tx: broadcast::Sender<GameEvent>,
    registry: Arc<Registry>,
) {
    // One command at a time: every mutation of the session is serialized here.
    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            GameCommand::Join { socket_id, slot } => {
                handle_join(&mut state, &event_tx, socket_id, slot);
            }
            GameCommand::SubmitAnswer {
                socket_id,
                slot,
                question_index,
                display_position,
            } => {
                handle_submit_answer(
                    &mut state,
                    &event_tx,
                    socket_id,
                    slot,
                    question_index,
                    display_position,
                );
            }
            GameCommand::EndGame { socket_id } => {
                handle_end_game(&mut state, &event_tx, socket_id);
            }
            GameCommand::Restart { socket_id } => {
                handle_restart(&mut state, &event_tx, socket_id);
            }
            GameCommand::Leave { socket_id } => {
                handle_leave(&mut state, socket_id);
            }
            GameCommand::FeedbackElapsed { question_index } => {
                handle_feedback_elapsed(&mut state, &event_tx, question_index);
            }
            GameCommand::IdleCheck => {
                let expired = state
                    .idle_since
                    .is_some_and(|since| since.elapsed() >= state.idle_ttl);
                if expired && state.connections.is_empty() {
                    tracing::info!("Room {} evicted after idling", state.room_id);
                    state.session.end_game_early();
                    break;
                }
            }
        }
    }

    // Channel closed or room evicted - cleanup
    registry.remove_room(&state.room_id);
    tracing::info!("Room {} task ended", state.room_id);
}

fn handle_join(
    state: &mut RoomState,
    tx: &broadcast::Sender<GameEvent>,
    socket_id: String,
    slot: Option<Slot>,
) {
    if let Some(slot) = slot {
        if !state.session.players().iter().any(|p| p.slot == slot) {
            state.reject(tx, &socket_id, Rejection::RosterMismatch { slot });
            return;
        }
        let taken = state
            .connections
            .iter()
            .any(|(other, claim)| *other != socket_id && *claim == Some(slot));
        if taken {
            state.reject(tx, &socket_id, StaleReference::SlotTaken { slot }.into());
            return;
        }
    }

    state.connections.insert(socket_id.clone(), slot);
    state.idle_since = None;

    tracing::info!(
        "Socket {} joined room {} as {}",
        socket_id,
        state.room_id,
        slot.map_or_else(|| "spectator".to_string(), |s| format!("player {s}"))
    );

    state.send_to(tx, &socket_id, ServerMsg::Joined {
        room_id: state.room_id.clone(),
        slot,
    });
    // Resync: a (re)joining client always gets the current screen.
    for event in state.session.snapshot() {
        state.send_to(tx, &socket_id, event.into());
    }
}

fn handle_submit_answer(
    state: &mut RoomState,
    tx: &broadcast::Sender<GameEvent>,
    socket_id: String,
    slot: Slot,
    question_index: usize,
    display_position: usize,
) {
    match state.claimed_slot(&socket_id) {
        None => {
            state.reject(tx, &socket_id, StaleReference::NotJoined.into());
            return;
        }
        Some(claim) if claim != Some(slot) => {
            state.reject(tx, &socket_id, StaleReference::UnclaimedSlot { slot }.into());
            return;
        }
        Some(_) => {}
    }

    match state
        .session
        .submit_answer(slot, question_index, display_position)
    {
        Ok(events) => {
            state.broadcast_events(tx, events);
            state.arm_timer_if_feedback();
        }
        Err(rejection) => state.reject(tx, &socket_id, rejection),
    }
}

fn handle_feedback_elapsed(
    state: &mut RoomState,
    tx: &broadcast::Sender<GameEvent>,
    question_index: usize,
) {
    if state.session.phase() != Phase::ShowingFeedback
        || state.session.question_index() != question_index
    {
        tracing::debug!(
            "Room {}: ignoring stale feedback timer for question {}",
            state.room_id,
            question_index + 1
        );
        return;
    }

    match state.session.advance_after_feedback() {
        Ok(events) => state.broadcast_events(tx, events),
        Err(rejection) => tracing::warn!("Room {}: {}", state.room_id, rejection),
    }
}

fn handle_end_game(state: &mut RoomState, tx: &broadcast::Sender<GameEvent>, socket_id: String) {
    if state.claimed_slot(&socket_id).is_none() {
        state.reject(tx, &socket_id, StaleReference::NotJoined.into());
        return;
    }
    let events = state.session.end_game_early();
    state.broadcast_events(tx, events);
}

fn handle_restart(state: &mut RoomState, tx: &broadcast::Sender<GameEvent>, socket_id: String) {
    if state.claimed_slot(&socket_id).is_none() {
        state.reject(tx, &socket_id, StaleReference::NotJoined.into());
        return;
    }
    match state.session.restart() {
        Ok(session) => {
            tracing::info!(
                "Room {} restarted with session {}",
                state.room_id,
                session.id()
            );
            state.session = session;
            let events = state.session.snapshot();
            state.broadcast_events(tx, events);
        }
        Err(rejection) => state.reject(tx, &socket_id, rejection),
    }
}

fn handle_leave(state: &mut RoomState, socket_id: String) {
    if state.connections.remove(&socket_id).is_none() {
        return;
    }
    tracing::info!("Socket {} left room {}", socket_id, state.room_id);

    if state.connections.is_empty() {
        state.schedule_idle_check();
    }
}
