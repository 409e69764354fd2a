use thiserror::Error;

use crate::types::{Phase, Slot};

/// Why a command was refused. Rejected commands leave session state untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("{command} is not acceptable while {phase}")]
    InvalidTransition { command: &'static str, phase: Phase },
    #[error("player {slot} cannot answer out of turn, it is player {turn_holder}'s turn")]
    OutOfTurn { slot: Slot, turn_holder: Slot },
    #[error("{0}")]
    StaleReference(StaleReference),
    #[error("player {slot} already answered question {question_index}")]
    DuplicateAnswer { slot: Slot, question_index: usize },
    #[error("player slot {slot} does not exist")]
    RosterMismatch { slot: Slot },
    #[error("display position {position} is outside 0..{option_count}")]
    InvalidOption { position: usize, option_count: usize },
    #[error("room not found")]
    RoomNotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StaleReference {
    #[error("question {submitted} is no longer current, question {current} is")]
    Question { submitted: usize, current: usize },
    #[error("connection has not claimed player slot {slot}")]
    UnclaimedSlot { slot: Slot },
    #[error("player slot {slot} is claimed by another connection")]
    SlotTaken { slot: Slot },
    #[error("connection has not joined this room")]
    NotJoined,
}

impl Rejection {
    /// Stable machine-readable code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidTransition { .. } | Self::OutOfTurn { .. } => "invalid_transition",
            Self::StaleReference(_) => "stale_reference",
            Self::DuplicateAnswer { .. } => "duplicate_answer",
            Self::RosterMismatch { .. } => "roster_mismatch",
            Self::InvalidOption { .. } => "invalid_option",
            Self::RoomNotFound => "room_not_found",
        }
    }
}

impl From<StaleReference> for Rejection {
    fn from(stale: StaleReference) -> Self {
        Self::StaleReference(stale)
    }
}

/// A question set that cannot be played.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuestionSetError {
    #[error("question set is empty")]
    Empty,
    #[error("question set has {count} questions, at most 50 are allowed")]
    TooManyQuestions { count: usize },
    #[error("questions must have between 2 and 8 options, found {count}")]
    OptionCount { count: usize },
    #[error("question {index} has no text")]
    EmptyText { index: usize },
    #[error("question {index} has {found} options, expected {expected}")]
    NonUniformOptions {
        index: usize,
        expected: usize,
        found: usize,
    },
    #[error("question {index} marks option {correct} as correct, which does not exist")]
    CorrectIndexOutOfRange { index: usize, correct: usize },
    #[error("expected {expected} questions, found {found}")]
    UnexpectedCount { expected: usize, found: usize },
    #[error("generated quiz is not valid JSON: {0}")]
    Malformed(String),
}

/// Errors that prevent a session from starting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("a session needs between 2 and 5 players, got {count}")]
    RosterMismatch { count: usize },
    #[error("player {slot} has an empty or overlong name")]
    InvalidPlayerName { slot: Slot },
    #[error(transparent)]
    InvalidQuestionSet(#[from] QuestionSetError),
    #[error("quiz {0} not found")]
    QuizNotFound(String),
    #[error("room capacity of {0} reached")]
    TooManyRooms(usize),
}

impl SessionError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::RosterMismatch { .. } | Self::InvalidPlayerName { .. } => "roster_mismatch",
            Self::InvalidQuestionSet(_) => "invalid_question_set",
            Self::QuizNotFound(_) => "quiz_not_found",
            Self::TooManyRooms(_) => "too_many_rooms",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
