use serde::{Deserialize, Serialize};

use crate::error::QuestionSetError;

/// 1-based player slot, stable for the lifetime of a session.
pub type Slot = u8;

/// Upper bound on questions in a single set.
pub const MAX_QUESTIONS: usize = 50;
/// Inclusive bounds on options per question.
pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 8;
/// Inclusive bounds on roster size.
pub const MIN_PLAYERS: usize = 2;
pub const MAX_PLAYERS: usize = 5;
pub const MAX_NAME_LEN: usize = 30;

/// A player in a game session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub slot: Slot,
    pub name: String,
    pub score: u32,
}

/// A single multiple-choice question, in the shape the quiz generator emits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionSpec {
    #[serde(rename = "question")]
    pub text: String,
    pub options: Vec<String>,
    #[serde(rename = "correctAnswer")]
    pub correct_option_index: usize,
}

/// An ordered, validated sequence of questions sharing one option count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct QuestionSet {
    questions: Vec<QuestionSpec>,
}

impl QuestionSet {
    pub fn new(questions: Vec<QuestionSpec>) -> Result<Self, QuestionSetError> {
        let Some(first) = questions.first() else {
            return Err(QuestionSetError::Empty);
        };
        if questions.len() > MAX_QUESTIONS {
            return Err(QuestionSetError::TooManyQuestions {
                count: questions.len(),
            });
        }

        let option_count = first.options.len();
        if !(MIN_OPTIONS..=MAX_OPTIONS).contains(&option_count) {
            return Err(QuestionSetError::OptionCount {
                count: option_count,
            });
        }

        for (index, q) in questions.iter().enumerate() {
            if q.text.trim().is_empty() {
                return Err(QuestionSetError::EmptyText { index });
            }
            if q.options.len() != option_count {
                return Err(QuestionSetError::NonUniformOptions {
                    index,
                    expected: option_count,
                    found: q.options.len(),
                });
            }
            if q.correct_option_index >= option_count {
                return Err(QuestionSetError::CorrectIndexOutOfRange {
                    index,
                    correct: q.correct_option_index,
                });
            }
        }

        Ok(Self { questions })
    }

    /// Parse raw generator output: a JSON array, possibly wrapped in a
    /// markdown code fence, that must hold exactly the requested counts.
    pub fn from_generated(
        text: &str,
        expected_questions: usize,
        expected_options: usize,
    ) -> Result<Self, QuestionSetError> {
        let cleaned = text.replace("```json", "").replace("```", "");
        let questions: Vec<QuestionSpec> = serde_json::from_str(cleaned.trim())
            .map_err(|e| QuestionSetError::Malformed(e.to_string()))?;

        if questions.len() != expected_questions {
            return Err(QuestionSetError::UnexpectedCount {
                expected: expected_questions,
                found: questions.len(),
            });
        }
        if let Some((index, q)) = questions
            .iter()
            .enumerate()
            .find(|(_, q)| q.options.len() != expected_options)
        {
            return Err(QuestionSetError::NonUniformOptions {
                index,
                expected: expected_options,
                found: q.options.len(),
            });
        }

        Self::new(questions)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn options_per_question(&self) -> usize {
        self.questions[0].options.len()
    }

    pub fn get(&self, index: usize) -> Option<&QuestionSpec> {
        self.questions.get(index)
    }
}

impl std::ops::Index<usize> for QuestionSet {
    type Output = QuestionSpec;

    fn index(&self, index: usize) -> &QuestionSpec {
        &self.questions[index]
    }
}

impl<'de> Deserialize<'de> for QuestionSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let questions = Vec::<QuestionSpec>::deserialize(deserializer)?;
        Self::new(questions).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Sv,
    #[default]
    En,
}

/// Who must answer before a question's feedback is shown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPolicy {
    /// Every player answers every question, in rotating turn order.
    #[default]
    AllPlayers,
    /// Only the question's starting player answers.
    SingleAnswer,
}

/// Session state-machine phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    AwaitingAnswers,
    ShowingFeedback,
    Ended,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AwaitingAnswers => write!(f, "AWAITING_ANSWERS"),
            Self::ShowingFeedback => write!(f, "SHOWING_FEEDBACK"),
            Self::Ended => write!(f, "ENDED"),
        }
    }
}

/// A quiz definition: stored on disk or posted inline by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quiz {
    pub topic: String,
    #[serde(default)]
    pub language: Language,
    pub questions: QuestionSet,
}

/// A quiz with its file-based id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizWithId {
    pub id: String,
    #[serde(flatten)]
    pub quiz: Quiz,
}

// ─── Event payloads ───────────────────────────────────────────────

/// The current question as players should see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionShown {
    pub question_index: usize,
    pub total_questions: usize,
    pub topic: String,
    pub language: Language,
    pub text: String,
    /// Options in shuffled display order.
    pub options: Vec<String>,
    pub turn_holder: Slot,
    pub answered: Vec<Slot>,
    pub players: Vec<Player>,
}

/// An accepted answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerResult {
    pub question_index: usize,
    pub slot: Slot,
    pub display_position: usize,
    pub correct: bool,
    pub players: Vec<Player>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackVerdict {
    AllCorrect,
    NoneCorrect,
    SomeCorrect,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerCorrectness {
    pub slot: Slot,
    pub display_position: usize,
    pub correct: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackPayload {
    pub question_index: usize,
    pub correct_display_position: usize,
    pub per_player: Vec<PlayerCorrectness>,
    pub correct_count: usize,
    pub answer_count: usize,
    pub verdict: FeedbackVerdict,
    pub players: Vec<Player>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOver {
    pub winners: Vec<Player>,
    pub tie: bool,
    /// All players, highest score first.
    pub standings: Vec<Player>,
    pub total_questions: usize,
    pub ended_early: bool,
}

// ─── Wire messages ────────────────────────────────────────────────

/// Messages sent from server to clients via WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    QuizList { quizzes: Vec<QuizWithId> },
    RoomCreated { room_id: String },
    Joined { room_id: String, slot: Option<Slot> },
    QuestionShown(QuestionShown),
    AnswerResult(AnswerResult),
    FeedbackShown(FeedbackPayload),
    GameOver(GameOver),
    Rejected { code: String, message: String },
}

/// Either a stored quiz id or an inline quiz.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuizRef {
    Stored { quiz_id: String },
    Inline(Quiz),
}

/// Messages sent from clients to server via WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    ListQuizzes,
    CreateRoom {
        quiz: QuizRef,
        players: Vec<String>,
        #[serde(default)]
        turn_policy: Option<TurnPolicy>,
    },
    JoinRoom {
        room_id: String,
        #[serde(default)]
        slot: Option<Slot>,
    },
    SubmitAnswer {
        room_id: String,
        slot: Slot,
        question_index: usize,
        display_position: usize,
    },
    EndGame { room_id: String },
    Restart { room_id: String },
}
