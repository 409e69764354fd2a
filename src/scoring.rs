use std::collections::BTreeMap;

use crate::error::{Rejection, StaleReference};
use crate::types::{Phase, Player, Slot};

/// Result of an accepted answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerVerdict {
    pub correct: bool,
}

/// Owns player scores and the answers given to the current question.
#[derive(Debug, Clone)]
pub struct ScoringLedger {
    players: Vec<Player>,
    question_index: usize,
    /// slot -> canonical option index, for `question_index` only.
    answers: BTreeMap<Slot, usize>,
}

impl ScoringLedger {
    pub fn new(players: Vec<Player>) -> Self {
        Self {
            players,
            question_index: 0,
            answers: BTreeMap::new(),
        }
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, slot: Slot) -> Option<&Player> {
        self.players.iter().find(|p| p.slot == slot)
    }

    pub fn answers(&self) -> &BTreeMap<Slot, usize> {
        &self.answers
    }

    pub fn has_answered(&self, slot: Slot) -> bool {
        self.answers.contains_key(&slot)
    }

    /// Start collecting answers for a new question.
    pub fn open_question(&mut self, question_index: usize) {
        self.question_index = question_index;
        self.answers.clear();
    }

    pub fn record_answer(
        &mut self,
        phase: Phase,
        slot: Slot,
        question_index: usize,
        canonical_option: usize,
        correct_option: usize,
    ) -> Result<AnswerVerdict, Rejection> {
        if phase != Phase::AwaitingAnswers {
            return Err(Rejection::InvalidTransition {
                command: "submit_answer",
                phase,
            });
        }
        if question_index != self.question_index {
            return Err(StaleReference::Question {
                submitted: question_index,
                current: self.question_index,
            }
            .into());
        }
        let Some(player) = self.players.iter_mut().find(|p| p.slot == slot) else {
            return Err(Rejection::RosterMismatch { slot });
        };
        if self.answers.contains_key(&slot) {
            return Err(Rejection::DuplicateAnswer {
                slot,
                question_index,
            });
        }

        let correct = canonical_option == correct_option;
        if correct {
            player.score += 1;
        }
        self.answers.insert(slot, canonical_option);

        Ok(AnswerVerdict { correct })
    }
}

/// Every player holding the top score. More than one entry means a tie.
pub fn compute_winners(players: &[Player]) -> Vec<Player> {
    let Some(max) = players.iter().map(|p| p.score).max() else {
        return Vec::new();
    };
    players.iter().filter(|p| p.score == max).cloned().collect()
}

/// Players by score descending, ties kept in slot order.
pub fn standings(players: &[Player]) -> Vec<Player> {
    let mut sorted = players.to_vec();
    sorted.sort_by(|a, b| b.score.cmp(&a.score));
    sorted
}
