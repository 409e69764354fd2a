use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

use crate::error::{Rejection, SessionError, StaleReference};
use crate::scoring::{self, ScoringLedger};
use crate::shuffle::{ShuffleCache, ShuffleMap};
use crate::timer::FeedbackTimer;
use crate::turn;
use crate::types::*;

/// How long feedback stays on screen before the next question.
pub const DEFAULT_FEEDBACK_DELAY: Duration = Duration::from_secs(5);

/// Fixed at session creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub topic: String,
    pub language: Language,
    pub turn_policy: TurnPolicy,
    pub feedback_delay: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            topic: String::new(),
            language: Language::default(),
            turn_policy: TurnPolicy::default(),
            feedback_delay: DEFAULT_FEEDBACK_DELAY,
        }
    }
}

/// Observable transitions, in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    QuestionShown(QuestionShown),
    AnswerResult(AnswerResult),
    FeedbackShown(FeedbackPayload),
    GameOver(GameOver),
}

impl From<SessionEvent> for ServerMsg {
    fn from(event: SessionEvent) -> Self {
        match event {
            SessionEvent::QuestionShown(q) => ServerMsg::QuestionShown(q),
            SessionEvent::AnswerResult(a) => ServerMsg::AnswerResult(a),
            SessionEvent::FeedbackShown(f) => ServerMsg::FeedbackShown(f),
            SessionEvent::GameOver(g) => ServerMsg::GameOver(g),
        }
    }
}

/// One game: roster, question pointer, turn order and scores.
///
/// Every command either applies fully and returns the resulting events, or
/// returns a [`Rejection`] and leaves the session untouched.
#[derive(Debug)]
pub struct QuizSession {
    id: Uuid,
    settings: SessionSettings,
    questions: Arc<QuestionSet>,
    ledger: ScoringLedger,
    shuffles: ShuffleCache,
    rng: StdRng,

    starting_player: usize,
    turn_pointer: usize,
    question_index: usize,
    phase: Phase,

    feedback: Option<FeedbackPayload>,
    game_over: Option<GameOver>,
    feedback_timer: Option<FeedbackTimer>,
}

impl QuizSession {
    pub fn new(
        settings: SessionSettings,
        roster: Vec<String>,
        questions: Arc<QuestionSet>,
    ) -> Result<Self, SessionError> {
        Self::with_rng(settings, roster, questions, StdRng::from_os_rng())
    }

    /// Like [`QuizSession::new`] with a caller-supplied random source.
    pub fn with_rng(
        settings: SessionSettings,
        roster: Vec<String>,
        questions: Arc<QuestionSet>,
        rng: StdRng,
    ) -> Result<Self, SessionError> {
        if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&roster.len()) {
            return Err(SessionError::RosterMismatch {
                count: roster.len(),
            });
        }

        let mut players = Vec::with_capacity(roster.len());
        for (i, name) in roster.into_iter().enumerate() {
            let slot = i as Slot + 1;
            let name = name.trim().to_string();
            if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
                return Err(SessionError::InvalidPlayerName { slot });
            }
            players.push(Player {
                slot,
                name,
                score: 0,
            });
        }

        Ok(Self::start(settings, players, questions, rng))
    }

    /// Open question 0 for an already validated roster.
    fn start(
        settings: SessionSettings,
        players: Vec<Player>,
        questions: Arc<QuestionSet>,
        mut rng: StdRng,
    ) -> Self {
        let starting_player = rng.random_range(0..players.len());
        let mut ledger = ScoringLedger::new(players);
        ledger.open_question(0);

        let id = Uuid::new_v4();
        tracing::info!(
            "Session {} created: {} players, {} questions, {:?}, player {} starts",
            id,
            ledger.players().len(),
            questions.len(),
            settings.turn_policy,
            starting_player + 1
        );

        Self {
            id,
            settings,
            questions,
            ledger,
            shuffles: ShuffleCache::new(),
            rng,
            starting_player,
            turn_pointer: starting_player,
            question_index: 0,
            phase: Phase::AwaitingAnswers,
            feedback: None,
            game_over: None,
            feedback_timer: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn question_index(&self) -> usize {
        self.question_index
    }

    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    pub fn players(&self) -> &[Player] {
        self.ledger.players()
    }

    /// 0-based roster position that opened the first question.
    pub fn starting_player(&self) -> usize {
        self.starting_player
    }

    pub fn turn_holder(&self) -> Slot {
        self.ledger.players()[self.turn_pointer].slot
    }

    pub fn game_over(&self) -> Option<&GameOver> {
        self.game_over.as_ref()
    }

    /// Question index of the pending feedback timer, if any.
    pub fn pending_timer(&self) -> Option<usize> {
        self.feedback_timer.as_ref().map(FeedbackTimer::question_index)
    }

    /// The question on screen, or `None` once the game has ended.
    pub fn current_question(&mut self) -> Option<QuestionShown> {
        match self.phase {
            Phase::Ended => None,
            _ => Some(self.question_shown()),
        }
    }

    /// Everything a newly attached client needs to render the current state.
    pub fn snapshot(&mut self) -> Vec<SessionEvent> {
        match self.phase {
            Phase::AwaitingAnswers => vec![SessionEvent::QuestionShown(self.question_shown())],
            Phase::ShowingFeedback => {
                let mut events = vec![SessionEvent::QuestionShown(self.question_shown())];
                events.extend(self.feedback.clone().map(SessionEvent::FeedbackShown));
                events
            }
            Phase::Ended => self
                .game_over
                .clone()
                .map(SessionEvent::GameOver)
                .into_iter()
                .collect(),
        }
    }

    pub fn submit_answer(
        &mut self,
        slot: Slot,
        question_index: usize,
        display_position: usize,
    ) -> Result<Vec<SessionEvent>, Rejection> {
        if self.phase != Phase::AwaitingAnswers {
            return Err(Rejection::InvalidTransition {
                command: "submit_answer",
                phase: self.phase,
            });
        }
        if question_index != self.question_index {
            return Err(StaleReference::Question {
                submitted: question_index,
                current: self.question_index,
            }
            .into());
        }
        if self.ledger.player(slot).is_none() {
            return Err(Rejection::RosterMismatch { slot });
        }
        if self.ledger.has_answered(slot) {
            return Err(Rejection::DuplicateAnswer {
                slot,
                question_index,
            });
        }
        let turn_holder = self.turn_holder();
        if slot != turn_holder {
            return Err(Rejection::OutOfTurn { slot, turn_holder });
        }

        let question = &self.questions[question_index];
        let option_count = question.options.len();
        let map = self
            .shuffles
            .shuffle_for(question_index, option_count, &mut self.rng);
        let canonical = map
            .canonical_index(display_position)
            .ok_or(Rejection::InvalidOption {
                position: display_position,
                option_count,
            })?;

        let verdict = self.ledger.record_answer(
            self.phase,
            slot,
            question_index,
            canonical,
            question.correct_option_index,
        )?;
        tracing::info!(
            "Session {}: player {} answered question {} {}",
            self.id,
            slot,
            question_index + 1,
            if verdict.correct { "correctly" } else { "incorrectly" }
        );

        let mut events = vec![SessionEvent::AnswerResult(AnswerResult {
            question_index,
            slot,
            display_position,
            correct: verdict.correct,
            players: self.ledger.players().to_vec(),
        })];

        let player_count = self.ledger.players().len();
        let complete = match self.settings.turn_policy {
            TurnPolicy::SingleAnswer => true,
            TurnPolicy::AllPlayers => self.ledger.answers().len() == player_count,
        };

        if complete {
            let feedback = feedback_payload(question_index, question, map, &self.ledger);
            tracing::info!(
                "Session {}: question {} complete, {}/{} correct",
                self.id,
                question_index + 1,
                feedback.correct_count,
                feedback.answer_count
            );
            self.phase = Phase::ShowingFeedback;
            self.feedback = Some(feedback.clone());
            events.push(SessionEvent::FeedbackShown(feedback));
        } else {
            self.turn_pointer = turn::next_turn(self.turn_pointer, player_count);
            events.push(SessionEvent::QuestionShown(self.question_shown()));
        }

        Ok(events)
    }

    /// Leave the feedback phase: next question, or the end of the game.
    pub fn advance_after_feedback(&mut self) -> Result<Vec<SessionEvent>, Rejection> {
        if self.phase != Phase::ShowingFeedback {
            return Err(Rejection::InvalidTransition {
                command: "advance_after_feedback",
                phase: self.phase,
            });
        }

        if let Some(timer) = self.feedback_timer.take() {
            timer.cancel();
        }
        self.feedback = None;
        self.question_index += 1;

        if self.question_index == self.questions.len() {
            return Ok(vec![SessionEvent::GameOver(self.finish(false))]);
        }

        let player_count = self.ledger.players().len();
        self.turn_pointer = turn::starting_player_for_question(
            self.starting_player,
            self.question_index,
            player_count,
        );
        self.ledger.open_question(self.question_index);
        self.phase = Phase::AwaitingAnswers;
        tracing::debug!(
            "Session {}: question {}, player {} starts",
            self.id,
            self.question_index + 1,
            self.turn_pointer + 1
        );

        Ok(vec![SessionEvent::QuestionShown(self.question_shown())])
    }

    /// Stop the game with the scores accrued so far. A no-op once ended.
    pub fn end_game_early(&mut self) -> Vec<SessionEvent> {
        if self.phase == Phase::Ended {
            return Vec::new();
        }
        tracing::info!(
            "Session {} ended early at question {}",
            self.id,
            self.question_index + 1
        );
        vec![SessionEvent::GameOver(self.finish(true))]
    }

    /// Attach the timer that will drive [`QuizSession::advance_after_feedback`].
    /// Replaces and cancels any previous timer.
    pub fn arm_feedback_timer(&mut self, timer: FeedbackTimer) {
        if let Some(old) = self.feedback_timer.replace(timer) {
            old.cancel();
        }
    }

    /// A fresh game with the same settings, roster and questions.
    pub fn restart(&mut self) -> Result<Self, Rejection> {
        if self.phase != Phase::Ended {
            return Err(Rejection::InvalidTransition {
                command: "restart",
                phase: self.phase,
            });
        }
        let players = self
            .ledger
            .players()
            .iter()
            .map(|p| Player { score: 0, ..p.clone() })
            .collect();
        let rng = StdRng::from_rng(&mut self.rng);
        Ok(Self::start(
            self.settings.clone(),
            players,
            Arc::clone(&self.questions),
            rng,
        ))
    }

    fn finish(&mut self, ended_early: bool) -> GameOver {
        if let Some(timer) = self.feedback_timer.take() {
            timer.cancel();
        }
        self.phase = Phase::Ended;
        self.feedback = None;

        let players = self.ledger.players();
        let winners = scoring::compute_winners(players);
        let game_over = GameOver {
            tie: winners.len() > 1,
            winners,
            standings: scoring::standings(players),
            total_questions: self.questions.len(),
            ended_early,
        };
        tracing::info!(
            "Session {} over, winner(s): {}",
            self.id,
            game_over
                .winners
                .iter()
                .map(|p| p.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        self.game_over = Some(game_over.clone());
        game_over
    }

    fn question_shown(&mut self) -> QuestionShown {
        let question_index = self.question_index;
        let turn_holder = self.turn_holder();
        let answered = self.ledger.answers().keys().copied().collect();
        let players = self.ledger.players().to_vec();

        let question = &self.questions[question_index];
        let map = self
            .shuffles
            .shuffle_for(question_index, question.options.len(), &mut self.rng);

        QuestionShown {
            question_index,
            total_questions: self.questions.len(),
            topic: self.settings.topic.clone(),
            language: self.settings.language,
            text: question.text.clone(),
            options: map.arrange(&question.options),
            turn_holder,
            answered,
            players,
        }
    }
}

fn feedback_payload(
    question_index: usize,
    question: &QuestionSpec,
    map: &ShuffleMap,
    ledger: &ScoringLedger,
) -> FeedbackPayload {
    let correct = question.correct_option_index;
    let per_player: Vec<PlayerCorrectness> = ledger
        .answers()
        .iter()
        .map(|(&slot, &canonical)| PlayerCorrectness {
            slot,
            display_position: map.display_position(canonical),
            correct: canonical == correct,
        })
        .collect();

    let correct_count = per_player.iter().filter(|p| p.correct).count();
    let answer_count = per_player.len();
    let verdict = if correct_count == answer_count {
        FeedbackVerdict::AllCorrect
    } else if correct_count == 0 {
        FeedbackVerdict::NoneCorrect
    } else {
        FeedbackVerdict::SomeCorrect
    };

    FeedbackPayload {
        question_index,
        correct_display_position: map.display_position(correct),
        per_player,
        correct_count,
        answer_count,
        verdict,
        players: ledger.players().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use tokio::sync::mpsc;

    use super::*;

    fn question_set(count: usize, options: usize) -> Arc<QuestionSet> {
        let questions = (0..count)
            .map(|q| QuestionSpec {
                text: format!("Question {}", q + 1),
                options: (0..options).map(|o| format!("Q{q} option {o}")).collect(),
                correct_option_index: q % options,
            })
            .collect();
        Arc::new(QuestionSet::new(questions).unwrap())
    }

    fn roster(count: usize) -> Vec<String> {
        (1..=count).map(|i| format!("Player {i}")).collect()
    }

    fn session(players: usize, questions: usize, policy: TurnPolicy, seed: u64) -> QuizSession {
        let settings = SessionSettings {
            topic: "Road trips".to_string(),
            turn_policy: policy,
            ..SessionSettings::default()
        };
        QuizSession::with_rng(
            settings,
            roster(players),
            question_set(questions, 4),
            StdRng::seed_from_u64(seed),
        )
        .unwrap()
    }

    /// Display position of the correct option for the current question.
    fn correct_position(session: &mut QuizSession) -> usize {
        let shown = session.current_question().unwrap();
        let q = &session.questions[shown.question_index];
        let correct_text = &q.options[q.correct_option_index];
        shown.options.iter().position(|o| o == correct_text).unwrap()
    }

    fn wrong_position(session: &mut QuizSession) -> usize {
        (correct_position(session) + 1) % 4
    }

    #[test]
    fn roster_outside_bounds_is_rejected() {
        for count in [0, 1, 6] {
            let err = QuizSession::new(SessionSettings::default(), roster(count), question_set(1, 4))
                .unwrap_err();
            assert_eq!(err, SessionError::RosterMismatch { count });
        }
    }

    #[test]
    fn blank_player_name_is_rejected() {
        let err = QuizSession::new(
            SessionSettings::default(),
            vec!["Driver".to_string(), "   ".to_string()],
            question_set(1, 4),
        )
        .unwrap_err();
        assert_eq!(err, SessionError::InvalidPlayerName { slot: 2 });
    }

    #[test]
    fn new_session_awaits_answers_from_starting_player() {
        let mut s = session(3, 2, TurnPolicy::AllPlayers, 11);
        assert_eq!(s.phase(), Phase::AwaitingAnswers);
        assert_eq!(s.question_index(), 0);
        assert_eq!(s.turn_holder() as usize, s.starting_player() + 1);
        let shown = s.current_question().unwrap();
        assert_eq!(shown.options.len(), 4);
        assert!(shown.answered.is_empty());
    }

    #[test]
    fn all_correct_two_players_five_questions_ends_in_tie() {
        let mut s = session(2, 5, TurnPolicy::AllPlayers, 3);
        while s.phase() != Phase::Ended {
            match s.phase() {
                Phase::AwaitingAnswers => {
                    let position = correct_position(&mut s);
                    let (slot, qi) = (s.turn_holder(), s.question_index());
                    s.submit_answer(slot, qi, position).unwrap();
                }
                Phase::ShowingFeedback => {
                    s.advance_after_feedback().unwrap();
                }
                Phase::Ended => unreachable!(),
            }
        }

        assert!(s.players().iter().all(|p| p.score == 5));
        let over = s.game_over().unwrap();
        assert_eq!(over.winners.len(), 2);
        assert!(over.tie);
        assert!(!over.ended_early);
    }

    #[test]
    fn turn_rotates_within_question_and_feedback_waits_for_everyone() {
        let mut s = session(3, 2, TurnPolicy::AllPlayers, 5);
        let first = s.turn_holder();
        let events = s.submit_answer(first, 0, 0).unwrap();
        assert!(matches!(events[0], SessionEvent::AnswerResult(_)));
        let SessionEvent::QuestionShown(shown) = &events[1] else {
            panic!("expected question re-push");
        };
        assert_eq!(shown.turn_holder, first % 3 + 1);
        assert_eq!(shown.answered, vec![first]);
        assert_eq!(s.phase(), Phase::AwaitingAnswers);

        let second = s.turn_holder();
        s.submit_answer(second, 0, 1).unwrap();
        let third = s.turn_holder();
        let events = s.submit_answer(third, 0, 2).unwrap();
        assert!(matches!(events.last(), Some(SessionEvent::FeedbackShown(_))));
        assert_eq!(s.phase(), Phase::ShowingFeedback);
    }

    #[test]
    fn single_answer_policy_completes_after_one_answer() {
        let mut s = session(4, 3, TurnPolicy::SingleAnswer, 9);
        let holder = s.turn_holder();
        let events = s.submit_answer(holder, 0, 0).unwrap();
        let Some(SessionEvent::FeedbackShown(feedback)) = events.last() else {
            panic!("expected feedback");
        };
        assert_eq!(feedback.answer_count, 1);
        assert_eq!(feedback.per_player[0].slot, holder);
    }

    #[test]
    fn starting_player_rotates_between_questions() {
        let mut s = session(4, 5, TurnPolicy::SingleAnswer, 21);
        let initial = s.starting_player();
        for q in 0..5 {
            assert_eq!(
                s.turn_holder() as usize - 1,
                turn::starting_player_for_question(initial, q, 4)
            );
            let holder = s.turn_holder();
            s.submit_answer(holder, q, 0).unwrap();
            s.advance_after_feedback().unwrap();
        }
        assert_eq!(s.phase(), Phase::Ended);
    }

    #[test]
    fn out_of_turn_submission_changes_nothing() {
        let mut s = session(3, 2, TurnPolicy::AllPlayers, 2);
        let holder = s.turn_holder();
        let other = holder % 3 + 1;
        let before = s.current_question().unwrap();

        let err = s.submit_answer(other, 0, 0).unwrap_err();
        assert_eq!(
            err,
            Rejection::OutOfTurn {
                slot: other,
                turn_holder: holder
            }
        );
        assert_eq!(s.current_question().unwrap(), before);
    }

    #[test]
    fn duplicate_submission_is_rejected() {
        let mut s = session(2, 2, TurnPolicy::AllPlayers, 4);
        let holder = s.turn_holder();
        s.submit_answer(holder, 0, 0).unwrap();
        let err = s.submit_answer(holder, 0, 1).unwrap_err();
        assert_eq!(
            err,
            Rejection::DuplicateAnswer {
                slot: holder,
                question_index: 0
            }
        );
        assert_eq!(s.current_question().unwrap().answered, vec![holder]);
    }

    #[test]
    fn stale_question_index_is_rejected() {
        let mut s = session(2, 3, TurnPolicy::SingleAnswer, 4);
        let holder = s.turn_holder();
        s.submit_answer(holder, 0, 0).unwrap();
        s.advance_after_feedback().unwrap();

        let holder = s.turn_holder();
        let err = s.submit_answer(holder, 0, 0).unwrap_err();
        assert_eq!(
            err,
            Rejection::StaleReference(StaleReference::Question {
                submitted: 0,
                current: 1
            })
        );
    }

    #[test]
    fn out_of_range_display_position_is_rejected() {
        let mut s = session(2, 1, TurnPolicy::AllPlayers, 4);
        let holder = s.turn_holder();
        let err = s.submit_answer(holder, 0, 4).unwrap_err();
        assert_eq!(
            err,
            Rejection::InvalidOption {
                position: 4,
                option_count: 4
            }
        );
        assert!(s.current_question().unwrap().answered.is_empty());
    }

    #[test]
    fn submit_during_feedback_is_invalid_transition() {
        let mut s = session(2, 2, TurnPolicy::SingleAnswer, 4);
        let holder = s.turn_holder();
        s.submit_answer(holder, 0, 0).unwrap();
        let other = holder % 2 + 1;
        let err = s.submit_answer(other, 0, 0).unwrap_err();
        assert_eq!(
            err,
            Rejection::InvalidTransition {
                command: "submit_answer",
                phase: Phase::ShowingFeedback
            }
        );
    }

    #[test]
    fn advance_outside_feedback_is_invalid_transition() {
        let mut s = session(2, 2, TurnPolicy::AllPlayers, 4);
        assert!(matches!(
            s.advance_after_feedback(),
            Err(Rejection::InvalidTransition { .. })
        ));
    }

    #[test]
    fn shuffle_is_stable_across_re_pushes() {
        let mut s = session(3, 1, TurnPolicy::AllPlayers, 8);
        let original = s.current_question().unwrap().options;
        let holder = s.turn_holder();
        let events = s.submit_answer(holder, 0, 1).unwrap();
        let SessionEvent::QuestionShown(shown) = &events[1] else {
            panic!("expected question re-push");
        };
        assert_eq!(shown.options, original);
        assert_eq!(s.snapshot().len(), 1);
        assert_eq!(s.current_question().unwrap().options, original);
    }

    #[test]
    fn feedback_reports_correct_position_and_verdict() {
        let mut s = session(2, 1, TurnPolicy::AllPlayers, 13);
        let correct = correct_position(&mut s);
        let wrong = wrong_position(&mut s);

        let first = s.turn_holder();
        s.submit_answer(first, 0, correct).unwrap();
        let second = s.turn_holder();
        let events = s.submit_answer(second, 0, wrong).unwrap();
        let Some(SessionEvent::FeedbackShown(feedback)) = events.last() else {
            panic!("expected feedback");
        };

        assert_eq!(feedback.correct_display_position, correct);
        assert_eq!(feedback.correct_count, 1);
        assert_eq!(feedback.verdict, FeedbackVerdict::SomeCorrect);
        let second_entry = feedback.per_player.iter().find(|p| p.slot == second).unwrap();
        assert_eq!(second_entry.display_position, wrong);
        assert!(!second_entry.correct);
    }

    #[test]
    fn snapshot_during_feedback_repeats_feedback_payload() {
        let mut s = session(2, 2, TurnPolicy::SingleAnswer, 17);
        let holder = s.turn_holder();
        let events = s.submit_answer(holder, 0, 2).unwrap();
        let Some(SessionEvent::FeedbackShown(sent)) = events.last().cloned() else {
            panic!("expected feedback");
        };

        let snapshot = s.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[1], SessionEvent::FeedbackShown(sent));
    }

    #[test]
    fn end_game_early_keeps_partial_scores_and_is_idempotent() {
        let mut s = session(3, 4, TurnPolicy::AllPlayers, 6);
        let position = correct_position(&mut s);
        let holder = s.turn_holder();
        s.submit_answer(holder, 0, position).unwrap();

        let events = s.end_game_early();
        let [SessionEvent::GameOver(over)] = events.as_slice() else {
            panic!("expected game over");
        };
        assert!(over.ended_early);
        assert_eq!(over.winners.len(), 1);
        assert_eq!(over.winners[0].slot, holder);
        assert_eq!(s.phase(), Phase::Ended);

        assert!(s.end_game_early().is_empty());
        assert!(s.submit_answer(holder, 0, 0).is_err());
        assert!(s.current_question().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn end_game_early_cancels_pending_feedback_timer() {
        let mut s = session(2, 3, TurnPolicy::SingleAnswer, 6);
        let holder = s.turn_holder();
        s.submit_answer(holder, 0, 0).unwrap();

        let (tx, mut rx) = mpsc::channel(1);
        s.arm_feedback_timer(FeedbackTimer::spawn(s.settings().feedback_delay, 0, tx, ()));
        assert_eq!(s.pending_timer(), Some(0));

        s.end_game_early();
        assert_eq!(s.pending_timer(), None);
        assert_eq!(rx.recv().await, None);
        assert_eq!(s.phase(), Phase::Ended);
    }

    #[test]
    fn restart_resets_scores_and_keeps_roster() {
        let mut s = session(2, 1, TurnPolicy::SingleAnswer, 30);
        let err = s.restart().unwrap_err();
        assert_eq!(err.code(), "invalid_transition");
        assert_eq!(s.phase(), Phase::AwaitingAnswers);

        let position = correct_position(&mut s);
        let holder = s.turn_holder();
        s.submit_answer(holder, 0, position).unwrap();
        s.advance_after_feedback().unwrap();
        assert_eq!(s.phase(), Phase::Ended);

        let fresh = s.restart().unwrap();
        assert_ne!(fresh.id(), s.id());
        assert_eq!(fresh.phase(), Phase::AwaitingAnswers);
        assert!(fresh.players().iter().all(|p| p.score == 0));
        let names: Vec<&str> = fresh.players().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Player 1", "Player 2"]);
        let slots: Vec<Slot> = fresh.players().iter().map(|p| p.slot).collect();
        assert_eq!(slots, vec![1, 2]);
        assert_eq!(fresh.question_index(), 0);
    }

    proptest! {
        #[test]
        fn full_run_visits_every_question_once_in_order(
            players in 2usize..=5,
            questions in 1usize..=12,
            single in any::<bool>(),
            seed in any::<u64>(),
        ) {
            let policy = if single { TurnPolicy::SingleAnswer } else { TurnPolicy::AllPlayers };
            let mut s = session(players, questions, policy, seed);
            let mut visited = Vec::new();

            while s.phase() != Phase::Ended {
                let qi = s.question_index();
                if visited.last() != Some(&qi) {
                    visited.push(qi);
                }
                match s.phase() {
                    Phase::AwaitingAnswers => {
                        let holder = s.turn_holder();
                        s.submit_answer(holder, qi, (seed.wrapping_add(qi as u64) % 4) as usize).unwrap();
                    }
                    Phase::ShowingFeedback => {
                        s.advance_after_feedback().unwrap();
                    }
                    Phase::Ended => unreachable!(),
                }
            }

            prop_assert_eq!(visited, (0..questions).collect::<Vec<_>>());
            prop_assert_eq!(s.question_index(), questions);
        }
    }
}
