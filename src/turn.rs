//! Turn rotation. Positions are 0-based indices into the roster.

/// The player who opens `question_index`, rotating one seat per question.
pub fn starting_player_for_question(
    initial_starting_player: usize,
    question_index: usize,
    player_count: usize,
) -> usize {
    (initial_starting_player + question_index) % player_count
}

/// The player after `current` within a question.
pub fn next_turn(current: usize, player_count: usize) -> usize {
    (current + 1) % player_count
}
