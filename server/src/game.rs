use crate::player_manager::PlayerManager;
use log::info;
use rand::seq::IteratorRandom;
use rand::Rng;
use shared::Opcode;
use std::collections::HashMap;

pub const NOT_ENOUGH_PLAYERS: &str = "Not enough players joined, the game was cancelled.";
pub const NO_WINNER: &str = "Game over! No winner this time.";
pub const SHUTTING_DOWN: &str = "Server is shutting down.";
const CORRECT: &str = "Correct!";
const INCORRECT: &str = "Incorrect!";

/// Lifecycle of the server. Only the round scheduler changes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Inactive,
    SendingOffers,
    GameStarted,
    Terminated,
}

/// Questions still unused in the current game.
#[derive(Debug, Clone, Default)]
pub struct QuestionSet {
    remaining: HashMap<String, bool>,
}

impl QuestionSet {
    pub fn new(questions: HashMap<String, bool>) -> Self {
        Self {
            remaining: questions,
        }
    }

    pub fn len(&self) -> usize {
        self.remaining.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remaining.is_empty()
    }

    /// Picks a remaining question uniformly at random.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<(String, bool)> {
        self.remaining
            .iter()
            .choose(rng)
            .map(|(question, &answer)| (question.clone(), answer))
    }

    /// Takes a question out of play for the rest of the game.
    pub fn retire(&mut self, question: &str) {
        self.remaining.remove(question);
    }
}

pub fn welcome_message(server_name: &str, topic: &str) -> String {
    format!("Welcome to {}! Today's topic: {}.", server_name, topic)
}

pub fn question_message(question: &str) -> String {
    format!("True or false: {}", question)
}

pub fn standings_message(players: &PlayerManager, rounds_played: u32) -> String {
    format!(
        "Standings after {} round(s):\n{}",
        rounds_played,
        players.standings()
    )
}

/// Scores the answers collected for one question and tells each answering
/// player how they did. Players who did not answer are left alone.
///
/// Returns the number of correct answers.
pub fn score_round(players: &mut PlayerManager, answers: Vec<(String, bool)>, correct: bool) -> usize {
    let mut correct_count = 0;

    for (name, answer) in answers {
        let Some(player) = players.get_mut(&name) else {
            continue;
        };

        if answer == correct {
            player.increment_score();
            player.send(Opcode::Positive, CORRECT);
            correct_count += 1;
        } else {
            player.send(Opcode::Negative, INCORRECT);
        }
    }

    correct_count
}

/// The END text for a finished game: the leader wins if they scored at all.
pub fn game_over_message(players: &PlayerManager) -> String {
    match players.leader() {
        Some(leader) if leader.score() > 0 => {
            info!("{} wins with {} point(s)", leader.name, leader.score());
            format!(
                "Game over!\nCongratulations to the winner: {}\n\n{}",
                leader.name,
                players.standings()
            )
        }
        _ => {
            info!("Game over without a winner");
            NO_WINNER.to_string()
        }
    }
}
