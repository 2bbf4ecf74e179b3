//! Player registry for the trivia server
//!
//! Everything the connection tasks and the round scheduler share lives here,
//! behind one lock owned by the server:
//! - Registered players keyed by their unique display name
//! - Answers submitted during the currently open answer window
//! - Join handles of the per-connection tasks
//!
//! No method performs network I/O. Messages are handed to each player's
//! outbound queue, so holding the lock never waits on a socket.

use crate::game::ServerState;
use crate::player::{Outbox, Player};
use log::{debug, info};
use rand::Rng;
use shared::{Opcode, SERVER_NAME_LEN};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::task::JoinHandle;

/// Why a rename request was refused. The message is sent back to the player.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RenameError {
    #[error("You cannot change your name once the game has started.")]
    GameInProgress,
    #[error("Your name cannot be empty.")]
    EmptyName,
    #[error("Your name cannot contain control characters.")]
    ControlCharacters,
    #[error("Your name is {} bytes long, the limit is {}.", .0, SERVER_NAME_LEN)]
    TooLong(usize),
    #[error("You are not registered with this server.")]
    UnknownPlayer,
}

/// Registry of connected players and the per-round answer map.
#[derive(Default)]
pub struct PlayerManager {
    /// Registered players indexed by name
    players: HashMap<String, Player>,
    /// Latest answer per player, tagged with the round it was given in
    pending_answers: HashMap<String, (u64, bool)>,
    /// Connection tasks indexed by player id
    handlers: HashMap<u32, JoinHandle<()>>,
    /// Players accepted since the last reset
    accepted: u32,
    last_join: Option<Instant>,
    /// Round whose answer window is open, if any
    answer_round: Option<u64>,
}

impl PlayerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly accepted connection as `Player<N>`.
    ///
    /// Returns the new player's id and name. The caller spawns the connection
    /// task and hands it to [`PlayerManager::track_handler`] while still
    /// holding the lock.
    pub fn register(&mut self, addr: SocketAddr, outbox: Outbox) -> (u32, String) {
        self.accepted += 1;
        let id = self.accepted;
        let name = self.unique_name(&format!("Player{}", id));

        let player = Player::new(id, name.clone(), addr, outbox);
        self.last_join = Some(player.joined_at);
        info!("{} joined from {}", name, addr);
        self.players.insert(name.clone(), player);

        (id, name)
    }

    pub fn track_handler(&mut self, id: u32, handle: JoinHandle<()>) {
        self.handlers.insert(id, handle);
    }

    /// Renames a player, appending random digits to the requested name until
    /// it no longer collides with anyone else's.
    pub fn rename(
        &mut self,
        current: &str,
        requested: &str,
        state: ServerState,
    ) -> Result<String, RenameError> {
        if state == ServerState::GameStarted {
            return Err(RenameError::GameInProgress);
        }

        let requested = requested.trim();
        if requested.is_empty() {
            return Err(RenameError::EmptyName);
        }
        // Names end up inside standings lines, one player per line.
        if requested.chars().any(char::is_control) {
            return Err(RenameError::ControlCharacters);
        }
        if requested.len() > SERVER_NAME_LEN {
            return Err(RenameError::TooLong(requested.len()));
        }
        if requested == current {
            return if self.players.contains_key(current) {
                Ok(current.to_string())
            } else {
                Err(RenameError::UnknownPlayer)
            };
        }

        let applied = self.unique_name(requested);
        let mut player = self
            .players
            .remove(current)
            .ok_or(RenameError::UnknownPlayer)?;
        player.name = applied.clone();
        self.players.insert(applied.clone(), player);

        if let Some(answer) = self.pending_answers.remove(current) {
            self.pending_answers.insert(applied.clone(), answer);
        }

        info!("{} is now known as {}", current, applied);
        Ok(applied)
    }

    /// Deregisters a player. Dropping the returned player closes its
    /// connection. Returns `None` if the name is not registered, so a second
    /// call for the same disconnect is harmless.
    pub fn remove(&mut self, name: &str) -> Option<Player> {
        let player = self.players.remove(name)?;
        self.pending_answers.remove(name);
        self.handlers.remove(&player.id);
        info!("{} removed", name);
        Some(player)
    }

    /// Current name of the player with the given id.
    pub fn name_of(&self, id: u32) -> Option<&str> {
        self.players
            .values()
            .find(|player| player.id == id)
            .map(|player| player.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&Player> {
        self.players.get(name)
    }

    pub fn count(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn last_join(&self) -> Option<Instant> {
        self.last_join
    }

    /// Player with the highest score; ties go to whoever joined first.
    pub fn leader(&self) -> Option<&Player> {
        self.players
            .values()
            .max_by(|a, b| a.score().cmp(&b.score()).then(b.id.cmp(&a.id)))
    }

    /// Players from best to worst score, earlier joins first on ties.
    pub fn ranking(&self) -> Vec<&Player> {
        let mut ranking: Vec<&Player> = self.players.values().collect();
        ranking.sort_by(|a, b| b.score().cmp(&a.score()).then(a.id.cmp(&b.id)));
        ranking
    }

    /// One `name : score` line per player, in ranking order.
    pub fn standings(&self) -> String {
        self.ranking()
            .iter()
            .map(|player| player.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn broadcast(&self, opcode: Opcode, text: &str) {
        for player in self.players.values() {
            player.send(opcode, text);
        }
    }

    /// Sends to one player. Returns false if the name is not registered.
    pub fn send_to(&self, name: &str, opcode: Opcode, text: &str) -> bool {
        match self.players.get(name) {
            Some(player) => {
                player.send(opcode, text);
                true
            }
            None => false,
        }
    }

    /// Starts accepting answers for `round`, discarding anything left over.
    pub fn open_answers(&mut self, round: u64) {
        self.pending_answers.clear();
        self.answer_round = Some(round);
    }

    /// Records a player's answer for the open round, replacing any earlier
    /// one. Returns false if no window is open or the player is unknown.
    pub fn record_answer(&mut self, name: &str, answer: bool) -> bool {
        let Some(round) = self.answer_round else {
            debug!("Dropping late answer from {}", name);
            return false;
        };
        if !self.players.contains_key(name) {
            return false;
        }

        debug!("{} answered {} in round {}", name, answer, round);
        self.pending_answers.insert(name.to_string(), (round, answer));
        true
    }

    /// Closes the answer window and hands back the answers given for `round`.
    pub fn close_answers(&mut self, round: u64) -> Vec<(String, bool)> {
        self.answer_round = None;
        self.pending_answers
            .drain()
            .filter(|(_, (answered_in, _))| *answered_in == round)
            .map(|(name, (_, answer))| (name, answer))
            .collect()
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Player> {
        self.players.get_mut(name)
    }

    /// Empties the registry for a new cycle and returns the connection tasks
    /// so the caller can wait for them to finish.
    pub fn clear(&mut self) -> Vec<JoinHandle<()>> {
        self.players.clear();
        self.pending_answers.clear();
        self.answer_round = None;
        self.accepted = 0;
        self.last_join = None;
        self.handlers.drain().map(|(_, handle)| handle).collect()
    }

    fn unique_name(&self, requested: &str) -> String {
        let mut rng = rand::thread_rng();
        let mut name = requested.to_string();
        while self.players.contains_key(&name) {
            name.push(char::from(b'0' + rng.gen_range(0..10u8)));
        }
        name
    }

    #[cfg(test)]
    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.players.keys().cloned().collect();
        names.sort();
        names
    }
}
