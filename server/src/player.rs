use log::debug;
use shared::{frame_message, Opcode};
use std::cmp::Ordering;
use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc;

/// Frames queued for one connection's socket.
pub type Outbox = mpsc::UnboundedSender<Vec<u8>>;

/// A connected player.
///
/// The socket itself belongs to the connection task; the player only holds
/// the queue feeding it. Dropping the player closes that queue, which ends the
/// task and closes the socket.
#[derive(Debug)]
pub struct Player {
    pub id: u32,
    pub name: String,
    pub addr: SocketAddr,
    pub joined_at: Instant,
    score: u32,
    outbox: Outbox,
}

impl Player {
    pub fn new(id: u32, name: String, addr: SocketAddr, outbox: Outbox) -> Self {
        Player {
            id,
            name,
            addr,
            joined_at: Instant::now(),
            score: 0,
            outbox,
        }
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn increment_score(&mut self) {
        self.score += 1;
    }

    /// Queues a message for this player. Best effort: if the connection is
    /// already gone the message is dropped, its own task cleans up.
    pub fn send(&self, opcode: Opcode, text: &str) {
        if self.outbox.send(frame_message(opcode, text)).is_err() {
            debug!("Dropping {:?} for {}, connection already closed", opcode, self.name);
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} : {}", self.name, self.score)
    }
}

// Players compare by score alone.
impl PartialEq for Player {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score
    }
}

impl PartialOrd for Player {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.score.cmp(&other.score))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::FrameBuffer;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    #[test]
    fn test_player_creation() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let player = Player::new(1, "Player1".to_string(), test_addr(), tx);

        assert_eq!(player.id, 1);
        assert_eq!(player.name, "Player1");
        assert_eq!(player.addr, test_addr());
        assert_eq!(player.score(), 0);
    }

    #[test]
    fn test_increment_score() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut player = Player::new(1, "Player1".to_string(), test_addr(), tx);

        player.increment_score();
        player.increment_score();
        assert_eq!(player.score(), 2);
        assert_eq!(player.to_string(), "Player1 : 2");
    }

    #[test]
    fn test_ordering_by_score() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut alice = Player::new(1, "alice".to_string(), test_addr(), tx.clone());
        let bob = Player::new(2, "bob".to_string(), test_addr(), tx);

        assert!(alice == bob);
        alice.increment_score();
        assert!(alice > bob);
        assert!(bob < alice);
    }

    #[test]
    fn test_send_queues_frame() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let player = Player::new(1, "Player1".to_string(), test_addr(), tx);

        player.send(Opcode::Positive, "Correct!");

        let frame = rx.try_recv().unwrap();
        let mut frames = FrameBuffer::new();
        assert_eq!(
            frames.push(&frame),
            vec![Ok((Opcode::Positive, "Correct!".to_string()))]
        );
    }

    #[test]
    fn test_send_wakes_connection_task() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let player = Player::new(1, "Player1".to_string(), test_addr(), tx);

        let mut recv = tokio_test::task::spawn(rx.recv());
        tokio_test::assert_pending!(recv.poll());

        player.send(Opcode::Question, "True or false: ARP resolves MAC addresses");
        assert!(recv.is_woken());
        let frame = tokio_test::assert_ready!(recv.poll());
        assert_eq!(frame.map(|frame| frame[0]), Some(Opcode::Question.to_byte()));
    }

    #[test]
    fn test_send_after_close_is_ignored() {
        let (tx, rx) = mpsc::unbounded_channel();
        let player = Player::new(1, "Player1".to_string(), test_addr(), tx);
        drop(rx);

        player.send(Opcode::Info, "nobody is listening");
    }
}
