//! Server network layer: offer broadcasts, session connections, and the round
//! scheduler that drives both

use crate::config::ServerConfig;
use crate::discovery::OfferBroadcaster;
use crate::error::ServerError;
use crate::game::{self, QuestionSet, ServerState};
use crate::player_manager::PlayerManager;
use crate::questions::QuestionSource;
use log::{debug, error, info, warn};
use shared::{encode_offer, parse_answer, FrameBuffer, Opcode};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, timeout_at, Instant};

const READ_BUFFER_SIZE: usize = 1024;

/// The registry lock shared by the scheduler, the acceptor and every
/// connection task.
pub type SharedPlayers = Arc<Mutex<PlayerManager>>;

/// How a join window ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JoinOutcome {
    Ready,
    NotEnoughPlayers,
    Shutdown,
}

/// Requests an orderly stop of a running [`Server`].
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// Trivia server: advertises itself, collects players, and runs games until
/// shut down.
pub struct Server {
    config: ServerConfig,
    source: Arc<dyn QuestionSource>,
    /// Last successfully loaded question set for the topic
    catalog: HashMap<String, bool>,
    /// Questions not yet asked in the current game
    questions: QuestionSet,
    players: SharedPlayers,
    broadcaster: OfferBroadcaster,
    state_tx: watch::Sender<ServerState>,
    state_rx: watch::Receiver<ServerState>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
    /// Sequence number of the next answer window
    next_round: u64,
}

impl Server {
    /// Validates the configuration and loads the question set before any
    /// socket is opened, so configuration mistakes surface immediately.
    pub async fn new(
        config: ServerConfig,
        source: Arc<dyn QuestionSource>,
    ) -> Result<Self, ServerError> {
        config.validate()?;
        let catalog = source.load(&config.topic)?;
        info!(
            "Loaded {} questions for topic '{}'",
            catalog.len(),
            config.topic
        );

        let broadcaster = OfferBroadcaster::bind(config.discovery_target).await?;
        let (state_tx, state_rx) = watch::channel(ServerState::Inactive);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Server {
            questions: QuestionSet::new(catalog.clone()),
            catalog,
            source,
            players: Arc::new(Mutex::new(PlayerManager::new())),
            broadcaster,
            state_tx,
            state_rx,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
            next_round: 0,
            config,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Read-only view of the server state.
    pub fn subscribe_state(&self) -> watch::Receiver<ServerState> {
        self.state_rx.clone()
    }

    /// Runs join windows and games back to back until shut down.
    pub async fn run(&mut self) -> Result<(), ServerError> {
        info!(
            "Server '{}' started on {}, topic '{}'",
            self.config.name, self.config.bind_ip, self.config.topic
        );

        while !self.is_shutting_down() {
            self.set_state(ServerState::SendingOffers);

            match self.run_join_window().await? {
                JoinOutcome::Ready => {
                    self.set_state(ServerState::GameStarted);
                    self.play_game().await;
                }
                JoinOutcome::NotEnoughPlayers => {
                    info!("Not enough players joined, cancelling this game");
                    self.players
                        .lock()
                        .await
                        .broadcast(Opcode::End, game::NOT_ENOUGH_PLAYERS);
                }
                JoinOutcome::Shutdown => {}
            }

            if self.is_shutting_down() {
                self.players
                    .lock()
                    .await
                    .broadcast(Opcode::Abort, game::SHUTTING_DOWN);
            }

            self.reset().await;

            if !self.is_shutting_down() {
                info!("Game over, sending out offer requests...");
            }
        }

        self.set_state(ServerState::Terminated);
        info!("Server stopped");
        Ok(())
    }

    /// Opens a fresh listener and advertises it until enough players have
    /// joined and the join grace has passed since the last of them.
    async fn run_join_window(&mut self) -> Result<JoinOutcome, ServerError> {
        let listener = TcpListener::bind(SocketAddr::new(self.config.bind_ip, 0)).await?;
        let port = listener.local_addr()?.port();
        let offer = encode_offer(&self.config.name, port)?;
        info!(
            "Listening on port {}, sending offers to {}",
            port, self.config.discovery_target
        );

        let (stop_tx, stop_rx) = watch::channel(false);
        let acceptor = tokio::spawn(accept_connections(
            listener,
            Arc::clone(&self.players),
            self.state_rx.clone(),
            stop_rx,
        ));

        let outcome = loop {
            self.broadcaster.announce(&offer).await;
            if !self.pause(self.config.broadcast_interval).await {
                break JoinOutcome::Shutdown;
            }

            let players = self.players.lock().await;
            let Some(last_join) = players.last_join() else {
                continue;
            };
            if last_join.elapsed() < self.config.join_grace {
                continue;
            }

            break if players.count() >= self.config.min_players {
                JoinOutcome::Ready
            } else {
                JoinOutcome::NotEnoughPlayers
            };
        };

        let _ = stop_tx.send(true);
        if let Err(e) = acceptor.await {
            warn!("Acceptor task failed: {}", e);
        }

        Ok(outcome)
    }

    /// Plays rounds until players, questions or the round budget run out,
    /// then announces the result. Returns early without an announcement on
    /// shutdown.
    async fn play_game(&mut self) {
        {
            let players = self.players.lock().await;
            info!("Game started with {} players", players.count());
            players.broadcast(
                Opcode::Start,
                &game::welcome_message(&self.config.name, &self.config.topic),
            );
        }

        let mut rounds_played = 0;
        while rounds_played < self.config.rounds_per_game && !self.questions.is_empty() {
            let remaining = self.players.lock().await.count();
            if remaining < self.config.min_players {
                info!("Only {} player(s) left, ending the game", remaining);
                break;
            }

            let drawn = {
                let mut rng = rand::thread_rng();
                self.questions.draw(&mut rng)
            };
            let Some((question, correct)) = drawn else {
                break;
            };

            let round = self.next_round;
            self.next_round += 1;

            {
                let mut players = self.players.lock().await;
                players.broadcast(
                    Opcode::Info,
                    &game::standings_message(&players, rounds_played),
                );
                players.open_answers(round);
                players.broadcast(Opcode::Question, &game::question_message(&question));
            }
            info!("Round {}: {} ({})", rounds_played + 1, question, correct);

            if !self.pause(self.config.answer_window).await {
                return;
            }

            {
                let mut players = self.players.lock().await;
                let answers = players.close_answers(round);
                let answered = answers.len();
                let correct_count = game::score_round(&mut players, answers, correct);
                info!(
                    "Round {} closed: {} answer(s), {} correct",
                    rounds_played + 1,
                    answered,
                    correct_count
                );
            }

            self.questions.retire(&question);
            rounds_played += 1;
        }

        let players = self.players.lock().await;
        players.broadcast(Opcode::End, &game::game_over_message(&players));
    }

    /// Drops every player, waits for their connections to flush and close,
    /// and reloads the question set for the next game.
    async fn reset(&mut self) {
        let handlers = self.players.lock().await.clear();
        drain_handlers(handlers, self.config.drain_timeout).await;

        match self.source.load(&self.config.topic) {
            Ok(questions) => self.catalog = questions,
            Err(e) => error!(
                "Failed to reload questions for '{}', reusing the previous set: {}",
                self.config.topic, e
            ),
        }
        self.questions = QuestionSet::new(self.catalog.clone());

        if !self.is_shutting_down() {
            self.set_state(ServerState::Inactive);
        }
    }

    fn set_state(&self, state: ServerState) {
        let previous = *self.state_tx.borrow();
        if previous != state {
            info!("State {:?} -> {:?}", previous, state);
        }
        let _ = self.state_tx.send(state);
    }

    fn is_shutting_down(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Sleeps unless a shutdown arrives first. Returns false on shutdown.
    async fn pause(&self, duration: Duration) -> bool {
        let mut shutdown = self.shutdown_rx.clone();
        let stopping = *shutdown.borrow();
        if stopping {
            return false;
        }

        tokio::select! {
            _ = sleep(duration) => true,
            _ = shutdown.changed() => false,
        }
    }
}

/// Accepts session connections until told to stop, then drops the listener.
async fn accept_connections(
    listener: TcpListener,
    players: SharedPlayers,
    state: watch::Receiver<ServerState>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => register_connection(stream, addr, &players, &state).await,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    sleep(Duration::from_millis(10)).await;
                }
            },
            _ = stop.changed() => break,
        }
    }

    debug!("Stopped accepting connections");
}

/// Registers the connection and starts its task while holding the lock, so
/// the task is tracked before it can possibly deregister itself.
async fn register_connection(
    stream: TcpStream,
    addr: SocketAddr,
    players: &SharedPlayers,
    state: &watch::Receiver<ServerState>,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
    }

    let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
    let mut manager = players.lock().await;
    let (id, name) = manager.register(addr, outbox_tx);
    manager.send_to(&name, Opcode::Info, &format!("Welcome! You joined as {}.", name));

    let handle = tokio::spawn(handle_connection(
        id,
        stream,
        outbox_rx,
        Arc::clone(players),
        state.clone(),
    ));
    manager.track_handler(id, handle);
}

/// Per-connection task: writes queued frames and dispatches incoming ones.
///
/// Ends when the player is deregistered (its queue closes), when the peer goes
/// away, or when the server terminates.
async fn handle_connection(
    id: u32,
    stream: TcpStream,
    mut outbox: mpsc::UnboundedReceiver<Vec<u8>>,
    players: SharedPlayers,
    mut state: watch::Receiver<ServerState>,
) {
    let (mut reader, mut writer) = stream.into_split();
    let mut frames = FrameBuffer::new();
    let mut buffer = [0u8; READ_BUFFER_SIZE];

    loop {
        tokio::select! {
            outgoing = outbox.recv() => match outgoing {
                Some(frame) => {
                    if let Err(e) = writer.write_all(&frame).await {
                        debug!("Write to connection {} failed: {}", id, e);
                    }
                }
                None => break,
            },
            read = reader.read(&mut buffer) => match read {
                Ok(0) => {
                    debug!("Connection {} closed by peer", id);
                    disconnect(id, &players).await;
                    break;
                }
                Ok(n) => {
                    for frame in frames.push(&buffer[..n]) {
                        match frame {
                            Ok((opcode, text)) => {
                                let current = *state.borrow();
                                dispatch(id, opcode, &text, &players, current).await;
                            }
                            Err(e) => warn!("Connection {}: {}", id, e),
                        }
                    }
                }
                Err(e) => {
                    match e.kind() {
                        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => {
                            debug!("Connection {} dropped: {}", id, e)
                        }
                        _ => warn!("Connection {} failed: {}", id, e),
                    }
                    disconnect(id, &players).await;
                    break;
                }
            },
            changed = state.changed() => {
                let terminated = changed.is_err() || *state.borrow() == ServerState::Terminated;
                if terminated {
                    while let Ok(frame) = outbox.try_recv() {
                        if writer.write_all(&frame).await.is_err() {
                            break;
                        }
                    }
                    break;
                }
            }
        }
    }

    let _ = writer.shutdown().await;
}

/// Deregisters a player whose connection went away and tells the others.
async fn disconnect(id: u32, players: &SharedPlayers) {
    let mut manager = players.lock().await;
    let Some(name) = manager.name_of(id).map(str::to_string) else {
        return;
    };

    manager.remove(&name);
    info!("{} has disconnected", name);
    manager.broadcast(Opcode::Info, &format!("{} has disconnected.", name));
}

/// Handles one message from a player. Only answers and rename requests mean
/// anything coming from a client.
async fn dispatch(
    id: u32,
    opcode: Opcode,
    text: &str,
    players: &SharedPlayers,
    state: ServerState,
) {
    match opcode {
        Opcode::ANSWER => {
            if state != ServerState::GameStarted {
                debug!("Ignoring answer from connection {} outside a game", id);
                return;
            }

            let mut manager = players.lock().await;
            let Some(name) = manager.name_of(id).map(str::to_string) else {
                return;
            };
            match parse_answer(text) {
                Some(answer) => {
                    manager.record_answer(&name, answer);
                }
                None => {
                    manager.send_to(
                        &name,
                        Opcode::Info,
                        &format!("'{}' is not a valid answer, try yes or no.", text.trim()),
                    );
                }
            }
        }
        Opcode::RENAME => {
            let mut manager = players.lock().await;
            let Some(current) = manager.name_of(id).map(str::to_string) else {
                return;
            };

            let (recipient, reply) = match manager.rename(&current, text, state) {
                Ok(applied) => {
                    let reply = format!("You are now known as {}.", applied);
                    (applied, reply)
                }
                Err(e) => (current, e.to_string()),
            };
            manager.send_to(&recipient, Opcode::Info, &reply);
        }
        other => debug!("Ignoring {:?} from connection {}", other, id),
    }
}

/// Waits for connection tasks to flush and exit. Whatever is still running
/// when `limit` runs out is aborted; the limit covers all tasks together.
async fn drain_handlers(handlers: Vec<JoinHandle<()>>, limit: Duration) {
    let deadline = Instant::now() + limit;
    for mut handle in handlers {
        if timeout_at(deadline, &mut handle).await.is_err() {
            warn!("Connection task did not finish in time, aborting it");
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::frame_message;
    use std::collections::VecDeque;
    use std::time::Instant;

    const WAIT: Duration = Duration::from_secs(2);

    struct TestConnection {
        stream: TcpStream,
        frames: FrameBuffer,
        queue: VecDeque<(Opcode, String)>,
    }

    impl TestConnection {
        async fn connect(addr: SocketAddr) -> Self {
            TestConnection {
                stream: TcpStream::connect(addr).await.unwrap(),
                frames: FrameBuffer::new(),
                queue: VecDeque::new(),
            }
        }

        async fn send(&mut self, opcode: Opcode, text: &str) {
            self.stream
                .write_all(&frame_message(opcode, text))
                .await
                .unwrap();
        }

        async fn next(&mut self) -> (Opcode, String) {
            let mut buffer = [0u8; 1024];
            while self.queue.is_empty() {
                let n = timeout(WAIT, self.stream.read(&mut buffer))
                    .await
                    .expect("timed out waiting for a message")
                    .unwrap();
                assert!(n > 0, "server closed the connection");
                self.queue
                    .extend(self.frames.push(&buffer[..n]).into_iter().map(Result::unwrap));
            }
            self.queue.pop_front().unwrap()
        }

        async fn expect(&mut self, opcode: Opcode) -> String {
            loop {
                let (received, text) = self.next().await;
                if received == opcode {
                    return text;
                }
            }
        }
    }

    async fn start_acceptor(
        players: SharedPlayers,
        state: watch::Receiver<ServerState>,
    ) -> (SocketAddr, watch::Sender<bool>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(accept_connections(listener, players, state, stop_rx));
        (addr, stop_tx)
    }

    async fn eventually<F>(players: &SharedPlayers, mut condition: F)
    where
        F: FnMut(&PlayerManager) -> bool,
    {
        let deadline = Instant::now() + WAIT;
        loop {
            if condition(&*players.lock().await) {
                return;
            }
            assert!(Instant::now() < deadline, "condition not met in time");
            sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_accepted_connection_is_registered() {
        let players: SharedPlayers = Arc::new(Mutex::new(PlayerManager::new()));
        let (_state_tx, state_rx) = watch::channel(ServerState::SendingOffers);
        let (addr, _stop) = start_acceptor(Arc::clone(&players), state_rx).await;

        let mut conn = TestConnection::connect(addr).await;
        let welcome = conn.expect(Opcode::Info).await;
        assert_eq!(welcome, "Welcome! You joined as Player1.");

        eventually(&players, |p| p.count() == 1 && p.get("Player1").is_some()).await;
    }

    #[tokio::test]
    async fn test_rename_over_connection() {
        let players: SharedPlayers = Arc::new(Mutex::new(PlayerManager::new()));
        let (state_tx, state_rx) = watch::channel(ServerState::SendingOffers);
        let (addr, _stop) = start_acceptor(Arc::clone(&players), state_rx).await;

        let mut conn = TestConnection::connect(addr).await;
        conn.expect(Opcode::Info).await;

        conn.send(Opcode::RENAME, "alice").await;
        assert_eq!(conn.expect(Opcode::Info).await, "You are now known as alice.");
        eventually(&players, |p| p.get("alice").is_some()).await;

        conn.send(Opcode::RENAME, "x : 99\nalice").await;
        assert_eq!(
            conn.expect(Opcode::Info).await,
            "Your name cannot contain control characters."
        );

        state_tx.send(ServerState::GameStarted).unwrap();
        conn.send(Opcode::RENAME, "bob").await;
        assert_eq!(
            conn.expect(Opcode::Info).await,
            "You cannot change your name once the game has started."
        );
        eventually(&players, |p| p.get("alice").is_some() && p.get("bob").is_none()).await;
    }

    #[tokio::test]
    async fn test_answers_recorded_only_during_game() {
        let players: SharedPlayers = Arc::new(Mutex::new(PlayerManager::new()));
        let (state_tx, state_rx) = watch::channel(ServerState::SendingOffers);
        let (addr, _stop) = start_acceptor(Arc::clone(&players), state_rx).await;

        let mut conn = TestConnection::connect(addr).await;
        conn.expect(Opcode::Info).await;
        players.lock().await.open_answers(1);

        // Messages are handled in order, so the rename reply means the answer
        // before it has been processed.
        conn.send(Opcode::ANSWER, "yes").await;
        conn.send(Opcode::RENAME, "Player1").await;
        assert_eq!(conn.expect(Opcode::Info).await, "You are now known as Player1.");
        assert!(players.lock().await.close_answers(1).is_empty());

        state_tx.send(ServerState::GameStarted).unwrap();
        players.lock().await.open_answers(2);

        conn.send(Opcode::ANSWER, "maybe").await;
        conn.send(Opcode::ANSWER, " No ").await;
        conn.send(Opcode::ANSWER, "yes").await;
        conn.send(Opcode::RENAME, "Player1").await;

        assert_eq!(
            conn.expect(Opcode::Info).await,
            "'maybe' is not a valid answer, try yes or no."
        );
        assert_eq!(
            conn.expect(Opcode::Info).await,
            "You cannot change your name once the game has started."
        );
        assert_eq!(
            players.lock().await.close_answers(2),
            vec![("Player1".to_string(), true)]
        );
    }

    #[tokio::test]
    async fn test_disconnect_notifies_remaining_players() {
        let players: SharedPlayers = Arc::new(Mutex::new(PlayerManager::new()));
        let (_state_tx, state_rx) = watch::channel(ServerState::GameStarted);
        let (addr, _stop) = start_acceptor(Arc::clone(&players), state_rx).await;

        let mut first = TestConnection::connect(addr).await;
        first.expect(Opcode::Info).await;
        let mut second = TestConnection::connect(addr).await;
        second.expect(Opcode::Info).await;
        eventually(&players, |p| p.count() == 2).await;

        drop(second);

        assert_eq!(
            first.expect(Opcode::Info).await,
            "Player2 has disconnected."
        );
        eventually(&players, |p| p.count() == 1 && p.get("Player2").is_none()).await;
    }

    #[tokio::test]
    async fn test_removed_player_connection_closes() {
        let players: SharedPlayers = Arc::new(Mutex::new(PlayerManager::new()));
        let (_state_tx, state_rx) = watch::channel(ServerState::SendingOffers);
        let (addr, _stop) = start_acceptor(Arc::clone(&players), state_rx).await;

        let mut conn = TestConnection::connect(addr).await;
        conn.expect(Opcode::Info).await;

        {
            let mut manager = players.lock().await;
            manager.send_to("Player1", Opcode::End, "bye");
            let handlers = manager.clear();
            assert_eq!(handlers.len(), 1);
        }

        // Queued messages are flushed before the socket closes.
        assert_eq!(conn.expect(Opcode::End).await, "bye");
        let mut buffer = [0u8; 16];
        let n = timeout(WAIT, conn.stream.read(&mut buffer))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_acceptor_stops_on_signal() {
        let players: SharedPlayers = Arc::new(Mutex::new(PlayerManager::new()));
        let (_state_tx, state_rx) = watch::channel(ServerState::SendingOffers);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = watch::channel(false);
        let acceptor = tokio::spawn(accept_connections(listener, players, state_rx, stop_rx));

        stop_tx.send(true).unwrap();
        timeout(WAIT, acceptor).await.unwrap().unwrap();

        // The listener is gone with the task.
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_drain_shares_one_deadline() {
        let (alive_tx, mut alive_rx) = mpsc::channel::<()>(1);
        let stuck: Vec<JoinHandle<()>> = (0..5)
            .map(|_| {
                let alive = alive_tx.clone();
                tokio::spawn(async move {
                    let _alive = alive;
                    std::future::pending::<()>().await
                })
            })
            .collect();
        drop(alive_tx);

        let started = Instant::now();
        drain_handlers(stuck, Duration::from_millis(200)).await;
        assert!(started.elapsed() < Duration::from_millis(600));

        // Every task was aborted, dropping its sender.
        assert!(timeout(WAIT, alive_rx.recv()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_drain_waits_for_finishing_tasks() {
        let finished = Arc::new(Mutex::new(0));
        let handlers = (0..3)
            .map(|_| {
                let finished = Arc::clone(&finished);
                tokio::spawn(async move {
                    sleep(Duration::from_millis(20)).await;
                    *finished.lock().await += 1;
                })
            })
            .collect();

        drain_handlers(handlers, WAIT).await;
        assert_eq!(*finished.lock().await, 3);
    }
}
