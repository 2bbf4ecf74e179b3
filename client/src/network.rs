use crate::display::{augment, render_message, Style, UserInterface};
use crate::input::{parse_command, Command, InputManager};
use log::{debug, info, warn};
use shared::{decode_offer, frame_message, parse_answer, FrameBuffer, Opcode, ANSWER_WINDOW, DISCOVERY_PORT};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::time::{sleep, sleep_until, Instant};

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    WaitingForOffer,
    Connecting,
    Connected,
    GameStarted,
    Terminated,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub discovery_port: u16,
    /// Sent as a rename request right after connecting
    pub name: Option<String>,
    pub answer_window: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            discovery_port: DISCOVERY_PORT,
            name: None,
            answer_window: ANSWER_WINDOW,
        }
    }
}

pub struct Client<U: UserInterface> {
    config: ClientConfig,
    state: ClientState,
    input: InputManager,
    ui: U,
    /// Set while a question is waiting for this player's answer
    answer_deadline: Option<Instant>,
}

impl<U: UserInterface> Client<U> {
    pub fn new(config: ClientConfig, input: InputManager, ui: U) -> Self {
        Client {
            config,
            state: ClientState::WaitingForOffer,
            input,
            ui,
            answer_deadline: None,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn ui(&self) -> &U {
        &self.ui
    }

    /// Looks for servers and plays their games until the player exits or a
    /// server aborts.
    pub async fn run(&mut self) -> io::Result<()> {
        while self.state != ClientState::Terminated {
            self.state = ClientState::WaitingForOffer;
            self.answer_deadline = None;

            let Some(server) = self.wait_for_offer().await? else {
                self.state = ClientState::Terminated;
                break;
            };

            self.state = ClientState::Connecting;
            match TcpStream::connect(server).await {
                Ok(stream) => {
                    if let Err(e) = self.play(stream).await {
                        warn!("Connection to {} failed: {}", server, e);
                        self.ui.display("Lost connection to the server.");
                    }
                }
                Err(e) => {
                    warn!("Failed to connect to {}: {}", server, e);
                    sleep(RECONNECT_DELAY).await;
                }
            }
        }

        info!("Client stopped");
        Ok(())
    }

    /// Listens for the first valid offer. Returns `None` if the player quits
    /// while waiting.
    async fn wait_for_offer(&mut self) -> io::Result<Option<SocketAddr>> {
        let socket = bind_discovery(self.config.discovery_port)?;
        self.ui.display(&augment(
            "Client started, listening for offer requests...",
            &[Style::Bold],
        ));

        let mut buffer = [0u8; 512];
        loop {
            tokio::select! {
                received = socket.recv_from(&mut buffer) => {
                    let (len, from) = match received {
                        Ok(received) => received,
                        Err(e) => {
                            debug!("Discovery receive failed: {}", e);
                            continue;
                        }
                    };
                    let Some(offer) = decode_offer(&buffer[..len]) else {
                        debug!("Ignoring {} byte packet from {}", len, from);
                        continue;
                    };

                    self.ui.display(&format!(
                        "Received offer from \"{}\" at {}, attempting to connect...",
                        offer.name,
                        from.ip()
                    ));
                    return Ok(Some(SocketAddr::new(from.ip(), offer.port)));
                }
                line = self.input.next_line() => match line.map(|line| parse_command(&line)) {
                    None | Some(Command::Exit) => return Ok(None),
                    Some(Command::Rename(name)) => {
                        self.ui.display(&format!("You will join as {}.", name));
                        self.config.name = Some(name);
                    }
                    Some(Command::Text(_)) => self.ui.display("Still looking for a server..."),
                },
            }
        }
    }

    /// Runs one session. Returns when the game ends, the server goes away,
    /// or the player quits.
    async fn play(&mut self, stream: TcpStream) -> io::Result<()> {
        self.state = ClientState::Connected;
        let _ = stream.set_nodelay(true);
        let (reader, mut writer) = stream.into_split();

        if let Some(name) = &self.config.name {
            writer.write_all(&frame_message(Opcode::RENAME, name)).await?;
        }

        let (tx, mut messages) = mpsc::unbounded_channel();
        let reader_task = tokio::spawn(async move {
            if let Err(e) = read_messages(reader, tx).await {
                debug!("Session read failed: {}", e);
            }
        });

        let result = loop {
            let deadline = self.answer_deadline;

            let outgoing = tokio::select! {
                message = messages.recv() => match message {
                    Some((opcode, text)) => {
                        self.handle_message(opcode, &text);
                        None
                    }
                    None => {
                        self.ui.display("The server closed the connection.");
                        break Ok(());
                    }
                },
                line = self.input.next_line() => match line {
                    Some(line) => self.handle_line(&line),
                    None => {
                        self.state = ClientState::Terminated;
                        None
                    }
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.answer_deadline = None;
                    self.ui.display("Time's up!");
                    None
                }
            };

            if let Some(frame) = outgoing {
                if let Err(e) = writer.write_all(&frame).await {
                    break Err(e);
                }
            }

            if matches!(
                self.state,
                ClientState::WaitingForOffer | ClientState::Terminated
            ) {
                break Ok(());
            }
        };

        reader_task.abort();
        result
    }

    /// Applies one server message to the session.
    pub fn handle_message(&mut self, opcode: Opcode, text: &str) {
        self.ui.display(&render_message(opcode, text));

        match opcode {
            Opcode::Start => self.state = ClientState::GameStarted,
            Opcode::Question => {
                self.answer_deadline = Some(Instant::now() + self.config.answer_window);
                self.ui.display("Type yes or no to answer.");
            }
            Opcode::Positive | Opcode::Negative => self.answer_deadline = None,
            Opcode::End => {
                self.answer_deadline = None;
                self.state = ClientState::WaitingForOffer;
            }
            Opcode::Abort => {
                self.answer_deadline = None;
                self.state = ClientState::Terminated;
            }
            Opcode::Info => {}
            Opcode::Unknown => debug!("Ignoring unknown message: {}", text),
        }
    }

    /// Turns a typed line into the frame to send, if any.
    pub fn handle_line(&mut self, line: &str) -> Option<Vec<u8>> {
        match parse_command(line) {
            Command::Exit => {
                self.state = ClientState::Terminated;
                None
            }
            Command::Rename(name) => Some(frame_message(Opcode::RENAME, &name)),
            Command::Text(text) if self.answer_deadline.is_some() => match parse_answer(&text) {
                Some(_) => {
                    self.answer_deadline = None;
                    Some(frame_message(Opcode::ANSWER, &text))
                }
                None => {
                    self.ui
                        .display(&format!("'{}' is not a valid answer, try yes or no.", text));
                    None
                }
            },
            Command::Text(_) => {
                self.ui.display("There is no open question right now.");
                None
            }
        }
    }
}

/// Binds the discovery port so several clients on one host can all hear
/// offers.
fn bind_discovery(port: u16) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)).into())?;
    UdpSocket::from_std(socket.into())
}

/// Forwards complete session messages from `reader` until it closes or the
/// receiving side goes away.
pub async fn read_messages<R>(mut reader: R, tx: mpsc::UnboundedSender<(Opcode, String)>) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut frames = FrameBuffer::new();
    let mut buffer = [0u8; 1024];

    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            return Ok(());
        }

        for frame in frames.push(&buffer[..n]) {
            match frame {
                Ok(message) => {
                    if tx.send(message).is_err() {
                        return Ok(());
                    }
                }
                Err(e) => warn!("Discarding server message: {}", e),
            }
        }
    }
}
