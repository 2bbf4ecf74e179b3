use std::time::Duration;

pub const DISCOVERY_PORT: u16 = 13117;
pub const MAGIC_COOKIE: u32 = 0xABCD_DCBA;
pub const OFFER_MESSAGE_TYPE: u8 = 0x2;
pub const SERVER_NAME_LEN: usize = 32;
pub const OFFER_LEN: usize = 4 + 1 + SERVER_NAME_LEN + 2;

pub const BROADCAST_INTERVAL: Duration = Duration::from_secs(1);
pub const JOIN_GRACE: Duration = Duration::from_secs(10);
pub const ANSWER_WINDOW: Duration = Duration::from_secs(10);
pub const MINIMUM_PLAYERS: usize = 2;

/// Byte written after every session message on the TCP stream.
pub const FRAME_DELIMITER: u8 = 0x00;
/// Longest partial frame a [`FrameBuffer`] holds before giving up on it.
pub const MAX_FRAME_LEN: usize = 4096;

const OFFER_NAME_RANGE: std::ops::Range<usize> = 5..5 + SERVER_NAME_LEN;
const OFFER_PORT_RANGE: std::ops::Range<usize> = 5 + SERVER_NAME_LEN..OFFER_LEN;

const ANSWER_LITERALS: [(&str, bool); 10] = [
    ("y", true),
    ("n", false),
    ("yes", true),
    ("no", false),
    ("true", true),
    ("false", false),
    ("t", true),
    ("f", false),
    ("1", true),
    ("0", false),
];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("server name is {0} bytes long, the limit is {SERVER_NAME_LEN}")]
    NameTooLong(usize),
    #[error("frame exceeded {MAX_FRAME_LEN} bytes without a delimiter")]
    FrameTooLong,
}

/// Session message type tag, the first byte of every TCP message.
///
/// `QUESTION`/`ANSWER` and `INFO`/`RENAME` share wire values; the direction of
/// travel tells them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Abort,
    Start,
    End,
    Question,
    Info,
    Positive,
    Negative,
    /// Never sent; produced when a received message has no recognizable tag.
    Unknown,
}

impl Opcode {
    pub const ANSWER: Opcode = Opcode::Question;
    pub const RENAME: Opcode = Opcode::Info;

    pub fn to_byte(self) -> u8 {
        match self {
            Opcode::Abort => 0x1,
            Opcode::Start => 0x2,
            Opcode::End => 0x4,
            Opcode::Question => 0x8,
            Opcode::Info => 0x10,
            Opcode::Positive => 0x20,
            Opcode::Negative => 0x40,
            Opcode::Unknown => 0x80,
        }
    }

    pub fn from_byte(byte: u8) -> Opcode {
        match byte {
            0x1 => Opcode::Abort,
            0x2 => Opcode::Start,
            0x4 => Opcode::End,
            0x8 => Opcode::Question,
            0x10 => Opcode::Info,
            0x20 => Opcode::Positive,
            0x40 => Opcode::Negative,
            _ => Opcode::Unknown,
        }
    }
}

/// A joinable server as advertised by a discovery packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOffer {
    pub name: String,
    pub port: u16,
}

fn offer_prefix() -> [u8; 5] {
    let mut prefix = [0u8; 5];
    prefix[..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
    prefix[4] = OFFER_MESSAGE_TYPE;
    prefix
}

pub fn validate_server_name(name: &str) -> Result<(), ProtocolError> {
    if name.len() > SERVER_NAME_LEN {
        return Err(ProtocolError::NameTooLong(name.len()));
    }
    Ok(())
}

/// Packs the 39-byte discovery packet: cookie, type, space-padded name, port.
pub fn encode_offer(name: &str, port: u16) -> Result<[u8; OFFER_LEN], ProtocolError> {
    validate_server_name(name)?;

    let mut packet = [b' '; OFFER_LEN];
    packet[..5].copy_from_slice(&offer_prefix());
    packet[OFFER_NAME_RANGE.start..OFFER_NAME_RANGE.start + name.len()]
        .copy_from_slice(name.as_bytes());
    packet[OFFER_PORT_RANGE].copy_from_slice(&port.to_be_bytes());
    Ok(packet)
}

pub fn is_offer(data: &[u8]) -> bool {
    data.len() == OFFER_LEN && data.starts_with(&offer_prefix())
}

/// Extracts the server name and port, or `None` for anything that is not an
/// offer packet.
pub fn decode_offer(data: &[u8]) -> Option<ServerOffer> {
    if !is_offer(data) {
        return None;
    }

    let name = String::from_utf8_lossy(&data[OFFER_NAME_RANGE])
        .trim_matches(|c: char| c.is_whitespace() || c == '\0')
        .to_string();
    let port = u16::from_be_bytes([data[OFFER_PORT_RANGE.start], data[OFFER_PORT_RANGE.start + 1]]);

    Some(ServerOffer { name, port })
}

pub fn encode_message(opcode: Opcode, text: &str) -> Vec<u8> {
    let mut data = Vec::with_capacity(1 + text.len());
    data.push(opcode.to_byte());
    data.extend_from_slice(text.as_bytes());
    data
}

pub fn decode_message(data: &[u8]) -> (Opcode, String) {
    match data.split_first() {
        Some((&tag, payload)) => (
            Opcode::from_byte(tag),
            String::from_utf8_lossy(payload).into_owned(),
        ),
        None => (Opcode::Unknown, String::new()),
    }
}

/// Encodes a message for the TCP stream, delimiter included.
///
/// NUL characters are dropped from `text` since they would split the frame.
pub fn frame_message(opcode: Opcode, text: &str) -> Vec<u8> {
    let mut data = if text.contains('\0') {
        encode_message(opcode, &text.replace('\0', ""))
    } else {
        encode_message(opcode, text)
    };
    data.push(FRAME_DELIMITER);
    data
}

/// Reassembles delimited session messages from arbitrary stream chunks.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    pending: Vec<u8>,
    /// Inside a frame that already overflowed; skip to its delimiter
    discarding: bool,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk read from the stream and returns one entry per frame it
    /// completed, in stream order.
    ///
    /// A frame that grows past [`MAX_FRAME_LEN`] yields a single
    /// `FrameTooLong` entry. The rest of it, up to and including its
    /// delimiter, is dropped, even when it arrives in later chunks.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<(Opcode, String), ProtocolError>> {
        let mut frames = Vec::new();

        for piece in chunk.split_inclusive(|&b| b == FRAME_DELIMITER) {
            let terminated = piece.last() == Some(&FRAME_DELIMITER);
            let body = if terminated {
                &piece[..piece.len() - 1]
            } else {
                piece
            };

            if self.discarding {
                self.discarding = !terminated;
                continue;
            }

            if self.pending.len() + body.len() > MAX_FRAME_LEN {
                self.pending.clear();
                self.discarding = !terminated;
                frames.push(Err(ProtocolError::FrameTooLong));
                continue;
            }

            self.pending.extend_from_slice(body);
            if terminated {
                frames.push(Ok(decode_message(&self.pending)));
                self.pending.clear();
            }
        }

        frames
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.discarding = false;
    }
}

/// Parses a player's answer: `y/n`, `yes/no`, `true/false`, `t/f`, `1/0`,
/// any case, surrounding whitespace ignored. Anything else is `None`.
pub fn parse_answer(answer: &str) -> Option<bool> {
    let normalized = answer.trim().to_lowercase();
    ANSWER_LITERALS
        .iter()
        .find(|(literal, _)| *literal == normalized)
        .map(|&(_, value)| value)
}
