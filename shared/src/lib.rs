//! # Shared Wire Protocol
//!
//! This crate defines the binary protocol spoken between the worms server and
//! its clients, and is depended on by both sides so the byte layouts can never
//! drift apart.
//!
//! ## Protocol summary
//!
//! The server broadcasts *events*, facts about the current round, inside UDP
//! datagrams of at most [`MAX_DATAGRAM_SIZE`] bytes. Every datagram starts with
//! the 32-bit round id, followed by one or more whole framed events. Events are
//! never split across datagrams; an event that does not fit is deferred to the
//! next one.
//!
//! Each event is framed as:
//!
//! ```text
//! len (u32 BE) | event_no (u32 BE) | event_type (u8) | event_data | crc32 (u32 BE)
//! ```
//!
//! `len` counts the bytes of `event_no`, `event_type` and `event_data`. The
//! CRC-32 (IEEE, as computed by `crc32fast`) covers everything from the first
//! byte of `len` through the last byte of `event_data`, so a receiver can
//! verify a frame before trusting its length field's neighbours.
//!
//! Clients send fixed-layout messages of 13–33 bytes:
//!
//! ```text
//! session_id (u64 BE) | turn_direction (u8) | next_expected_event_no (u32 BE) | player_name (0–20 bytes)
//! ```
//!
//! Name bytes must be printable ASCII in `[33, 126]`. Anything that violates
//! the layout is a [`ProtocolError::MalformedDatagram`] and is silently dropped
//! by the server.
//!
//! ## What lives here
//!
//! - [`Event`]: the tagged event variants and their exact encodings
//! - [`ClientMessage`]: decode (server side) and encode (client side)
//! - [`DatagramBuilder`]: packs events into ≤550-byte broadcast datagrams
//! - [`TurnDirection`]: the wire values for steering intent
//! - [`parse_datagram`] / [`Event::parse`]: the client-side decoder

use thiserror::Error;

/// Hard upper bound on any datagram the server emits, in bytes.
pub const MAX_DATAGRAM_SIZE: usize = 550;

/// Smallest valid client message: session id, direction and cursor, no name.
pub const CLIENT_MESSAGE_MIN: usize = 13;

/// Largest valid client message: the fixed fields plus a 20-byte name.
pub const CLIENT_MESSAGE_MAX: usize = 33;

/// Maximum player name length in bytes.
pub const MAX_NAME_LENGTH: usize = 20;

/// Maximum number of participants in a single round.
pub const MAX_PLAYERS: usize = 25;

/// Bytes of the round-id prefix at the start of every broadcast datagram.
pub const GAME_ID_SIZE: usize = 4;

const EVENT_NEW_GAME: u8 = 0;
const EVENT_PIXEL: u8 = 1;
const EVENT_PLAYER_ELIMINATED: u8 = 2;
const EVENT_GAME_OVER: u8 = 3;

/// Bytes of an event frame that are not payload: len, event_no, type, crc32.
const FRAME_OVERHEAD: usize = 13;

/// Errors produced by the codec.
///
/// The server's policy for all of these is to drop the offending datagram
/// silently; they are surfaced as values so callers can log them at debug
/// level without ever replying to the peer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// Length, framing, CRC or character-set constraint violated.
    #[error("malformed datagram")]
    MalformedDatagram,
    /// An event frame carried a type tag outside the known set.
    #[error("unknown event type {0}")]
    UnknownEventType(u8),
    /// The caller supplied insufficient room for even a single event.
    #[error("buffer exhausted")]
    BufferExhausted,
}

/// Steering intent carried in every client message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnDirection {
    Straight,
    Right,
    Left,
}

impl TurnDirection {
    /// Maps a wire byte to a direction. Values outside `{0, 1, 2}` are not a
    /// decode error (the registry drops such messages as a policy decision),
    /// so this returns `None` rather than failing.
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(TurnDirection::Straight),
            1 => Some(TurnDirection::Right),
            2 => Some(TurnDirection::Left),
            _ => None,
        }
    }

    pub fn wire_value(self) -> u8 {
        match self {
            TurnDirection::Straight => 0,
            TurnDirection::Right => 1,
            TurnDirection::Left => 2,
        }
    }
}

/// A single entry of the round's append-only event log.
///
/// The event number is not part of the variant: it is the event's index in
/// the log and is supplied at encode time and recovered at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Round started: board dimensions plus the participating player names in
    /// ascending order. Player indices in later events refer to this order.
    NewGame {
        width: u32,
        height: u32,
        names: Vec<String>,
    },
    /// A live avatar entered a fresh in-bounds cell and painted it.
    Pixel { player: u8, x: u32, y: u32 },
    /// An avatar left the board or crossed a painted cell.
    PlayerEliminated { player: u8 },
    /// Exactly one avatar remains; the round is over.
    GameOver,
}

impl Event {
    fn type_tag(&self) -> u8 {
        match self {
            Event::NewGame { .. } => EVENT_NEW_GAME,
            Event::Pixel { .. } => EVENT_PIXEL,
            Event::PlayerEliminated { .. } => EVENT_PLAYER_ELIMINATED,
            Event::GameOver => EVENT_GAME_OVER,
        }
    }

    /// Payload bytes of `event_data` for this variant.
    fn data_len(&self) -> usize {
        match self {
            Event::NewGame { names, .. } => {
                8 + names.iter().map(|n| n.len() + 1).sum::<usize>()
            }
            Event::Pixel { .. } => 9,
            Event::PlayerEliminated { .. } => 1,
            Event::GameOver => 0,
        }
    }

    /// Total bytes this event occupies on the wire, frame included.
    pub fn encoded_len(&self) -> usize {
        FRAME_OVERHEAD + self.data_len()
    }

    /// Appends the framed encoding of this event to `out`.
    ///
    /// Serialization never fails: the caller decides where the bytes go and
    /// [`DatagramBuilder`] enforces the datagram size limit before calling this.
    pub fn encode(&self, event_no: u32, out: &mut Vec<u8>) {
        let start = out.len();
        let len = (self.data_len() + 5) as u32;
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&event_no.to_be_bytes());
        out.push(self.type_tag());
        match self {
            Event::NewGame {
                width,
                height,
                names,
            } => {
                out.extend_from_slice(&width.to_be_bytes());
                out.extend_from_slice(&height.to_be_bytes());
                for name in names {
                    out.extend_from_slice(name.as_bytes());
                    out.push(0);
                }
            }
            Event::Pixel { player, x, y } => {
                out.push(*player);
                out.extend_from_slice(&x.to_be_bytes());
                out.extend_from_slice(&y.to_be_bytes());
            }
            Event::PlayerEliminated { player } => {
                out.push(*player);
            }
            Event::GameOver => {}
        }
        let crc = crc32fast::hash(&out[start..]);
        out.extend_from_slice(&crc.to_be_bytes());
    }

    /// Parses one framed event from the front of `buf`.
    ///
    /// Returns the event, its number, and how many bytes of `buf` it consumed.
    /// The server never receives events; this is the client half of the codec
    /// and the verification tool for tests.
    pub fn parse(buf: &[u8]) -> Result<(u32, Event, usize), ProtocolError> {
        if buf.len() < FRAME_OVERHEAD {
            return Err(ProtocolError::MalformedDatagram);
        }
        let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if len < 5 || buf.len() < len + 8 {
            return Err(ProtocolError::MalformedDatagram);
        }
        let stored_crc = u32::from_be_bytes([
            buf[len + 4],
            buf[len + 5],
            buf[len + 6],
            buf[len + 7],
        ]);
        if crc32fast::hash(&buf[..len + 4]) != stored_crc {
            return Err(ProtocolError::MalformedDatagram);
        }
        let event_no = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let data = &buf[9..len + 4];
        let event = match buf[8] {
            EVENT_NEW_GAME => parse_new_game(data)?,
            EVENT_PIXEL => {
                if data.len() != 9 {
                    return Err(ProtocolError::MalformedDatagram);
                }
                Event::Pixel {
                    player: data[0],
                    x: u32::from_be_bytes([data[1], data[2], data[3], data[4]]),
                    y: u32::from_be_bytes([data[5], data[6], data[7], data[8]]),
                }
            }
            EVENT_PLAYER_ELIMINATED => {
                if data.len() != 1 {
                    return Err(ProtocolError::MalformedDatagram);
                }
                Event::PlayerEliminated { player: data[0] }
            }
            EVENT_GAME_OVER => {
                if !data.is_empty() {
                    return Err(ProtocolError::MalformedDatagram);
                }
                Event::GameOver
            }
            tag => return Err(ProtocolError::UnknownEventType(tag)),
        };
        Ok((event_no, event, len + 8))
    }
}

fn parse_new_game(data: &[u8]) -> Result<Event, ProtocolError> {
    if data.len() < 8 {
        return Err(ProtocolError::MalformedDatagram);
    }
    let width = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    let height = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
    let name_bytes = &data[8..];
    let mut names = Vec::new();
    if !name_bytes.is_empty() {
        if name_bytes[name_bytes.len() - 1] != 0 {
            return Err(ProtocolError::MalformedDatagram);
        }
        for raw in name_bytes[..name_bytes.len() - 1].split(|&b| b == 0) {
            if raw.is_empty() || raw.len() > MAX_NAME_LENGTH || !is_valid_name(raw) {
                return Err(ProtocolError::MalformedDatagram);
            }
            let name =
                String::from_utf8(raw.to_vec()).map_err(|_| ProtocolError::MalformedDatagram)?;
            names.push(name);
        }
    }
    Ok(Event::NewGame {
        width,
        height,
        names,
    })
}

fn is_valid_name(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| (33..=126).contains(&b))
}

/// Decoded form of the 13–33 byte message every client sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientMessage {
    pub session_id: u64,
    /// Raw wire byte; use [`TurnDirection::from_wire`] to interpret it. The
    /// registry, not the codec, rejects out-of-range values.
    pub turn_direction: u8,
    pub next_expected_event_no: u32,
    pub player_name: String,
}

impl ClientMessage {
    /// Decodes a client datagram, enforcing the length and character-set
    /// constraints. Callers drop malformed datagrams without replying.
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < CLIENT_MESSAGE_MIN || buf.len() > CLIENT_MESSAGE_MAX {
            return Err(ProtocolError::MalformedDatagram);
        }
        let name_bytes = &buf[CLIENT_MESSAGE_MIN..];
        if !is_valid_name(name_bytes) {
            return Err(ProtocolError::MalformedDatagram);
        }
        Ok(ClientMessage {
            session_id: u64::from_be_bytes([
                buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
            ]),
            turn_direction: buf[8],
            next_expected_event_no: u32::from_be_bytes([buf[9], buf[10], buf[11], buf[12]]),
            player_name: String::from_utf8(name_bytes.to_vec())
                .map_err(|_| ProtocolError::MalformedDatagram)?,
        })
    }

    /// Encodes this message for sending; the client half of the codec.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CLIENT_MESSAGE_MIN + self.player_name.len());
        out.extend_from_slice(&self.session_id.to_be_bytes());
        out.push(self.turn_direction);
        out.extend_from_slice(&self.next_expected_event_no.to_be_bytes());
        out.extend_from_slice(self.player_name.as_bytes());
        out
    }
}

/// Packs a run of events into broadcast datagrams.
///
/// Every produced datagram starts with the round id and holds only whole
/// events. When the next event would push a datagram past
/// [`MAX_DATAGRAM_SIZE`], the current one is sealed and a fresh one started.
/// A partially filled final datagram is emitted as-is by [`finish`].
///
/// [`finish`]: DatagramBuilder::finish
pub struct DatagramBuilder {
    game_id: u32,
    current: Vec<u8>,
    sealed: Vec<Vec<u8>>,
}

impl DatagramBuilder {
    pub fn new(game_id: u32) -> Self {
        DatagramBuilder {
            game_id,
            current: game_id.to_be_bytes().to_vec(),
            sealed: Vec::new(),
        }
    }

    /// Appends one event, sealing the current datagram first if the event
    /// would not fit whole. Fails with [`ProtocolError::BufferExhausted`] only
    /// if the event cannot fit even in an empty datagram, which no event
    /// within protocol limits ever triggers.
    pub fn push(&mut self, event_no: u32, event: &Event) -> Result<(), ProtocolError> {
        let need = event.encoded_len();
        if GAME_ID_SIZE + need > MAX_DATAGRAM_SIZE {
            return Err(ProtocolError::BufferExhausted);
        }
        if self.current.len() + need > MAX_DATAGRAM_SIZE {
            self.seal();
        }
        event.encode(event_no, &mut self.current);
        Ok(())
    }

    fn seal(&mut self) {
        let fresh = self.game_id.to_be_bytes().to_vec();
        self.sealed.push(std::mem::replace(&mut self.current, fresh));
    }

    /// Seals any partial datagram and returns the full sequence, in order.
    /// Datagrams holding no events are not emitted.
    pub fn finish(mut self) -> Vec<Vec<u8>> {
        if self.current.len() > GAME_ID_SIZE {
            self.seal();
        }
        self.sealed
    }
}

/// Splits a broadcast datagram into its round id and framed events.
///
/// Client-side convenience over [`Event::parse`]; also the primary assertion
/// tool in the server's integration tests.
pub fn parse_datagram(buf: &[u8]) -> Result<(u32, Vec<(u32, Event)>), ProtocolError> {
    if buf.len() < GAME_ID_SIZE {
        return Err(ProtocolError::MalformedDatagram);
    }
    let game_id = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let mut events = Vec::new();
    let mut offset = GAME_ID_SIZE;
    while offset < buf.len() {
        let (event_no, event, consumed) = Event::parse(&buf[offset..])?;
        events.push((event_no, event));
        offset += consumed;
    }
    Ok((game_id, events))
}
