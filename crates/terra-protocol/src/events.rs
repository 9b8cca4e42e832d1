//! In-game frames (selector bit `1`).
//!
//! A frame received during a game is one of two shapes that cannot be told
//! apart from the header:
//!
//! - **public**: bit 0 is the selector, bit 1 is reserved, then zero or more
//!   events `id:4 | sender:9 | payload`, walked while at least 8 unread bits
//!   remain;
//! - **private**: a single `id:4 | sender:9 | payload` addressed to this
//!   client, starting at bit 0.
//!
//! The only way to tell them apart is to try the public reading first and
//! fall back to the private one if it runs off the end of the frame. See
//! [`try_decode_public_events`] and [`decode_private_event`].

use crate::{Buffer, ProtocolError};

/// Bit at which the first public event header starts.
pub const PUBLIC_EVENTS_OFFSET: usize = 2;

/// Width of an event header (`id:4 | sender:9`).
pub const EVENT_HEADER_BITS: usize = 13;

/// Public event iteration stops when fewer than this many bits remain.
const MIN_EVENT_BITS: usize = 8;

/// Private emoji code asking the recipient for money.
pub const EMOJI_REQUEST_AID: u16 = 1022;
/// Private emoji code asking the recipient to repeat its last attack.
pub const EMOJI_MIRROR_ATTACK: u16 = 697;

/// Public in-game event ids.
pub mod ids {
    pub const PLACE_BASE: u8 = 0;
    pub const ATTACK: u8 = 1;
    pub const SEND_MONEY: u8 = 2;
    pub const EMOJI: u8 = 5;
    pub const EMOJI_ALT: u8 = 6;
    pub const FLAG: u8 = 7;
    pub const PLAYER_LEFT: u8 = 9;
}

/// Private event ids.
pub mod private_ids {
    pub const EMOJI: u8 = 12;
    pub const CLAN_REQUEST: u8 = 13;
    pub const TARGETED_ATTACK: u8 = 14;
}

/// Typed payload of a public event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEvent {
    PlaceBase { position: u32 },
    Attack { percentage: u16, target: u16 },
    SendMoney { value: u16, target: u16 },
    /// Ids `3` and `4`: two opaque fields of 10 and 22 bits.
    Reserved { id: u8, first: u16, second: u32 },
    /// Ids `5` and `6`.
    Emoji { code: u16 },
    Flag(bool),
    PlayerLeft,
    /// Any other id; no payload.
    Other(u8),
}

impl GameEvent {
    /// Reads the payload of event `id` at the current read cursor.
    pub fn read(id: u8, buf: &mut Buffer) -> Result<Self, ProtocolError> {
        let event = match id {
            ids::PLACE_BASE => Self::PlaceBase {
                position: buf.decode_bits(22)?,
            },
            ids::ATTACK => Self::Attack {
                percentage: buf.decode_bits(10)? as u16,
                target: buf.decode_bits(10)? as u16,
            },
            ids::SEND_MONEY => Self::SendMoney {
                value: buf.decode_bits(10)? as u16,
                target: buf.decode_bits(9)? as u16,
            },
            3 | 4 => Self::Reserved {
                id,
                first: buf.decode_bits(10)? as u16,
                second: buf.decode_bits(22)?,
            },
            ids::EMOJI | ids::EMOJI_ALT => Self::Emoji {
                code: buf.decode_bits(10)? as u16,
            },
            ids::FLAG => Self::Flag(buf.decode_bool()?),
            ids::PLAYER_LEFT => Self::PlayerLeft,
            other => Self::Other(other),
        };
        Ok(event)
    }
}

/// Typed payload of a private event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivateEvent {
    Emoji { code: u16 },
    ClanRequest,
    TargetedAttack { target: u16 },
    Other(u8),
}

impl PrivateEvent {
    /// Reads the payload of private event `id` at the current read cursor.
    pub fn read(id: u8, buf: &mut Buffer) -> Result<Self, ProtocolError> {
        let event = match id {
            private_ids::EMOJI => Self::Emoji {
                code: buf.decode_bits(10)? as u16,
            },
            private_ids::CLAN_REQUEST => Self::ClanRequest,
            private_ids::TARGETED_ATTACK => Self::TargetedAttack {
                target: buf.decode_bits(9)? as u16,
            },
            other => Self::Other(other),
        };
        Ok(event)
    }
}

/// One public event located inside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHeader {
    pub id: u8,
    pub sender: u16,
    /// Bit offset of the payload, just past the header.
    pub payload_offset: usize,
    pub event: GameEvent,
}

/// Header of a private event; the payload starts at bit 13.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrivateHeader {
    pub id: u8,
    pub sender: u16,
}

fn read_header(buf: &mut Buffer) -> Result<(u8, u16), ProtocolError> {
    let id = buf.decode_bits(4)? as u8;
    let sender = buf.decode_bits(9)? as u16;
    Ok((id, sender))
}

/// Reads the frame as a stream of public events.
///
/// Returns the first overrun if the frame does not parse this way, which
/// means it is a private message.
pub fn try_decode_public_events(buf: &mut Buffer) -> Result<Vec<EventHeader>, ProtocolError> {
    buf.set_read_offset(PUBLIC_EVENTS_OFFSET);
    let mut events = Vec::new();
    while buf.read_offset() + MIN_EVENT_BITS <= buf.bit_len() {
        let (id, sender) = read_header(buf)?;
        let payload_offset = buf.read_offset();
        let event = GameEvent::read(id, buf)?;
        events.push(EventHeader {
            id,
            sender,
            payload_offset,
            event,
        });
    }
    Ok(events)
}

/// Reads the frame as one private event and leaves the cursor at its
/// payload.
pub fn decode_private_event(buf: &mut Buffer) -> Result<PrivateHeader, ProtocolError> {
    buf.set_read_offset(0);
    let (id, sender) = read_header(buf)?;
    Ok(PrivateHeader { id, sender })
}

/// How an in-game frame was interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameFrame {
    Public(Vec<EventHeader>),
    Private(PrivateHeader),
    /// Neither reading fits; the frame is dropped.
    Undecodable(ProtocolError),
}

/// Interprets an in-game frame: public events first, private as fallback.
pub fn classify_game_frame(buf: &mut Buffer) -> GameFrame {
    match try_decode_public_events(buf) {
        Ok(events) => GameFrame::Public(events),
        Err(_) => match decode_private_event(buf) {
            Ok(header) => GameFrame::Private(header),
            Err(e) => GameFrame::Undecodable(e),
        },
    }
}
