//! Outbound message catalog.
//!
//! Every message the client can send is a variant of [`Outbound`]. Encoding
//! writes the protocol selector bit, the tag, then the fields into a
//! [`Buffer`] sized from [`Outbound::bit_len`]:
//!
//! ```text
//! meta:    0 | tag:6 | fields...
//! in-game: 1 | tag:4 | fields...
//! ```

use rand::Rng;

use crate::buffer::{utf16_len, Buffer};
use crate::ProtocolError;

/// Selector bit for lobby/meta messages.
pub const META_SELECTOR: u32 = 0;
/// Selector bit for in-game messages.
pub const GAME_SELECTOR: u32 = 1;

/// Widest nickname the 5-bit length field can describe, in UTF-16 units.
pub const MAX_NICKNAME_UNITS: usize = 31;

/// Highest protocol version expressible in the 14-bit version field.
pub const MAX_PROTOCOL_VERSION: u16 = (1 << 14) - 1;

/// Random identifiers the server expects after the first challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountInfo {
    pub ids: [u16; 4],
    pub extra: u16,
    pub token: u32,
}

impl AccountInfo {
    /// Draws fresh identifiers in the ranges the official client uses.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            ids: [
                rng.random_range(0..=60000),
                rng.random_range(0..=60000),
                rng.random_range(0..=60000),
                rng.random_range(0..=60000),
            ],
            extra: rng.random_range(0..=2000),
            token: rng.random_range(100_000..=300_000),
        }
    }
}

/// A message the client sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// First frame on every connection: advertises the protocol version.
    Init { version: u16 },
    /// Answer to the server's challenge; `x` is echoed back verbatim.
    ChallengeResponse { x: u8, answer: u16 },
    AccountInfo(AccountInfo),
    /// Opens a fresh lobby session.
    SessionInfo {
        time: u16,
        nickname: String,
        colors: [u8; 3],
    },
    JoinRoom { room: u8 },
    /// Resumes into the game the lobby placed us in.
    ReadyForSession {
        server_flag: u8,
        challenge_x: u16,
        challenge_y: u16,
        time: u16,
        version: u16,
    },
    SetBase { position: u32 },
    Attack { percentage: u16, target: u16 },
    SendMoney { percentage: u16, target: u16 },
    ClanRequest { target: u16 },
    Ping,
    LobbyEvent { sub_id: u8 },
}

impl Outbound {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::ChallengeResponse { .. } => "challenge-response",
            Self::AccountInfo(_) => "account-info",
            Self::SessionInfo { .. } => "session-info",
            Self::JoinRoom { .. } => "join-room",
            Self::ReadyForSession { .. } => "ready-for-session",
            Self::SetBase { .. } => "set-base",
            Self::Attack { .. } => "attack",
            Self::SendMoney { .. } => "send-money",
            Self::ClanRequest { .. } => "clan-request",
            Self::Ping => "ping",
            Self::LobbyEvent { .. } => "lobby-event",
        }
    }

    /// Number of bits the frame is sized for.
    ///
    /// `Attack` carries 25 bits of content but is sent in 4 bytes, same as
    /// `SetBase`.
    pub fn bit_len(&self) -> usize {
        match self {
            Self::Init { .. } => 39,
            Self::ChallengeResponse { .. } => 26,
            Self::AccountInfo(_) => 115,
            Self::SessionInfo { nickname, .. } => 40 + 16 * utf16_len(nickname),
            Self::JoinRoom { .. } => 11,
            Self::ReadyForSession { .. } => 58,
            Self::SetBase { .. } => 27,
            Self::Attack { .. } => 27,
            Self::SendMoney { .. } => 24,
            Self::ClanRequest { .. } => 14,
            Self::Ping => 8,
            Self::LobbyEvent { .. } => 13,
        }
    }

    /// Encodes the message into a ready-to-send frame.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = Buffer::with_bits(self.bit_len());
        match self {
            Self::Init { version } => {
                meta_tag(&mut buf, 13)?;
                buf.write_bits(14, u32::from(*version))?;
                buf.write_bits(4, 0)?;
                buf.write_bits(7, 0)?;
                buf.write_bits(1, 0)?;
                buf.write_bits(1, 0)?;
                buf.write_bits(5, 12)?;
            }
            Self::ChallengeResponse { x, answer } => {
                meta_tag(&mut buf, 14)?;
                buf.write_bits(3, u32::from(*x))?;
                buf.write_bits(16, u32::from(*answer))?;
            }
            Self::AccountInfo(info) => {
                meta_tag(&mut buf, 17)?;
                for id in info.ids {
                    buf.write_bits(16, u32::from(id))?;
                }
                buf.write_bits(12, u32::from(info.extra))?;
                buf.write_bits(30, info.token)?;
            }
            Self::SessionInfo {
                time,
                nickname,
                colors,
            } => {
                let units = utf16_len(nickname);
                if units > MAX_NICKNAME_UNITS {
                    return Err(ProtocolError::MalformedFrame(format!(
                        "nickname is {units} UTF-16 units, max {MAX_NICKNAME_UNITS}"
                    )));
                }
                meta_tag(&mut buf, 1)?;
                buf.write_bits(10, u32::from(*time))?;
                buf.write_bits(5, units as u32)?;
                buf.write_str(nickname)?;
                for color in colors {
                    buf.write_bits(6, u32::from(*color))?;
                }
            }
            Self::JoinRoom { room } => {
                meta_tag(&mut buf, 2)?;
                buf.write_bits(4, u32::from(*room))?;
            }
            Self::ReadyForSession {
                server_flag,
                challenge_x,
                challenge_y,
                time,
                version,
            } => {
                meta_tag(&mut buf, 5)?;
                buf.write_bits(8, u32::from(*server_flag))?;
                buf.write_bits(10, u32::from(*challenge_x))?;
                buf.write_bits(9, u32::from(*challenge_y))?;
                buf.write_bits(10, u32::from(*time))?;
                buf.write_bits(14, u32::from(*version))?;
            }
            Self::SetBase { position } => {
                game_tag(&mut buf, 0)?;
                buf.write_bits(22, *position)?;
            }
            Self::Attack { percentage, target } => {
                game_tag(&mut buf, 1)?;
                buf.write_bits(10, u32::from(*percentage))?;
                buf.write_bits(10, u32::from(*target))?;
            }
            Self::SendMoney { percentage, target } => {
                game_tag(&mut buf, 2)?;
                buf.write_bits(10, u32::from(*percentage))?;
                buf.write_bits(9, u32::from(*target))?;
            }
            Self::ClanRequest { target } => {
                game_tag(&mut buf, 14)?;
                buf.write_bits(9, u32::from(*target))?;
            }
            Self::Ping => {
                meta_tag(&mut buf, 4)?;
                buf.write_bits(1, 0)?;
            }
            Self::LobbyEvent { sub_id } => {
                meta_tag(&mut buf, 15)?;
                buf.write_bits(6, u32::from(*sub_id))?;
            }
        }
        Ok(buf.into_bytes())
    }
}

fn meta_tag(buf: &mut Buffer, tag: u32) -> Result<(), ProtocolError> {
    buf.write_bits(1, META_SELECTOR)?;
    buf.write_bits(6, tag)
}

fn game_tag(buf: &mut Buffer, tag: u32) -> Result<(), ProtocolError> {
    buf.write_bits(1, GAME_SELECTOR)?;
    buf.write_bits(4, tag)
}
