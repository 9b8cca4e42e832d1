//! Wire protocol for Terra.
//!
//! This crate knows how the game's bytes are laid out and nothing about
//! connections:
//!
//! - **Bit codec** ([`Buffer`]) — MSB-first bit cursors over a byte buffer.
//! - **Challenge** ([`ChallengeVariant`], [`solve_current`], [`solve_legacy`])
//!   — the anti-automation puzzle answered during the handshake.
//! - **Outbound** ([`Outbound`]) — every message the client sends.
//! - **Meta** ([`MetaMessage`]) — inbound handshake, lobby, and scene frames.
//! - **Events** ([`classify_game_frame`], [`GameEvent`], [`PrivateEvent`]) —
//!   inbound in-game frames.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Transport (bytes) → Protocol (Buffer, MetaMessage, GameFrame) → Client
//! ```

mod buffer;
pub mod challenge;
mod error;
pub mod events;
pub mod messages;
pub mod meta;

pub use buffer::{bits_to_bytes, utf16_len, Buffer, MAX_FIELD_BITS, PLACEHOLDER};
pub use challenge::{solve_current, solve_legacy, ChallengeVariant};
pub use error::ProtocolError;
pub use events::{
    classify_game_frame, decode_private_event, try_decode_public_events, EventHeader,
    GameEvent, GameFrame, PrivateEvent, PrivateHeader,
};
pub use messages::{AccountInfo, Outbound, MAX_NICKNAME_UNITS, MAX_PROTOCOL_VERSION};
pub use meta::{
    Battle, Challenge, Clan, GameSetup, LobbyUpdate, MetaMessage, PlayerInfo, Roster,
    SceneTransition,
};
