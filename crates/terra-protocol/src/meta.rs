//! Inbound lobby/meta messages (selector bit `0`).
//!
//! The meta protocol carries the handshake and everything that happens
//! before the client is inside a running game: challenges, the lobby room
//! listing, and the scene transition that hands the client over to a game
//! server.

use serde::{Deserialize, Serialize};

use crate::{Buffer, ProtocolError};

/// Meta message ids the client reacts to.
pub mod ids {
    pub const LOBBY_STATE: u32 = 2;
    pub const SCENE_WITH_ROSTER: u32 = 3;
    pub const SCENE: u32 = 4;
    pub const CHALLENGE: u32 = 9;
    pub const LOBBY_SUB_EVENT: u32 = 11;
}

/// Server challenge seeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Challenge {
    /// Echoed back in the response.
    pub x: u8,
    pub low: u32,
    pub high: u32,
}

/// One clan with players online in a battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clan {
    pub online: u16,
    pub name: String,
}

/// A joinable room ("battle") in the lobby listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Battle {
    pub id: u8,
    pub game_mode: u8,
    pub crown: bool,
    pub map_id: u8,
    pub seed: u16,
    pub players: u64,
    pub max_players: u16,
    pub time: u16,
    pub clans: Vec<Clan>,
}

/// Decoded lobby state: the online-player table and the room listing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LobbyUpdate {
    pub online: [u64; 4],
    pub battles: Vec<Battle>,
}

/// One participant of a game, in join order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: u16,
    pub nickname: String,
    pub flag: u8,
    pub colors: [u8; 3],
}

/// Room parameters carried alongside a roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSetup {
    /// 14 bits with no known meaning.
    pub reserved: u16,
    pub game_mode: u8,
    pub crown: bool,
    pub map_id: u8,
    pub seed: u16,
}

/// Roster attached to a scene transition with id `3`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    pub local_player_id: u16,
    pub setup: GameSetup,
    pub players: Vec<PlayerInfo>,
}

/// Instruction to move to a game server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneTransition {
    pub room_index: u16,
    pub challenge_x: u16,
    pub challenge_y: u16,
    pub roster: Option<Roster>,
}

/// A decoded meta frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaMessage {
    Challenge(Challenge),
    LobbySubEvent { sub_id: u8 },
    LobbyState(LobbyUpdate),
    SceneTransition(SceneTransition),
    /// An id this client has no handling for.
    Unknown(u32),
}

impl MetaMessage {
    /// Decodes a meta frame. `buf` must be positioned just after the
    /// selector bit.
    pub fn decode(buf: &mut Buffer) -> Result<Self, ProtocolError> {
        let id = buf.decode_bits(6)?;
        let msg = match id {
            ids::CHALLENGE => Self::Challenge(Challenge {
                x: buf.decode_bits(3)? as u8,
                low: buf.decode_bits(16)?,
                high: buf.decode_bits(20)?,
            }),
            ids::LOBBY_SUB_EVENT => Self::LobbySubEvent {
                sub_id: buf.decode_bits(6)? as u8,
            },
            ids::LOBBY_STATE => Self::LobbyState(decode_lobby(buf)?),
            ids::SCENE_WITH_ROSTER | ids::SCENE => {
                Self::SceneTransition(decode_scene(buf, id == ids::SCENE_WITH_ROSTER)?)
            }
            other => Self::Unknown(other),
        };
        Ok(msg)
    }
}

fn decode_lobby(buf: &mut Buffer) -> Result<LobbyUpdate, ProtocolError> {
    // Width of every "players online" field in this frame, up to 63 bits.
    let width = buf.decode_bits(6)?;
    let mut online = [0u64; 4];
    for slot in &mut online {
        *slot = buf.decode_wide(width)?;
    }

    let count = buf.decode_bits(4)?;
    let mut battles = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let mut battle = Battle {
            id: buf.decode_bits(5)? as u8,
            game_mode: buf.decode_bits(4)? as u8,
            crown: buf.decode_bool()?,
            map_id: buf.decode_bits(6)? as u8,
            seed: buf.decode_bits(14)? as u16,
            players: buf.decode_wide(width)?,
            max_players: buf.decode_bits(9)? as u16 + 1,
            time: buf.decode_bits(10)? as u16,
            clans: Vec::new(),
        };
        let clans = buf.decode_bits(3)?;
        for _ in 0..clans {
            let online = buf.decode_bits(9)? as u16 + 1;
            let len = buf.decode_bits(3)? as usize;
            battle.clans.push(Clan {
                online,
                name: buf.read_str(len),
            });
        }
        battles.push(battle);
    }

    Ok(LobbyUpdate { online, battles })
}

fn decode_scene(buf: &mut Buffer, with_roster: bool) -> Result<SceneTransition, ProtocolError> {
    let room_index = buf.decode_bits(10)? as u16;
    let challenge_x = buf.decode_bits(10)? as u16;
    let roster_start = buf.read_offset();
    let challenge_y = if with_roster {
        buf.decode_bits(9)? as u16
    } else {
        buf.decode_bits(1)? as u16
    };

    let roster = if with_roster {
        // The roster re-reads the 9 bits after challenge_x as the local
        // player id.
        buf.set_read_offset(roster_start);
        Some(decode_roster(buf)?)
    } else {
        None
    };

    Ok(SceneTransition {
        room_index,
        challenge_x,
        challenge_y,
        roster,
    })
}

fn decode_roster(buf: &mut Buffer) -> Result<Roster, ProtocolError> {
    let local_player_id = buf.decode_bits(9)? as u16;
    let setup = GameSetup {
        reserved: buf.decode_bits(14)? as u16,
        game_mode: buf.decode_bits(4)? as u8,
        crown: buf.decode_bool()?,
        map_id: buf.decode_bits(6)? as u8,
        seed: buf.decode_bits(14)? as u16,
    };

    let count = buf.decode_bits(9)? + 1;
    let mut players = Vec::with_capacity(count as usize);
    for id in 0..count {
        let flag = buf.decode_bits(1)? as u8;
        let colors = [
            buf.decode_bits(6)? as u8,
            buf.decode_bits(6)? as u8,
            buf.decode_bits(6)? as u8,
        ];
        let len = buf.decode_bits(5)? as usize;
        players.push(PlayerInfo {
            id: id as u16,
            nickname: buf.read_str(len),
            flag,
            colors,
        });
    }

    Ok(Roster {
        local_player_id,
        setup,
        players,
    })
}
