//! Helper bots that follow a friend around.
//!
//! Each bot joins the first open room, looks for the friend in the roster
//! and then mirrors them: bot `i` copies the friend's `i`-th base
//! placement, every friend attack is repeated, and private emoji commands
//! trigger aid, attacks, or clan requests.
//!
//! ```text
//! helper-bot <friend> [bots] [nickname]
//! ```
//!
//! `RUST_LOG` controls log output (default `info`). `TERRA_PROTOCOL_VERSION`
//! overrides the advertised protocol version.

use terra::{Client, ClientConfig, ClientHandle, Handler};
use terra_protocol::events::{EMOJI_MIRROR_ATTACK, EMOJI_REQUEST_AID};
use terra_protocol::{Buffer, GameEvent, LobbyUpdate, PlayerInfo, PrivateEvent};
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Bot
// ---------------------------------------------------------------------------

struct HelperBot {
    index: usize,
    nickname: String,
    friend: String,
    friend_id: Option<u16>,
    joined: bool,
    /// Friend base placements seen so far.
    bases_seen: usize,
    has_base: bool,
    /// Last target the friend pointed us at.
    target: Option<u16>,
}

impl HelperBot {
    fn new(index: usize, nickname: String, friend: String) -> Self {
        Self {
            index,
            nickname,
            friend,
            friend_id: None,
            joined: false,
            bases_seen: 0,
            has_base: false,
            target: None,
        }
    }

    fn is_friend(&self, sender: u16) -> bool {
        self.friend_id == Some(sender)
    }
}

impl Handler for HelperBot {
    fn on_connect(&mut self, _client: &ClientHandle) {
        tracing::info!(bot = %self.nickname, "connected");
    }

    fn on_lobby_update(&mut self, client: &ClientHandle, lobby: &LobbyUpdate) {
        if let Ok(json) = serde_json::to_string(lobby) {
            tracing::debug!(bot = %self.nickname, lobby = %json, "lobby update");
        }
        if self.joined {
            return;
        }
        if let Some(battle) = lobby.battles.first() {
            self.joined = true;
            client.join_room(battle.id);
            tracing::info!(bot = %self.nickname, room = battle.id, "joining room");
        }
    }

    fn on_game_scene(&mut self, _client: &ClientHandle, players: &[PlayerInfo], url: &str) {
        self.friend_id = players
            .iter()
            .find(|p| p.nickname == self.friend)
            .map(|p| p.id);
        match self.friend_id {
            Some(id) => tracing::info!(bot = %self.nickname, friend_id = id, url, "friend found"),
            None => tracing::warn!(bot = %self.nickname, friend = %self.friend, "friend not in game"),
        }
    }

    fn on_game_start(&mut self, _client: &ClientHandle) {
        tracing::info!(bot = %self.nickname, "battle started");
    }

    fn on_game_event(&mut self, client: &ClientHandle, buf: &mut Buffer, id: u8, sender: u16) {
        if !self.is_friend(sender) {
            return;
        }
        let event = match GameEvent::read(id, buf) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(error = %e, id, "unreadable friend event");
                return;
            }
        };

        match event {
            GameEvent::PlaceBase { position } => {
                if !self.has_base && self.bases_seen == self.index {
                    self.has_base = true;
                    client.set_base(position);
                    tracing::info!(bot = %self.nickname, position, "copying base");
                }
                self.bases_seen += 1;
            }
            GameEvent::Attack { percentage, target } => {
                tracing::info!(bot = %self.nickname, target, percentage, "copying attack");
                client.attack(percentage, target);
            }
            GameEvent::Emoji { code } => {
                tracing::debug!(bot = %self.nickname, code, "friend emoji");
            }
            _ => {}
        }
    }

    fn on_private_event(&mut self, client: &ClientHandle, buf: &mut Buffer, id: u8, sender: u16) {
        if !self.is_friend(sender) {
            return;
        }
        let Ok(event) = PrivateEvent::read(id, buf) else {
            return;
        };
        tracing::debug!(bot = %self.nickname, ?event, "private event");

        match event {
            PrivateEvent::Emoji {
                code: EMOJI_REQUEST_AID,
            } => {
                client.send_money(400, sender);
            }
            PrivateEvent::Emoji {
                code: EMOJI_MIRROR_ATTACK,
            } => {
                if let Some(target) = self.target {
                    client.attack(200, target);
                }
            }
            PrivateEvent::ClanRequest => {
                client.clan_request(sender);
            }
            PrivateEvent::TargetedAttack { target } => {
                self.target = Some(target);
                client.attack(100, target);
                tracing::info!(bot = %self.nickname, target, "attacking on request");
            }
            _ => {}
        }
    }

    fn on_disconnect(&mut self, _client: &ClientHandle, outdated_version: bool) {
        if outdated_version {
            tracing::warn!(bot = %self.nickname, "rejected by server, protocol version may be outdated");
        } else {
            tracing::warn!(bot = %self.nickname, "disconnected by server");
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let friend = args.next().ok_or("usage: helper-bot <friend> [bots] [nickname]")?;
    let bots: usize = match args.next() {
        Some(n) => n.parse()?,
        None => 3,
    };
    let nickname = args.next().unwrap_or_else(|| "helper".to_string());

    let mut base = ClientConfig::default();
    if let Ok(version) = std::env::var("TERRA_PROTOCOL_VERSION") {
        base.protocol_version = version.parse()?;
    }

    let mut clients = Vec::with_capacity(bots);
    for index in 0..bots {
        let name = format!("{nickname} ({index})");
        let config = ClientConfig {
            nickname: name.clone(),
            ..base.clone()
        };
        let bot = HelperBot::new(index, name, friend.clone());
        clients.push(Client::start(config, bot).await?);
    }
    tracing::info!(bots, friend = %friend, "bots started");

    for client in clients {
        client.closed().await;
    }
    Ok(())
}
