//! Connection state machine.
//!
//! A [`Session`] holds everything the client knows about its current
//! connection and turns each inbound frame into callbacks plus a list of
//! [`Action`]s for the driver to carry out. It never touches the network
//! itself, so every transition can be exercised with plain byte slices.
//!
//! ```text
//! Disconnected → AwaitingChallenge → Lobby → JoiningRoom
//!                                              ↓
//!                      InGame ← InGameHandshake
//! ```
//!
//! - `AwaitingChallenge`: `Init` sent, waiting for meta id 9.
//! - `Lobby`: first lobby state (meta id 2) received.
//! - `JoiningRoom`: scene transition (meta id 3/4) received; the driver is
//!   switching to the game server.
//! - `InGameHandshake`: `Init` sent to the game server.
//! - `InGame`: challenge answered with `ReadyForSession`.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use rand::Rng;
use terra_protocol::events::ids as game_ids;
use terra_protocol::{
    classify_game_frame, AccountInfo, Buffer, Challenge, GameFrame, LobbyUpdate, MetaMessage,
    Outbound, PlayerInfo, ProtocolError, SceneTransition,
};

use crate::{ClientConfig, ClientHandle, Handler};

/// Where the connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Disconnected,
    AwaitingChallenge,
    Lobby,
    JoiningRoom,
    InGameHandshake,
    InGame,
}

/// Side effects requested by the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Queue a frame on the current connection.
    Send(Outbound),
    /// Start the periodic keep-alive (no-op if already running).
    StartKeepAlive,
    /// Close the current connection, open `url`, and send `Init`.
    Reconnect { url: String },
}

/// Mutable per-connection fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionState {
    pub phase: Phase,
    pub local_player_id: Option<u16>,
    pub challenge_x: u16,
    pub challenge_y: u16,
    /// Milliseconds modulo 1024 at startup, jittered; sent as a 10-bit field.
    pub current_time: u16,
    /// Set once the server sends its first lobby state.
    pub connection_accepted: bool,
    /// Set once the first challenge on the current connection is answered.
    pub inited: bool,
    pub in_game: bool,
    pub battle_started: bool,
    pub url: String,
    pub players: Vec<PlayerInfo>,
}

impl ConnectionState {
    /// Fresh state for a client about to dial `url`.
    pub fn new(url: impl Into<String>, current_time: u16) -> Self {
        Self {
            phase: Phase::Disconnected,
            local_player_id: None,
            challenge_x: 0,
            challenge_y: 0,
            current_time,
            connection_accepted: false,
            inited: false,
            in_game: false,
            battle_started: false,
            url: url.into(),
            players: Vec::new(),
        }
    }
}

/// Wall-clock milliseconds modulo 1024, shifted by up to ±20 and wrapped
/// back into 10 bits.
pub fn jittered_clock<R: Rng + ?Sized>(rng: &mut R) -> u16 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let jitter: i64 = rng.random_range(-20..=20);
    ((millis % 1024) as i64 + jitter).rem_euclid(1024) as u16
}

/// The state machine for one client.
#[derive(Debug)]
pub struct Session {
    config: ClientConfig,
    state: ConnectionState,
}

impl Session {
    /// Creates a session for `config`, starting at the lobby URL.
    pub fn new(config: ClientConfig) -> Self {
        let clock = jittered_clock(&mut rand::rng());
        Self::with_clock(config, clock)
    }

    /// Creates a session with a fixed clock value.
    pub fn with_clock(config: ClientConfig, current_time: u16) -> Self {
        let state = ConnectionState::new(config.lobby_url.clone(), current_time);
        Self { config, state }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// The `Init` frame for the configured protocol version.
    pub fn init_message(&self) -> Outbound {
        Outbound::Init {
            version: self.config.protocol_version,
        }
    }

    /// Records that the lobby connection is open and `Init` was sent.
    pub fn connected(&mut self) {
        self.state.phase = Phase::AwaitingChallenge;
    }

    /// Records that the game server connection is open and `Init` was sent.
    pub fn reconnected(&mut self) {
        self.state.phase = Phase::InGameHandshake;
    }

    /// Records that the connection is gone.
    pub fn disconnected(&mut self) {
        self.state.phase = Phase::Disconnected;
    }

    /// Whether a disconnect now should be reported as a stale version.
    pub fn outdated_version(&self) -> bool {
        !self.state.connection_accepted
    }

    /// Processes one inbound frame.
    ///
    /// Errors are fatal for the connection: an empty frame, or a meta frame
    /// that does not decode. In-game frames never fail; undecodable ones
    /// are dropped.
    pub fn handle_frame<H: Handler>(
        &mut self,
        frame: &[u8],
        handler: &mut H,
        client: &ClientHandle,
    ) -> Result<Vec<Action>, ProtocolError> {
        if frame.is_empty() {
            return Err(ProtocolError::MalformedFrame("empty frame".into()));
        }

        let mut buf = Buffer::from_bytes(frame);
        if buf.decode_bits(1)? == 0 {
            let msg = MetaMessage::decode(&mut buf)
                .map_err(|e| ProtocolError::MalformedFrame(format!("meta frame: {e}")))?;
            self.handle_meta(msg, handler, client)
        } else {
            self.handle_game_frame(buf, handler, client);
            Ok(Vec::new())
        }
    }

    fn handle_meta<H: Handler>(
        &mut self,
        msg: MetaMessage,
        handler: &mut H,
        client: &ClientHandle,
    ) -> Result<Vec<Action>, ProtocolError> {
        let mut actions = Vec::new();
        match msg {
            MetaMessage::Challenge(challenge) => {
                self.handle_challenge(challenge, &mut actions)?;
            }
            MetaMessage::LobbySubEvent { sub_id } => {
                tracing::trace!(sub_id, "lobby sub-event");
                if sub_id == 0 {
                    actions.push(Action::Send(Outbound::LobbyEvent { sub_id: 1 }));
                }
            }
            MetaMessage::LobbyState(lobby) => {
                self.handle_lobby(&lobby, handler, client);
            }
            MetaMessage::SceneTransition(scene) => {
                self.handle_scene(scene, handler, client, &mut actions);
            }
            MetaMessage::Unknown(id) => {
                tracing::trace!(id, "ignoring meta message");
            }
        }
        Ok(actions)
    }

    fn handle_challenge(
        &mut self,
        challenge: Challenge,
        actions: &mut Vec<Action>,
    ) -> Result<(), ProtocolError> {
        let started = Instant::now();
        let answer = self
            .config
            .challenge_variant
            .solve(challenge.low, challenge.high)?;
        let elapsed = started.elapsed();
        if elapsed > self.config.challenge_budget {
            tracing::warn!(
                ?elapsed,
                budget = ?self.config.challenge_budget,
                "challenge took longer than budget"
            );
        } else {
            tracing::debug!(?elapsed, answer, "challenge solved");
        }

        actions.push(Action::Send(Outbound::ChallengeResponse {
            x: challenge.x,
            answer,
        }));

        if self.state.inited {
            return Ok(());
        }

        actions.push(Action::Send(Outbound::AccountInfo(AccountInfo::random(
            &mut rand::rng(),
        ))));
        if self.state.in_game {
            actions.push(Action::Send(Outbound::ReadyForSession {
                server_flag: u8::from(self.state.url != self.config.lobby_url),
                challenge_x: self.state.challenge_x,
                challenge_y: self.state.challenge_y,
                time: self.state.current_time,
                version: self.config.protocol_version,
            }));
            actions.push(Action::StartKeepAlive);
            self.state.phase = Phase::InGame;
        } else {
            actions.push(Action::Send(Outbound::SessionInfo {
                time: self.state.current_time,
                nickname: self.config.nickname.clone(),
                colors: self.config.colors,
            }));
        }
        self.state.inited = true;
        Ok(())
    }

    fn handle_lobby<H: Handler>(
        &mut self,
        lobby: &LobbyUpdate,
        handler: &mut H,
        client: &ClientHandle,
    ) {
        if !self.state.connection_accepted {
            self.state.connection_accepted = true;
            tracing::info!(url = %self.state.url, "connection accepted");
            handler.on_connect(client);
        }
        if self.state.phase == Phase::AwaitingChallenge {
            self.state.phase = Phase::Lobby;
        }
        tracing::debug!(battles = lobby.battles.len(), "lobby update");
        handler.on_lobby_update(client, lobby);
    }

    fn handle_scene<H: Handler>(
        &mut self,
        scene: SceneTransition,
        handler: &mut H,
        client: &ClientHandle,
        actions: &mut Vec<Action>,
    ) {
        self.state.challenge_x = scene.challenge_x;
        self.state.challenge_y = scene.challenge_y;
        if let Some(roster) = scene.roster {
            self.state.local_player_id = Some(roster.local_player_id);
            self.state.players = roster.players;
        }

        let url = self.config.game_url(scene.room_index);
        self.state.url = url.clone();
        tracing::info!(
            url = %url,
            players = self.state.players.len(),
            "moving to game server"
        );
        handler.on_game_scene(client, &self.state.players, &url);

        self.state.inited = false;
        self.state.in_game = true;
        self.state.phase = Phase::JoiningRoom;
        actions.push(Action::Reconnect { url });
    }

    fn handle_game_frame<H: Handler>(
        &mut self,
        mut buf: Buffer,
        handler: &mut H,
        client: &ClientHandle,
    ) {
        match classify_game_frame(&mut buf) {
            GameFrame::Public(events) => {
                for header in events {
                    buf.set_read_offset(header.payload_offset);
                    handler.on_game_event(client, &mut buf, header.id, header.sender);
                    buf.set_read_offset(header.payload_offset);

                    if header.id == game_ids::ATTACK && !self.state.battle_started {
                        self.state.battle_started = true;
                        tracing::info!("battle started");
                        handler.on_game_start(client);
                    }
                }
            }
            GameFrame::Private(header) => {
                tracing::trace!(id = header.id, sender = header.sender, "private event");
                handler.on_private_event(client, &mut buf, header.id, header.sender);
            }
            GameFrame::Undecodable(e) => {
                tracing::debug!(
                    error = %e,
                    len = buf.len(),
                    "dropping in-game frame that fits neither reading"
                );
            }
        }
    }
}
