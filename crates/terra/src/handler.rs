//! Callback interface for consumers of decoded protocol events.
//!
//! Terra does not decide what to do with the game; it only decodes frames
//! and tells a [`Handler`] about them. Implement the methods you care about,
//! the rest default to no-ops.
//!
//! # Contract
//!
//! Every method runs synchronously on the receive-loop task, so a handler
//! that blocks stalls all further decoding for that client. Replies go
//! through the [`ClientHandle`], which only queues frames and never waits.
//!
//! With [`ChallengeVariant::Legacy`](terra_protocol::ChallengeVariant) the
//! challenge solve is slow enough to matter. On a multi-threaded runtime the
//! receive loop then handles frames under
//! [`tokio::task::block_in_place`], so other tasks keep running; on a
//! current-thread runtime the solve still stalls the runtime until it
//! finishes.
//!
//! The `buf` handed to [`Handler::on_game_event`] and
//! [`Handler::on_private_event`] is the live frame buffer positioned just
//! after the event header. Handlers may read the payload with
//! [`Buffer::decode_bits`] and move the cursor with
//! [`Buffer::set_read_offset`]; the dispatcher puts it back at the payload
//! start before moving on.

use terra_protocol::{Buffer, LobbyUpdate, PlayerInfo};

use crate::ClientHandle;

/// Receives decoded events for one client.
///
/// # Example
///
/// ```rust
/// use terra::{ClientHandle, Handler};
/// use terra_protocol::LobbyUpdate;
///
/// /// Joins the first room the lobby lists.
/// struct FirstRoom {
///     joined: bool,
/// }
///
/// impl Handler for FirstRoom {
///     fn on_lobby_update(&mut self, client: &ClientHandle, lobby: &LobbyUpdate) {
///         if let (false, Some(battle)) = (self.joined, lobby.battles.first()) {
///             client.join_room(battle.id);
///             self.joined = true;
///         }
///     }
/// }
/// ```
pub trait Handler: Send + 'static {
    /// The lobby listing changed.
    fn on_lobby_update(&mut self, _client: &ClientHandle, _lobby: &LobbyUpdate) {}

    /// The server accepted the connection (first lobby state received).
    fn on_connect(&mut self, _client: &ClientHandle) {}

    /// The client was placed in a game; `url` is the game server it is
    /// moving to.
    fn on_game_scene(&mut self, _client: &ClientHandle, _players: &[PlayerInfo], _url: &str) {}

    /// The first attack of the game was seen.
    fn on_game_start(&mut self, _client: &ClientHandle) {}

    /// A public in-game event, with `buf` positioned at its payload.
    fn on_game_event(&mut self, _client: &ClientHandle, _buf: &mut Buffer, _id: u8, _sender: u16) {}

    /// A private message addressed to this client, with `buf` positioned
    /// at its payload.
    fn on_private_event(
        &mut self,
        _client: &ClientHandle,
        _buf: &mut Buffer,
        _id: u8,
        _sender: u16,
    ) {
    }

    /// The connection ended for a reason other than
    /// [`ClientHandle::disconnect`].
    ///
    /// `outdated_version` is `true` when the server never accepted the
    /// connection, which usually means the protocol version is stale.
    fn on_disconnect(&mut self, _client: &ClientHandle, _outdated_version: bool) {}
}
