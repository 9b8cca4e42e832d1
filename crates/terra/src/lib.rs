//! # Terra
//!
//! Client engine for the territory-conquest game's binary WebSocket
//! protocol.
//!
//! Terra connects to the lobby, answers the server's challenge, follows the
//! lobby into a game server and decodes everything that happens there. What
//! to do about it is up to the [`Handler`] you pass in; replies go through a
//! [`ClientHandle`].
//!
//! # Key types
//!
//! - [`Client`] — starts and owns the background tasks
//! - [`ClientHandle`] — cloneable sender for outbound messages
//! - [`Handler`] — callbacks for lobby, scene, and in-game events
//! - [`ClientConfig`] — nickname, protocol version, URLs, timings
//! - [`Session`] — the connection state machine, usable without a network
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use terra::{Client, ClientConfig, ClientHandle, Handler};
//! use terra_protocol::LobbyUpdate;
//!
//! struct Watcher;
//!
//! impl Handler for Watcher {
//!     fn on_lobby_update(&mut self, _client: &ClientHandle, lobby: &LobbyUpdate) {
//!         println!("{} battles open", lobby.battles.len());
//!     }
//! }
//!
//! # async fn run() -> Result<(), terra::ClientError> {
//! let config = ClientConfig::builder().nickname("watcher").build()?;
//! let client = Client::start(config, Watcher).await?;
//! client.closed().await;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod driver;
mod error;
mod handler;
pub mod session;

pub use client::{Client, ClientHandle};
pub use config::{
    ClientConfig, ClientConfigBuilder, DEFAULT_GAME_URL_TEMPLATE, DEFAULT_LOBBY_URL,
    DEFAULT_PROTOCOL_VERSION,
};
pub use error::ClientError;
pub use handler::Handler;
pub use session::{Action, ConnectionState, Phase, Session};
