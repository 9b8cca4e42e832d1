//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use terra_protocol::{utf16_len, ChallengeVariant, MAX_NICKNAME_UNITS, MAX_PROTOCOL_VERSION};

use crate::ClientError;

/// Public lobby endpoint.
pub const DEFAULT_LOBBY_URL: &str = "wss://territorial.io/i31/";

/// Game server endpoint; `{index}` is replaced by the room index.
pub const DEFAULT_GAME_URL_TEMPLATE: &str = "wss://territorial.io/i3{index}/";

/// Protocol version the client advertises by default.
pub const DEFAULT_PROTOCOL_VERSION: u16 = 1050;

/// Configuration for one client instance.
///
/// Build one with [`ClientConfig::builder`] (validated) or construct it
/// directly and call [`ClientConfig::validate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Name shown to other players. At most 31 UTF-16 units.
    pub nickname: String,

    /// Version sent in `Init` and `ReadyForSession` (14 bits).
    pub protocol_version: u16,

    /// Which challenge puzzle the server for `protocol_version` expects.
    pub challenge_variant: ChallengeVariant,

    /// URL dialled on start.
    pub lobby_url: String,

    /// Template for game server URLs, with an `{index}` placeholder.
    pub game_url_template: String,

    /// Player colour, three 6-bit components.
    pub colors: [u8; 3],

    /// Interval between keep-alive pings once in a game.
    pub keepalive_interval: Duration,

    /// Solving a challenge slower than this logs a warning. The server's
    /// real deadline is not published.
    pub challenge_budget: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            nickname: String::new(),
            protocol_version: DEFAULT_PROTOCOL_VERSION,
            challenge_variant: ChallengeVariant::Current,
            lobby_url: DEFAULT_LOBBY_URL.to_string(),
            game_url_template: DEFAULT_GAME_URL_TEMPLATE.to_string(),
            colors: [0; 3],
            keepalive_interval: Duration::from_secs(15),
            challenge_budget: Duration::from_secs(2),
        }
    }
}

impl ClientConfig {
    /// Creates a builder with default settings.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// URL of the game server for `room_index`.
    pub fn game_url(&self, room_index: u16) -> String {
        self.game_url_template
            .replace("{index}", &room_index.to_string())
    }

    /// Checks that every field fits its wire representation.
    pub fn validate(&self) -> Result<(), ClientError> {
        let units = utf16_len(&self.nickname);
        if units > MAX_NICKNAME_UNITS {
            return Err(ClientError::InvalidConfig(format!(
                "nickname is {units} UTF-16 units, max {MAX_NICKNAME_UNITS}"
            )));
        }
        if self.protocol_version > MAX_PROTOCOL_VERSION {
            return Err(ClientError::InvalidConfig(format!(
                "protocol version {} exceeds {MAX_PROTOCOL_VERSION}",
                self.protocol_version
            )));
        }
        if let Some(c) = self.colors.iter().find(|&&c| c >= 64) {
            return Err(ClientError::InvalidConfig(format!(
                "colour component {c} does not fit in 6 bits"
            )));
        }
        if !self.game_url_template.contains("{index}") {
            return Err(ClientError::InvalidConfig(
                "game_url_template has no {index} placeholder".into(),
            ));
        }
        if self.keepalive_interval.is_zero() {
            return Err(ClientError::InvalidConfig(
                "keepalive_interval must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn nickname(mut self, nickname: impl Into<String>) -> Self {
        self.config.nickname = nickname.into();
        self
    }

    pub fn protocol_version(mut self, version: u16) -> Self {
        self.config.protocol_version = version;
        self
    }

    pub fn challenge_variant(mut self, variant: ChallengeVariant) -> Self {
        self.config.challenge_variant = variant;
        self
    }

    pub fn lobby_url(mut self, url: impl Into<String>) -> Self {
        self.config.lobby_url = url.into();
        self
    }

    pub fn game_url_template(mut self, template: impl Into<String>) -> Self {
        self.config.game_url_template = template.into();
        self
    }

    pub fn colors(mut self, colors: [u8; 3]) -> Self {
        self.config.colors = colors;
        self
    }

    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.config.keepalive_interval = interval;
        self
    }

    pub fn challenge_budget(mut self, budget: Duration) -> Self {
        self.config.challenge_budget = budget;
        self
    }

    /// Validates and returns the config.
    pub fn build(self) -> Result<ClientConfig, ClientError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.protocol_version, 1050);
        assert_eq!(config.challenge_variant, ChallengeVariant::Current);
        assert_eq!(config.keepalive_interval, Duration::from_secs(15));
        assert_eq!(config.lobby_url, "wss://territorial.io/i31/");
    }

    #[test]
    fn test_game_url_from_room_index() {
        let config = ClientConfig::default();
        assert_eq!(config.game_url(1), "wss://territorial.io/i31/");
        assert_eq!(config.game_url(4), "wss://territorial.io/i34/");
    }

    #[test]
    fn test_builder_sets_fields() {
        let config = ClientConfig::builder()
            .nickname("bot (0)")
            .protocol_version(1000)
            .challenge_variant(ChallengeVariant::Legacy)
            .colors([1, 2, 3])
            .build()
            .unwrap();
        assert_eq!(config.nickname, "bot (0)");
        assert_eq!(config.protocol_version, 1000);
        assert_eq!(config.challenge_variant, ChallengeVariant::Legacy);
        assert_eq!(config.colors, [1, 2, 3]);
    }

    #[test]
    fn test_rejects_long_nickname() {
        let err = ClientConfig::builder().nickname("n".repeat(32)).build();
        assert!(matches!(err, Err(ClientError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_wide_fields() {
        assert!(ClientConfig::builder().protocol_version(1 << 14).build().is_err());
        assert!(ClientConfig::builder().colors([0, 64, 0]).build().is_err());
        assert!(ClientConfig::builder().game_url_template("wss://x/").build().is_err());
        assert!(
            ClientConfig::builder()
                .keepalive_interval(Duration::ZERO)
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_config_serializes() {
        let config = ClientConfig::builder().nickname("a").build().unwrap();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["nickname"], "a");
        assert_eq!(json["challenge_variant"], "Current");
    }
}
