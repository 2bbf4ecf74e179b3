//! Server configuration
//!
//! Defaults follow the protocol constants in `shared`: offers go to the
//! limited broadcast address on the well-known discovery port once per
//! second, the join window closes ten seconds after the last join, and each
//! question stays open for ten seconds.

use crate::error::ServerError;
use shared::{
    validate_server_name, ANSWER_WINDOW, BROADCAST_INTERVAL, DISCOVERY_PORT, JOIN_GRACE,
    MINIMUM_PLAYERS,
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SERVER_NAME: &str = "LAN Trivia";
pub const DEFAULT_TOPIC: &str = "networking";
pub const DEFAULT_ROUNDS_PER_GAME: u32 = 10;

/// Runtime settings for [`crate::network::Server`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Advertised in every offer; at most 32 bytes.
    pub name: String,
    /// Question set loaded from the question source at the start of each game.
    pub topic: String,
    /// Directory holding `<topic>.csv` files.
    pub questions_dir: PathBuf,
    /// Address the session listener binds to. The port is always ephemeral.
    pub bind_ip: IpAddr,
    /// Where offers are sent.
    pub discovery_target: SocketAddr,
    pub broadcast_interval: Duration,
    /// Quiet period after the last join before the game starts.
    pub join_grace: Duration,
    pub answer_window: Duration,
    pub min_players: usize,
    pub rounds_per_game: u32,
    /// How long a reset waits for connection tasks to flush before aborting them.
    pub drain_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_SERVER_NAME.to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            questions_dir: PathBuf::from("questions"),
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            discovery_target: SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), DISCOVERY_PORT),
            broadcast_interval: BROADCAST_INTERVAL,
            join_grace: JOIN_GRACE,
            answer_window: ANSWER_WINDOW,
            min_players: MINIMUM_PLAYERS,
            rounds_per_game: DEFAULT_ROUNDS_PER_GAME,
            drain_timeout: Duration::from_secs(1),
        }
    }
}

impl ServerConfig {
    /// Checks everything that can be checked before touching the network.
    pub fn validate(&self) -> Result<(), ServerError> {
        validate_server_name(&self.name)?;

        if self.min_players == 0 {
            return Err(ServerError::InvalidConfig(
                "at least one player must be required to start a game".to_string(),
            ));
        }
        if self.broadcast_interval.is_zero() {
            return Err(ServerError::InvalidConfig(
                "broadcast interval must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::ProtocolError;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.min_players, 2);
        assert_eq!(config.discovery_target.port(), 13117);
    }

    #[test]
    fn test_long_name_rejected() {
        let config = ServerConfig {
            name: "a".repeat(33),
            ..ServerConfig::default()
        };

        match config.validate() {
            Err(ServerError::Protocol(ProtocolError::NameTooLong(33))) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_zero_min_players_rejected() {
        let config = ServerConfig {
            min_players: 0,
            ..ServerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ServerError::InvalidConfig(_))
        ));
    }
}
