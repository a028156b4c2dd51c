//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::game::combat::PowerStats;
use crate::game::{Arena, EngineConfig, MovementModel, BLOCK_SIZE};
use crate::sync::{CreationPolicy, RoomTopics};
use crate::util::time::frame_period;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS, comma-separated; any origin when unset
    pub client_origin: Option<String>,

    /// Movement topic; presence lives on `online-users-<room>`
    pub room: String,
    pub arena_width: i32,
    pub arena_height: i32,
    pub movement_model: MovementModel,
    pub movement_delay_ms: u64,
    pub power_period_ms: u64,
    pub power_range_cells: i32,
    /// Player cursor range in cells
    pub cursor_range_cells: i32,
    /// Create remote entries from movement of peers not yet seen in presence
    pub create_on_move: bool,

    /// Driver ticks per second
    pub frame_rate: u32,
    /// Outbound broadcasts per second per client
    pub broadcast_rate: u32,
    /// Bot-driven sessions run by the binary
    pub bots: usize,
    pub probe_interval_secs: u64,
    /// Fraction of hub deliveries dropped, for exercising packet loss
    pub loss_rate: f64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = match lookup("PORT") {
            Some(port) => format!("0.0.0.0:{}", port.trim()),
            None => lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
        };

        let config = Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            client_origin: lookup("CLIENT_ORIGIN").filter(|s| !s.trim().is_empty()),

            room: lookup("ROOM").unwrap_or_else(|| "room-6".to_string()),
            arena_width: parse_var(&lookup, "ARENA_WIDTH", 1280)?,
            arena_height: parse_var(&lookup, "ARENA_HEIGHT", 720)?,
            movement_model: parse_var(&lookup, "MOVEMENT_MODEL", MovementModel::Grid)?,
            movement_delay_ms: parse_var(&lookup, "MOVEMENT_DELAY_MS", 150)?,
            power_period_ms: parse_var(&lookup, "POWER_PERIOD_MS", 60)?,
            power_range_cells: parse_var(&lookup, "POWER_RANGE_CELLS", 8)?,
            cursor_range_cells: parse_var(&lookup, "CURSOR_RANGE_CELLS", 4)?,
            create_on_move: parse_var(&lookup, "CREATE_ON_MOVE", false)?,

            frame_rate: parse_var(&lookup, "FRAME_RATE", 30)?,
            broadcast_rate: parse_var(&lookup, "BROADCAST_RATE", 10)?,
            bots: parse_var(&lookup, "BOTS", 2)?,
            probe_interval_secs: parse_var(&lookup, "PROBE_INTERVAL_SECS", 5)?,
            loss_rate: parse_var(&lookup, "LOSS_RATE", 0.0)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.room.trim().is_empty() {
            return Err(ConfigError::Invalid("ROOM"));
        }
        // the spawn cell must fit
        if self.arena_width < 3 * BLOCK_SIZE {
            return Err(ConfigError::Invalid("ARENA_WIDTH"));
        }
        if self.arena_height < 3 * BLOCK_SIZE {
            return Err(ConfigError::Invalid("ARENA_HEIGHT"));
        }
        if self.power_range_cells < 1 {
            return Err(ConfigError::Invalid("POWER_RANGE_CELLS"));
        }
        if self.cursor_range_cells < 1 {
            return Err(ConfigError::Invalid("CURSOR_RANGE_CELLS"));
        }
        if self.frame_rate == 0 {
            return Err(ConfigError::Invalid("FRAME_RATE"));
        }
        if self.broadcast_rate == 0 {
            return Err(ConfigError::Invalid("BROADCAST_RATE"));
        }
        if self.probe_interval_secs == 0 {
            return Err(ConfigError::Invalid("PROBE_INTERVAL_SECS"));
        }
        if !(0.0..=1.0).contains(&self.loss_rate) {
            return Err(ConfigError::Invalid("LOSS_RATE"));
        }
        Ok(())
    }

    /// Simulation tuning for every session
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            model: self.movement_model,
            arena: Arena::new(self.arena_width, self.arena_height),
            movement_delay: self.movement_delay_ms,
            power: PowerStats::new(self.power_period_ms, self.power_range_cells),
            max_range: self.cursor_range_cells,
            ..EngineConfig::default()
        }
    }

    pub fn creation_policy(&self) -> CreationPolicy {
        if self.create_on_move {
            CreationPolicy::LazyOnMove
        } else {
            CreationPolicy::PresenceOnly
        }
    }

    pub fn topics(&self) -> RoomTopics {
        RoomTopics::for_room(&self.room)
    }

    pub fn frame_period(&self) -> Duration {
        frame_period(self.frame_rate)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }
}

fn parse_var<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_without_variables() {
        let config = load(&[]).unwrap();
        assert_eq!(config.server_addr, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(config.room, "room-6");
        assert_eq!(config.movement_model, MovementModel::Grid);
        assert_eq!(config.creation_policy(), CreationPolicy::PresenceOnly);
        assert_eq!(config.topics().presence, "online-users-room-6");
        assert_eq!(config.client_origin, None);
        assert_eq!(config.loss_rate, 0.0);

        let engine = config.engine();
        assert_eq!(engine.arena.width, 1280);
        assert_eq!(engine.arena.height, 720);
        assert_eq!(engine.power.max_distance, 8 * BLOCK_SIZE);
        assert_eq!(engine.max_range, 4);
    }

    #[test]
    fn port_overrides_server_addr() {
        let config = load(&[("PORT", "9000"), ("SERVER_ADDR", "127.0.0.1:1")]).unwrap();
        assert_eq!(config.server_addr.port(), 9000);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("MOVEMENT_MODEL", "continuous"),
            ("CREATE_ON_MOVE", "true"),
            ("POWER_RANGE_CELLS", "3"),
            ("FRAME_RATE", "60"),
            ("LOSS_RATE", "0.25"),
        ])
        .unwrap();
        assert_eq!(config.loss_rate, 0.25);
        assert_eq!(config.movement_model, MovementModel::Continuous);
        assert_eq!(config.creation_policy(), CreationPolicy::LazyOnMove);
        assert_eq!(config.engine().power.max_distance, 3 * BLOCK_SIZE);
        assert_eq!(config.frame_period(), frame_period(60));
    }

    #[test]
    fn bad_values_name_the_variable() {
        assert!(matches!(
            load(&[("MOVEMENT_MODEL", "diagonal")]),
            Err(ConfigError::Invalid("MOVEMENT_MODEL"))
        ));
        assert!(matches!(
            load(&[("FRAME_RATE", "0")]),
            Err(ConfigError::Invalid("FRAME_RATE"))
        ));
        assert!(matches!(
            load(&[("ARENA_WIDTH", "64")]),
            Err(ConfigError::Invalid("ARENA_WIDTH"))
        ));
        assert!(matches!(
            load(&[("LOSS_RATE", "1.5")]),
            Err(ConfigError::Invalid("LOSS_RATE"))
        ));
        assert!(matches!(
            load(&[("LOSS_RATE", "NaN")]),
            Err(ConfigError::Invalid("LOSS_RATE"))
        ));
        assert!(matches!(
            load(&[("SERVER_ADDR", "nowhere")]),
            Err(ConfigError::InvalidAddress)
        ));
    }
}
