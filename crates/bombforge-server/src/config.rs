//! Server configuration file.
//!
//! Every field is optional; anything left out keeps its default. Times
//! are plain numbers with the unit in the key name.
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:8080"
//!
//! [room]
//! max_players = 4
//! waiting_secs = 20
//! ```

use std::path::Path;
use std::time::Duration;

use bombforge::DEFAULT_MAX_MESSAGE_SIZE;
use bombforge::prelude::{ClockConfig, RoomConfig, SessionConfig, TickPolicy};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const DEFAULT_PATH: &str = "bombforge.toml";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub clock: ClockSection,
    #[serde(default)]
    pub room: RoomSection,
}

impl Config {
    /// Loads `path`, or the defaults if it does not exist.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn room_config(&self) -> RoomConfig {
        let r = &self.room;
        RoomConfig {
            max_players: r.max_players,
            width: r.width,
            height: r.height,
            starting_lives: r.starting_lives,
            base_blast_range: r.base_blast_range,
            bomb_fuse: Duration::from_millis(r.bomb_fuse_ms),
            waiting_duration: Duration::from_secs(r.waiting_secs),
            countdown_duration: Duration::from_secs(r.countdown_secs),
            finished_grace: Duration::from_secs(r.finished_grace_secs),
            idle_timeout: Duration::from_secs(r.idle_timeout_secs),
            block_probability: r.block_probability,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            queue_capacity: self.server.queue_capacity,
        }
    }

    pub fn clock_config(&self) -> ClockConfig {
        ClockConfig {
            tick_rate_hz: self.clock.tick_rate_hz,
            sweep_interval: Duration::from_secs(self.clock.sweep_interval_secs),
            policy: if self.clock.keep_cadence {
                TickPolicy::Drop
            } else {
                TickPolicy::Skip
            },
            budget_warn_threshold: self.clock.budget_warn_threshold,
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.server.read_timeout_secs)
    }
}

/// Listener and per-connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Seconds of client silence before the connection is closed.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    /// Outbound frames a client may fall behind before it is dropped.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Largest message a client may send, in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            read_timeout_secs: default_read_timeout(),
            queue_capacity: default_queue_capacity(),
            max_message_size: default_max_message_size(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_read_timeout() -> u64 {
    60
}
fn default_queue_capacity() -> usize {
    SessionConfig::default().queue_capacity
}
fn default_max_message_size() -> usize {
    DEFAULT_MAX_MESSAGE_SIZE
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClockSection {
    #[serde(default = "default_tick_rate")]
    pub tick_rate_hz: u32,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// After a late tick, fire the next one on the original schedule
    /// instead of restarting the interval from now.
    #[serde(default)]
    pub keep_cadence: bool,
    #[serde(default = "default_budget_threshold")]
    pub budget_warn_threshold: f64,
}

impl Default for ClockSection {
    fn default() -> Self {
        Self {
            tick_rate_hz: default_tick_rate(),
            sweep_interval_secs: default_sweep_interval(),
            keep_cadence: false,
            budget_warn_threshold: default_budget_threshold(),
        }
    }
}

fn default_tick_rate() -> u32 {
    60
}
fn default_sweep_interval() -> u64 {
    30
}
fn default_budget_threshold() -> f64 {
    0.8
}

/// Match rules. Mirrors [`RoomConfig`] with numeric times.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoomSection {
    pub max_players: usize,
    pub width: i32,
    pub height: i32,
    pub starting_lives: u32,
    pub base_blast_range: u32,
    pub bomb_fuse_ms: u64,
    pub waiting_secs: u64,
    pub countdown_secs: u64,
    pub finished_grace_secs: u64,
    pub idle_timeout_secs: u64,
    pub block_probability: f64,
}

impl Default for RoomSection {
    fn default() -> Self {
        let d = RoomConfig::default();
        Self {
            max_players: d.max_players,
            width: d.width,
            height: d.height,
            starting_lives: d.starting_lives,
            base_blast_range: d.base_blast_range,
            bomb_fuse_ms: millis(d.bomb_fuse),
            waiting_secs: d.waiting_duration.as_secs(),
            countdown_secs: d.countdown_duration.as_secs(),
            finished_grace_secs: d.finished_grace.as_secs(),
            idle_timeout_secs: d.idle_timeout.as_secs(),
            block_probability: d.block_probability,
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_matches_library_defaults() {
        let config: Config = toml::from_str("").unwrap();
        let room = config.room_config();
        let defaults = RoomConfig::default();
        assert_eq!(room.max_players, defaults.max_players);
        assert_eq!(room.bomb_fuse, defaults.bomb_fuse);
        assert_eq!(room.waiting_duration, defaults.waiting_duration);
        assert_eq!(room.idle_timeout, defaults.idle_timeout);
        assert_eq!(config.session_config().queue_capacity, 256);
        assert_eq!(config.clock_config().tick_rate_hz, 60);
        assert_eq!(config.clock_config().policy, TickPolicy::Skip);
        assert_eq!(config.read_timeout(), Duration::from_secs(60));
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.server.max_message_size, 512);
    }

    #[test]
    fn test_partial_sections_override_only_given_keys() {
        let config: Config = toml::from_str(
            r#"
            [server]
            bind = "127.0.0.1:9000"

            [clock]
            tick_rate_hz = 30
            keep_cadence = true

            [room]
            max_players = 2
            bomb_fuse_ms = 1500
            "#,
        )
        .unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:9000");
        assert_eq!(config.server.read_timeout_secs, 60);
        assert!(config.clock.keep_cadence);

        let clock = config.clock_config();
        assert_eq!(clock.tick_rate_hz, 30);
        assert_eq!(clock.policy, TickPolicy::Drop);
        assert_eq!(clock.sweep_interval, Duration::from_secs(30));

        let room = config.room_config();
        assert_eq!(room.max_players, 2);
        assert_eq!(room.bomb_fuse, Duration::from_millis(1500));
        assert_eq!(room.width, 15);
        assert_eq!(room.countdown_duration, Duration::from_secs(10));
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let config = Config::load("definitely/not/here.toml").unwrap();
        assert_eq!(config.room.max_players, 4);
    }

    #[test]
    fn test_unknown_types_are_rejected() {
        let result: Result<Config, _> = toml::from_str("[room]\nmax_players = \"four\"");
        assert!(result.is_err());
    }
}
