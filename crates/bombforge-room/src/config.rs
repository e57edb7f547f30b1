//! Room configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Players needed before a waiting room starts its timer.
pub const MIN_PLAYERS_TO_START: usize = 2;

/// Settings shared by every room the registry creates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Maximum players per auto-created room. Reaching it starts the
    /// countdown immediately.
    pub max_players: usize,

    /// Grid width in cells, perimeter included.
    pub width: i32,

    /// Grid height in cells, perimeter included.
    pub height: i32,

    pub starting_lives: u32,

    /// Blast range before the owner's flame power-ups are added.
    pub base_blast_range: u32,

    pub bomb_fuse: Duration,

    /// How long a waiting room with at least two players waits for more
    /// before counting down.
    pub waiting_duration: Duration,

    pub countdown_duration: Duration,

    /// How long a finished room lingers so clients can see the result.
    pub finished_grace: Duration,

    /// Players silent for longer than this are removed by the idle sweep.
    pub idle_timeout: Duration,

    /// Chance that a free interior cell starts as a destructible block.
    pub block_probability: f64,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_players: 4,
            width: 15,
            height: 13,
            starting_lives: 3,
            base_blast_range: 2,
            bomb_fuse: Duration::from_secs(3),
            waiting_duration: Duration::from_secs(20),
            countdown_duration: Duration::from_secs(10),
            finished_grace: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(60),
            block_probability: 0.6,
        }
    }
}

impl RoomConfig {
    /// Smallest grid that still has four distinct spawn corners.
    pub const MIN_DIMENSION: i32 = 5;

    /// Clamps out-of-range values so the config is safe to use.
    pub fn validated(mut self) -> Self {
        self.max_players = self.max_players.max(1);
        self.width = self.width.max(Self::MIN_DIMENSION);
        self.height = self.height.max(Self::MIN_DIMENSION);
        self.block_probability = if self.block_probability.is_finite() {
            self.block_probability.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    /// Capacity for a room created on request: anything outside `[2, 4]`
    /// falls back to 4.
    pub fn requested_capacity(requested: Option<usize>) -> usize {
        match requested {
            Some(n) if (2..=4).contains(&n) => n,
            _ => 4,
        }
    }
}
