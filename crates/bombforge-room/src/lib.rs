//! Room engine for Bombforge.
//!
//! Each room is one match: terrain, players, bombs and a match state
//! machine behind a single lock. A global clock steps every room at a
//! fixed rate; player actions arrive concurrently from connection tasks.
//! Both paths compute under the room lock and deliver after releasing it.
//!
//! # Key types
//!
//! - [`Engine`]: join / leave / act / tick / sweep, room listing
//! - [`RoomRegistry`]: the id → room index
//! - [`Room`]: one match and its lock
//! - [`Terrain`]: the tile grid, and its generator
//! - [`Outbox`]: events computed under a lock, sent after it
//! - [`blast_set`]: explosion geometry

mod config;
mod engine;
mod error;
mod outbox;
mod registry;
mod room;
mod simulation;
mod terrain;

pub use config::{MIN_PLAYERS_TO_START, RoomConfig};
pub use engine::{Engine, Seat};
pub use error::RoomError;
pub use outbox::Outbox;
pub use registry::{RoomRegistry, TerrainFactory};
pub use room::{Departure, Room, StepOutcome};
pub use simulation::blast_set;
pub use terrain::Terrain;
