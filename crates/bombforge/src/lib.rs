//! # Bombforge
//!
//! A multiplayer Bomberman-style arena server.
//!
//! Players connect over WebSocket with `?name=<display name>&room=<id>`,
//! are seated in a room (auto-matched when no room is given), and play
//! a server-authoritative match: a shared grid, timed bombs, lives, and
//! a last-survivor win.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bombforge::prelude::*;
//!
//! # async fn run() -> Result<(), BombforgeError> {
//! let server = BombforgeServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod server;

pub use bombforge_transport::DEFAULT_MAX_MESSAGE_SIZE;
pub use error::BombforgeError;
pub use server::{BombforgeServer, BombforgeServerBuilder, DEFAULT_READ_TIMEOUT};

/// Everything needed to configure and run a server.
pub mod prelude {
    pub use crate::{BombforgeError, BombforgeServer, BombforgeServerBuilder};
    pub use bombforge_protocol::{
        Action, ClientMessage, Direction, Envelope, JoinRequest, MatchState, PlayerId, Position,
        RoomId, RoomSummary, ServerEvent, Tile,
    };
    pub use bombforge_room::{Engine, RoomConfig, RoomError};
    pub use bombforge_session::SessionConfig;
    pub use bombforge_tick::{ClockConfig, TickPolicy};
}
