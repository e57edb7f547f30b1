//! Wire protocol for Bombforge.
//!
//! This crate defines the language the arena server and its browser
//! clients speak:
//!
//! - **Types** ([`PlayerId`], [`RoomId`], [`Tile`], [`MatchState`], ...)
//! - **Messages** ([`ClientMessage`] → [`Action`] inbound,
//!   [`ServerEvent`] in an [`Envelope`] outbound)
//! - **Join handshake** ([`JoinRequest`])
//! - **Codec** ([`Codec`] trait, [`JsonCodec`])
//!
//! ```text
//! Transport (bytes) → Protocol (Action / Envelope) → Room engine
//! ```

mod codec;
mod error;
mod join;
mod messages;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use join::JoinRequest;
pub use messages::{
    Action, BombView, ChatInput, ChatLine, ClientMessage, Envelope, GameStateView, PlayerInput,
    PlayerView, PowerUps, RoomSummary, RoomView, ServerEvent, TileGrid,
};
pub use types::{BombId, Direction, MatchState, PlayerId, Position, Recipient, RoomId, Tile};
