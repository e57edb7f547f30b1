//! Error types for the room layer.

use bombforge_protocol::{PlayerId, RoomId};

/// Errors that can occur during room operations.
///
/// Illegal moves and rejected bomb placements are not errors: they leave
/// the room untouched and produce no events.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room is at its configured capacity.
    #[error("room {0} is full")]
    RoomFull(RoomId),

    /// The room has emptied out or expired and is being removed.
    #[error("room {0} is closed")]
    Closed(RoomId),

    /// The player is not (or no longer) in this room.
    #[error("player {0} not in room {1}")]
    NotInRoom(PlayerId, RoomId),

    /// A join or create request was missing required input.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No room could be found or created for the player, because every
    /// candidate filled up or closed while the join was in flight.
    #[error("no room available")]
    Unavailable,

    /// A hand-built terrain was not a rectangle of at least one cell.
    #[error("invalid terrain: {0}")]
    InvalidTerrain(String),
}
