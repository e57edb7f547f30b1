//! Unified error type for the Bombforge server.

use bombforge_protocol::ProtocolError;
use bombforge_room::RoomError;
use bombforge_session::SessionError;
use bombforge_transport::TransportError;

/// Top-level error that wraps every crate-specific error, so `?` composes
/// across the layers.
#[derive(Debug, thiserror::Error)]
pub enum BombforgeError {
    /// Binding, accepting, sending or receiving failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// An outbound queue was saturated or already closed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The join was refused (full room, missing name, ...).
    #[error(transparent)]
    Room(#[from] RoomError),
}
