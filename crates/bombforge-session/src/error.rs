//! Error types for the session layer.

use bombforge_protocol::PlayerId;

/// Why a frame could not be queued for a session.
///
/// Both variants are terminal: the session has been torn down by the time
/// the caller sees the error, and the room should treat it as a leave.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The outbound queue was full. The client stopped reading, so the
    /// session is considered unresponsive.
    #[error("outbound queue saturated for player {0}")]
    Saturated(PlayerId),

    /// The session was already torn down, or its receiving side is gone.
    #[error("session closed for player {0}")]
    Closed(PlayerId),
}
