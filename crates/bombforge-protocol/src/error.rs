//! Error types for the protocol layer.
//!
//! Each crate in Bombforge defines its own error enum. A `ProtocolError`
//! always means the bytes or the message shape were wrong, never that a
//! room or a connection misbehaved.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, an unknown `type` tag, a missing
    /// `data` field, or a direction that isn't one of the four cardinals.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message parsed but violates protocol rules, e.g. an empty chat
    /// line or a join handshake without a player name.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
