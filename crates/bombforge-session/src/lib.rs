//! Player sessions for Bombforge.
//!
//! A session is the server's handle on one seated player's connection:
//!
//! 1. **Queueing**: [`Session::deliver`] pushes encoded frames onto a
//!    bounded queue without ever awaiting
//! 2. **Teardown**: a saturated queue or an explicit [`Session::close`]
//!    ends the session, and its [`SessionReceiver`] stops yielding frames
//! 3. **Fan-out**: [`broadcast`] delivers one frame to many sessions and
//!    reports the ones that failed
//!
//! # How it fits in the stack
//!
//! ```text
//! Room Layer (above)  ← snapshots sessions under its lock, fans out after
//!     ↕
//! Session Layer (this crate)  ← bounded per-player outbound queues
//!     ↕
//! Protocol Layer (below)  ← provides PlayerId, RoomId
//! ```

mod broadcast;
mod error;
mod session;

pub use broadcast::broadcast;
pub use error::SessionError;
pub use session::{Frame, Session, SessionConfig, SessionReceiver};
