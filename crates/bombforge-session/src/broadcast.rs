//! Room fan-out.
//!
//! A broadcast is a loop of non-blocking [`Session::deliver`] calls over a
//! snapshot of the room's sessions. Recipients that cannot take the frame
//! are collected and handed back so the caller can remove them from the
//! room; they never hold up delivery to anyone else.

use bombforge_protocol::PlayerId;

use crate::{Frame, Session, SessionError};

/// Queues `frame` on every session in `targets`.
///
/// Returns the players whose sessions failed (saturated or already
/// closed), in the order they were visited.
pub fn broadcast<'a, I>(targets: I, frame: &Frame) -> Vec<PlayerId>
where
    I: IntoIterator<Item = &'a Session>,
{
    let mut failed = Vec::new();
    for session in targets {
        match session.deliver(Frame::clone(frame)) {
            Ok(()) => {}
            Err(SessionError::Saturated(player)) | Err(SessionError::Closed(player)) => {
                failed.push(player);
            }
        }
    }
    if !failed.is_empty() {
        tracing::debug!(failed = failed.len(), "broadcast skipped unresponsive sessions");
    }
    failed
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bombforge_protocol::RoomId;

    use super::*;
    use crate::{SessionConfig, SessionReceiver};

    fn seat(id: u64, capacity: usize) -> (Session, SessionReceiver) {
        Session::open(
            PlayerId(id),
            RoomId::from("room_1"),
            &SessionConfig {
                queue_capacity: capacity,
            },
        )
    }

    #[test]
    fn test_broadcast_reaches_every_session() {
        let (a, mut ra) = seat(1, 4);
        let (b, mut rb) = seat(2, 4);
        let frame: Frame = Arc::from(&b"hello"[..]);

        let failed = broadcast([&a, &b], &frame);

        assert!(failed.is_empty());
        assert_eq!(&*ra.try_recv().unwrap(), b"hello");
        assert_eq!(&*rb.try_recv().unwrap(), b"hello");
    }

    #[test]
    fn test_saturated_recipient_does_not_block_others() {
        let (slow, _slow_rx) = seat(1, 1);
        let (fast, mut fast_rx) = seat(2, 8);
        let frame: Frame = Arc::from(&b"x"[..]);

        // Fill the slow session's single slot.
        assert!(broadcast([&slow], &frame).is_empty());

        let failed = broadcast([&slow, &fast], &frame);
        assert_eq!(failed, vec![PlayerId(1)]);
        assert!(slow.is_closed());
        assert_eq!(&*fast_rx.try_recv().unwrap(), b"x");
        assert_eq!(&*fast_rx.try_recv().unwrap(), b"x");
    }

    #[test]
    fn test_closed_recipient_reported() {
        let (gone, _rx) = seat(3, 4);
        gone.close();
        let frame: Frame = Arc::from(&b"x"[..]);
        assert_eq!(broadcast([&gone], &frame), vec![PlayerId(3)]);
    }
}
