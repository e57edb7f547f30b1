//! Session types: the server's handle on one seated player's connection.
//!
//! A session is split in two halves:
//!
//! - [`Session`] lives in the room. It is cheap to clone and only ever
//!   *queues* frames (`try_send`), so code holding a room lock can snapshot
//!   it and the fan-out after the lock can never block on the network.
//! - [`SessionReceiver`] lives in the connection task, which drains the
//!   queue onto the socket and notices when the session is torn down.
//!
//! ```text
//!   room ──deliver()──▶ [bounded queue] ──recv()──▶ connection task ──▶ socket
//!     │                                                ▲
//!     └──────────── close() / saturation ─── teardown ─┘
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bombforge_protocol::{PlayerId, RoomId};
use tokio::sync::{Notify, mpsc};

use crate::SessionError;

/// One encoded outbound message, shared between every recipient of a
/// broadcast.
pub type Frame = Arc<[u8]>;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for session behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Frames a session may have queued before it is considered
    /// unresponsive and torn down.
    ///
    /// Default: 256.
    pub queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { queue_capacity: 256 }
    }
}

// ---------------------------------------------------------------------------
// Teardown signal
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Teardown {
    done: AtomicBool,
    notify: Notify,
}

impl Teardown {
    /// Returns `true` only for the call that actually tore the session down.
    fn fire(&self) -> bool {
        let first = !self.done.swap(true, Ordering::AcqRel);
        if first {
            // `notify_one` stores a permit, so a receiver that starts waiting
            // after this call still wakes up.
            self.notify.notify_one();
        }
        first
    }

    fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// The producer half of a seated player's connection.
#[derive(Debug, Clone)]
pub struct Session {
    player_id: PlayerId,
    room_id: RoomId,
    outbound: mpsc::Sender<Frame>,
    teardown: Arc<Teardown>,
}

impl Session {
    /// Opens a session for `player_id` in `room_id` and returns both halves.
    pub fn open(
        player_id: PlayerId,
        room_id: RoomId,
        config: &SessionConfig,
    ) -> (Session, SessionReceiver) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let teardown = Arc::new(Teardown::default());
        let session = Session {
            player_id,
            room_id,
            outbound: tx,
            teardown: Arc::clone(&teardown),
        };
        let receiver = SessionReceiver {
            player_id,
            inbound: rx,
            teardown,
        };
        (session, receiver)
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Queues one frame without waiting.
    ///
    /// # Errors
    /// - [`SessionError::Saturated`] if the queue is full. The session is
    ///   torn down before returning.
    /// - [`SessionError::Closed`] if the session was already torn down or
    ///   the receiving side was dropped.
    pub fn deliver(&self, frame: Frame) -> Result<(), SessionError> {
        if self.teardown.is_done() {
            return Err(SessionError::Closed(self.player_id));
        }
        match self.outbound.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                if self.teardown.fire() {
                    tracing::warn!(
                        player_id = %self.player_id,
                        room_id = %self.room_id,
                        "outbound queue saturated, tearing session down"
                    );
                }
                Err(SessionError::Saturated(self.player_id))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.teardown.fire();
                Err(SessionError::Closed(self.player_id))
            }
        }
    }

    /// Tears the session down. The connection task's [`SessionReceiver`]
    /// stops yielding frames and the connection is closed.
    ///
    /// Idempotent; returns `true` if this call did the teardown.
    pub fn close(&self) -> bool {
        let first = self.teardown.fire();
        if first {
            tracing::debug!(player_id = %self.player_id, room_id = %self.room_id, "session closed");
        }
        first
    }

    pub fn is_closed(&self) -> bool {
        self.teardown.is_done()
    }
}

// ---------------------------------------------------------------------------
// SessionReceiver
// ---------------------------------------------------------------------------

/// The consumer half, owned by the connection task.
#[derive(Debug)]
pub struct SessionReceiver {
    player_id: PlayerId,
    inbound: mpsc::Receiver<Frame>,
    teardown: Arc<Teardown>,
}

impl SessionReceiver {
    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    /// Waits for the next queued frame.
    ///
    /// Returns `None` once the session is torn down (frames still queued
    /// are discarded) or every [`Session`] clone has been dropped.
    pub async fn recv(&mut self) -> Option<Frame> {
        if self.teardown.is_done() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.teardown.notify.notified() => None,
            frame = self.inbound.recv() => frame,
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<Frame> {
        if self.teardown.is_done() {
            return None;
        }
        self.inbound.try_recv().ok()
    }

    pub fn is_closed(&self) -> bool {
        self.teardown.is_done()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(capacity: usize) -> (Session, SessionReceiver) {
        Session::open(
            PlayerId(1),
            RoomId::from("room_1"),
            &SessionConfig {
                queue_capacity: capacity,
            },
        )
    }

    fn frame(text: &str) -> Frame {
        Arc::from(text.as_bytes())
    }

    #[test]
    fn test_default_queue_capacity() {
        assert_eq!(SessionConfig::default().queue_capacity, 256);
    }

    #[tokio::test]
    async fn test_deliver_then_recv_in_order() {
        let (session, mut rx) = open(4);
        session.deliver(frame("a")).unwrap();
        session.deliver(frame("b")).unwrap();

        assert_eq!(&*rx.recv().await.unwrap(), b"a");
        assert_eq!(&*rx.recv().await.unwrap(), b"b");
    }

    #[test]
    fn test_full_queue_tears_session_down() {
        let (session, mut rx) = open(2);
        session.deliver(frame("1")).unwrap();
        session.deliver(frame("2")).unwrap();

        let err = session.deliver(frame("3")).unwrap_err();
        assert!(matches!(err, SessionError::Saturated(PlayerId(1))));
        assert!(session.is_closed());
        assert!(rx.is_closed());
        // Queued frames are discarded once torn down.
        assert!(rx.try_recv().is_none());
        // Later deliveries report Closed, not Saturated.
        assert!(matches!(
            session.deliver(frame("4")),
            Err(SessionError::Closed(_))
        ));
    }

    #[test]
    fn test_dropped_receiver_reports_closed() {
        let (session, rx) = open(2);
        drop(rx);
        assert!(matches!(
            session.deliver(frame("x")),
            Err(SessionError::Closed(_))
        ));
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn test_close_wakes_waiting_receiver() {
        let (session, mut rx) = open(2);
        let waiter = tokio::spawn(async move { rx.recv().await });
        tokio::task::yield_now().await;

        assert!(session.close());
        assert!(!session.close(), "second close is a no-op");
        assert!(waiter.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_close_before_recv_is_observed() {
        let (session, mut rx) = open(2);
        session.deliver(frame("late")).unwrap();
        session.close();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_recv_ends_when_all_senders_dropped() {
        let (session, mut rx) = open(2);
        let clone = session.clone();
        drop(session);
        drop(clone);
        assert!(rx.recv().await.is_none());
    }
}
