//! Events computed under a room lock, delivered after it is released.
//!
//! Every mutating room operation returns an [`Outbox`] instead of sending
//! anything itself. The outbox owns a snapshot of the target sessions, so
//! flushing it touches no room state and can never contend with the tick.

use std::collections::BTreeMap;

use bombforge_protocol::{Codec, Envelope, PlayerId, RoomId};
use bombforge_session::{Frame, Session, broadcast};

struct Delivery {
    targets: Vec<Session>,
    envelope: Envelope,
}

/// Pending outbound events plus sessions to tear down once they are sent.
#[derive(Default)]
pub struct Outbox {
    deliveries: Vec<Delivery>,
    closing: Vec<Session>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, targets: Vec<Session>, envelope: Envelope) {
        self.deliveries.push(Delivery { targets, envelope });
    }

    /// Closes `session` after everything queued so far has been delivered.
    pub fn close_after(&mut self, session: Session) {
        self.closing.push(session);
    }

    pub fn append(&mut self, mut other: Outbox) {
        self.deliveries.append(&mut other.deliveries);
        self.closing.append(&mut other.closing);
    }

    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty() && self.closing.is_empty()
    }

    pub fn len(&self) -> usize {
        self.deliveries.len()
    }

    /// The queued envelopes, in delivery order.
    pub fn envelopes(&self) -> impl Iterator<Item = &Envelope> {
        self.deliveries.iter().map(|d| &d.envelope)
    }

    /// The wire `type` of every queued envelope, in order.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.envelopes().map(|e| e.event.kind()).collect()
    }

    /// The players each queued envelope is addressed to, in order.
    pub fn recipients(&self) -> Vec<Vec<PlayerId>> {
        self.deliveries
            .iter()
            .map(|d| d.targets.iter().map(Session::player_id).collect())
            .collect()
    }

    /// Encodes each envelope once and fans it out, then closes the
    /// sessions marked with [`close_after`](Self::close_after).
    ///
    /// Returns the players whose sessions could not take a frame, keyed to
    /// the room they were in, so the caller can remove them.
    pub fn flush<C: Codec>(self, codec: &C) -> BTreeMap<PlayerId, RoomId> {
        let mut failed = BTreeMap::new();
        for Delivery { targets, envelope } in self.deliveries {
            if targets.is_empty() {
                continue;
            }
            let frame: Frame = match codec.encode(&envelope) {
                Ok(bytes) => bytes.into(),
                Err(e) => {
                    tracing::error!(kind = envelope.event.kind(), error = %e, "failed to encode event");
                    continue;
                }
            };
            for player in broadcast(&targets, &frame) {
                if let Some(session) = targets.iter().find(|s| s.player_id() == player) {
                    failed.insert(player, session.room_id().clone());
                }
            }
        }
        for session in self.closing {
            session.close();
        }
        failed
    }
}

impl std::fmt::Debug for Outbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbox")
            .field("kinds", &self.kinds())
            .field("closing", &self.closing.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use bombforge_protocol::{JsonCodec, ServerEvent};
    use bombforge_session::{SessionConfig, SessionReceiver};

    use super::*;

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
    fn test_flush_encodes_and_delivers_in_order() {
        let (a, mut ra) = seat(1, 8);
        let mut outbox = Outbox::new();
        outbox.push(vec![a.clone()], Envelope::new(ServerEvent::Pong));
        outbox.push(vec![a], Envelope::new(ServerEvent::error("nope")));
        assert_eq!(outbox.kinds(), ["pong", "error"]);

        let failed = outbox.flush(&JsonCodec);
        assert!(failed.is_empty());

        let first: serde_json::Value = serde_json::from_slice(&ra.try_recv().unwrap()).unwrap();
        let second: serde_json::Value = serde_json::from_slice(&ra.try_recv().unwrap()).unwrap();
        assert_eq!(first["type"], "pong");
        assert_eq!(second["data"]["message"], "nope");
    }

    #[test]
    fn test_flush_reports_saturated_players_once() {
        let (slow, _rx) = seat(5, 1);
        let mut outbox = Outbox::new();
        for _ in 0..3 {
            outbox.push(vec![slow.clone()], Envelope::new(ServerEvent::Pong));
        }
        let failed = outbox.flush(&JsonCodec);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[&PlayerId(5)], RoomId::from("room_1"));
    }

    #[test]
    fn test_close_after_runs_after_delivery() {
        let (a, mut ra) = seat(1, 8);
        let mut outbox = Outbox::new();
        outbox.push(vec![a.clone()], Envelope::new(ServerEvent::Pong));
        outbox.close_after(a.clone());
        assert!(!outbox.is_empty());

        outbox.flush(&JsonCodec);
        assert!(a.is_closed());
        // Teardown discards what was still queued.
        assert!(ra.try_recv().is_none());
    }

    #[test]
    fn test_append_keeps_order() {
        let mut first = Outbox::new();
        first.push(vec![], Envelope::new(ServerEvent::Pong));
        let mut second = Outbox::new();
        second.push(vec![], Envelope::new(ServerEvent::error("x")));
        first.append(second);
        assert_eq!(first.kinds(), ["pong", "error"]);
        assert_eq!(first.len(), 2);
    }
}
