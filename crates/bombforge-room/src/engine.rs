//! The room engine: the entry point the connection layer talks to.
//!
//! [`Engine`] ties the registry, the rooms and the session queues
//! together. Every operation runs the room logic under the room lock,
//! releases it, and only then flushes the resulting [`Outbox`]. Sessions
//! that turn out to be saturated during a flush are removed from their
//! room exactly as if the player had left.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use bombforge_protocol::{Action, Codec, JoinRequest, PlayerId, RoomId, RoomSummary};
use bombforge_session::{Session, SessionConfig, SessionReceiver};
use bombforge_tick::{ClockEvent, GameClock};

use crate::{Outbox, RoomConfig, RoomError, RoomRegistry};

/// How many candidate rooms a join tries before giving up. Candidates are
/// only skipped when they fill up or close between being picked and
/// being joined.
const MAX_JOIN_ATTEMPTS: usize = 8;

/// A successfully seated player.
#[derive(Debug)]
pub struct Seat {
    pub player_id: PlayerId,
    pub room_id: RoomId,
    /// Frames queued for this player's connection.
    pub receiver: SessionReceiver,
}

pub struct Engine<C: Codec> {
    registry: RoomRegistry,
    codec: C,
    session_config: SessionConfig,
}

impl<C: Codec> Engine<C> {
    pub fn new(codec: C, room_config: RoomConfig, session_config: SessionConfig) -> Self {
        Self::with_registry(codec, RoomRegistry::new(room_config), session_config)
    }

    pub fn with_registry(codec: C, registry: RoomRegistry, session_config: SessionConfig) -> Self {
        Self {
            registry,
            codec,
            session_config,
        }
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Seats a new player, in the requested room or in the first room with
    /// a free seat.
    ///
    /// # Errors
    /// - [`RoomError::InvalidRequest`] if the name is missing
    /// - [`RoomError::RoomFull`] if the requested room is at capacity
    /// - [`RoomError::Unavailable`] if every candidate filled up or closed
    ///   while the join was in flight
    pub fn join(&self, request: &JoinRequest, now: Instant) -> Result<Seat, RoomError> {
        let name = request
            .player_name()
            .map_err(|_| RoomError::InvalidRequest("Player name is required".into()))?;
        let player_id = self.registry.next_player_id();

        for attempt in 1..=MAX_JOIN_ATTEMPTS {
            let room = self.registry.find_or_create(request.room.as_ref());
            let (session, receiver) =
                Session::open(player_id, room.id().clone(), &self.session_config);

            match room.join(player_id, name, session, now) {
                Ok(outbox) => {
                    self.deliver(outbox, now);
                    return Ok(Seat {
                        player_id,
                        room_id: room.id().clone(),
                        receiver,
                    });
                }
                Err(RoomError::RoomFull(id)) if request.room.is_some() => {
                    return Err(RoomError::RoomFull(id));
                }
                Err(RoomError::RoomFull(id)) => {
                    tracing::debug!(room_id = %id, attempt, "room filled during join, retrying");
                }
                Err(RoomError::Closed(id)) => {
                    // Emptied between pick and join; make sure it is gone
                    // so the next attempt does not pick it again.
                    self.registry.remove_room(&room);
                    tracing::debug!(room_id = %id, attempt, "room closed during join, retrying");
                }
                Err(e) => return Err(e),
            }
        }
        tracing::warn!(%player_id, "no room available after {MAX_JOIN_ATTEMPTS} attempts");
        Err(RoomError::Unavailable)
    }

    /// Removes a player. A player who already left is ignored.
    pub fn leave(&self, player_id: PlayerId, room_id: &RoomId, now: Instant) {
        let outbox = self.remove_player(player_id, room_id, now);
        self.deliver(outbox, now);
    }

    /// Applies an action from a seated player. Actions from players or
    /// rooms that are already gone are dropped.
    pub fn act(&self, player_id: PlayerId, room_id: &RoomId, action: Action, now: Instant) {
        let Some(room) = self.registry.get(room_id) else {
            tracing::debug!(%player_id, %room_id, "action for unknown room dropped");
            return;
        };
        match room.apply(player_id, action, now) {
            Ok(outbox) => self.deliver(outbox, now),
            Err(e) => tracing::debug!(%player_id, error = %e, "action dropped"),
        }
    }

    /// One simulation step over every room. Rooms whose finished grace
    /// period ran out are removed and their sessions closed.
    pub fn tick(&self, now: Instant) {
        for room in self.registry.snapshot() {
            let outcome = room.step(now);
            let mut outbox = outcome.outbox;
            if outcome.expired {
                self.registry.remove_room(&room);
                outbox.append(room.close());
                tracing::info!(room_id = %room.id(), "finished room expired");
            }
            self.deliver(outbox, now);
        }
    }

    /// Evicts idle players and empty rooms.
    pub fn sweep(&self, now: Instant) {
        let idle_timeout = self.registry.config().idle_timeout;
        let outbox = self.registry.sweep(now, idle_timeout);
        self.deliver(outbox, now);
    }

    pub fn list_rooms(&self) -> Vec<RoomSummary> {
        self.registry
            .snapshot()
            .iter()
            .filter(|room| !room.is_closed())
            .map(|room| room.summary())
            .collect()
    }

    /// Creates an empty room on request. Capacities outside `[2, 4]` fall
    /// back to 4.
    ///
    /// # Errors
    /// [`RoomError::InvalidRequest`] if `name` is blank.
    pub fn create_room(
        &self,
        name: &str,
        max_players: Option<usize>,
    ) -> Result<RoomSummary, RoomError> {
        if name.trim().is_empty() {
            return Err(RoomError::InvalidRequest("Room name is required".into()));
        }
        let capacity = RoomConfig::requested_capacity(max_players);
        let room = self.registry.create_with_capacity(capacity);
        tracing::info!(room_id = %room.id(), name = name.trim(), capacity, "room created on request");
        Ok(room.summary())
    }

    fn remove_player(&self, player_id: PlayerId, room_id: &RoomId, now: Instant) -> Outbox {
        let Some(room) = self.registry.get(room_id) else {
            return Outbox::new();
        };
        match room.leave(player_id, now) {
            Ok(departure) => {
                if departure.now_empty {
                    self.registry.remove_room(&room);
                }
                departure.outbox
            }
            Err(e) => {
                tracing::trace!(error = %e, "leave ignored");
                Outbox::new()
            }
        }
    }

    /// Flushes `outbox`, then removes every player whose queue could not
    /// keep up. Their departures are flushed the same way until nothing
    /// is left.
    fn deliver(&self, outbox: Outbox, now: Instant) {
        let mut pending = vec![outbox];
        while let Some(outbox) = pending.pop() {
            let failed: BTreeMap<PlayerId, RoomId> = outbox.flush(&self.codec);
            for (player_id, room_id) in failed {
                tracing::warn!(%player_id, %room_id, "evicting unresponsive player");
                pending.push(self.remove_player(player_id, &room_id, now));
            }
        }
    }
}

impl<C: Codec> Engine<C> {
    /// Runs the game clock forever: a simulation step on every tick, the
    /// idle sweep on every sweep interval.
    pub async fn drive(self: Arc<Self>, mut clock: GameClock) {
        tracing::info!(
            rate_hz = clock.tick_rate_hz(),
            sweep_secs = clock.sweep_interval().as_secs(),
            "game clock started"
        );
        loop {
            match clock.next().await {
                ClockEvent::Tick(info) => {
                    self.tick(info.at);
                    clock.record_tick_end();
                }
                ClockEvent::Sweep { at } => {
                    tracing::debug!(rooms = self.registry.len(), "idle sweep");
                    self.sweep(at);
                }
            }
        }
    }
}
