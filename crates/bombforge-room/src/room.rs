//! The room aggregate: one match, one lock.
//!
//! Every field that can change lives in [`RoomInner`] behind a single
//! `std::sync::Mutex`. Operations lock, mutate, snapshot the sessions they
//! need to notify into an [`Outbox`], and unlock. Nothing in this module
//! awaits or touches the network.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use bombforge_protocol::{
    Action, BombId, BombView, ChatLine, Direction, Envelope, GameStateView, MatchState, PlayerId,
    PlayerView, Position, PowerUps, Recipient, RoomId, RoomSummary, RoomView, ServerEvent,
};
use bombforge_session::Session;

use crate::config::MIN_PLAYERS_TO_START;
use crate::{Outbox, RoomConfig, RoomError, Terrain};

/// Milliseconds since the Unix epoch, for client-facing timestamps.
pub(crate) fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub(crate) struct Player {
    pub(crate) id: PlayerId,
    pub(crate) name: String,
    pub(crate) pos: Position,
    pub(crate) lives: u32,
    pub(crate) score: u32,
    pub(crate) power_ups: PowerUps,
    pub(crate) last_seen: Instant,
}

impl Player {
    pub(crate) fn is_alive(&self) -> bool {
        self.lives > 0
    }

    pub(crate) fn view(&self) -> PlayerView {
        PlayerView {
            id: self.id,
            name: self.name.clone(),
            x: self.pos.x,
            y: self.pos.y,
            lives: self.lives,
            score: self.score,
            power_ups: self.power_ups,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Bomb {
    pub(crate) id: BombId,
    pub(crate) owner: PlayerId,
    pub(crate) pos: Position,
    pub(crate) placed_at: Instant,
    pub(crate) fuse: Duration,
}

impl Bomb {
    pub(crate) fn view(&self) -> BombView {
        BombView {
            id: self.id,
            x: self.pos.x,
            y: self.pos.y,
            player_id: self.owner,
            timer: u64::try_from(self.fuse.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub(crate) fn is_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.placed_at) >= self.fuse
    }
}

// ---------------------------------------------------------------------------
// RoomInner
// ---------------------------------------------------------------------------

pub(crate) struct RoomInner {
    pub(crate) id: RoomId,
    pub(crate) config: RoomConfig,
    pub(crate) state: MatchState,
    pub(crate) terrain: Terrain,
    pub(crate) players: BTreeMap<PlayerId, Player>,
    pub(crate) bombs: BTreeMap<BombId, Bomb>,
    pub(crate) sessions: BTreeMap<PlayerId, Session>,
    pub(crate) waiting_since: Option<Instant>,
    pub(crate) countdown_since: Option<Instant>,
    pub(crate) finished_at: Option<Instant>,
    pub(crate) next_bomb: u64,
    /// Set once the room is empty or expired; a closed room accepts nothing.
    pub(crate) closed: bool,
}

impl RoomInner {
    pub(crate) fn envelope(&self, event: ServerEvent) -> Envelope {
        Envelope::new(event).in_room(self.id.clone())
    }

    pub(crate) fn targets(&self, to: Recipient) -> Vec<Session> {
        self.sessions
            .iter()
            .filter(|(id, _)| to.includes(**id))
            .map(|(_, s)| s.clone())
            .collect()
    }

    pub(crate) fn roster(&self) -> BTreeMap<PlayerId, PlayerView> {
        self.players.iter().map(|(id, p)| (*id, p.view())).collect()
    }

    fn bomb_views(&self) -> BTreeMap<BombId, BombView> {
        self.bombs.iter().map(|(id, b)| (*id, b.view())).collect()
    }

    pub(crate) fn alive_count(&self) -> usize {
        self.players.values().filter(|p| p.is_alive()).count()
    }

    fn game_state(&self) -> GameStateView {
        GameStateView {
            players: self.roster(),
            bombs: self.bomb_views(),
            map: self.terrain.snapshot(),
            state: self.state,
        }
    }

    fn room_view(&self) -> RoomView {
        RoomView {
            id: self.id.clone(),
            state: self.state,
            max_players: self.config.max_players,
            players: self.roster(),
            bombs: self.bomb_views(),
            map: self.terrain.snapshot(),
        }
    }

    /// Moves the state machine one step forward. Every call site checks
    /// the current state first; the guard keeps the order strict anyway.
    pub(crate) fn advance(&mut self, to: MatchState) -> bool {
        if !self.state.can_transition_to(to) {
            tracing::error!(room_id = %self.id, from = %self.state, %to, "refused out-of-order transition");
            return false;
        }
        tracing::info!(room_id = %self.id, from = %self.state, %to, players = self.players.len(), "match state changed");
        self.state = to;
        true
    }

    pub(crate) fn start_countdown(&mut self, now: Instant, outbox: &mut Outbox) {
        if !self.advance(MatchState::Countdown) {
            return;
        }
        self.countdown_since = Some(now);
        let duration_ms =
            u64::try_from(self.config.countdown_duration.as_millis()).unwrap_or(u64::MAX);
        outbox.push(
            self.targets(Recipient::All),
            self.envelope(ServerEvent::Countdown { duration_ms }),
        );
    }

    /// Ends a running match once at most one player is still alive.
    pub(crate) fn check_end(&mut self, now: Instant, outbox: &mut Outbox) {
        if self.state != MatchState::Playing || self.alive_count() > 1 {
            return;
        }
        if !self.advance(MatchState::Finished) {
            return;
        }
        self.finished_at = Some(now);
        let winner = self.players.values().find(|p| p.is_alive()).map(Player::view);
        if let Some(w) = &winner {
            tracing::info!(room_id = %self.id, winner = %w.id, "match won");
        }
        outbox.push(
            self.targets(Recipient::All),
            self.envelope(ServerEvent::GameEnded {
                state: MatchState::Finished,
                winner,
            }),
        );
    }

    /// Removes a player and their session. Returns `false` if they were
    /// not in the room.
    pub(crate) fn remove_player(
        &mut self,
        player_id: PlayerId,
        now: Instant,
        outbox: &mut Outbox,
    ) -> bool {
        let Some(player) = self.players.remove(&player_id) else {
            return false;
        };
        if let Some(session) = self.sessions.remove(&player_id) {
            outbox.close_after(session);
        }
        tracing::info!(room_id = %self.id, %player_id, name = %player.name, remaining = self.players.len(), "player left");

        outbox.push(
            self.targets(Recipient::All),
            self.envelope(ServerEvent::PlayerLeft { player_id })
                .caused_by(player_id),
        );

        if self.players.is_empty() {
            self.closed = true;
            return true;
        }
        match self.state {
            MatchState::Playing => self.check_end(now, outbox),
            MatchState::Waiting if self.players.len() < MIN_PLAYERS_TO_START => {
                self.waiting_since = None;
            }
            _ => {}
        }
        true
    }

    fn try_move(&mut self, player_id: PlayerId, direction: Direction) -> Outbox {
        let mut outbox = Outbox::new();
        if self.state != MatchState::Playing {
            return outbox;
        }
        let Some(player) = self.players.get(&player_id) else {
            return outbox;
        };
        if !player.is_alive() {
            return outbox;
        }
        let target = player.pos.step(direction);
        if !self.terrain.is_walkable(target) {
            tracing::trace!(room_id = %self.id, %player_id, %target, "move blocked");
            return outbox;
        }
        if let Some(player) = self.players.get_mut(&player_id) {
            player.pos = target;
        }
        outbox.push(
            self.targets(Recipient::All),
            self.envelope(ServerEvent::PlayerMoved {
                player_id,
                x: target.x,
                y: target.y,
            })
            .caused_by(player_id),
        );
        outbox
    }

    fn try_place_bomb(&mut self, player_id: PlayerId, now: Instant) -> Outbox {
        let mut outbox = Outbox::new();
        if self.state != MatchState::Playing {
            return outbox;
        }
        let Some(player) = self.players.get(&player_id) else {
            return outbox;
        };
        if !player.is_alive() {
            return outbox;
        }
        let quota = 1 + player.power_ups.bombs as usize;
        let live = self.bombs.values().filter(|b| b.owner == player_id).count();
        if live >= quota {
            tracing::debug!(room_id = %self.id, %player_id, live, quota, "bomb quota reached");
            return outbox;
        }
        let pos = player.pos;
        if self.bombs.values().any(|b| b.pos == pos) {
            return outbox;
        }

        self.next_bomb += 1;
        let bomb = Bomb {
            id: BombId(self.next_bomb),
            owner: player_id,
            pos,
            placed_at: now,
            fuse: self.config.bomb_fuse,
        };
        let view = bomb.view();
        self.bombs.insert(bomb.id, bomb);
        tracing::debug!(room_id = %self.id, %player_id, bomb_id = %view.id, %pos, "bomb placed");

        outbox.push(
            self.targets(Recipient::All),
            self.envelope(ServerEvent::BombPlaced(view))
                .caused_by(player_id),
        );
        outbox
    }
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// Result of a player leaving.
#[derive(Debug)]
pub struct Departure {
    pub outbox: Outbox,
    /// The room has no players left and must be removed from the registry.
    pub now_empty: bool,
}

/// Result of one simulation step.
#[derive(Debug, Default)]
pub struct StepOutcome {
    pub outbox: Outbox,
    /// The room finished long enough ago to be torn down.
    pub expired: bool,
}

/// One independent match instance.
pub struct Room {
    id: RoomId,
    /// Creation order within the registry, used to keep listings stable.
    seq: u64,
    created_at_ms: u64,
    inner: Mutex<RoomInner>,
}

impl Room {
    pub fn new(id: RoomId, seq: u64, config: RoomConfig, terrain: Terrain) -> Self {
        Self {
            inner: Mutex::new(RoomInner {
                id: id.clone(),
                config,
                state: MatchState::Waiting,
                terrain,
                players: BTreeMap::new(),
                bombs: BTreeMap::new(),
                sessions: BTreeMap::new(),
                waiting_since: None,
                countdown_since: None,
                finished_at: None,
                next_bomb: 0,
                closed: false,
            }),
            id,
            seq,
            created_at_ms: epoch_millis(),
        }
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }

    /// A panic while the lock was held leaves the room usable: every
    /// operation leaves the fields consistent before it can panic.
    pub(crate) fn lock(&self) -> MutexGuard<'_, RoomInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seats a player.
    ///
    /// The joiner receives `welcome` and `gameState`; everyone else
    /// receives `playerJoined`. Reaching capacity starts the countdown at
    /// once; reaching two players starts the waiting timer.
    ///
    /// # Errors
    /// - [`RoomError::Closed`] if the room is being removed
    /// - [`RoomError::RoomFull`] if the room is at capacity
    pub fn join(
        &self,
        player_id: PlayerId,
        name: &str,
        session: Session,
        now: Instant,
    ) -> Result<Outbox, RoomError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(RoomError::Closed(self.id.clone()));
        }
        if inner.players.len() >= inner.config.max_players {
            return Err(RoomError::RoomFull(self.id.clone()));
        }

        let spawn = inner.terrain.spawn_for(inner.players.len());
        let player = Player {
            id: player_id,
            name: name.to_string(),
            pos: spawn,
            lives: inner.config.starting_lives,
            score: 0,
            power_ups: PowerUps::default(),
            last_seen: now,
        };
        let joined = player.view();
        inner.players.insert(player_id, player);
        inner.sessions.insert(player_id, session.clone());
        tracing::info!(room_id = %self.id, %player_id, %name, %spawn, players = inner.players.len(), "player joined");

        let mut outbox = Outbox::new();
        outbox.push(
            vec![session.clone()],
            inner
                .envelope(ServerEvent::Welcome {
                    player_id,
                    room_id: self.id.clone(),
                    room: inner.room_view(),
                })
                .to(player_id),
        );
        outbox.push(
            vec![session],
            inner
                .envelope(ServerEvent::GameState(inner.game_state()))
                .to(player_id),
        );
        outbox.push(
            inner.targets(Recipient::AllExcept(player_id)),
            inner
                .envelope(ServerEvent::PlayerJoined(joined))
                .caused_by(player_id),
        );

        if inner.state == MatchState::Waiting {
            let count = inner.players.len();
            if count >= inner.config.max_players {
                inner.start_countdown(now, &mut outbox);
            } else if count >= MIN_PLAYERS_TO_START && inner.waiting_since.is_none() {
                inner.waiting_since = Some(now);
            }
        }
        Ok(outbox)
    }

    /// Removes a player, tells the others, and closes the player's session
    /// once the outbox is flushed.
    ///
    /// # Errors
    /// [`RoomError::NotInRoom`] if the player already left.
    pub fn leave(&self, player_id: PlayerId, now: Instant) -> Result<Departure, RoomError> {
        let mut inner = self.lock();
        let mut outbox = Outbox::new();
        if !inner.remove_player(player_id, now, &mut outbox) {
            return Err(RoomError::NotInRoom(player_id, self.id.clone()));
        }
        Ok(Departure {
            outbox,
            now_empty: inner.closed,
        })
    }

    /// Applies one player action. Actions that the rules forbid (walking
    /// into a wall, a bomb over quota) come back as an empty outbox.
    ///
    /// # Errors
    /// - [`RoomError::Closed`] if the room is being removed
    /// - [`RoomError::NotInRoom`] if the player is not seated here
    pub fn apply(
        &self,
        player_id: PlayerId,
        action: Action,
        now: Instant,
    ) -> Result<Outbox, RoomError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(RoomError::Closed(self.id.clone()));
        }
        let Some(player) = inner.players.get_mut(&player_id) else {
            return Err(RoomError::NotInRoom(player_id, self.id.clone()));
        };
        player.last_seen = now;
        let name = player.name.clone();

        Ok(match action {
            Action::Move { direction } => inner.try_move(player_id, direction),
            Action::PlaceBomb => inner.try_place_bomb(player_id, now),
            Action::Chat { text } => {
                let mut outbox = Outbox::new();
                outbox.push(
                    inner.targets(Recipient::All),
                    inner
                        .envelope(ServerEvent::Chat(ChatLine {
                            player_id,
                            player_name: name,
                            message: text,
                            timestamp: epoch_millis(),
                        }))
                        .caused_by(player_id),
                );
                outbox
            }
            Action::Ping => {
                let mut outbox = Outbox::new();
                outbox.push(
                    inner.targets(Recipient::Player(player_id)),
                    inner.envelope(ServerEvent::Pong).to(player_id),
                );
                outbox
            }
        })
    }

    /// Runs one simulation step: state-machine transitions, bomb
    /// resolution and end-of-match detection.
    pub fn step(&self, now: Instant) -> StepOutcome {
        self.lock().step(now)
    }

    /// Removes every player whose last activity is older than `timeout`.
    pub fn evict_idle(&self, now: Instant, timeout: Duration) -> Departure {
        let mut inner = self.lock();
        let idle: Vec<PlayerId> = inner
            .players
            .values()
            .filter(|p| now.saturating_duration_since(p.last_seen) > timeout)
            .map(|p| p.id)
            .collect();
        let mut outbox = Outbox::new();
        for player_id in idle {
            tracing::info!(room_id = %self.id, %player_id, "player timed out");
            inner.remove_player(player_id, now, &mut outbox);
        }
        Departure {
            outbox,
            now_empty: inner.players.is_empty(),
        }
    }

    /// Marks the room closed and hands back its sessions for teardown.
    /// Players stay listed so the last broadcast state remains readable.
    pub fn close(&self) -> Outbox {
        let mut inner = self.lock();
        inner.closed = true;
        let mut outbox = Outbox::new();
        for session in std::mem::take(&mut inner.sessions).into_values() {
            outbox.close_after(session);
        }
        outbox
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Open for auto-matching: waiting, not full, not closed.
    pub fn is_joinable(&self) -> bool {
        let inner = self.lock();
        !inner.closed
            && inner.state == MatchState::Waiting
            && inner.players.len() < inner.config.max_players
    }

    pub fn state(&self) -> MatchState {
        self.lock().state
    }

    pub fn player_count(&self) -> usize {
        self.lock().players.len()
    }

    pub fn max_players(&self) -> usize {
        self.lock().config.max_players
    }

    pub fn player(&self, player_id: PlayerId) -> Option<PlayerView> {
        self.lock().players.get(&player_id).map(Player::view)
    }

    /// Live bombs owned by `player_id`.
    pub fn bombs_of(&self, player_id: PlayerId) -> Vec<BombView> {
        self.lock()
            .bombs
            .values()
            .filter(|b| b.owner == player_id)
            .map(Bomb::view)
            .collect()
    }

    pub fn terrain(&self) -> Terrain {
        self.lock().terrain.clone()
    }

    pub fn view(&self) -> RoomView {
        self.lock().room_view()
    }

    pub fn summary(&self) -> RoomSummary {
        let inner = self.lock();
        RoomSummary {
            id: self.id.clone(),
            player_count: inner.players.len(),
            max_players: inner.config.max_players,
            state: inner.state,
            players: inner
                .players
                .iter()
                .map(|(id, p)| (*id, p.name.clone()))
                .collect(),
            created_at: self.created_at_ms,
        }
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("id", &self.id)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bombforge_session::{SessionConfig, SessionReceiver};

    /// 9×9 with an open 7×7 floor, so a range-3 blast from the centre
    /// reaches every arm in full.
    fn open_9x9() -> Terrain {
        Terrain::from_ascii(&[
            "#########",
            "#.......#",
            "#.......#",
            "#.......#",
            "#.......#",
            "#.......#",
            "#.......#",
            "#.......#",
            "#########",
        ])
        .unwrap()
    }

    fn seat(room: &Room, id: u64, now: Instant) -> (PlayerId, SessionReceiver) {
        let player_id = PlayerId(id);
        let (session, rx) =
            Session::open(player_id, room.id().clone(), &SessionConfig::default());
        room.join(player_id, &format!("p{id}"), session, now).unwrap();
        (player_id, rx)
    }

    fn playing_room(now: Instant) -> (Room, PlayerId, Vec<SessionReceiver>) {
        let room = Room::new(RoomId::from("r"), 1, RoomConfig::default(), open_9x9());
        let (a, rx_a) = seat(&room, 1, now);
        let (_, rx_b) = seat(&room, 2, now);
        room.lock().state = MatchState::Playing;
        (room, a, vec![rx_a, rx_b])
    }

    #[test]
    fn test_bomb_bonus_raises_the_quota() {
        let t = Instant::now();
        let (room, a, _rx) = playing_room(t);
        let mut inner = room.lock();
        inner.players.get_mut(&a).unwrap().power_ups.bombs = 1;

        assert_eq!(inner.try_place_bomb(a, t).kinds(), ["bombPlaced"]);
        inner.try_move(a, Direction::Right);
        assert_eq!(inner.try_place_bomb(a, t).kinds(), ["bombPlaced"]);
        inner.try_move(a, Direction::Right);
        assert!(inner.try_place_bomb(a, t).is_empty(), "third bomb over quota");
        assert_eq!(inner.bombs.len(), 2);
    }

    #[test]
    fn test_flame_bonus_extends_the_blast() {
        let t = Instant::now();
        let (room, a, _rx) = playing_room(t);
        let mut inner = room.lock();
        {
            let player = inner.players.get_mut(&a).unwrap();
            player.power_ups.flames = 1;
            player.pos = Position::new(4, 4);
        }
        assert!(!inner.try_place_bomb(a, t).is_empty());

        let fuse = inner.config.bomb_fuse;
        let outcome = inner.step(t + fuse);
        let explosions = outcome
            .outbox
            .envelopes()
            .find_map(|e| match &e.event {
                ServerEvent::BombExploded { explosions, .. } => Some(explosions.clone()),
                _ => None,
            })
            .expect("bomb should explode");
        assert_eq!(explosions.len(), 1 + 4 * 3);
        for p in [(4, 1), (4, 7), (1, 4), (7, 4)] {
            assert!(explosions.contains(&Position::new(p.0, p.1)), "missing {p:?}");
        }
        assert_eq!(inner.players[&a].lives, 2);
    }
}
