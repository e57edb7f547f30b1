//! Core vocabulary shared by every layer: identifiers, grid primitives,
//! match states, and message recipients.
//!
//! These types travel on the wire, so their serde shape is part of the
//! contract with the browser client. The tests at the bottom pin it.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a player.
///
/// `#[serde(transparent)]` keeps it a plain number on the wire, so
/// `PlayerId(42)` is `42` in JSON and `"42"` when used as a map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player_{}", self.0)
    }
}

/// A unique identifier for a room.
///
/// Rooms are addressed by string because clients may name the room they
/// want to join (`?room=lobby`); generated rooms get `room_<n>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    /// Borrows the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoomId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RoomId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A unique identifier for a bomb within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BombId(pub u64);

impl fmt::Display for BombId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bomb_{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Recipient
// ---------------------------------------------------------------------------

/// Who should receive an outbound event.
///
/// Room operations pair every event they produce with a `Recipient`; the
/// room resolves it to concrete sessions before its lock is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// Every session in the room.
    All,
    /// One specific player.
    Player(PlayerId),
    /// Everyone except the given player (e.g. `playerJoined`).
    AllExcept(PlayerId),
}

impl Recipient {
    /// Returns `true` if `player` is addressed by this recipient.
    pub fn includes(&self, player: PlayerId) -> bool {
        match self {
            Self::All => true,
            Self::Player(p) => *p == player,
            Self::AllExcept(p) => *p != player,
        }
    }
}

// ---------------------------------------------------------------------------
// Grid primitives
// ---------------------------------------------------------------------------

/// A cell coordinate on the arena grid. `x` grows right, `y` grows down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The neighbouring cell one step in `direction`.
    pub fn step(self, direction: Direction) -> Self {
        self.offset(direction, 1)
    }

    /// The cell `distance` steps away in `direction`.
    pub fn offset(self, direction: Direction, distance: i32) -> Self {
        let (dx, dy) = direction.delta();
        Self::new(self.x + dx * distance, self.y + dy * distance)
    }

    /// Chebyshev (king-move) distance between two cells.
    pub fn chebyshev(self, other: Self) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }
}

/// Serialized as a `[x, y]` pair, the shape the client draws blasts from.
impl Serialize for Position {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        [self.x, self.y].serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Position {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let [x, y] = <[i32; 2]>::deserialize(deserializer)?;
        Ok(Self::new(x, y))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// One of the four cardinal directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Scan order used by blast propagation.
    pub const ALL: [Direction; 4] = [Self::Up, Self::Down, Self::Left, Self::Right];

    /// Unit grid offset `(dx, dy)`.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Self::Up => (0, -1),
            Self::Down => (0, 1),
            Self::Left => (-1, 0),
            Self::Right => (1, 0),
        }
    }
}

/// A terrain code. On the wire each cell is its numeric code
/// (`0` floor, `1` solid wall, `2` destructible block).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Tile {
    #[default]
    Floor = 0,
    Wall = 1,
    Block = 2,
}

impl Tile {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Floor),
            1 => Some(Self::Wall),
            2 => Some(Self::Block),
            _ => None,
        }
    }
}

impl Serialize for Tile {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for Tile {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        Self::from_code(code)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown terrain code {code}")))
    }
}

// ---------------------------------------------------------------------------
// MatchState
// ---------------------------------------------------------------------------

/// The phase of a room's match.
///
/// Transitions are strictly ordered, no skipping and no going back:
///
/// ```text
/// Waiting → Countdown → Playing → Finished
/// ```
///
/// Removal of the room is not a state; it can happen from any phase once
/// the room is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchState {
    Waiting,
    Countdown,
    Playing,
    Finished,
}

impl MatchState {
    /// The only state this one may advance to.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Waiting => Some(Self::Countdown),
            Self::Countdown => Some(Self::Playing),
            Self::Playing => Some(Self::Finished),
            Self::Finished => None,
        }
    }

    /// Returns `true` if transitioning to `target` is valid.
    pub fn can_transition_to(self, target: Self) -> bool {
        self.next() == Some(target)
    }
}

impl fmt::Display for MatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Waiting => "waiting",
            Self::Countdown => "countdown",
            Self::Playing => "playing",
            Self::Finished => "finished",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_id_serializes_as_plain_number() {
        assert_eq!(serde_json::to_string(&PlayerId(42)).unwrap(), "42");
        assert_eq!(PlayerId(7).to_string(), "player_7");
    }

    #[test]
    fn test_room_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&RoomId::from("room_3")).unwrap();
        assert_eq!(json, "\"room_3\"");
    }

    #[test]
    fn test_position_serializes_as_pair() {
        let json = serde_json::to_string(&Position::new(3, 5)).unwrap();
        assert_eq!(json, "[3,5]");
        let back: Position = serde_json::from_str("[1,2]").unwrap();
        assert_eq!(back, Position::new(1, 2));
    }

    #[test]
    fn test_position_offset_and_chebyshev() {
        let p = Position::new(3, 3);
        assert_eq!(p.step(Direction::Up), Position::new(3, 2));
        assert_eq!(p.offset(Direction::Right, 2), Position::new(5, 3));
        assert_eq!(p.chebyshev(Position::new(4, 1)), 2);
    }

    #[test]
    fn test_direction_parses_lowercase_only() {
        let d: Direction = serde_json::from_str("\"left\"").unwrap();
        assert_eq!(d, Direction::Left);
        assert!(serde_json::from_str::<Direction>("\"north\"").is_err());
    }

    #[test]
    fn test_tile_codes_match_client_map() {
        let row = vec![Tile::Floor, Tile::Wall, Tile::Block];
        assert_eq!(serde_json::to_string(&row).unwrap(), "[0,1,2]");
        assert!(serde_json::from_str::<Tile>("7").is_err());
    }

    #[test]
    fn test_match_state_next_follows_strict_order() {
        assert_eq!(MatchState::Waiting.next(), Some(MatchState::Countdown));
        assert_eq!(MatchState::Countdown.next(), Some(MatchState::Playing));
        assert_eq!(MatchState::Playing.next(), Some(MatchState::Finished));
        assert_eq!(MatchState::Finished.next(), None);
        assert!(!MatchState::Waiting.can_transition_to(MatchState::Playing));
        assert!(!MatchState::Finished.can_transition_to(MatchState::Waiting));
    }

    #[test]
    fn test_match_state_wire_name() {
        assert_eq!(serde_json::to_string(&MatchState::Playing).unwrap(), "\"playing\"");
        assert_eq!(MatchState::Countdown.to_string(), "countdown");
    }

    #[test]
    fn test_recipient_includes() {
        assert!(Recipient::All.includes(PlayerId(1)));
        assert!(Recipient::Player(PlayerId(1)).includes(PlayerId(1)));
        assert!(!Recipient::Player(PlayerId(1)).includes(PlayerId(2)));
        assert!(!Recipient::AllExcept(PlayerId(1)).includes(PlayerId(1)));
        assert!(Recipient::AllExcept(PlayerId(1)).includes(PlayerId(2)));
    }
}
