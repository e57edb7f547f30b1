//! Inbound and outbound message shapes.
//!
//! Every message on the wire is `{type, data, from?, to?, roomId?}`.
//! Inbound messages are decoded eagerly into [`ClientMessage`] and then
//! narrowed into the closed [`Action`] set; nothing deeper in the engine
//! ever probes raw JSON fields. Outbound events are [`ServerEvent`]s
//! wrapped in an [`Envelope`] that adds the routing metadata.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{BombId, Direction, MatchState, PlayerId, Position, ProtocolError, RoomId, Tile};

/// Row-major terrain snapshot, indexed `map[y][x]`.
pub type TileGrid = Vec<Vec<Tile>>;

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// A message sent by a client, as it appears on the wire.
///
/// Adjacently tagged: `{"type": "playerInput", "data": {...}}`. Unknown
/// `type` tags fail to decode and the message is rejected at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ClientMessage {
    Chat(ChatInput),
    PlayerInput(PlayerInput),
    Ping,
}

/// Payload of an inbound `chat` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatInput {
    pub message: String,
}

/// Payload of an inbound `playerInput` message.
///
/// Internally tagged by its own `type` field (`move` or `bomb`). The
/// optional `x`/`y` on a bomb request are accepted for compatibility but
/// ignored: bombs always land on the requester's current cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PlayerInput {
    Move {
        direction: Direction,
    },
    Bomb {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        x: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        y: Option<i32>,
    },
}

/// The closed set of things a seated player can ask the room to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Move { direction: Direction },
    PlaceBomb,
    Chat { text: String },
    Ping,
}

impl TryFrom<ClientMessage> for Action {
    type Error = ProtocolError;

    fn try_from(msg: ClientMessage) -> Result<Self, Self::Error> {
        match msg {
            ClientMessage::Chat(ChatInput { message }) => {
                if message.trim().is_empty() {
                    return Err(ProtocolError::InvalidMessage("chat message is empty".into()));
                }
                Ok(Self::Chat { text: message })
            }
            ClientMessage::PlayerInput(PlayerInput::Move { direction }) => {
                Ok(Self::Move { direction })
            }
            ClientMessage::PlayerInput(PlayerInput::Bomb { .. }) => Ok(Self::PlaceBomb),
            ClientMessage::Ping => Ok(Self::Ping),
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot views
// ---------------------------------------------------------------------------

/// Per-player modifiers picked up during a match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerUps {
    /// Extra simultaneous bombs.
    pub bombs: u32,
    /// Extra blast range.
    pub flames: u32,
    pub speed: u32,
}

/// A player as the client sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub lives: u32,
    pub score: u32,
    pub power_ups: PowerUps,
}

/// A live bomb as the client sees it. `timer` is the fuse in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BombView {
    pub id: BombId,
    pub x: i32,
    pub y: i32,
    pub player_id: PlayerId,
    pub timer: u64,
}

/// Full state sent to a player right after joining.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStateView {
    pub players: BTreeMap<PlayerId, PlayerView>,
    pub bombs: BTreeMap<BombId, BombView>,
    pub map: TileGrid,
    pub state: MatchState,
}

/// Room description embedded in `welcome`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomView {
    pub id: RoomId,
    pub state: MatchState,
    pub max_players: usize,
    pub players: BTreeMap<PlayerId, PlayerView>,
    pub bombs: BTreeMap<BombId, BombView>,
    pub map: TileGrid,
}

/// One line of the room listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: RoomId,
    pub player_count: usize,
    pub max_players: usize,
    pub state: MatchState,
    /// Player id → display name.
    pub players: BTreeMap<PlayerId, String>,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
}

/// A chat line relayed to the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatLine {
    pub player_id: PlayerId,
    pub player_name: String,
    pub message: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// An event pushed from the server to one or more sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    Welcome {
        player_id: PlayerId,
        room_id: RoomId,
        room: RoomView,
    },
    PlayerJoined(PlayerView),
    PlayerLeft {
        player_id: PlayerId,
    },
    GameState(GameStateView),
    Countdown {
        duration_ms: u64,
    },
    GameStarted {
        state: MatchState,
    },
    PlayerMoved {
        player_id: PlayerId,
        x: i32,
        y: i32,
    },
    BombPlaced(BombView),
    BombExploded {
        bomb_id: BombId,
        explosions: Vec<Position>,
        map: TileGrid,
        players: BTreeMap<PlayerId, PlayerView>,
    },
    GameEnded {
        state: MatchState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        winner: Option<PlayerView>,
    },
    Chat(ChatLine),
    Pong,
    Error {
        message: String,
    },
}

impl ServerEvent {
    /// Shorthand for an `error{message}` event.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { message: message.into() }
    }

    /// The wire `type` tag, handy for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Welcome { .. } => "welcome",
            Self::PlayerJoined(_) => "playerJoined",
            Self::PlayerLeft { .. } => "playerLeft",
            Self::GameState(_) => "gameState",
            Self::Countdown { .. } => "countdown",
            Self::GameStarted { .. } => "gameStarted",
            Self::PlayerMoved { .. } => "playerMoved",
            Self::BombPlaced(_) => "bombPlaced",
            Self::BombExploded { .. } => "bombExploded",
            Self::GameEnded { .. } => "gameEnded",
            Self::Chat(_) => "chat",
            Self::Pong => "pong",
            Self::Error { .. } => "error",
        }
    }
}

/// The outbound wire wrapper: `{type, data, from?, to?, roomId?}`.
///
/// The event's own `type`/`data` pair is flattened into the envelope so
/// the client sees one flat object.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(flatten)]
    pub event: ServerEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<PlayerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<PlayerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
}

impl Envelope {
    pub fn new(event: ServerEvent) -> Self {
        Self {
            event,
            from: None,
            to: None,
            room_id: None,
        }
    }

    /// Marks the player whose action caused this event.
    pub fn caused_by(mut self, player: PlayerId) -> Self {
        self.from = Some(player);
        self
    }

    /// Marks the single intended recipient.
    pub fn to(mut self, player: PlayerId) -> Self {
        self.to = Some(player);
        self
    }

    pub fn in_room(mut self, room: RoomId) -> Self {
        self.room_id = Some(room);
        self
    }
}
