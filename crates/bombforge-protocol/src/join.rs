//! The join handshake inputs.
//!
//! A client joins by opening the WebSocket with a query string:
//! `/ws?name=ada&room=lobby`. `name` is required; `room` is optional and,
//! when absent, the server auto-matches into any room with free capacity.

use crate::{ProtocolError, RoomId};

/// Parsed join parameters, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinRequest {
    pub name: Option<String>,
    pub room: Option<RoomId>,
}

impl JoinRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            room: None,
        }
    }

    pub fn in_room(mut self, room: impl Into<RoomId>) -> Self {
        self.room = Some(room.into());
        self
    }

    /// Parses a URL query string (without the leading `?`).
    ///
    /// Percent-encoding and `+` are decoded. Empty values count as absent,
    /// and unknown keys are ignored.
    pub fn from_query(query: &str) -> Self {
        let mut request = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                "name" => request.name = Some(value.to_string()),
                "room" => request.room = Some(RoomId::from(value)),
                _ => {}
            }
        }
        request
    }

    /// Returns the display name, or an error if none was supplied.
    pub fn player_name(&self) -> Result<&str, ProtocolError> {
        self.name
            .as_deref()
            .ok_or_else(|| ProtocolError::InvalidMessage("Player name is required".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_query_reads_name_and_room() {
        let req = JoinRequest::from_query("name=ada&room=lobby");
        assert_eq!(req.name.as_deref(), Some("ada"));
        assert_eq!(req.room, Some(RoomId::from("lobby")));
    }

    #[test]
    fn test_from_query_decodes_percent_and_plus() {
        let req = JoinRequest::from_query("name=Ada+L%C3%B6vel");
        assert_eq!(req.name.as_deref(), Some("Ada Lövel"));
        assert_eq!(req.room, None);
    }

    #[test]
    fn test_blank_name_is_missing() {
        let req = JoinRequest::from_query("name=%20%20&room=");
        assert!(req.name.is_none());
        assert!(req.room.is_none());
        assert!(matches!(req.player_name(), Err(ProtocolError::InvalidMessage(_))));
    }

    #[test]
    fn test_player_name_ok() {
        let req = JoinRequest::new("bob").in_room("r1");
        assert_eq!(req.player_name().unwrap(), "bob");
        assert_eq!(req.room.unwrap().as_str(), "r1");
    }
}
