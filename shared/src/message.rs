//! Typed message envelopes carried inside frames
//!
//! Envelopes are JSON objects tagged by a `type` field. Unknown tags decode to
//! the `Unknown` variant so older peers keep working when the protocol grows.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Open key/value mapping used for state fragments and snapshots on the wire
pub type StateMap = serde_json::Map<String, serde_json::Value>;

/// Liveness probe a client writes in place of an envelope. It is not valid
/// JSON, so the server drops it as undecodable and sends nothing back.
pub const PING_SENTINEL: &[u8] = b"ping";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Action {
        #[serde(default)]
        data: StateMap,
    },
    Chat {
        #[serde(default)]
        message: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Connection {
        id: u32,
    },
    GameStart,
    GameUpdate {
        state: StateMap,
    },
    Chat {
        sender_id: u32,
        message: String,
    },
    Ack {
        message_type: String,
    },
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Action { .. } => "action",
            ClientMessage::Chat { .. } => "chat",
            ClientMessage::Unknown => "unknown",
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        encode(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        decode(bytes)
    }
}

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Connection { .. } => "connection",
            ServerMessage::GameStart => "game_start",
            ServerMessage::GameUpdate { .. } => "game_update",
            ServerMessage::Chat { .. } => "chat",
            ServerMessage::Ack { .. } => "ack",
            ServerMessage::Unknown => "unknown",
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        encode(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        decode(bytes)
    }
}

/// Raw `type` tag of an envelope, kept for messages that decode to `Unknown`
pub fn envelope_type(bytes: &[u8]) -> Option<String> {
    #[derive(Deserialize)]
    struct Tag {
        #[serde(rename = "type")]
        kind: String,
    }
    serde_json::from_slice::<Tag>(bytes).ok().map(|tag| tag.kind)
}

fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(message).map_err(ProtocolError::Encode)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    serde_json::from_slice(bytes).map_err(ProtocolError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_wire_shape() {
        let mut data = StateMap::new();
        data.insert("hp".to_string(), json!(7));
        let bytes = ClientMessage::Action { data }.to_bytes().unwrap();

        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value, json!({"type": "action", "data": {"hp": 7}}));
    }

    #[test]
    fn test_server_messages_use_snake_case_tags() {
        let cases = [
            (ServerMessage::Connection { id: 3 }, json!({"type": "connection", "id": 3})),
            (ServerMessage::GameStart, json!({"type": "game_start"})),
            (
                ServerMessage::Chat {
                    sender_id: 2,
                    message: "hi".to_string(),
                },
                json!({"type": "chat", "sender_id": 2, "message": "hi"}),
            ),
            (
                ServerMessage::Ack {
                    message_type: "action".to_string(),
                },
                json!({"type": "ack", "message_type": "action"}),
            ),
        ];

        for (message, expected) in cases {
            let value: serde_json::Value =
                serde_json::from_slice(&message.to_bytes().unwrap()).unwrap();
            assert_eq!(value, expected);
        }
    }

    #[test]
    fn test_game_update_decodes_state() {
        let bytes = br#"{"type":"game_update","state":{"current_turn":4,"players":[]}}"#;
        match ServerMessage::from_bytes(bytes).unwrap() {
            ServerMessage::GameUpdate { state } => {
                assert_eq!(state.get("current_turn"), Some(&json!(4)));
                assert_eq!(state.get("players"), Some(&json!([])));
            }
            other => panic!("Expected game_update, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_types_decode_to_unknown() {
        let server = ServerMessage::from_bytes(br#"{"type":"weather","rain":true}"#).unwrap();
        assert_eq!(server, ServerMessage::Unknown);

        let client = ClientMessage::from_bytes(br#"{"type":"emote"}"#).unwrap();
        assert_eq!(client, ClientMessage::Unknown);
        assert_eq!(client.kind(), "unknown");
    }

    #[test]
    fn test_envelope_type_keeps_raw_tag() {
        assert_eq!(envelope_type(br#"{"type":"emote","x":1}"#), Some("emote".to_string()));
        assert_eq!(envelope_type(br#"{"data":{}}"#), None);
        assert_eq!(envelope_type(PING_SENTINEL), None);
    }

    #[test]
    fn test_chat_without_message_defaults_to_empty() {
        let message = ClientMessage::from_bytes(br#"{"type":"chat"}"#).unwrap();
        assert_eq!(
            message,
            ClientMessage::Chat {
                message: String::new()
            }
        );
    }

    #[test]
    fn test_ping_sentinel_is_not_an_envelope() {
        assert!(matches!(
            ClientMessage::from_bytes(PING_SENTINEL),
            Err(ProtocolError::Decode(_))
        ));
    }

    #[test]
    fn test_missing_type_is_rejected() {
        assert!(ServerMessage::from_bytes(br#"{"id":1}"#).is_err());
    }
}
