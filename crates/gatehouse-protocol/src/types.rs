//! Control-plane message types.
//!
//! Everything here is serialized with serde; the JSON shapes are part of
//! the client contract and are pinned by the tests at the bottom.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identity of an authenticated player.
///
/// Assigned by the server's authenticator once the handshake succeeds
/// and used as the key of the active-session map. Serializes as a bare
/// number.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// HTTP-style codes carried by [`SystemMessage::Error`].
pub mod error_codes {
    /// The first frame was not a handshake, or the version didn't match.
    pub const BAD_HANDSHAKE: u16 = 400;
    /// The authenticator rejected the token.
    pub const UNAUTHORIZED: u16 = 401;
    /// The authenticated identity already has a live session.
    pub const ALREADY_CONNECTED: u16 = 409;
    /// Too many connections from the client's address.
    pub const TOO_MANY_CONNECTIONS: u16 = 429;
}

/// Control messages exchanged between client and server.
///
/// Internally tagged, so a heartbeat is
/// `{ "type": "Heartbeat", "client_time": 5000 }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SystemMessage {
    /// Client → Server, first frame of every connection.
    ///
    /// `token` goes to the authenticator. `locale` picks the language of
    /// server-initiated text (disconnect reasons). `account_id` is the
    /// platform account the client claims, used for lookups only.
    Handshake {
        version: u32,
        token: Option<String>,
        #[serde(default)]
        locale: Option<String>,
        #[serde(default)]
        account_id: Option<String>,
    },

    /// Server → Client: authenticated and active.
    HandshakeAck { player_id: PlayerId, server_time: u64 },

    /// Either direction: the connection is about to close.
    Disconnect { reason: String },

    /// Client → Server keep-alive.
    Heartbeat { client_time: u64 },

    /// Server → Client keep-alive reply, echoing `client_time` for RTT.
    HeartbeatAck { client_time: u64, server_time: u64 },

    /// Server → Client failure notice. See [`error_codes`].
    Error { code: u16, message: String },
}

/// The top-level frame. Every message on the wire is an `Envelope`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Per-direction sequence number.
    pub seq: u64,

    /// Milliseconds since the sender's connection started.
    pub timestamp: u64,

    pub message: SystemMessage,
}

impl Envelope {
    pub fn new(seq: u64, timestamp: u64, message: SystemMessage) -> Self {
        Self {
            seq,
            timestamp,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_id_serializes_as_plain_number() {
        let json = serde_json::to_string(&PlayerId(42)).unwrap();
        assert_eq!(json, "42");
    }

    #[test]
    fn test_player_id_display() {
        assert_eq!(PlayerId(7).to_string(), "P-7");
    }

    #[test]
    fn test_handshake_json_format() {
        let msg = SystemMessage::Handshake {
            version: 1,
            token: Some("abc".into()),
            locale: Some("de_de".into()),
            account_id: Some("2535400000000001".into()),
        };
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "Handshake");
        assert_eq!(json["version"], 1);
        assert_eq!(json["token"], "abc");
        assert_eq!(json["locale"], "de_de");
        assert_eq!(json["account_id"], "2535400000000001");
    }

    #[test]
    fn test_handshake_without_optional_fields_decodes() {
        // Older clients only send version and token.
        let msg: SystemMessage =
            serde_json::from_str(r#"{"type":"Handshake","version":1,"token":null}"#)
                .unwrap();
        assert_eq!(
            msg,
            SystemMessage::Handshake {
                version: 1,
                token: None,
                locale: None,
                account_id: None,
            }
        );
    }

    #[test]
    fn test_handshake_ack_json_format() {
        let msg = SystemMessage::HandshakeAck {
            player_id: PlayerId(42),
            server_time: 15000,
        };
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "HandshakeAck");
        assert_eq!(json["player_id"], 42);
        assert_eq!(json["server_time"], 15000);
    }

    #[test]
    fn test_error_json_format() {
        let msg = SystemMessage::Error {
            code: error_codes::TOO_MANY_CONNECTIONS,
            message: "too many connections".into(),
        };
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "Error");
        assert_eq!(json["code"], 429);
        assert_eq!(json["message"], "too many connections");
    }

    #[test]
    fn test_disconnect_json_format() {
        let msg = SystemMessage::Disconnect {
            reason: "server shutting down".into(),
        };
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "Disconnect");
        assert_eq!(json["reason"], "server shutting down");
    }

    #[test]
    fn test_envelope_json_format() {
        let env = Envelope::new(3, 250, SystemMessage::Heartbeat { client_time: 240 });
        let json: serde_json::Value = serde_json::to_value(&env).unwrap();

        assert_eq!(json["seq"], 3);
        assert_eq!(json["timestamp"], 250);
        assert_eq!(json["message"]["type"], "Heartbeat");
        assert_eq!(json["message"]["client_time"], 240);
    }
}
