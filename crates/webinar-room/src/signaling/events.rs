//! Broadcast events received from the media server

use super::protocol::{Participant, RemoteProducer};
use crate::{Error, Result};
use serde::Deserialize;
use serde_json::Value;

/// Broadcast event names
pub mod names {
    /// A participant entered the room
    pub const USER_JOINED: &str = "userJoined";
    /// A participant left the room
    pub const USER_LEFT: &str = "userLeft";
    /// Producers became available
    pub const NEW_PRODUCERS: &str = "newProducers";
    /// A producer closed
    pub const PRODUCER_CLOSED: &str = "producerClosed";
    /// Host ended the call
    pub const CALL_ENDED: &str = "callEnded";
    /// Someone raised a hand
    pub const HAND_RAISE: &str = "handRaise";
}

/// Typed room broadcast
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    /// Participant joined
    UserJoined(Participant),
    /// Participant left
    UserLeft(Participant),
    /// Producers announced
    NewProducers(Vec<RemoteProducer>),
    /// Producer closed
    ProducerClosed {
        /// Closed producer id
        producer_id: String,
    },
    /// Host ended the call
    CallEnded,
    /// Hand raised
    HandRaise {
        /// Raising user, when the server includes it
        user_id: Option<String>,
        /// Display name of the raiser
        name: String,
    },
}

#[derive(Deserialize)]
struct UserPayload {
    user: Participant,
}

#[derive(Deserialize)]
struct ProducersPayload {
    producers: Vec<RemoteProducer>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProducerClosedPayload {
    producer_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HandRaisePayload {
    #[serde(default)]
    user_id: Option<String>,
    name: String,
}

impl RoomEvent {
    /// Decode a broadcast
    ///
    /// Returns `Ok(None)` for event names this session does not handle.
    pub fn parse(method: &str, params: Value) -> Result<Option<Self>> {
        let event = match method {
            names::USER_JOINED => {
                RoomEvent::UserJoined(decode::<UserPayload>(method, params)?.user)
            }
            names::USER_LEFT => RoomEvent::UserLeft(decode::<UserPayload>(method, params)?.user),
            names::NEW_PRODUCERS => {
                RoomEvent::NewProducers(decode::<ProducersPayload>(method, params)?.producers)
            }
            names::PRODUCER_CLOSED => RoomEvent::ProducerClosed {
                producer_id: decode::<ProducerClosedPayload>(method, params)?.producer_id,
            },
            names::CALL_ENDED => RoomEvent::CallEnded,
            names::HAND_RAISE => {
                let payload = decode::<HandRaisePayload>(method, params)?;
                RoomEvent::HandRaise {
                    user_id: payload.user_id,
                    name: payload.name,
                }
            }
            _ => return Ok(None),
        };

        Ok(Some(event))
    }

    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            RoomEvent::UserJoined(_) => names::USER_JOINED,
            RoomEvent::UserLeft(_) => names::USER_LEFT,
            RoomEvent::NewProducers(_) => names::NEW_PRODUCERS,
            RoomEvent::ProducerClosed { .. } => names::PRODUCER_CLOSED,
            RoomEvent::CallEnded => names::CALL_ENDED,
            RoomEvent::HandRaise { .. } => names::HAND_RAISE,
        }
    }
}

fn decode<T: for<'de> Deserialize<'de>>(method: &str, params: Value) -> Result<T> {
    serde_json::from_value(params)
        .map_err(|e| Error::SerializationError(format!("Invalid {} payload: {}", method, e)))
}

/// Why the channel went down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `disconnect()` was called locally
    ClientInitiated,
    /// The link closed or failed underneath us
    ConnectionLost,
}

/// Everything the channel reports to its owner
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Room broadcast
    Room(RoomEvent),
    /// Channel closed; emitted once
    Disconnected(DisconnectReason),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaKind, MediaVariant};
    use crate::signaling::protocol::ParticipantRole;
    use serde_json::json;

    #[test]
    fn test_parse_new_producers() {
        let event = RoomEvent::parse(
            "newProducers",
            json!({"producers": [{"producerId": "p1", "kind": "video", "variant": "screen"}]}),
        )
        .unwrap()
        .unwrap();

        assert_eq!(
            event,
            RoomEvent::NewProducers(vec![RemoteProducer {
                producer_id: "p1".to_string(),
                kind: MediaKind::Video,
                variant: MediaVariant::Screen,
            }])
        );
        assert_eq!(event.name(), "newProducers");
    }

    #[test]
    fn test_parse_user_left_host() {
        let event = RoomEvent::parse(
            "userLeft",
            json!({
                "user": {"id": "h1", "firstName": "Grace", "lastName": "Hopper", "role": "host"}
            }),
        )
        .unwrap()
        .unwrap();

        match event {
            RoomEvent::UserLeft(p) => assert_eq!(p.role, ParticipantRole::Host),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_call_ended_ignores_payload() {
        assert_eq!(
            RoomEvent::parse("callEnded", Value::Null).unwrap(),
            Some(RoomEvent::CallEnded)
        );
    }

    #[test]
    fn test_unknown_event_is_ignored() {
        assert_eq!(RoomEvent::parse("recordingStarted", json!({})).unwrap(), None);
    }

    #[test]
    fn test_malformed_payload_is_error() {
        let err = RoomEvent::parse("producerClosed", json!({"id": 4})).unwrap_err();
        assert!(matches!(err, Error::SerializationError(_)));
    }
}
