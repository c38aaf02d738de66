//! JSON-RPC 2.0 framing and the webinar signaling payloads

use crate::media::{MediaKind, MediaVariant, RtpCapabilities, RtpParameters, DtlsParameters};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC 2.0 protocol version
pub const JSONRPC_VERSION: &str = "2.0";

/// Signaling method names
pub mod methods {
    /// Host opens the room
    pub const CREATE_ROOM: &str = "createRoom";
    /// Attendee joins the room
    pub const JOIN_ROOM: &str = "joinRoom";
    /// Host ends the call for everyone
    pub const EXIT_ROOM: &str = "exitRoom";
    /// Single participant leaves
    pub const LEAVE_ROOM: &str = "leaveRoom";
    /// Current participant list
    pub const GET_IN_ROOM_USERS: &str = "getInRoomUsers";
    /// Router capabilities for device negotiation
    pub const GET_ROUTER_RTP_CAPABILITIES: &str = "getRouterRtpCapabilities";
    /// Server transport parameters (once per direction)
    pub const CREATE_WEBRTC_TRANSPORT: &str = "createWebRtcTransport";
    /// DTLS parameter exchange
    pub const CONNECT_TRANSPORT: &str = "connectTransport";
    /// Register a local producer
    pub const PRODUCE: &str = "produce";
    /// Create a consumer for a remote producer
    pub const CONSUME: &str = "consume";
    /// Current remote producer list
    pub const GET_PRODUCERS: &str = "getProducers";
    /// Local producer closed (fire-and-forget)
    pub const CLOSE_PRODUCER: &str = "closeProducer";
    /// Raise hand (fire-and-forget)
    pub const HANDS_UP: &str = "handsUp";
}

/// JSON-RPC 2.0 error codes
pub mod error_codes {
    /// Application-level rejection
    pub const SERVER_ERROR: i32 = -32000;
}

/// Outbound JSON-RPC 2.0 request or notification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcRequest {
    /// Protocol version (must be "2.0")
    pub jsonrpc: String,

    /// Method name to invoke
    pub method: String,

    /// Method parameters
    pub params: Value,

    /// Correlation id (absent for notifications)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
}

impl JsonRpcRequest {
    /// Build a request (`id: Some`) or notification (`id: None`)
    pub fn new(method: &str, params: Value, id: Option<u64>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params,
            id,
        }
    }

    /// Convert to JSON text
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(|e| {
            crate::Error::SerializationError(format!(
                "Failed to serialize {} request: {}",
                self.method, e
            ))
        })
    }
}

/// JSON-RPC 2.0 error object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorObject {
    /// Error code
    pub code: i32,

    /// Human-readable error message
    pub message: String,

    /// Additional error data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Any frame the server can send
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum InboundFrame {
    /// Broadcast event (JSON-RPC notification)
    Notification {
        /// Event name
        method: String,
        /// Event payload
        #[serde(default)]
        params: Value,
    },

    /// Reply to one of our requests
    Response {
        /// Correlation id
        id: u64,
        /// Success payload
        #[serde(default)]
        result: Option<Value>,
        /// Error payload
        #[serde(default)]
        error: Option<ErrorObject>,
    },
}

impl InboundFrame {
    /// Parse an inbound text frame
    pub fn from_json(text: &str) -> crate::Result<Self> {
        serde_json::from_str(text).map_err(|e| {
            crate::Error::SerializationError(format!("Failed to parse signaling frame: {}", e))
        })
    }
}

/// Outcome carried by a response frame
///
/// Besides the JSON-RPC `error` member, servers also signal failure with an
/// `{"error": "..."}` result body; both reject the request.
pub fn response_outcome(
    result: Option<Value>,
    error: Option<ErrorObject>,
) -> Result<Value, ErrorObject> {
    if let Some(error) = error {
        return Err(error);
    }

    let result = result.unwrap_or(Value::Null);
    if let Some(message) = result.get("error").filter(|e| !e.is_null()) {
        let message = match message {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Err(ErrorObject {
            code: error_codes::SERVER_ERROR,
            message,
            data: None,
        });
    }

    Ok(result)
}

/// Role of a participant in the room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    /// Runs the webinar; leaving ends media for everyone
    Host,
    /// Regular participant
    Attendee,
}

/// A participant in the room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// User identifier
    pub id: String,

    /// First name
    #[serde(default)]
    pub first_name: String,

    /// Last name
    #[serde(default)]
    pub last_name: String,

    /// Role in the room
    pub role: ParticipantRole,
}

impl Participant {
    /// "First Last", trimmed
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    /// Whether this participant hosts the room
    pub fn is_host(&self) -> bool {
        self.role == ParticipantRole::Host
    }
}

/// A producer advertised by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteProducer {
    /// Server producer id
    pub producer_id: String,

    /// Media kind
    pub kind: MediaKind,

    /// Semantic variant
    pub variant: MediaVariant,
}

/// Params carrying only the room id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomParams {
    /// Room identifier
    pub room_id: String,
}

/// `createRoom` / `joinRoom` params
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomParams {
    /// Room identifier
    pub room_id: String,

    /// Joining user
    pub user: Participant,
}

/// `createRoom` / `joinRoom` result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JoinRoomResponse {
    /// False when the server refuses entry
    pub status: bool,

    /// Reason shown to the user on refusal
    #[serde(default)]
    pub message: Option<String>,
}

/// `getInRoomUsers` result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InRoomUsersResponse {
    /// Participants currently in the room
    #[serde(default)]
    pub users: Vec<Participant>,
}

/// `getProducers` result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProducersResponse {
    /// Producers currently live in the room
    #[serde(default)]
    pub producers: Vec<RemoteProducer>,
}

/// `createWebRtcTransport` params
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransportParams {
    /// Room identifier
    pub room_id: String,

    /// True for the receive transport
    pub consumer: bool,

    /// Device capabilities (send transport only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtp_capabilities: Option<RtpCapabilities>,
}

/// `connectTransport` params
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectTransportParams {
    /// Room identifier
    pub room_id: String,

    /// Server transport id
    pub transport_id: String,

    /// Local DTLS parameters
    pub dtls_parameters: DtlsParameters,
}

/// `produce` params
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProduceParams {
    /// Room identifier
    pub room_id: String,

    /// Media kind
    pub kind: MediaKind,

    /// RTP parameters from the engine
    pub rtp_parameters: RtpParameters,

    /// Semantic variant
    pub variant: MediaVariant,

    /// Send transport id
    pub producer_transport_id: String,
}

/// `produce` result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProduceResponse {
    /// Server-assigned producer id
    pub producer_id: String,
}

/// `consume` params
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeParams {
    /// Room identifier
    pub room_id: String,

    /// Remote producer to consume
    pub producer_id: String,

    /// Local device capabilities
    pub rtp_capabilities: RtpCapabilities,

    /// Receive transport id
    pub consumer_transport_id: String,
}

/// `consume` result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeResponse {
    /// Server consumer id
    pub id: String,

    /// Echoed producer id (optional on the wire)
    #[serde(default)]
    pub producer_id: Option<String>,

    /// Media kind
    pub kind: MediaKind,

    /// RTP parameters
    pub rtp_parameters: RtpParameters,

    /// Semantic variant
    pub variant: MediaVariant,
}

/// `closeProducer` params
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CloseProducerParams {
    /// Room identifier
    pub room_id: String,

    /// Producer being closed
    pub producer_id: String,
}

/// `leaveRoom` params
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRoomParams {
    /// Room identifier
    pub room_id: String,

    /// Leaving user
    pub user_id: String,
}

/// `handsUp` params
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HandsUpParams {
    /// Room identifier
    pub room_id: String,

    /// Raising user
    pub user_id: String,

    /// Name shown to the room
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let req = JsonRpcRequest::new(methods::GET_PRODUCERS, json!({"roomId": "r1"}), Some(7));
        let text = req.to_json().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["method"], "getProducers");
        assert_eq!(value["id"], 7);

        let note = JsonRpcRequest::new(methods::CLOSE_PRODUCER, json!({}), None);
        assert!(!note.to_json().unwrap().contains("\"id\""));
    }

    #[test]
    fn test_inbound_frame_kinds() {
        let frame =
            InboundFrame::from_json(r#"{"jsonrpc":"2.0","result":{"ok":true},"id":3}"#).unwrap();
        assert!(matches!(frame, InboundFrame::Response { id: 3, .. }));

        let frame = InboundFrame::from_json(r#"{"jsonrpc":"2.0","method":"callEnded","params":{}}"#)
            .unwrap();
        assert!(matches!(
            frame,
            InboundFrame::Notification { ref method, .. } if method == "callEnded"
        ));

        assert!(InboundFrame::from_json(r#"{"jsonrpc":"2.0"}"#).is_err());
    }

    #[test]
    fn test_response_outcome_error_forms() {
        let err = response_outcome(
            None,
            Some(ErrorObject {
                code: error_codes::SERVER_ERROR,
                message: "no such room".to_string(),
                data: None,
            }),
        )
        .unwrap_err();
        assert_eq!(err.message, "no such room");

        let err = response_outcome(Some(json!({"error": "transport gone"})), None).unwrap_err();
        assert_eq!(err.message, "transport gone");

        let ok = response_outcome(Some(json!({"producerId": "p1", "error": null})), None).unwrap();
        assert_eq!(ok["producerId"], "p1");
    }

    #[test]
    fn test_participant_wire_shape() {
        let p: Participant = serde_json::from_value(json!({
            "id": "u1",
            "firstName": "Ada",
            "lastName": "Lovelace",
            "role": "host"
        }))
        .unwrap();
        assert!(p.is_host());
        assert_eq!(p.display_name(), "Ada Lovelace");

        let partial: Participant =
            serde_json::from_value(json!({"id": "u2", "role": "attendee"})).unwrap();
        assert_eq!(partial.display_name(), "");
    }

    #[test]
    fn test_join_response_rejection() {
        let resp: JoinRoomResponse =
            serde_json::from_value(json!({"status": false, "message": "Room closed"})).unwrap();
        assert!(!resp.status);
        assert_eq!(resp.message.as_deref(), Some("Room closed"));
    }
}
