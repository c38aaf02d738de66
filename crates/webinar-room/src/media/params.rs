//! Opaque negotiation blobs exchanged between the server and the media engine
//!
//! The session forwards these verbatim; only the engine interprets them.

use super::{MediaKind, MediaVariant};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Router or device RTP capabilities
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RtpCapabilities(pub Value);

/// RTP parameters of a producer or consumer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RtpParameters(pub Value);

/// DTLS parameters sent on transport connect
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DtlsParameters(pub Value);

/// Server-side transport parameters (`createWebRtcTransport` result)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportOptions {
    /// Server transport identifier
    pub id: String,

    /// ICE parameters
    pub ice_parameters: Value,

    /// ICE candidates
    pub ice_candidates: Value,

    /// Server DTLS parameters
    pub dtls_parameters: DtlsParameters,

    /// SCTP parameters (data channels)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sctp_parameters: Option<Value>,
}

/// Parameters needed to create a local consumer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerOptions {
    /// Server consumer identifier
    pub id: String,

    /// Remote producer this consumer reads from
    pub producer_id: String,

    /// Media kind
    pub kind: MediaKind,

    /// RTP parameters chosen by the server
    pub rtp_parameters: RtpParameters,

    /// Semantic variant of the remote track
    pub variant: MediaVariant,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transport_options_from_server() {
        let value = json!({
            "id": "t-1",
            "iceParameters": {"usernameFragment": "u", "password": "p"},
            "iceCandidates": [],
            "dtlsParameters": {"role": "auto", "fingerprints": []}
        });

        let options: TransportOptions = serde_json::from_value(value).unwrap();
        assert_eq!(options.id, "t-1");
        assert!(options.sctp_parameters.is_none());
        assert_eq!(options.dtls_parameters.0["role"], "auto");
    }

    #[test]
    fn test_opaque_blobs_are_transparent() {
        let caps = RtpCapabilities(json!({"codecs": []}));
        assert_eq!(serde_json::to_string(&caps).unwrap(), r#"{"codecs":[]}"#);
    }
}
