//! Traits at the media-engine boundary
//!
//! These mirror the shape of a client-side SFU library: a device loaded from
//! router capabilities creates transports; transports call back into a
//! [`TransportListener`] when they need the server (`connect`, `produce`) and
//! when their connection state moves.

use super::params::{
    ConsumerOptions, DtlsParameters, RtpCapabilities, RtpParameters, TransportOptions,
};
use super::track::{MediaStream, MediaTrack};
use super::{MediaKind, MediaVariant};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Direction of a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportDirection {
    /// Outbound (producers)
    Send,
    /// Inbound (consumers)
    Recv,
}

impl std::fmt::Display for TransportDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportDirection::Send => write!(f, "send"),
            TransportDirection::Recv => write!(f, "recv"),
        }
    }
}

/// ICE/DTLS connection state of a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportConnectionState {
    /// Created, not yet connected
    New,
    /// Handshake in progress
    Connecting,
    /// Media can flow
    Connected,
    /// Connectivity lost
    Disconnected,
    /// Handshake failed
    Failed,
    /// Closed locally
    Closed,
}

/// Callbacks a transport raises towards the signaling side
#[async_trait]
pub trait TransportListener: Send + Sync {
    /// Transport needs its DTLS parameters delivered to the server
    async fn on_connect(&self, transport_id: &str, dtls_parameters: DtlsParameters) -> Result<()>;

    /// Send transport needs a server-assigned producer id
    async fn on_produce(
        &self,
        transport_id: &str,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
        variant: MediaVariant,
    ) -> Result<String>;

    /// Connection state changed
    fn on_connection_state_change(&self, transport_id: &str, state: TransportConnectionState);
}

/// Factory for negotiated devices (the client-side SFU library entry point)
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Create a device and load it with the router's capabilities
    async fn load_device(
        &self,
        router_capabilities: RtpCapabilities,
    ) -> Result<Arc<dyn MediaDevice>>;
}

/// A device loaded with negotiated capabilities
pub trait MediaDevice: Send + Sync {
    /// Local RTP capabilities (sent with `consume` and send-transport creation)
    fn rtp_capabilities(&self) -> RtpCapabilities;

    /// Build a local send transport from server parameters
    fn create_send_transport(
        &self,
        options: TransportOptions,
        listener: Arc<dyn TransportListener>,
    ) -> Result<Arc<dyn SendTransport>>;

    /// Build a local receive transport from server parameters
    fn create_recv_transport(
        &self,
        options: TransportOptions,
        listener: Arc<dyn TransportListener>,
    ) -> Result<Arc<dyn RecvTransport>>;
}

/// Outbound transport
#[async_trait]
pub trait SendTransport: Send + Sync {
    /// Transport identifier (server-assigned)
    fn id(&self) -> &str;

    /// Start sending a track; resolves once the server assigned a producer id
    async fn produce(&self, track: MediaTrack, variant: MediaVariant) -> Result<Arc<dyn Producer>>;

    /// Close the transport and every producer on it
    fn close(&self);

    /// Whether the transport is closed
    fn is_closed(&self) -> bool;
}

/// Inbound transport
#[async_trait]
pub trait RecvTransport: Send + Sync {
    /// Transport identifier (server-assigned)
    fn id(&self) -> &str;

    /// Create a consumer for a remote producer (starts paused)
    async fn consume(&self, options: ConsumerOptions) -> Result<Arc<dyn Consumer>>;

    /// Close the transport and every consumer on it
    fn close(&self);

    /// Whether the transport is closed
    fn is_closed(&self) -> bool;
}

/// Handle to one local track being sent
pub trait Producer: Send + Sync {
    /// Server-assigned producer id
    fn id(&self) -> &str;

    /// Media kind
    fn kind(&self) -> MediaKind;

    /// Track being sent
    fn track(&self) -> MediaTrack;

    /// Close the producer
    fn close(&self);

    /// Whether the producer is closed
    fn is_closed(&self) -> bool;
}

/// Handle to one remote track being received
#[async_trait]
pub trait Consumer: Send + Sync {
    /// Server consumer id
    fn id(&self) -> &str;

    /// Remote producer id
    fn producer_id(&self) -> &str;

    /// Media kind
    fn kind(&self) -> MediaKind;

    /// Received track
    fn track(&self) -> MediaTrack;

    /// Resume a paused consumer
    async fn resume(&self) -> Result<()>;

    /// Whether the consumer is paused
    fn is_paused(&self) -> bool;

    /// Close the consumer (stops its track)
    fn close(&self);

    /// Whether the consumer is closed
    fn is_closed(&self) -> bool;
}

/// Where local media comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureSource {
    /// Camera (getUserMedia video)
    Camera,
    /// Microphone (getUserMedia audio)
    Microphone,
    /// Display capture (getDisplayMedia)
    Display,
}

/// Capture constraints passed to [`MediaCapture::acquire`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConstraints {
    /// Width / height ratio (video only)
    pub aspect_ratio: Option<f64>,

    /// Target vertical resolution (video only)
    pub height: Option<u32>,

    /// Target frame rate (video only)
    pub frame_rate: Option<u32>,
}

impl CaptureConstraints {
    /// Constraints for an audio-only capture
    pub fn audio() -> Self {
        Self {
            aspect_ratio: None,
            height: None,
            frame_rate: None,
        }
    }

    /// Constraints for a video capture
    pub fn video(aspect_ratio: f64, height: u32, frame_rate: u32) -> Self {
        Self {
            aspect_ratio: Some(aspect_ratio),
            height: Some(height),
            frame_rate: Some(frame_rate),
        }
    }

    /// Width implied by height and aspect ratio
    pub fn width(&self) -> Option<u32> {
        match (self.aspect_ratio, self.height) {
            (Some(ratio), Some(height)) => Some((height as f64 * ratio).round() as u32),
            _ => None,
        }
    }
}

/// Local media acquisition (camera, microphone, display)
#[async_trait]
pub trait MediaCapture: Send + Sync {
    /// Acquire a stream from the given source
    async fn acquire(
        &self,
        source: CaptureSource,
        constraints: &CaptureConstraints,
    ) -> Result<MediaStream>;
}
