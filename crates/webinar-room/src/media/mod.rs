//! Media model and the seams to the client-side SFU media library
//!
//! The session never touches codecs or sockets itself. It drives an injected
//! [`MediaEngine`] (device, transports, producers, consumers) and an injected
//! [`MediaCapture`] (camera, microphone, display capture).

pub mod engine;
pub mod headless;
pub mod params;
pub mod track;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use engine::{
    CaptureConstraints, CaptureSource, Consumer, MediaCapture, MediaDevice, MediaEngine, Producer,
    RecvTransport, SendTransport, TransportConnectionState, TransportDirection, TransportListener,
};
pub use headless::{
    HeadlessCapture, HeadlessConsumer, HeadlessEngine, HeadlessProducer, HeadlessTransport,
};
pub use params::{ConsumerOptions, DtlsParameters, RtpCapabilities, RtpParameters, TransportOptions};
pub use track::{EndReason, MediaStream, MediaTrack, ReadyState};

/// Media kind of a track as seen by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Audio track
    Audio,
    /// Video track
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

/// Semantic role of a track, distinct from its [`MediaKind`]
///
/// Also names the three local producer slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaVariant {
    /// Microphone audio
    Audio,
    /// Camera video
    Video,
    /// Screen-share video
    Screen,
}

impl MediaVariant {
    /// All local producer slots
    pub const ALL: [MediaVariant; 3] = [
        MediaVariant::Video,
        MediaVariant::Audio,
        MediaVariant::Screen,
    ];

    /// Media kind carried by this variant
    pub fn kind(&self) -> MediaKind {
        match self {
            MediaVariant::Audio => MediaKind::Audio,
            MediaVariant::Video | MediaVariant::Screen => MediaKind::Video,
        }
    }

    /// Capture source used to feed this slot
    pub fn capture_source(&self) -> CaptureSource {
        match self {
            MediaVariant::Audio => CaptureSource::Microphone,
            MediaVariant::Video => CaptureSource::Camera,
            MediaVariant::Screen => CaptureSource::Display,
        }
    }
}

impl fmt::Display for MediaVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaVariant::Audio => write!(f, "audio"),
            MediaVariant::Video => write!(f, "video"),
            MediaVariant::Screen => write!(f, "screen"),
        }
    }
}
