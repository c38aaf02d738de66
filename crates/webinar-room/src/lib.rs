//! Live session core for webinar rooms on an SFU
//!
//! This crate joins a webinar room hosted by a Selective Forwarding Unit,
//! publishes local camera, microphone and screen media, and consumes every
//! remote producer the server announces.
//!
//! # Features
//!
//! - **JSON-RPC 2.0 signaling**: correlated requests over WebSocket, typed room broadcasts
//! - **Transport pair**: one send and one receive transport per join, created once
//! - **Local producers**: camera / microphone / screen slots with per-slot toggle gates
//! - **Consumer registry**: at most one consumer per remote producer, reconciled on every change
//! - **Room model**: participants, host-leave teardown, hand raises
//! - **Pluggable media**: the SFU client library and capture sit behind traits
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Embedding UI (notices + RoomSnapshot watch)              │
//! │  ↓                                                        │
//! │  WebinarSession                                           │
//! │  ├─ SignalingChannel (JSON-RPC 2.0 over WebSocket)        │
//! │  ├─ RoomState (participants, producers, consumers)        │
//! │  ├─ MediaSession (per join)                               │
//! │  │   ├─ MediaDevice (negotiated capabilities)             │
//! │  │   ├─ TransportPair (send + receive)                    │
//! │  │   └─ ProducerSet (video / audio / screen)              │
//! │  └─ event router (broadcasts, transport + track events)   │
//! │     ↓                                                      │
//! │  MediaEngine / MediaCapture (SFU client library, devices) │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use webinar_room::{Participant, ParticipantRole, SessionConfig};
//!
//! let user = Participant {
//!     id: "u-1".to_string(),
//!     first_name: "Ada".to_string(),
//!     last_name: "Lovelace".to_string(),
//!     role: ParticipantRole::Host,
//! };
//! let config = SessionConfig::new("ws://localhost:3016", "weekly-sync", user);
//! assert!(config.validate().is_ok());
//! ```
//!
//! ## Async Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use webinar_room::media::{HeadlessCapture, HeadlessEngine};
//! use webinar_room::{SessionConfig, WebinarSession};
//!
//! # async fn example(config: SessionConfig) -> webinar_room::Result<()> {
//! let (session, mut notices) = WebinarSession::connect(
//!     config,
//!     Arc::new(HeadlessEngine::new()),
//!     Arc::new(HeadlessCapture::new()),
//! )
//! .await?;
//!
//! session.start().await?;
//! session.toggle_audio().await?;
//!
//! while let Some(notice) = notices.recv().await {
//!     println!("{:?}", notice);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod media;
pub mod session;
pub mod signaling;
pub mod transport;

pub use config::{CaptureConfig, SessionConfig};
pub use error::{Error, Result};
pub use media::{MediaKind, MediaVariant};
pub use session::{
    JoinOutcome, MediaSlot, MediaToggles, RoomSnapshot, SessionNotice, SessionPhase, WebinarSession,
};
pub use signaling::{
    ChannelEvent, Participant, ParticipantRole, RemoteProducer, RoomEvent, SignalingChannel,
};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
