//! Signaling channel to the media server
//!
//! JSON-RPC 2.0 over a persistent bidirectional link. Requests are correlated
//! by id; broadcasts arrive as typed [`RoomEvent`]s.

pub mod channel;
pub mod events;
pub mod protocol;

pub use channel::SignalingChannel;
pub use events::{ChannelEvent, DisconnectReason, RoomEvent};
pub use protocol::{Participant, ParticipantRole, RemoteProducer};
