//! Session layer: room model, local and remote media, controller

pub mod consumers;
pub mod controller;
pub mod notice;
pub mod producers;
pub mod room;

pub use consumers::RemoteMedia;
pub use controller::{JoinOutcome, RoomSnapshot, SessionPhase, WebinarSession};
pub use notice::SessionNotice;
pub use producers::{MediaSlot, MediaToggles, ProducerSet};
pub use room::RoomState;
