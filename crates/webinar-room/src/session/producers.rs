//! Local producer slots (camera, microphone, screen)

use crate::media::{
    CaptureConstraints, MediaCapture, MediaStream, MediaTrack, MediaVariant, Producer,
    SendTransport,
};
use crate::signaling::protocol::{methods, CloseProducerParams};
use crate::signaling::SignalingChannel;
use crate::{Error, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Local slot identifier
pub type MediaSlot = MediaVariant;

/// Which local slots are live
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaToggles {
    /// Camera producing
    pub is_video: bool,
    /// Microphone producing
    pub is_audio: bool,
    /// Screen share producing
    pub is_screen: bool,
}

impl MediaToggles {
    /// State of one slot
    pub fn get(&self, slot: MediaSlot) -> bool {
        match slot {
            MediaVariant::Video => self.is_video,
            MediaVariant::Audio => self.is_audio,
            MediaVariant::Screen => self.is_screen,
        }
    }
}

struct LocalSlot {
    stream: MediaStream,
    producer: Arc<dyn Producer>,
}

impl LocalSlot {
    fn release(self, channel: &SignalingChannel, room_id: &str, variant: MediaVariant) -> String {
        let producer_id = self.producer.id().to_string();

        self.stream.stop_all();
        let params = CloseProducerParams {
            room_id: room_id.to_string(),
            producer_id: producer_id.clone(),
        };
        if let Err(e) = channel.notify(methods::CLOSE_PRODUCER, &params) {
            debug!(producer_id = %producer_id, "closeProducer not delivered: {}", e);
        }
        self.producer.close();

        info!(producer_id = %producer_id, %variant, "Local producer stopped");
        producer_id
    }
}

struct SlotGates {
    video: tokio::sync::Mutex<()>,
    audio: tokio::sync::Mutex<()>,
    screen: tokio::sync::Mutex<()>,
}

/// Up to one producer per slot, each slot with its own in-flight gate
pub struct ProducerSet {
    room_id: String,
    channel: SignalingChannel,
    slots: Mutex<HashMap<MediaVariant, LocalSlot>>,
    gates: SlotGates,
    closed: AtomicBool,
}

impl ProducerSet {
    /// Empty producer set for a room
    pub fn new(room_id: impl Into<String>, channel: SignalingChannel) -> Self {
        Self {
            room_id: room_id.into(),
            channel,
            slots: Mutex::new(HashMap::new()),
            gates: SlotGates {
                video: tokio::sync::Mutex::new(()),
                audio: tokio::sync::Mutex::new(()),
                screen: tokio::sync::Mutex::new(()),
            },
            closed: AtomicBool::new(false),
        }
    }

    /// Claim a slot for one toggle; fails fast when another is in flight
    pub fn gate(&self, slot: MediaSlot) -> Result<tokio::sync::MutexGuard<'_, ()>> {
        let gate = match slot {
            MediaVariant::Video => &self.gates.video,
            MediaVariant::Audio => &self.gates.audio,
            MediaVariant::Screen => &self.gates.screen,
        };
        gate.try_lock().map_err(|_| Error::ToggleInProgress(slot))
    }

    /// Whether the slot holds a producer
    pub fn is_active(&self, slot: MediaSlot) -> bool {
        self.slots.lock().contains_key(&slot)
    }

    /// Toggle state of every slot
    pub fn toggles(&self) -> MediaToggles {
        let slots = self.slots.lock();
        MediaToggles {
            is_video: slots.contains_key(&MediaVariant::Video),
            is_audio: slots.contains_key(&MediaVariant::Audio),
            is_screen: slots.contains_key(&MediaVariant::Screen),
        }
    }

    /// Server ids of our own producers
    pub fn producer_ids(&self) -> HashSet<String> {
        self.slots.lock().values().map(|s| s.producer.id().to_string()).collect()
    }

    /// Acquire capture for a slot and start producing it
    ///
    /// Returns the producer's track. Acquired tracks are stopped again if
    /// anything after acquisition fails.
    pub async fn start(
        &self,
        slot: MediaSlot,
        transport: &Arc<dyn SendTransport>,
        capture: &dyn MediaCapture,
        constraints: &CaptureConstraints,
    ) -> Result<(String, MediaTrack)> {
        let stream = capture.acquire(slot.capture_source(), constraints).await?;

        let track = match stream.first_track(slot.kind()) {
            Some(track) => track.clone(),
            None => {
                stream.stop_all();
                return Err(Error::MediaAcquisitionError(format!(
                    "capture for {} slot returned no {} track",
                    slot,
                    slot.kind()
                )));
            }
        };

        let producer = match transport.produce(track.clone(), slot).await {
            Ok(producer) => producer,
            Err(e) => {
                stream.stop_all();
                return Err(e);
            }
        };
        let producer_id = producer.id().to_string();

        let local = LocalSlot { stream, producer };
        if self.closed.load(Ordering::SeqCst) {
            // Session torn down while we were producing
            local.release(&self.channel, &self.room_id, slot);
            return Err(Error::InvalidState("media session closed".to_string()));
        }

        let previous = self.slots.lock().insert(slot, local);
        if let Some(previous) = previous {
            warn!(%slot, "Replacing a live producer");
            previous.release(&self.channel, &self.room_id, slot);
        }

        info!(producer_id = %producer_id, %slot, "Local producer started");
        Ok((producer_id, track))
    }

    /// Stop a slot; returns the stopped producer id
    pub fn stop(&self, slot: MediaSlot) -> Option<String> {
        let local = self.slots.lock().remove(&slot)?;
        Some(local.release(&self.channel, &self.room_id, slot))
    }

    /// Stop a slot only if it still holds `producer_id`
    pub fn stop_if(&self, slot: MediaSlot, producer_id: &str) -> bool {
        let local = {
            let mut slots = self.slots.lock();
            match slots.get(&slot) {
                Some(local) if local.producer.id() == producer_id => slots.remove(&slot),
                _ => None,
            }
        };

        match local {
            Some(local) => {
                local.release(&self.channel, &self.room_id, slot);
                true
            }
            None => false,
        }
    }

    /// Stop every slot and refuse further producers
    pub fn close(&self) -> Vec<String> {
        self.closed.store(true, Ordering::SeqCst);
        let drained: Vec<(MediaVariant, LocalSlot)> = self.slots.lock().drain().collect();
        drained
            .into_iter()
            .map(|(slot, local)| local.release(&self.channel, &self.room_id, slot))
            .collect()
    }
}
