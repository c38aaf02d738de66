//! Room membership, remote producer list and consumer registry
//!
//! All three live behind one lock so that a producer closing removes it from
//! the list and from the registry in a single step. Consume attempts are
//! bracketed by [`RoomState::begin_consume`] and [`RoomState::finish_consume`],
//! which re-validates the producer before the entry is committed.

use super::consumers::RemoteMedia;
use crate::media::MediaStream;
use crate::signaling::{Participant, RemoteProducer};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

#[derive(Default)]
struct RoomInner {
    participants: Vec<Participant>,
    producers: Vec<RemoteProducer>,
    consumers: HashMap<String, RemoteMedia>,
    pending: HashSet<String>,
}

/// Shared view of the room
#[derive(Default)]
pub struct RoomState {
    inner: Mutex<RoomInner>,
}

impl RoomState {
    /// Create an empty room view
    pub fn new() -> Self {
        Self::default()
    }

    /// Current participants
    pub fn participants(&self) -> Vec<Participant> {
        self.inner.lock().participants.clone()
    }

    /// Replace the participant list
    pub fn set_participants(&self, participants: Vec<Participant>) {
        let mut inner = self.inner.lock();
        inner.participants.clear();
        for p in participants {
            if !inner.participants.iter().any(|existing| existing.id == p.id) {
                inner.participants.push(p);
            }
        }
    }

    /// Append a participant unless one with the same id is present
    pub fn add_participant(&self, participant: Participant) -> bool {
        let mut inner = self.inner.lock();
        if inner.participants.iter().any(|p| p.id == participant.id) {
            return false;
        }
        inner.participants.push(participant);
        true
    }

    /// Remove a participant by id
    pub fn remove_participant(&self, id: &str) -> Option<Participant> {
        let mut inner = self.inner.lock();
        let index = inner.participants.iter().position(|p| p.id == id)?;
        Some(inner.participants.remove(index))
    }

    /// Known remote producers
    pub fn producers(&self) -> Vec<RemoteProducer> {
        self.inner.lock().producers.clone()
    }

    /// Whether a remote producer is known
    pub fn has_producer(&self, producer_id: &str) -> bool {
        self.inner
            .lock()
            .producers
            .iter()
            .any(|p| p.producer_id == producer_id)
    }

    /// Append producers with unknown ids; returns how many were added
    pub fn add_producers(&self, producers: Vec<RemoteProducer>) -> usize {
        let mut inner = self.inner.lock();
        let mut added = 0;
        for producer in producers {
            if !inner.producers.iter().any(|p| p.producer_id == producer.producer_id) {
                inner.producers.push(producer);
                added += 1;
            }
        }
        added
    }

    /// Drop a producer from the list and the registry together
    ///
    /// Returns the registry entry, which the caller closes.
    pub fn remove_producer(&self, producer_id: &str) -> Option<RemoteMedia> {
        let mut inner = self.inner.lock();
        inner.producers.retain(|p| p.producer_id != producer_id);
        inner.consumers.remove(producer_id)
    }

    /// Drop every producer and registry entry
    pub fn clear_media(&self) -> Vec<RemoteMedia> {
        let mut inner = self.inner.lock();
        inner.producers.clear();
        inner.pending.clear();
        inner.consumers.drain().map(|(_, media)| media).collect()
    }

    /// Forget everything, participants included
    pub fn reset(&self) -> Vec<RemoteMedia> {
        let media = self.clear_media();
        self.inner.lock().participants.clear();
        media
    }

    /// Known producers with neither an entry nor a consume in flight
    pub fn missing_consumers(&self) -> Vec<String> {
        let inner = self.inner.lock();
        inner
            .producers
            .iter()
            .filter(|p| {
                !inner.consumers.contains_key(&p.producer_id)
                    && !inner.pending.contains(&p.producer_id)
            })
            .map(|p| p.producer_id.clone())
            .collect()
    }

    /// Claim the right to consume a producer
    ///
    /// False when an entry exists, a consume is already in flight, or the
    /// producer is unknown.
    pub fn begin_consume(&self, producer_id: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner.consumers.contains_key(producer_id)
            || inner.pending.contains(producer_id)
            || !inner.producers.iter().any(|p| p.producer_id == producer_id)
        {
            return false;
        }
        inner.pending.insert(producer_id.to_string())
    }

    /// Commit a consumed producer
    ///
    /// Hands the media back when the producer closed in the meantime or an
    /// entry already exists; the caller closes it.
    pub fn finish_consume(&self, media: RemoteMedia) -> Result<(), RemoteMedia> {
        let mut inner = self.inner.lock();
        let producer_id = media.producer_id().to_string();
        inner.pending.remove(&producer_id);

        if inner.consumers.contains_key(&producer_id)
            || !inner.producers.iter().any(|p| p.producer_id == producer_id)
        {
            return Err(media);
        }

        inner.consumers.insert(producer_id, media);
        Ok(())
    }

    /// Release a claim after a failed consume
    pub fn abort_consume(&self, producer_id: &str) {
        self.inner.lock().pending.remove(producer_id);
    }

    /// Remove the entry only if it still belongs to `consumer_id`
    pub fn remove_consumer_if(&self, producer_id: &str, consumer_id: &str) -> Option<RemoteMedia> {
        let mut inner = self.inner.lock();
        match inner.consumers.get(producer_id) {
            Some(media) if media.consumer_id() == consumer_id => {
                inner.consumers.remove(producer_id)
            }
            _ => None,
        }
    }

    /// Producer ids that currently have a consumer, sorted
    pub fn consumed_producers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.lock().consumers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Stream received for a remote producer
    pub fn remote_stream(&self, producer_id: &str) -> Option<MediaStream> {
        self.inner
            .lock()
            .consumers
            .get(producer_id)
            .map(|media| media.stream().clone())
    }
}
