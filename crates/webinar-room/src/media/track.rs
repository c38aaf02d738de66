//! Media tracks and streams
//!
//! A track ends in one of two ways: a local [`MediaTrack::stop`], or an
//! external [`MediaTrack::end`] (device unplugged, the platform's "stop
//! sharing" control, a remote peer dropping). Only the latter is reported to
//! ended-watchers as [`EndReason::Ended`].

use super::MediaKind;
use std::sync::Arc;
use tokio::sync::watch;

/// Observable lifecycle of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// Track is producing media
    Live,
    /// Track is finished and cannot be restarted
    Ended,
}

/// Why a track ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Stopped locally via [`MediaTrack::stop`]
    Stopped,
    /// Ended from outside the session
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackState {
    Live,
    Finished(EndReason),
}

struct TrackInner {
    id: String,
    kind: MediaKind,
    label: String,
    state: watch::Sender<TrackState>,
}

/// A single audio or video track
///
/// Cheap to clone; clones share the same lifecycle.
#[derive(Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

impl MediaTrack {
    /// Create a live track with a generated id
    pub fn new(kind: MediaKind, label: impl Into<String>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), kind, label)
    }

    /// Create a live track with a known id
    pub fn with_id(id: impl Into<String>, kind: MediaKind, label: impl Into<String>) -> Self {
        let (state, _) = watch::channel(TrackState::Live);
        Self {
            inner: Arc::new(TrackInner {
                id: id.into(),
                kind,
                label: label.into(),
                state,
            }),
        }
    }

    /// Track identifier
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Media kind
    pub fn kind(&self) -> MediaKind {
        self.inner.kind
    }

    /// Human-readable label (device name)
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Current ready state
    pub fn ready_state(&self) -> ReadyState {
        match *self.inner.state.borrow() {
            TrackState::Live => ReadyState::Live,
            TrackState::Finished(_) => ReadyState::Ended,
        }
    }

    /// Stop the track locally. Does not notify ended-watchers as `Ended`.
    pub fn stop(&self) {
        self.finish(EndReason::Stopped);
    }

    /// End the track from outside (device loss, remote drop)
    pub fn end(&self) {
        self.finish(EndReason::Ended);
    }

    fn finish(&self, reason: EndReason) {
        self.inner.state.send_if_modified(|state| {
            if *state == TrackState::Live {
                *state = TrackState::Finished(reason);
                true
            } else {
                false
            }
        });
    }

    /// Wait until the track finishes and report why
    pub async fn ended(&self) -> EndReason {
        let mut rx = self.inner.state.subscribe();
        loop {
            if let TrackState::Finished(reason) = *rx.borrow_and_update() {
                return reason;
            }
            if rx.changed().await.is_err() {
                return EndReason::Stopped;
            }
        }
    }
}

impl std::fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("label", &self.inner.label)
            .field("ready_state", &self.ready_state())
            .finish()
    }
}

/// A group of tracks acquired or received together
#[derive(Debug, Clone)]
pub struct MediaStream {
    id: String,
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    /// Create a stream from tracks
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tracks,
        }
    }

    /// Stream identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Add a track to the stream
    pub fn add_track(&mut self, track: MediaTrack) {
        self.tracks.push(track);
    }

    /// All tracks
    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    /// First track of the given kind
    pub fn first_track(&self, kind: MediaKind) -> Option<&MediaTrack> {
        self.tracks.iter().find(|t| t.kind() == kind)
    }

    /// Stop every track in the stream
    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }

    /// True while at least one track is live
    pub fn is_active(&self) -> bool {
        self.tracks.iter().any(|t| t.ready_state() == ReadyState::Live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_is_final() {
        let track = MediaTrack::new(MediaKind::Video, "camera");
        assert_eq!(track.ready_state(), ReadyState::Live);

        track.stop();
        track.end();
        assert_eq!(track.ready_state(), ReadyState::Ended);
        assert_eq!(tokio_test::block_on(track.ended()), EndReason::Stopped);
    }

    #[tokio::test]
    async fn test_external_end_wakes_watcher() {
        let track = MediaTrack::new(MediaKind::Video, "display");
        let watcher = {
            let track = track.clone();
            tokio::spawn(async move { track.ended().await })
        };

        tokio::task::yield_now().await;
        track.end();

        assert_eq!(watcher.await.unwrap(), EndReason::Ended);
    }

    #[test]
    fn test_stream_stop_all() {
        let stream = MediaStream::new(vec![
            MediaTrack::new(MediaKind::Video, "camera"),
            MediaTrack::new(MediaKind::Audio, "mic"),
        ]);
        assert!(stream.is_active());
        assert_eq!(stream.first_track(MediaKind::Audio).unwrap().label(), "mic");

        stream.stop_all();
        assert!(!stream.is_active());
        assert!(stream.tracks().iter().all(|t| t.ready_state() == ReadyState::Ended));
    }
}
