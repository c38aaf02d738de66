//! Session controller
//!
//! Owns the per-join [`MediaSession`] (device, transports, local producers),
//! routes room broadcasts and transport events, and drives the phase machine:
//!
//! ```text
//! Idle ──join──▶ Joining ──▶ Joined ──leave / end_call / callEnded──▶ Ended
//!   ▲               │           │
//!   └── join fails ─┘           └── transport or signaling lost ──▶ Disconnected
//! ```

use super::consumers::{consume_producer, ConsumeContext, RemoteTrackEnded};
use super::notice::SessionNotice;
use super::producers::{MediaSlot, MediaToggles, ProducerSet};
use super::room::RoomState;
use crate::config::SessionConfig;
use crate::media::{
    EndReason, MediaCapture, MediaDevice, MediaEngine, MediaStream, MediaTrack, MediaVariant,
    RtpCapabilities,
};
use crate::signaling::protocol::{
    methods, HandsUpParams, InRoomUsersResponse, JoinRoomParams, JoinRoomResponse, LeaveRoomParams,
    ProducersResponse, RoomParams,
};
use crate::signaling::{
    ChannelEvent, DisconnectReason, Participant, RemoteProducer, RoomEvent, SignalingChannel,
};
use crate::transport::{TransportEvent, TransportPair};
use crate::{Error, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Lifecycle phase of a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    /// Connected, not in the room (attendee waiting room, or after a failed join)
    #[default]
    Idle,
    /// Join sequence running
    Joining,
    /// In the room with transports up
    Joined,
    /// Left, ended or rejected; terminal
    Ended,
    /// Lost a transport or the signaling link
    Disconnected,
}

/// Result of a join attempt that reached the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Sequence completed
    Joined,
    /// Server refused entry with this message
    Rejected(String),
}

/// Everything a UI needs to render the room
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomSnapshot {
    /// Session phase
    pub phase: SessionPhase,
    /// Participants in the room
    pub participants: Vec<Participant>,
    /// Remote producers announced by the server
    pub remote_producers: Vec<RemoteProducer>,
    /// Remote producer ids with a live consumer
    pub consumers: Vec<String>,
    /// Local slot state
    pub toggles: MediaToggles,
    /// Whether we raised our hand
    pub hand_raised: bool,
}

/// Per-join media state, discarded on leave or disconnect
struct MediaSession {
    device: tokio::sync::Mutex<Option<Arc<dyn MediaDevice>>>,
    transports: TransportPair,
    producers: ProducerSet,
}

impl MediaSession {
    async fn device(&self) -> Option<Arc<dyn MediaDevice>> {
        self.device.lock().await.clone()
    }
}

#[derive(Debug)]
struct LocalTrackEnded {
    slot: MediaSlot,
    producer_id: String,
}

struct Receivers {
    channel: Option<mpsc::UnboundedReceiver<ChannelEvent>>,
    transport: mpsc::UnboundedReceiver<TransportEvent>,
    remote_ended: mpsc::UnboundedReceiver<RemoteTrackEnded>,
    local_ended: mpsc::UnboundedReceiver<LocalTrackEnded>,
}

struct SessionInner {
    session_id: Uuid,
    config: SessionConfig,
    channel: SignalingChannel,
    engine: Arc<dyn MediaEngine>,
    capture: Arc<dyn MediaCapture>,
    phase: Mutex<SessionPhase>,
    room: RoomState,
    media: Mutex<Option<Arc<MediaSession>>>,
    hand_raised: AtomicBool,
    notices: mpsc::UnboundedSender<SessionNotice>,
    snapshot: watch::Sender<RoomSnapshot>,
    transport_tx: mpsc::UnboundedSender<TransportEvent>,
    remote_ended_tx: mpsc::UnboundedSender<RemoteTrackEnded>,
    local_ended_tx: mpsc::UnboundedSender<LocalTrackEnded>,
    receivers: Mutex<Option<Receivers>>,
}

/// A live webinar session
///
/// Cheap to clone; clones drive the same session.
#[derive(Clone)]
pub struct WebinarSession {
    inner: Arc<SessionInner>,
}

impl WebinarSession {
    /// Create a session over an established signaling channel
    ///
    /// Returns the session and the receiver for user-facing notices.
    pub fn new(
        config: SessionConfig,
        channel: SignalingChannel,
        engine: Arc<dyn MediaEngine>,
        capture: Arc<dyn MediaCapture>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionNotice>) {
        let (notices, notice_rx) = mpsc::unbounded_channel();
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (remote_ended_tx, remote_ended_rx) = mpsc::unbounded_channel();
        let (local_ended_tx, local_ended_rx) = mpsc::unbounded_channel();
        let (snapshot, _) = watch::channel(RoomSnapshot::default());

        let receivers = Receivers {
            channel: channel.take_events(),
            transport: transport_rx,
            remote_ended: remote_ended_rx,
            local_ended: local_ended_rx,
        };

        let inner = Arc::new(SessionInner {
            session_id: Uuid::new_v4(),
            config,
            channel,
            engine,
            capture,
            phase: Mutex::new(SessionPhase::Idle),
            room: RoomState::new(),
            media: Mutex::new(None),
            hand_raised: AtomicBool::new(false),
            notices,
            snapshot,
            transport_tx,
            remote_ended_tx,
            local_ended_tx,
            receivers: Mutex::new(Some(receivers)),
        });

        (Self { inner }, notice_rx)
    }

    /// Validate the config, open the WebSocket and create the session
    pub async fn connect(
        config: SessionConfig,
        engine: Arc<dyn MediaEngine>,
        capture: Arc<dyn MediaCapture>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionNotice>)> {
        config.validate()?;
        let channel =
            SignalingChannel::connect(&config.signaling_url, config.request_timeout()).await?;
        Ok(Self::new(config, channel, engine, capture))
    }

    /// Install the event router; the host joins immediately
    ///
    /// Returns `None` for attendees, who call [`join`](Self::join) once
    /// admitted from the waiting room.
    pub async fn start(&self) -> Result<Option<JoinOutcome>> {
        let receivers = self
            .inner
            .receivers
            .lock()
            .take()
            .ok_or_else(|| Error::InvalidState("session already started".to_string()))?;
        let channel_events = receivers
            .channel
            .ok_or_else(|| Error::InvalidState("channel events already taken".to_string()))?;

        tokio::spawn(route_events(
            Arc::downgrade(&self.inner),
            channel_events,
            receivers.transport,
            receivers.remote_ended,
            receivers.local_ended,
        ));

        let user = &self.inner.config.user;
        info!(
            session_id = %self.inner.session_id,
            room_id = %self.inner.config.room_id,
            user_id = %user.id,
            role = ?user.role,
            "Session started"
        );

        if user.is_host() {
            self.join().await.map(Some)
        } else {
            Ok(None)
        }
    }

    /// Run the join sequence
    ///
    /// join → participants → capabilities → receive transport → current
    /// producers → send transport. A failing step returns the session to
    /// `Idle`; nothing is retried.
    pub async fn join(&self) -> Result<JoinOutcome> {
        let inner = &self.inner;
        {
            let mut phase = inner.phase.lock();
            match *phase {
                SessionPhase::Idle | SessionPhase::Disconnected => *phase = SessionPhase::Joining,
                other => {
                    return Err(Error::InvalidState(format!("cannot join while {:?}", other)));
                }
            }
        }
        inner.publish();

        match inner.run_join().await {
            Ok(JoinOutcome::Joined) => {
                info!(
                    session_id = %inner.session_id,
                    room_id = %inner.config.room_id,
                    "Joined room"
                );
                inner.publish();
                Ok(JoinOutcome::Joined)
            }
            Ok(JoinOutcome::Rejected(message)) => {
                info!(session_id = %inner.session_id, "Join rejected: {}", message);
                inner.teardown().await;
                inner.set_phase(SessionPhase::Ended);
                inner.emit(SessionNotice::JoinRejected {
                    message: message.clone(),
                });
                inner.emit(SessionNotice::NavigateAway);
                inner.publish();
                Ok(JoinOutcome::Rejected(message))
            }
            Err(e) => {
                if inner.phase() == SessionPhase::Joining {
                    error!(session_id = %inner.session_id, "Join failed: {}", e);
                    inner.teardown().await;
                    inner.set_phase_if(SessionPhase::Joining, SessionPhase::Idle);
                } else {
                    // Whoever moved the phase already tore the session down
                    warn!(
                        session_id = %inner.session_id,
                        phase = ?inner.phase(),
                        "Join interrupted: {}",
                        e
                    );
                }
                inner.publish();
                Err(e)
            }
        }
    }

    /// Load router capabilities into a fresh device
    ///
    /// Returns `Ok(false)` with a warning when the channel is closed or a
    /// device is already loaded.
    pub async fn negotiate_capabilities(&self) -> Result<bool> {
        let media = self.inner.media_or_create();
        self.inner.negotiate(&media).await
    }

    /// Create the receive transport; `Ok(false)` if it already exists
    pub async fn create_recv_transport(&self) -> Result<bool> {
        let media = self.inner.require_media()?;
        let device = media.device().await.ok_or(Error::DeviceNotLoaded)?;
        let (_, created) = media.transports.ensure_recv(&device).await?;
        Ok(created)
    }

    /// Create the send transport; `Ok(false)` if it already exists
    pub async fn create_send_transport(&self) -> Result<bool> {
        let media = self.inner.require_media()?;
        let device = media.device().await.ok_or(Error::DeviceNotLoaded)?;
        let (_, created) = media.transports.ensure_send(&device).await?;
        Ok(created)
    }

    /// Consume one remote producer; `Ok(false)` when skipped
    pub async fn consume(&self, producer_id: &str) -> Result<bool> {
        let consumed = self.inner.consume(producer_id).await?;
        if consumed {
            self.inner.publish();
        }
        Ok(consumed)
    }

    /// Toggle the camera slot
    pub async fn toggle_video(&self) -> Result<bool> {
        self.toggle(MediaVariant::Video).await
    }

    /// Toggle the microphone slot
    pub async fn toggle_audio(&self) -> Result<bool> {
        self.toggle(MediaVariant::Audio).await
    }

    /// Toggle the screen share slot
    pub async fn toggle_screen(&self) -> Result<bool> {
        self.toggle(MediaVariant::Screen).await
    }

    /// Start the slot if inactive, stop it if active
    ///
    /// Returns the new state. Fails with [`Error::ToggleInProgress`] when a
    /// toggle for the same slot has not finished.
    pub async fn toggle(&self, slot: MediaSlot) -> Result<bool> {
        let inner = &self.inner;
        let media = inner.require_media()?;
        let _gate = media.producers.gate(slot)?;

        if media.producers.is_active(slot) {
            media.producers.stop(slot);
            inner.publish();
            return Ok(false);
        }

        let transport = media
            .transports
            .send_transport()
            .await
            .ok_or_else(|| Error::TransportNotReady("send transport".to_string()))?;
        let constraints = inner.config.constraints_for(slot);

        match media
            .producers
            .start(slot, &transport, inner.capture.as_ref(), &constraints)
            .await
        {
            Ok((producer_id, track)) => {
                if slot == MediaVariant::Screen {
                    inner.watch_local_track(slot, producer_id, track);
                }
                inner.publish();
                Ok(true)
            }
            Err(e) => {
                error!(session_id = %inner.session_id, %slot, "Failed to start local media: {}", e);
                Err(e)
            }
        }
    }

    /// Ensure a slot is on or off; returns whether anything changed
    pub async fn set_slot_enabled(&self, slot: MediaSlot, enabled: bool) -> Result<bool> {
        if self.toggles().get(slot) == enabled {
            return Ok(false);
        }
        self.toggle(slot).await.map(|_| true)
    }

    /// Raise our hand
    pub fn raise_hand(&self) -> Result<()> {
        let inner = &self.inner;
        let user = &inner.config.user;
        inner.channel.notify(
            methods::HANDS_UP,
            &HandsUpParams {
                room_id: inner.config.room_id.clone(),
                user_id: user.id.clone(),
                name: user.display_name(),
            },
        )?;

        inner.hand_raised.store(true, Ordering::SeqCst);
        inner.publish();
        Ok(())
    }

    /// Leave the room
    pub async fn leave(&self) -> Result<()> {
        let inner = &self.inner;
        if inner.phase() == SessionPhase::Ended {
            return Err(Error::InvalidState("session already ended".to_string()));
        }

        info!(session_id = %inner.session_id, "Leaving room");
        inner.stop_local_media();
        if let Err(e) = inner.channel.notify(methods::LEAVE_ROOM, &inner.leave_params()) {
            warn!(session_id = %inner.session_id, "leaveRoom not delivered: {}", e);
        }

        inner.end_session(None).await;
        Ok(())
    }

    /// End the call for everyone (host only)
    pub async fn end_call(&self) -> Result<()> {
        let inner = &self.inner;
        if !inner.config.user.is_host() {
            return Err(Error::InvalidState("only the host can end the call".to_string()));
        }
        if inner.phase() == SessionPhase::Ended {
            return Err(Error::InvalidState("session already ended".to_string()));
        }

        info!(session_id = %inner.session_id, "Ending call");
        inner.stop_local_media();
        let result = inner
            .channel
            .request::<_, Value>(
                methods::EXIT_ROOM,
                &RoomParams {
                    room_id: inner.config.room_id.clone(),
                },
            )
            .await;

        inner.end_session(None).await;
        result.map(|_| ())
    }

    /// Final teardown: local media, best-effort leaveRoom, then disconnect
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        info!(session_id = %inner.session_id, "Shutting down session");

        inner.stop_local_media();
        if inner.channel.is_connected() {
            if let Err(e) = inner.channel.notify(methods::LEAVE_ROOM, &inner.leave_params()) {
                debug!("leaveRoom not delivered: {}", e);
            }
        }
        inner.channel.disconnect();

        inner.set_phase(SessionPhase::Ended);
        inner.teardown().await;
        inner.publish();
    }

    /// Session id used in log fields
    pub fn session_id(&self) -> Uuid {
        self.inner.session_id
    }

    /// Session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Current phase
    pub fn phase(&self) -> SessionPhase {
        self.inner.phase()
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> RoomSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot updates
    pub fn subscribe(&self) -> watch::Receiver<RoomSnapshot> {
        self.inner.snapshot.subscribe()
    }

    /// Local slot state
    pub fn toggles(&self) -> MediaToggles {
        self.inner
            .current_media()
            .map(|media| media.producers.toggles())
            .unwrap_or_default()
    }

    /// Current participants
    pub fn participants(&self) -> Vec<Participant> {
        self.inner.room.participants()
    }

    /// Known remote producers
    pub fn remote_producers(&self) -> Vec<RemoteProducer> {
        self.inner.room.producers()
    }

    /// Remote producer ids with a live consumer
    pub fn consumer_ids(&self) -> Vec<String> {
        self.inner.room.consumed_producers()
    }

    /// Stream received for a remote producer
    pub fn remote_stream(&self, producer_id: &str) -> Option<MediaStream> {
        self.inner.room.remote_stream(producer_id)
    }
}

impl SessionInner {
    fn phase(&self) -> SessionPhase {
        *self.phase.lock()
    }

    fn set_phase(&self, phase: SessionPhase) {
        *self.phase.lock() = phase;
    }

    fn set_phase_if(&self, expected: SessionPhase, next: SessionPhase) -> bool {
        let mut phase = self.phase.lock();
        if *phase == expected {
            *phase = next;
            true
        } else {
            false
        }
    }

    fn emit(&self, notice: SessionNotice) {
        debug!(session_id = %self.session_id, ?notice, "Session notice");
        let _ = self.notices.send(notice);
    }

    fn publish(&self) {
        let snapshot = RoomSnapshot {
            phase: self.phase(),
            participants: self.room.participants(),
            remote_producers: self.room.producers(),
            consumers: self.room.consumed_producers(),
            toggles: self
                .current_media()
                .map(|media| media.producers.toggles())
                .unwrap_or_default(),
            hand_raised: self.hand_raised.load(Ordering::SeqCst),
        };
        self.snapshot.send_replace(snapshot);
    }

    fn room_params(&self) -> RoomParams {
        RoomParams {
            room_id: self.config.room_id.clone(),
        }
    }

    fn leave_params(&self) -> LeaveRoomParams {
        LeaveRoomParams {
            room_id: self.config.room_id.clone(),
            user_id: self.config.user.id.clone(),
        }
    }

    fn current_media(&self) -> Option<Arc<MediaSession>> {
        self.media.lock().clone()
    }

    fn require_media(&self) -> Result<Arc<MediaSession>> {
        self.current_media()
            .ok_or_else(|| Error::InvalidState("no media session; join first".to_string()))
    }

    fn media_or_create(&self) -> Arc<MediaSession> {
        let mut media = self.media.lock();
        let session = media.get_or_insert_with(|| {
            Arc::new(MediaSession {
                device: tokio::sync::Mutex::new(None),
                transports: TransportPair::new(
                    self.config.room_id.clone(),
                    self.channel.clone(),
                    self.transport_tx.clone(),
                ),
                producers: ProducerSet::new(self.config.room_id.clone(), self.channel.clone()),
            })
        });
        Arc::clone(session)
    }

    async fn run_join(self: &Arc<Self>) -> Result<JoinOutcome> {
        let method = if self.config.user.is_host() {
            methods::CREATE_ROOM
        } else {
            methods::JOIN_ROOM
        };

        let response: JoinRoomResponse = self
            .channel
            .request(
                method,
                &JoinRoomParams {
                    room_id: self.config.room_id.clone(),
                    user: self.config.user.clone(),
                },
            )
            .await?;
        self.check_joining(None)?;
        if !response.status {
            let message = response
                .message
                .unwrap_or_else(|| "Unable to join the room".to_string());
            return Ok(JoinOutcome::Rejected(message));
        }

        let users: InRoomUsersResponse = self
            .channel
            .request(methods::GET_IN_ROOM_USERS, &self.room_params())
            .await?;
        self.check_joining(None)?;
        self.room.set_participants(users.users);
        self.publish();

        let media = self.media_or_create();
        match self.join_media(&media).await {
            Ok(()) => Ok(JoinOutcome::Joined),
            Err(e) => {
                if !self.is_current(&media) {
                    // Torn down under us; nothing else will release these
                    media.producers.close();
                    media.transports.close_all().await;
                }
                Err(e)
            }
        }
    }

    /// Device, transports and current producers for one join
    ///
    /// Moves `Joining → Joined` only if no teardown replaced `media` meanwhile.
    async fn join_media(self: &Arc<Self>, media: &Arc<MediaSession>) -> Result<()> {
        self.negotiate(media).await?;
        self.check_joining(Some(media))?;
        let device = media.device().await.ok_or(Error::DeviceNotLoaded)?;

        media.transports.ensure_recv(&device).await?;
        self.check_joining(Some(media))?;

        let producers: ProducersResponse = self
            .channel
            .request(methods::GET_PRODUCERS, &self.room_params())
            .await?;
        self.check_joining(Some(media))?;
        self.add_remote_producers(media, producers.producers);
        self.reconcile();

        media.transports.ensure_send(&device).await?;
        self.check_joining(Some(media))?;

        // Teardown paths move the phase before discarding media
        if !self.set_phase_if(SessionPhase::Joining, SessionPhase::Joined) {
            return Err(self.join_interrupted());
        }
        Ok(())
    }

    fn is_current(&self, media: &Arc<MediaSession>) -> bool {
        self.media
            .lock()
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, media))
    }

    fn check_joining(&self, media: Option<&Arc<MediaSession>>) -> Result<()> {
        let replaced = media.is_some_and(|media| !self.is_current(media));
        if replaced || self.phase() != SessionPhase::Joining {
            return Err(self.join_interrupted());
        }
        Ok(())
    }

    fn join_interrupted(&self) -> Error {
        Error::InvalidState(format!("join interrupted; session is {:?}", self.phase()))
    }

    async fn negotiate(&self, media: &MediaSession) -> Result<bool> {
        if !self.channel.is_connected() {
            warn!(
                session_id = %self.session_id,
                "Signaling closed; skipping capability negotiation"
            );
            return Ok(false);
        }

        let mut device = media.device.lock().await;
        if device.is_some() {
            warn!(
                session_id = %self.session_id,
                "Media device already loaded; ignoring negotiation"
            );
            return Ok(false);
        }

        let capabilities: RtpCapabilities = self
            .channel
            .request(methods::GET_ROUTER_RTP_CAPABILITIES, &self.room_params())
            .await?;
        let loaded = self.engine.load_device(capabilities).await?;

        info!(session_id = %self.session_id, "Media device loaded");
        *device = Some(loaded);
        Ok(true)
    }

    async fn consume(&self, producer_id: &str) -> Result<bool> {
        let media = self.require_media()?;
        let device = media.device().await.ok_or(Error::DeviceNotLoaded)?;
        let transport = media
            .transports
            .recv_transport()
            .await
            .ok_or_else(|| Error::TransportNotReady("receive transport".to_string()))?;

        consume_producer(
            ConsumeContext {
                room_id: &self.config.room_id,
                channel: &self.channel,
                room: &self.room,
                device: &device,
                transport: &transport,
                track_ended: &self.remote_ended_tx,
            },
            producer_id,
        )
        .await
    }

    /// Record announced producers, skipping our own
    fn add_remote_producers(&self, media: &MediaSession, producers: Vec<RemoteProducer>) -> usize {
        let own = media.producers.producer_ids();
        let remote: Vec<RemoteProducer> = producers
            .into_iter()
            .filter(|p| !own.contains(&p.producer_id))
            .collect();
        self.room.add_producers(remote)
    }

    /// Consume every known producer lacking an entry, one task each
    fn reconcile(self: &Arc<Self>) {
        if self.current_media().is_none() {
            return;
        }

        for producer_id in self.room.missing_consumers() {
            let weak = Arc::downgrade(self);
            tokio::spawn(async move {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                match inner.consume(&producer_id).await {
                    Ok(true) => inner.publish(),
                    Ok(false) => {}
                    Err(e) if e.is_setup_error() => {
                        debug!(producer_id = %producer_id, "Not ready to consume yet: {}", e)
                    }
                    Err(e) => {
                        warn!(producer_id = %producer_id, "Failed to consume producer: {}", e)
                    }
                }
            });
        }
    }

    fn watch_local_track(&self, slot: MediaSlot, producer_id: String, track: MediaTrack) {
        let tx = self.local_ended_tx.clone();
        tokio::spawn(async move {
            if track.ended().await == EndReason::Ended {
                let _ = tx.send(LocalTrackEnded { slot, producer_id });
            }
        });
    }

    /// Stop every local producer (sends `closeProducer` for each)
    fn stop_local_media(&self) {
        if let Some(media) = self.current_media() {
            let stopped = media.producers.close();
            if !stopped.is_empty() {
                debug!(
                    session_id = %self.session_id,
                    count = stopped.len(),
                    "Local producers stopped"
                );
            }
        }
    }

    /// Discard the media session and all room state
    async fn teardown(&self) {
        self.stop_local_media();

        let media = self.media.lock().take();
        for remote in self.room.reset() {
            remote.close();
        }
        if let Some(media) = media {
            media.transports.close_all().await;
        }

        self.hand_raised.store(false, Ordering::SeqCst);
    }

    /// Move to `Ended` once; later calls do nothing
    async fn end_session(&self, notice: Option<SessionNotice>) {
        {
            let mut phase = self.phase.lock();
            if *phase == SessionPhase::Ended {
                return;
            }
            *phase = SessionPhase::Ended;
        }

        self.teardown().await;
        if let Some(notice) = notice {
            self.emit(notice);
        }
        self.emit(SessionNotice::NavigateAway);
        self.publish();
    }

    async fn on_connection_lost(&self, source: &str) {
        let phase = self.phase();
        if matches!(phase, SessionPhase::Ended | SessionPhase::Disconnected) {
            debug!(session_id = %self.session_id, source, ?phase, "Ignoring connection loss");
            return;
        }

        warn!(session_id = %self.session_id, source, ?phase, "Connection lost");
        self.set_phase(SessionPhase::Disconnected);
        self.teardown().await;
        self.emit(SessionNotice::ConnectionLost);

        if self.config.user.is_host() {
            info!(session_id = %self.session_id, "Host media torn down; join again to recover");
        } else {
            self.emit(SessionNotice::ReloadRequired);
            self.channel.disconnect();
        }
        self.publish();
    }

    async fn on_channel_event(self: &Arc<Self>, event: ChannelEvent) {
        match event {
            ChannelEvent::Room(event) => self.on_room_event(event).await,
            ChannelEvent::Disconnected(DisconnectReason::ClientInitiated) => {
                debug!(session_id = %self.session_id, "Signaling closed locally");
            }
            ChannelEvent::Disconnected(DisconnectReason::ConnectionLost) => {
                self.on_connection_lost("signaling").await;
            }
        }
    }

    async fn on_room_event(self: &Arc<Self>, event: RoomEvent) {
        if self.phase() == SessionPhase::Ended {
            debug!(event = event.name(), "Session ended; ignoring room event");
            return;
        }

        match event {
            RoomEvent::UserJoined(user) => {
                info!(user_id = %user.id, role = ?user.role, "Participant joined");
                if self.room.add_participant(user) {
                    self.publish();
                }
            }
            RoomEvent::UserLeft(user) => {
                info!(user_id = %user.id, role = ?user.role, "Participant left");
                self.room.remove_participant(&user.id);
                if user.is_host() {
                    let cleared = self.room.clear_media();
                    info!(consumers = cleared.len(), "Host left; clearing remote media");
                    for remote in cleared {
                        remote.close();
                    }
                }
                self.publish();
            }
            RoomEvent::NewProducers(producers) => {
                let added = match self.current_media() {
                    Some(media) => self.add_remote_producers(&media, producers),
                    None => self.room.add_producers(producers),
                };
                debug!(added, "New producers announced");
                if added > 0 {
                    self.publish();
                }
                self.reconcile();
            }
            RoomEvent::ProducerClosed { producer_id } => {
                debug!(producer_id = %producer_id, "Producer closed");
                if let Some(remote) = self.room.remove_producer(&producer_id) {
                    remote.close();
                }
                self.publish();
            }
            RoomEvent::CallEnded => {
                info!(session_id = %self.session_id, "Host ended the call");
                self.end_session(Some(SessionNotice::CallEnded)).await;
            }
            RoomEvent::HandRaise { name, .. } => {
                info!(name = %name, "Hand raised");
                self.emit(SessionNotice::HandRaised { name });
            }
        }
    }

    async fn on_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Disconnected {
                direction,
                transport_id,
            } => {
                let Some(media) = self.current_media() else {
                    return;
                };
                if !media.transports.close_if(direction, &transport_id).await {
                    debug!(transport_id = %transport_id, "Disconnect from a stale transport");
                    return;
                }
                self.on_connection_lost("transport").await;
            }
        }
    }

    fn on_remote_track_ended(&self, ended: RemoteTrackEnded) {
        if let Some(remote) = self.room.remove_consumer_if(&ended.producer_id, &ended.consumer_id) {
            info!(producer_id = %ended.producer_id, "Remote track ended; consumer removed");
            remote.close();
            self.publish();
        }
    }

    fn on_local_track_ended(&self, ended: LocalTrackEnded) {
        let Some(media) = self.current_media() else {
            return;
        };
        if media.producers.stop_if(ended.slot, &ended.producer_id) {
            info!(
                slot = %ended.slot,
                producer_id = %ended.producer_id,
                "Local track ended externally"
            );
            self.publish();
        }
    }
}

async fn route_events(
    session: Weak<SessionInner>,
    mut channel: mpsc::UnboundedReceiver<ChannelEvent>,
    mut transport: mpsc::UnboundedReceiver<TransportEvent>,
    mut remote_ended: mpsc::UnboundedReceiver<RemoteTrackEnded>,
    mut local_ended: mpsc::UnboundedReceiver<LocalTrackEnded>,
) {
    loop {
        tokio::select! {
            event = channel.recv() => {
                let (Some(event), Some(inner)) = (event, session.upgrade()) else { break };
                inner.on_channel_event(event).await;
            }
            event = transport.recv() => {
                let (Some(event), Some(inner)) = (event, session.upgrade()) else { break };
                inner.on_transport_event(event).await;
            }
            event = remote_ended.recv() => {
                let (Some(event), Some(inner)) = (event, session.upgrade()) else { break };
                inner.on_remote_track_ended(event);
            }
            event = local_ended.recv() => {
                let (Some(event), Some(inner)) = (event, session.upgrade()) else { break };
                inner.on_local_track_ended(event);
            }
        }
    }

    debug!("Session event router terminated");
}
