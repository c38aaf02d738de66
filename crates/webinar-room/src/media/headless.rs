//! Headless media engine and capture
//!
//! Performs the same listener handshakes as a real SFU client library
//! (connect on first use, server-assigned producer ids, paused consumers)
//! but moves no media. Tracks are synthetic. Used by the `webinar-probe`
//! binary and by tests, which also use the inspection helpers to simulate
//! remote drops and transport disconnects.

use super::engine::{
    CaptureConstraints, CaptureSource, Consumer, MediaCapture, MediaDevice, MediaEngine, Producer,
    RecvTransport, SendTransport, TransportConnectionState, TransportDirection, TransportListener,
};
use super::params::{
    ConsumerOptions, DtlsParameters, RtpCapabilities, RtpParameters, TransportOptions,
};
use super::track::{MediaStream, MediaTrack};
use super::{MediaKind, MediaVariant};
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

#[derive(Default)]
struct EngineState {
    devices_loaded: AtomicUsize,
    transports: Mutex<Vec<Arc<HeadlessTransport>>>,
    consumers: Mutex<Vec<Arc<HeadlessConsumer>>>,
}

/// Media engine that negotiates but never sends packets
#[derive(Clone, Default)]
pub struct HeadlessEngine {
    state: Arc<EngineState>,
}

impl HeadlessEngine {
    /// Create a new headless engine
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of devices loaded so far
    pub fn devices_loaded(&self) -> usize {
        self.state.devices_loaded.load(Ordering::SeqCst)
    }

    /// Transports created in the given direction, oldest first
    pub fn transports(&self, direction: TransportDirection) -> Vec<Arc<HeadlessTransport>> {
        self.state
            .transports
            .lock()
            .iter()
            .filter(|t| t.direction == direction)
            .cloned()
            .collect()
    }

    /// Every consumer created so far
    pub fn consumers(&self) -> Vec<Arc<HeadlessConsumer>> {
        self.state.consumers.lock().clone()
    }

    /// Most recent open consumer for a remote producer
    pub fn consumer_for(&self, producer_id: &str) -> Option<Arc<HeadlessConsumer>> {
        self.state
            .consumers
            .lock()
            .iter()
            .rev()
            .find(|c| c.producer_id == producer_id && !c.closed.load(Ordering::SeqCst))
            .cloned()
    }
}

#[async_trait]
impl MediaEngine for HeadlessEngine {
    async fn load_device(
        &self,
        router_capabilities: RtpCapabilities,
    ) -> Result<Arc<dyn MediaDevice>> {
        let codecs = router_capabilities
            .0
            .get("codecs")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                Error::DeviceError("router capabilities carry no codec list".to_string())
            })?;

        if codecs.is_empty() {
            return Err(Error::DeviceError("router supports no codecs".to_string()));
        }

        self.state.devices_loaded.fetch_add(1, Ordering::SeqCst);
        debug!(codecs = codecs.len(), "Headless device loaded");

        Ok(Arc::new(HeadlessDevice {
            capabilities: router_capabilities,
            engine: Arc::downgrade(&self.state),
        }))
    }
}

struct HeadlessDevice {
    capabilities: RtpCapabilities,
    engine: Weak<EngineState>,
}

impl HeadlessDevice {
    fn register(
        &self,
        direction: TransportDirection,
        options: TransportOptions,
        listener: Arc<dyn TransportListener>,
    ) -> Arc<HeadlessTransport> {
        let transport = Arc::new(HeadlessTransport {
            id: options.id,
            direction,
            listener,
            connect_gate: tokio::sync::Mutex::new(false),
            state: Mutex::new(TransportConnectionState::New),
            closed: AtomicBool::new(false),
            next_mid: AtomicU32::new(0),
            engine: self.engine.clone(),
        });

        if let Some(engine) = self.engine.upgrade() {
            engine.transports.lock().push(Arc::clone(&transport));
        }

        transport
    }
}

impl MediaDevice for HeadlessDevice {
    fn rtp_capabilities(&self) -> RtpCapabilities {
        self.capabilities.clone()
    }

    fn create_send_transport(
        &self,
        options: TransportOptions,
        listener: Arc<dyn TransportListener>,
    ) -> Result<Arc<dyn SendTransport>> {
        Ok(self.register(TransportDirection::Send, options, listener))
    }

    fn create_recv_transport(
        &self,
        options: TransportOptions,
        listener: Arc<dyn TransportListener>,
    ) -> Result<Arc<dyn RecvTransport>> {
        Ok(self.register(TransportDirection::Recv, options, listener))
    }
}

/// Headless transport (either direction)
pub struct HeadlessTransport {
    id: String,
    direction: TransportDirection,
    listener: Arc<dyn TransportListener>,
    connect_gate: tokio::sync::Mutex<bool>,
    state: Mutex<TransportConnectionState>,
    closed: AtomicBool,
    next_mid: AtomicU32,
    engine: Weak<EngineState>,
}

impl HeadlessTransport {
    /// Server transport id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Transport direction
    pub fn direction(&self) -> TransportDirection {
        self.direction
    }

    /// Current connection state
    pub fn connection_state(&self) -> TransportConnectionState {
        *self.state.lock()
    }

    /// Whether the transport was closed locally
    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Report a connectivity loss to the listener
    pub fn simulate_disconnect(&self) {
        self.set_state(TransportConnectionState::Disconnected);
    }

    fn set_state(&self, state: TransportConnectionState) {
        *self.state.lock() = state;
        self.listener.on_connection_state_change(&self.id, state);
    }

    fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            *self.state.lock() = TransportConnectionState::Closed;
            debug!(
                transport_id = %self.id,
                direction = %self.direction,
                "Headless transport closed"
            );
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed() {
            return Err(Error::TransportError(format!("transport {} is closed", self.id)));
        }
        Ok(())
    }

    async fn ensure_connected(&self) -> Result<()> {
        let mut connected = self.connect_gate.lock().await;
        if *connected {
            return Ok(());
        }

        self.set_state(TransportConnectionState::Connecting);
        let dtls = DtlsParameters(json!({
            "role": "client",
            "fingerprints": [{"algorithm": "sha-256", "value": format!("headless:{}", self.id)}],
        }));

        match self.listener.on_connect(&self.id, dtls).await {
            Ok(()) => {
                *connected = true;
                self.set_state(TransportConnectionState::Connected);
                Ok(())
            }
            Err(e) => {
                self.set_state(TransportConnectionState::Failed);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl SendTransport for HeadlessTransport {
    fn id(&self) -> &str {
        &self.id
    }

    async fn produce(&self, track: MediaTrack, variant: MediaVariant) -> Result<Arc<dyn Producer>> {
        self.ensure_open()?;
        if track.ready_state() == super::ReadyState::Ended {
            return Err(Error::ProducerError(format!("track {} already ended", track.id())));
        }

        self.ensure_connected().await?;

        let mid = self.next_mid.fetch_add(1, Ordering::SeqCst);
        let rtp_parameters = RtpParameters(json!({
            "mid": mid.to_string(),
            "codecs": [],
            "encodings": [{"ssrc": 1000 + mid}],
        }));

        let kind = track.kind();
        let producer_id = self
            .listener
            .on_produce(&self.id, kind, rtp_parameters, variant)
            .await?;

        Ok(Arc::new(HeadlessProducer {
            id: producer_id,
            kind,
            track,
            closed: AtomicBool::new(false),
        }))
    }

    fn close(&self) {
        self.shutdown();
    }

    fn is_closed(&self) -> bool {
        self.closed()
    }
}

#[async_trait]
impl RecvTransport for HeadlessTransport {
    fn id(&self) -> &str {
        &self.id
    }

    async fn consume(&self, options: ConsumerOptions) -> Result<Arc<dyn Consumer>> {
        self.ensure_open()?;
        self.ensure_connected().await?;

        let track = MediaTrack::with_id(
            format!("remote-{}", options.producer_id),
            options.kind,
            format!("remote {} {}", options.variant, options.producer_id),
        );

        let consumer = Arc::new(HeadlessConsumer {
            id: options.id,
            producer_id: options.producer_id,
            kind: options.kind,
            track,
            paused: AtomicBool::new(true),
            closed: AtomicBool::new(false),
        });

        if let Some(engine) = self.engine.upgrade() {
            engine.consumers.lock().push(Arc::clone(&consumer));
        }

        Ok(consumer)
    }

    fn close(&self) {
        self.shutdown();
    }

    fn is_closed(&self) -> bool {
        self.closed()
    }
}

/// Headless producer
pub struct HeadlessProducer {
    id: String,
    kind: MediaKind,
    track: MediaTrack,
    closed: AtomicBool,
}

impl Producer for HeadlessProducer {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn track(&self) -> MediaTrack {
        self.track.clone()
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.track.stop();
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Headless consumer
pub struct HeadlessConsumer {
    id: String,
    producer_id: String,
    kind: MediaKind,
    track: MediaTrack,
    paused: AtomicBool,
    closed: AtomicBool,
}

impl HeadlessConsumer {
    /// Simulate the remote side dying (the track ends unexpectedly)
    pub fn drop_remote(&self) {
        self.track.end();
    }
}

#[async_trait]
impl Consumer for HeadlessConsumer {
    fn id(&self) -> &str {
        &self.id
    }

    fn producer_id(&self) -> &str {
        &self.producer_id
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn track(&self) -> MediaTrack {
        self.track.clone()
    }

    async fn resume(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ConsumerError(format!("consumer {} is closed", self.id)));
        }
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.track.stop();
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct CaptureState {
    denied: Mutex<HashSet<CaptureSource>>,
    acquired: Mutex<Vec<(CaptureSource, MediaStream)>>,
}

/// Capture backend producing synthetic tracks
#[derive(Clone, Default)]
pub struct HeadlessCapture {
    state: Arc<CaptureState>,
}

impl HeadlessCapture {
    /// Create a capture backend that grants every source
    pub fn new() -> Self {
        Self::default()
    }

    /// Make future acquisitions from `source` fail as permission denied
    pub fn deny(&self, source: CaptureSource) {
        self.state.denied.lock().insert(source);
    }

    /// Grant `source` again
    pub fn allow(&self, source: CaptureSource) {
        self.state.denied.lock().remove(&source);
    }

    /// Streams handed out so far for `source`
    pub fn acquired_from(&self, source: CaptureSource) -> Vec<MediaStream> {
        self.state
            .acquired
            .lock()
            .iter()
            .filter(|(s, _)| *s == source)
            .map(|(_, stream)| stream.clone())
            .collect()
    }

    /// Every stream handed out so far
    pub fn acquired(&self) -> Vec<MediaStream> {
        self.state
            .acquired
            .lock()
            .iter()
            .map(|(_, stream)| stream.clone())
            .collect()
    }
}

#[async_trait]
impl MediaCapture for HeadlessCapture {
    async fn acquire(
        &self,
        source: CaptureSource,
        constraints: &CaptureConstraints,
    ) -> Result<MediaStream> {
        if self.state.denied.lock().contains(&source) {
            return Err(Error::MediaAcquisitionError(format!(
                "permission denied for {:?}",
                source
            )));
        }

        let resolution = match (constraints.width(), constraints.height) {
            (Some(w), Some(h)) => format!(" {}x{}", w, h),
            _ => String::new(),
        };

        let track = match source {
            CaptureSource::Camera => {
                MediaTrack::new(MediaKind::Video, format!("headless camera{}", resolution))
            }
            CaptureSource::Microphone => MediaTrack::new(MediaKind::Audio, "headless microphone"),
            CaptureSource::Display => {
                MediaTrack::new(MediaKind::Video, format!("headless display{}", resolution))
            }
        };

        let stream = MediaStream::new(vec![track]);
        self.state.acquired.lock().push((source, stream.clone()));
        Ok(stream)
    }
}
