//! Webinar session test harness
//!
//! Provides:
//! - A scripted signaling server over in-memory channels (`FakeServer`)
//! - Session construction with the headless engine and capture
//! - Polling helpers for state that settles asynchronously
//!
//! Basic usage pattern:
//!
//! 1. `let mut t = TestSession::host();` (or `attendee`)
//! 2. Script replies with `t.server.reply(..)` / `fail(..)` / `hold(..)`
//! 3. Drive the session and push broadcasts with `t.server.broadcast(..)`
//! 4. Assert on `t.server.requests(..)`, the session snapshot and notices

#![allow(dead_code)]

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use webinar_room::media::{HeadlessCapture, HeadlessEngine};
use webinar_room::{
    MediaKind, MediaVariant, Participant, ParticipantRole, RemoteProducer, SessionConfig,
    SessionNotice, SignalingChannel, WebinarSession,
};

/// Install a test subscriber once
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

#[derive(Clone)]
enum Scripted {
    Result(Value),
    Error(String),
}

#[derive(Default)]
struct ServerState {
    to_client: Mutex<Option<mpsc::UnboundedSender<String>>>,
    frames: Mutex<Vec<Value>>,
    scripted: Mutex<HashMap<String, Scripted>>,
    holding: Mutex<HashMap<String, usize>>,
    held: Mutex<Vec<Value>>,
    users: Mutex<Vec<Value>>,
    producers: Mutex<Vec<RemoteProducer>>,
    transports: AtomicUsize,
    produced: AtomicUsize,
    consumers: AtomicUsize,
}

impl ServerState {
    fn send(&self, frame: Value) {
        if let Some(tx) = self.to_client.lock().as_ref() {
            let _ = tx.send(frame.to_string());
        }
    }

    fn default_result(&self, method: &str, params: &Value) -> Value {
        match method {
            "createRoom" | "joinRoom" => json!({"status": true}),
            "getInRoomUsers" => json!({"users": self.users.lock().clone()}),
            "getRouterRtpCapabilities" => json!({
                "codecs": [
                    {"kind": "audio", "mimeType": "audio/opus", "clockRate": 48000, "channels": 2},
                    {"kind": "video", "mimeType": "video/VP8", "clockRate": 90000}
                ],
                "headerExtensions": []
            }),
            "createWebRtcTransport" => {
                let n = self.transports.fetch_add(1, Ordering::SeqCst) + 1;
                json!({
                    "id": format!("transport-{}", n),
                    "iceParameters": {
                        "usernameFragment": format!("ufrag-{}", n),
                        "password": "secret"
                    },
                    "iceCandidates": [{"ip": "127.0.0.1", "port": 40000 + n, "protocol": "udp"}],
                    "dtlsParameters": {"role": "auto", "fingerprints": []}
                })
            }
            "produce" => {
                let n = self.produced.fetch_add(1, Ordering::SeqCst) + 1;
                json!({"producerId": format!("server-producer-{}", n)})
            }
            "consume" => {
                let n = self.consumers.fetch_add(1, Ordering::SeqCst) + 1;
                let producer_id = params["producerId"].as_str().unwrap_or_default().to_string();
                let (kind, variant) = self
                    .producers
                    .lock()
                    .iter()
                    .find(|p| p.producer_id == producer_id)
                    .map(|p| (p.kind, p.variant))
                    .unwrap_or((MediaKind::Video, MediaVariant::Video));
                json!({
                    "id": format!("consumer-{}", n),
                    "producerId": producer_id,
                    "kind": kind,
                    "rtpParameters": {"mid": n.to_string(), "codecs": []},
                    "variant": variant
                })
            }
            "getProducers" => json!({"producers": self.producers.lock().clone()}),
            _ => json!({}),
        }
    }

    fn answer(&self, request: &Value) {
        let method = request["method"].as_str().unwrap_or_default();
        let scripted = self.scripted.lock().get(method).cloned();
        let frame = match scripted {
            Some(Scripted::Result(result)) => {
                json!({"jsonrpc": "2.0", "result": result, "id": request["id"]})
            }
            Some(Scripted::Error(message)) => json!({
                "jsonrpc": "2.0",
                "error": {"code": -32000, "message": message},
                "id": request["id"]
            }),
            None => json!({
                "jsonrpc": "2.0",
                "result": self.default_result(method, &request["params"]),
                "id": request["id"]
            }),
        };
        self.send(frame);
    }
}

/// Scripted signaling server speaking JSON-RPC 2.0 over in-memory channels
#[derive(Clone)]
pub struct FakeServer {
    state: Arc<ServerState>,
}

impl FakeServer {
    /// Start a server and return the client channel connected to it
    pub fn start(request_timeout: Option<Duration>) -> (Self, SignalingChannel) {
        let (client_tx, mut server_rx) = mpsc::unbounded_channel::<String>();
        let (server_tx, client_rx) = mpsc::unbounded_channel::<String>();

        let state = Arc::new(ServerState::default());
        *state.to_client.lock() = Some(server_tx);

        let task_state = Arc::clone(&state);
        tokio::spawn(async move {
            while let Some(text) = server_rx.recv().await {
                let frame: Value = serde_json::from_str(&text).expect("client sent invalid JSON");
                task_state.frames.lock().push(frame.clone());

                if frame["id"].is_null() {
                    continue;
                }
                let method = frame["method"].as_str().unwrap_or_default().to_string();
                let parked = {
                    let mut holding = task_state.holding.lock();
                    match holding.get_mut(&method) {
                        Some(pass) if *pass > 0 => {
                            *pass -= 1;
                            false
                        }
                        Some(_) => {
                            task_state.held.lock().push(frame.clone());
                            true
                        }
                        None => false,
                    }
                };
                if !parked {
                    task_state.answer(&frame);
                }
            }
        });

        let channel = SignalingChannel::from_parts(client_tx, client_rx, request_timeout);
        (Self { state }, channel)
    }

    /// Always answer `method` with `result`
    pub fn reply(&self, method: &str, result: Value) {
        self.state
            .scripted
            .lock()
            .insert(method.to_string(), Scripted::Result(result));
    }

    /// Always answer `method` with a JSON-RPC error
    pub fn fail(&self, method: &str, message: &str) {
        self.state
            .scripted
            .lock()
            .insert(method.to_string(), Scripted::Error(message.to_string()));
    }

    /// Go back to the default reply for `method`
    pub fn clear(&self, method: &str) {
        self.state.scripted.lock().remove(method);
    }

    /// Park every `method` request until `release`
    pub fn hold(&self, method: &str) {
        self.hold_after(method, 0);
    }

    /// Answer the next `pass` `method` requests, then park the rest until `release`
    pub fn hold_after(&self, method: &str, pass: usize) {
        self.state.holding.lock().insert(method.to_string(), pass);
    }

    /// Stop parking `method` and answer everything parked so far
    pub fn release(&self, method: &str) {
        let parked: Vec<Value> = {
            let mut holding = self.state.holding.lock();
            holding.remove(method);
            let mut held = self.state.held.lock();
            let (matching, rest): (Vec<Value>, Vec<Value>) =
                held.drain(..).partition(|r| r["method"] == method);
            *held = rest;
            matching
        };
        for request in parked {
            self.state.answer(&request);
        }
    }

    /// Wait until `count` requests for `method` are parked
    pub async fn wait_for_held(&self, method: &str, count: usize) {
        let state = Arc::clone(&self.state);
        let method = method.to_string();
        eventually(move || {
            let held = state.held.lock();
            held.iter().filter(|r| r["method"] == method).count() >= count
        })
        .await;
    }

    /// Wait until `count` frames with `method` have arrived
    ///
    /// Notifications are recorded asynchronously, so assert on them after this.
    pub async fn wait_for_count(&self, method: &str, count: usize) {
        let server = self.clone();
        let method = method.to_string();
        eventually(move || server.count(&method) >= count).await;
    }

    /// Participants returned by `getInRoomUsers`
    pub fn set_users(&self, users: Vec<Participant>) {
        *self.state.users.lock() = users
            .into_iter()
            .map(|u| serde_json::to_value(u).unwrap())
            .collect();
    }

    /// Producers returned by `getProducers` (and used to shape `consume` replies)
    pub fn set_producers(&self, producers: Vec<RemoteProducer>) {
        *self.state.producers.lock() = producers;
    }

    /// Push a broadcast to the client
    pub fn broadcast(&self, method: &str, params: Value) {
        self.state
            .send(json!({"jsonrpc": "2.0", "method": method, "params": params}));
    }

    /// Register producers and broadcast `newProducers`
    pub fn announce(&self, producers: Vec<RemoteProducer>) {
        self.state.producers.lock().extend(producers.iter().cloned());
        self.broadcast("newProducers", json!({ "producers": producers }));
    }

    /// Unregister a producer and broadcast `producerClosed`
    pub fn close_producer(&self, producer_id: &str) {
        self.state
            .producers
            .lock()
            .retain(|p| p.producer_id != producer_id);
        self.broadcast("producerClosed", json!({ "producerId": producer_id }));
    }

    /// Drop the link (the client sees a lost connection)
    pub fn disconnect(&self) {
        self.state.to_client.lock().take();
    }

    /// Params of every frame sent with `method`, oldest first
    pub fn requests(&self, method: &str) -> Vec<Value> {
        self.state
            .frames
            .lock()
            .iter()
            .filter(|f| f["method"] == method)
            .map(|f| f["params"].clone())
            .collect()
    }

    /// Number of frames sent with `method`
    pub fn count(&self, method: &str) -> usize {
        self.requests(method).len()
    }

    /// Method names of every frame received, oldest first
    pub fn methods(&self) -> Vec<String> {
        self.state
            .frames
            .lock()
            .iter()
            .map(|f| f["method"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}

/// A session wired to a fake server and the headless engine
pub struct TestSession {
    pub session: WebinarSession,
    pub notices: mpsc::UnboundedReceiver<SessionNotice>,
    pub server: FakeServer,
    pub engine: HeadlessEngine,
    pub capture: HeadlessCapture,
}

impl TestSession {
    /// Build a session; the caller scripts the server before `start()`
    pub fn with_config(config: SessionConfig) -> Self {
        init_tracing();
        let (server, channel) = FakeServer::start(config.request_timeout());
        let engine = HeadlessEngine::new();
        let capture = HeadlessCapture::new();
        let (session, notices) = WebinarSession::new(
            config,
            channel,
            Arc::new(engine.clone()),
            Arc::new(capture.clone()),
        );

        Self {
            session,
            notices,
            server,
            engine,
            capture,
        }
    }

    /// Host session, not started
    pub fn host() -> Self {
        Self::with_config(config(participant("host-1", ParticipantRole::Host)))
    }

    /// Attendee session, not started
    pub fn attendee() -> Self {
        Self::with_config(config(participant("attendee-1", ParticipantRole::Attendee)))
    }

    /// Next notice, failing the test after 2s
    pub async fn next_notice(&mut self) -> SessionNotice {
        tokio::time::timeout(Duration::from_secs(2), self.notices.recv())
            .await
            .expect("no notice within 2s")
            .expect("notice channel closed")
    }

    /// Notices received so far
    pub fn drain_notices(&mut self) -> Vec<SessionNotice> {
        let mut out = Vec::new();
        while let Ok(notice) = self.notices.try_recv() {
            out.push(notice);
        }
        out
    }
}

/// Participant with a generated name
pub fn participant(id: &str, role: ParticipantRole) -> Participant {
    Participant {
        id: id.to_string(),
        first_name: "Test".to_string(),
        last_name: id.to_string(),
        role,
    }
}

/// Remote producer descriptor
pub fn remote(producer_id: &str, variant: MediaVariant) -> RemoteProducer {
    RemoteProducer {
        producer_id: producer_id.to_string(),
        kind: variant.kind(),
        variant,
    }
}

/// Session config for the test room
pub fn config(user: Participant) -> SessionConfig {
    SessionConfig::new("ws://fake.invalid/ws", "room-1", user)
}

/// Poll `condition` every 5ms for up to 2s
pub async fn eventually<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within 2s");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Let spawned tasks run for a moment
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
