//! Request/response signaling channel with per-call correlation
//!
//! A [`SignalingChannel`] sits on top of any pair of text-frame pipes. The
//! WebSocket constructor wires those pipes to a socket; tests wire them to an
//! in-memory server. Replies are matched to callers by JSON-RPC id, broadcasts
//! are decoded into [`RoomEvent`]s and handed to whoever took the event
//! receiver.

use super::events::{ChannelEvent, DisconnectReason, RoomEvent};
use super::protocol::{response_outcome, ErrorObject, InboundFrame, JsonRpcRequest};
use crate::{Error, Result};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

type PendingReply = oneshot::Sender<std::result::Result<Value, ErrorObject>>;

struct ChannelInner {
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    pending: Mutex<HashMap<u64, PendingReply>>,
    next_id: AtomicU64,
    connected: AtomicBool,
    request_timeout: Option<Duration>,
    event_tx: mpsc::UnboundedSender<ChannelEvent>,
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<ChannelEvent>>>,
    shutdown: watch::Sender<bool>,
}

/// Session-scoped signaling channel handle
///
/// Cheap to clone; clones share the same link.
#[derive(Clone)]
pub struct SignalingChannel {
    inner: Arc<ChannelInner>,
}

impl SignalingChannel {
    /// Connect to a WebSocket signaling server
    ///
    /// # Arguments
    ///
    /// * `url` - ws:// or wss:// URL
    /// * `request_timeout` - Upper bound per request (`None` waits forever)
    pub async fn connect(url: &str, request_timeout: Option<Duration>) -> Result<Self> {
        info!("Connecting to signaling server: {}", url);

        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| Error::WebSocketError(format!("Failed to connect: {}", e)))?;

        info!("Connected to signaling server");

        let (mut write, mut read) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();

        // Receiver task: socket frames to the channel
        tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if in_tx.send(text).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        info!("WebSocket connection closed by server");
                        break;
                    }
                    Err(e) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
            debug!("Signaling receiver task terminated");
        });

        let channel = Self::from_parts(out_tx, in_rx, request_timeout);

        // Sender task: outbound frames to the socket
        let link = Arc::downgrade(&channel.inner);
        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if let Err(e) = write.send(Message::Text(text)).await {
                    error!("Failed to send WebSocket message: {}", e);
                    if let Some(inner) = link.upgrade() {
                        inner.close(DisconnectReason::ConnectionLost);
                    }
                    break;
                }
            }
            let _ = write.close().await;
            debug!("Signaling sender task terminated");
        });

        Ok(channel)
    }

    /// Build a channel over raw text-frame pipes
    ///
    /// Must be called inside a tokio runtime: the inbound reader runs as a task.
    pub fn from_parts(
        outbound: mpsc::UnboundedSender<String>,
        inbound: mpsc::UnboundedReceiver<String>,
        request_timeout: Option<Duration>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let inner = Arc::new(ChannelInner {
            outbound: Mutex::new(Some(outbound)),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            connected: AtomicBool::new(true),
            request_timeout,
            event_tx,
            event_rx: Mutex::new(Some(event_rx)),
            shutdown,
        });

        tokio::spawn(Self::reader_task(Arc::clone(&inner), inbound, shutdown_rx));

        Self { inner }
    }

    async fn reader_task(
        inner: Arc<ChannelInner>,
        mut inbound: mpsc::UnboundedReceiver<String>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                frame = inbound.recv() => match frame {
                    Some(text) => inner.handle_frame(&text),
                    None => {
                        warn!("Signaling link closed");
                        inner.close(DisconnectReason::ConnectionLost);
                        break;
                    }
                },
                _ = shutdown.changed() => break,
            }
        }

        debug!("Signaling reader task terminated");
    }

    /// Whether the link is still up
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Take the event receiver (once; later calls return `None`)
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<ChannelEvent>> {
        self.inner.event_rx.lock().take()
    }

    /// Send a request and wait for its reply
    ///
    /// Fails with [`Error::ServerError`] when the server answers with an
    /// error payload, [`Error::ChannelClosed`] if the link drops first.
    pub async fn request<P, R>(&self, method: &str, params: &P) -> Result<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().insert(id, tx);

        let frame = match serde_json::to_value(params)
            .map_err(Error::from)
            .and_then(|params| JsonRpcRequest::new(method, params, Some(id)).to_json())
        {
            Ok(frame) => frame,
            Err(e) => {
                self.inner.pending.lock().remove(&id);
                return Err(e);
            }
        };

        debug!(method, id, "Sending signaling request");
        if let Err(e) = self.inner.send_frame(frame) {
            self.inner.pending.lock().remove(&id);
            return Err(e);
        }

        let reply = match self.inner.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(reply) => reply,
                Err(_) => {
                    self.inner.pending.lock().remove(&id);
                    return Err(Error::OperationTimeout(format!(
                        "{} got no reply within {:?}",
                        method, limit
                    )));
                }
            },
            None => rx.await,
        };

        match reply {
            Ok(Ok(value)) => serde_json::from_value(value).map_err(|e| {
                Error::SerializationError(format!("Invalid {} response: {}", method, e))
            }),
            Ok(Err(err)) => Err(Error::ServerError {
                method: method.to_string(),
                message: err.message,
            }),
            Err(_) => Err(Error::ChannelClosed),
        }
    }

    /// Send a fire-and-forget notification
    pub fn notify<P>(&self, method: &str, params: &P) -> Result<()>
    where
        P: Serialize + ?Sized,
    {
        let params = serde_json::to_value(params)?;
        let frame = JsonRpcRequest::new(method, params, None).to_json()?;
        debug!(method, "Sending signaling notification");
        self.inner.send_frame(frame)
    }

    /// Close the link from our side
    pub fn disconnect(&self) {
        info!("Disconnecting signaling channel");
        self.inner.close(DisconnectReason::ClientInitiated);
    }
}

impl ChannelInner {
    fn send_frame(&self, frame: String) -> Result<()> {
        let sent = match self.outbound.lock().as_ref() {
            Some(tx) => tx.send(frame).is_ok(),
            None => return Err(Error::ChannelClosed),
        };

        if !sent {
            // Writer side is gone; report it like a read-side loss
            warn!("Signaling writer stopped");
            self.close(DisconnectReason::ConnectionLost);
            return Err(Error::ChannelClosed);
        }
        Ok(())
    }

    fn handle_frame(&self, text: &str) {
        let frame = match InboundFrame::from_json(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping unparseable signaling frame: {}", e);
                return;
            }
        };

        match frame {
            InboundFrame::Response { id, result, error } => {
                let waiter = self.pending.lock().remove(&id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(response_outcome(result, error));
                    }
                    None => debug!(id, "Reply for unknown or abandoned request"),
                }
            }
            InboundFrame::Notification { method, params } => {
                match RoomEvent::parse(&method, params) {
                    Ok(Some(event)) => {
                        debug!(event = event.name(), "Room event received");
                        let _ = self.event_tx.send(ChannelEvent::Room(event));
                    }
                    Ok(None) => debug!(method = %method, "Ignoring unrecognized event"),
                    Err(e) => warn!("Failed to decode {} event: {}", method, e),
                }
            }
        }
    }

    fn close(&self, reason: DisconnectReason) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }

        self.outbound.lock().take();
        let _ = self.shutdown.send(true);

        // Dropping the senders fails every waiter with ChannelClosed
        let abandoned: Vec<PendingReply> = self.pending.lock().drain().map(|(_, tx)| tx).collect();
        if !abandoned.is_empty() {
            debug!(count = abandoned.len(), "Failing pending signaling requests");
        }
        drop(abandoned);

        let _ = self.event_tx.send(ChannelEvent::Disconnected(reason));
    }
}
