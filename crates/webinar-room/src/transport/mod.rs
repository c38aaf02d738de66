//! Send/receive transport pair
//!
//! Exactly one transport per direction per media session. Creation is
//! guarded so that concurrent callers share one server round trip, and the
//! engine's transport callbacks are bridged onto the signaling channel.

use crate::media::{
    DtlsParameters, MediaDevice, MediaKind, MediaVariant, RecvTransport, RtpParameters,
    SendTransport, TransportConnectionState, TransportDirection, TransportListener,
    TransportOptions,
};
use crate::signaling::protocol::{
    methods, ConnectTransportParams, CreateTransportParams, ProduceParams, ProduceResponse,
};
use crate::signaling::SignalingChannel;
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// Transport-level notifications for the session controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A transport lost connectivity
    Disconnected {
        /// Which side
        direction: TransportDirection,
        /// Server transport id
        transport_id: String,
    },
}

/// The session's send and receive transports
pub struct TransportPair {
    room_id: String,
    channel: SignalingChannel,
    events: mpsc::UnboundedSender<TransportEvent>,
    send: Mutex<Option<Arc<dyn SendTransport>>>,
    recv: Mutex<Option<Arc<dyn RecvTransport>>>,
}

impl TransportPair {
    /// Create an empty pair
    pub fn new(
        room_id: impl Into<String>,
        channel: SignalingChannel,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Self {
        Self {
            room_id: room_id.into(),
            channel,
            events,
            send: Mutex::new(None),
            recv: Mutex::new(None),
        }
    }

    fn bridge(&self, direction: TransportDirection) -> Arc<dyn TransportListener> {
        Arc::new(SignalBridge {
            room_id: self.room_id.clone(),
            channel: self.channel.clone(),
            direction,
            events: self.events.clone(),
        })
    }

    /// Create the receive transport unless one exists
    ///
    /// Returns the transport and whether this call created it.
    pub async fn ensure_recv(
        &self,
        device: &Arc<dyn MediaDevice>,
    ) -> Result<(Arc<dyn RecvTransport>, bool)> {
        let mut slot = self.recv.lock().await;
        if let Some(existing) = slot.as_ref() {
            debug!(transport_id = existing.id(), "Receive transport already exists");
            return Ok((Arc::clone(existing), false));
        }

        let options: TransportOptions = self
            .channel
            .request(
                methods::CREATE_WEBRTC_TRANSPORT,
                &CreateTransportParams {
                    room_id: self.room_id.clone(),
                    consumer: true,
                    rtp_capabilities: None,
                },
            )
            .await?;

        let transport =
            device.create_recv_transport(options, self.bridge(TransportDirection::Recv))?;
        info!(transport_id = transport.id(), "Receive transport created");

        *slot = Some(Arc::clone(&transport));
        Ok((transport, true))
    }

    /// Create the send transport unless one exists
    ///
    /// Returns the transport and whether this call created it.
    pub async fn ensure_send(
        &self,
        device: &Arc<dyn MediaDevice>,
    ) -> Result<(Arc<dyn SendTransport>, bool)> {
        let mut slot = self.send.lock().await;
        if let Some(existing) = slot.as_ref() {
            debug!(transport_id = existing.id(), "Send transport already exists");
            return Ok((Arc::clone(existing), false));
        }

        let options: TransportOptions = self
            .channel
            .request(
                methods::CREATE_WEBRTC_TRANSPORT,
                &CreateTransportParams {
                    room_id: self.room_id.clone(),
                    consumer: false,
                    rtp_capabilities: Some(device.rtp_capabilities()),
                },
            )
            .await?;

        let transport =
            device.create_send_transport(options, self.bridge(TransportDirection::Send))?;
        info!(transport_id = transport.id(), "Send transport created");

        *slot = Some(Arc::clone(&transport));
        Ok((transport, true))
    }

    /// Current send transport, if created and open
    pub async fn send_transport(&self) -> Option<Arc<dyn SendTransport>> {
        self.send.lock().await.as_ref().filter(|t| !t.is_closed()).cloned()
    }

    /// Current receive transport, if created and open
    pub async fn recv_transport(&self) -> Option<Arc<dyn RecvTransport>> {
        self.recv.lock().await.as_ref().filter(|t| !t.is_closed()).cloned()
    }

    /// Close one side if its id matches
    ///
    /// The closed transport stays in place so the presence guard keeps
    /// holding; a new pair is needed to create another.
    pub async fn close_if(&self, direction: TransportDirection, transport_id: &str) -> bool {
        match direction {
            TransportDirection::Send => match self.send.lock().await.as_ref() {
                Some(t) if t.id() == transport_id => {
                    t.close();
                    true
                }
                _ => false,
            },
            TransportDirection::Recv => match self.recv.lock().await.as_ref() {
                Some(t) if t.id() == transport_id => {
                    t.close();
                    true
                }
                _ => false,
            },
        }
    }

    /// Close both transports
    pub async fn close_all(&self) {
        if let Some(t) = self.send.lock().await.take() {
            t.close();
        }
        if let Some(t) = self.recv.lock().await.take() {
            t.close();
        }
    }
}

/// Forwards engine transport callbacks to the signaling server
struct SignalBridge {
    room_id: String,
    channel: SignalingChannel,
    direction: TransportDirection,
    events: mpsc::UnboundedSender<TransportEvent>,
}

#[async_trait]
impl TransportListener for SignalBridge {
    async fn on_connect(&self, transport_id: &str, dtls_parameters: DtlsParameters) -> Result<()> {
        debug!(transport_id, direction = %self.direction, "Connecting transport");

        let _: Value = self
            .channel
            .request(
                methods::CONNECT_TRANSPORT,
                &ConnectTransportParams {
                    room_id: self.room_id.clone(),
                    transport_id: transport_id.to_string(),
                    dtls_parameters,
                },
            )
            .await?;
        Ok(())
    }

    async fn on_produce(
        &self,
        transport_id: &str,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
        variant: MediaVariant,
    ) -> Result<String> {
        let response: ProduceResponse = self
            .channel
            .request(
                methods::PRODUCE,
                &ProduceParams {
                    room_id: self.room_id.clone(),
                    kind,
                    rtp_parameters,
                    variant,
                    producer_transport_id: transport_id.to_string(),
                },
            )
            .await?;

        debug!(producer_id = %response.producer_id, %variant, "Server assigned producer id");
        Ok(response.producer_id)
    }

    fn on_connection_state_change(&self, transport_id: &str, state: TransportConnectionState) {
        debug!(transport_id, direction = %self.direction, ?state, "Transport state changed");

        if state == TransportConnectionState::Disconnected {
            warn!(transport_id, direction = %self.direction, "Transport disconnected");
            let _ = self.events.send(TransportEvent::Disconnected {
                direction: self.direction,
                transport_id: transport_id.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{HeadlessEngine, MediaEngine, MediaTrack, RtpCapabilities};
    use serde_json::json;

    /// Answers every request with a canned reply
    fn scripted_channel() -> (SignalingChannel, Arc<parking_lot::Mutex<Vec<Value>>>) {
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);

        tokio::spawn(async move {
            let mut n = 0;
            while let Some(text) = out_rx.recv().await {
                let req: Value = serde_json::from_str(&text).unwrap();
                log.lock().push(req.clone());
                let result = match req["method"].as_str().unwrap() {
                    "createWebRtcTransport" => {
                        n += 1;
                        json!({
                            "id": format!("t{}", n),
                            "iceParameters": {},
                            "iceCandidates": [],
                            "dtlsParameters": {}
                        })
                    }
                    "produce" => json!({"producerId": "srv-1"}),
                    _ => json!({}),
                };
                if !req["id"].is_null() {
                    let reply = json!({"jsonrpc": "2.0", "result": result, "id": req["id"]});
                    let _ = in_tx.send(reply.to_string());
                }
            }
        });

        (SignalingChannel::from_parts(out_tx, in_rx, None), seen)
    }

    async fn device() -> Arc<dyn MediaDevice> {
        HeadlessEngine::new()
            .load_device(RtpCapabilities(json!({"codecs": [{"mimeType": "video/VP8"}]})))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_concurrent_ensure_creates_once() {
        let (channel, seen) = scripted_channel();
        let (tx, _rx) = mpsc::unbounded_channel();
        let pair = Arc::new(TransportPair::new("room-1", channel, tx));
        let device = device().await;

        let (a, b) = tokio::join!(pair.ensure_recv(&device), pair.ensure_recv(&device));
        let (a, created_a) = a.unwrap();
        let (b, created_b) = b.unwrap();

        assert_eq!(a.id(), b.id());
        assert!(created_a ^ created_b);
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(seen.lock()[0]["params"]["consumer"], true);
    }

    #[tokio::test]
    async fn test_send_transport_carries_caps_and_bridges_produce() {
        let (channel, seen) = scripted_channel();
        let (tx, _rx) = mpsc::unbounded_channel();
        let pair = TransportPair::new("room-1", channel, tx);
        let device = device().await;

        let (send, _) = pair.ensure_send(&device).await.unwrap();
        let producer = send
            .produce(MediaTrack::new(MediaKind::Video, "cam"), MediaVariant::Video)
            .await
            .unwrap();
        assert_eq!(producer.id(), "srv-1");

        let seen = seen.lock();
        let methods: Vec<&str> = seen.iter().map(|r| r["method"].as_str().unwrap()).collect();
        assert_eq!(methods, vec!["createWebRtcTransport", "connectTransport", "produce"]);
        assert_eq!(seen[0]["params"]["consumer"], false);
        assert!(seen[0]["params"]["rtpCapabilities"]["codecs"].is_array());
        assert_eq!(seen[2]["params"]["producerTransportId"], "t1");
        assert_eq!(seen[2]["params"]["variant"], "video");
    }

    #[tokio::test]
    async fn test_disconnect_is_reported() {
        let (channel, _seen) = scripted_channel();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pair = TransportPair::new("room-1", channel, tx);
        let engine = HeadlessEngine::new();
        let device = engine
            .load_device(RtpCapabilities(json!({"codecs": [{"mimeType": "audio/opus"}]})))
            .await
            .unwrap();

        pair.ensure_recv(&device).await.unwrap();
        engine.transports(TransportDirection::Recv)[0].simulate_disconnect();

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            TransportEvent::Disconnected {
                direction: TransportDirection::Recv,
                transport_id: "t1".to_string()
            }
        );
        assert!(pair.close_if(TransportDirection::Recv, "t1").await);
        assert!(pair.recv_transport().await.is_none());
    }
}
