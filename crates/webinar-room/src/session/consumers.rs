//! Remote media consumption

use super::room::RoomState;
use crate::media::{
    Consumer, ConsumerOptions, EndReason, MediaDevice, MediaKind, MediaStream, MediaVariant,
    RecvTransport,
};
use crate::signaling::protocol::{methods, ConsumeParams, ConsumeResponse};
use crate::signaling::SignalingChannel;
use crate::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// One consumed remote producer
pub struct RemoteMedia {
    consumer: Arc<dyn Consumer>,
    stream: MediaStream,
    variant: MediaVariant,
}

impl RemoteMedia {
    /// Wrap a live consumer and the stream built from its track
    pub fn new(consumer: Arc<dyn Consumer>, stream: MediaStream, variant: MediaVariant) -> Self {
        Self {
            consumer,
            stream,
            variant,
        }
    }

    /// Server consumer id
    pub fn consumer_id(&self) -> &str {
        self.consumer.id()
    }

    /// Remote producer id
    pub fn producer_id(&self) -> &str {
        self.consumer.producer_id()
    }

    /// Media kind
    pub fn kind(&self) -> MediaKind {
        self.consumer.kind()
    }

    /// Semantic variant
    pub fn variant(&self) -> MediaVariant {
        self.variant
    }

    /// Stream holding the received track
    pub fn stream(&self) -> &MediaStream {
        &self.stream
    }

    /// Close the consumer
    pub fn close(&self) {
        self.consumer.close();
    }
}

/// Raised when a consumed track ends on its own
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RemoteTrackEnded {
    pub producer_id: String,
    pub consumer_id: String,
}

/// Everything one consume attempt needs
pub(crate) struct ConsumeContext<'a> {
    pub room_id: &'a str,
    pub channel: &'a SignalingChannel,
    pub room: &'a RoomState,
    pub device: &'a Arc<dyn MediaDevice>,
    pub transport: &'a Arc<dyn RecvTransport>,
    pub track_ended: &'a mpsc::UnboundedSender<RemoteTrackEnded>,
}

/// Consume a remote producer and register it
///
/// Returns `Ok(false)` when nothing was done: the producer is unknown,
/// already consumed, already being consumed, or closed during the attempt.
pub(crate) async fn consume_producer(ctx: ConsumeContext<'_>, producer_id: &str) -> Result<bool> {
    if !ctx.room.begin_consume(producer_id) {
        debug!(producer_id, "Skipping consume");
        return Ok(false);
    }

    match attempt(&ctx, producer_id).await {
        Ok(Some(media)) => {
            let consumer_id = media.consumer_id().to_string();
            let track = media.consumer.track();

            if let Err(media) = ctx.room.finish_consume(media) {
                debug!(producer_id, "Producer went away while consuming");
                media.close();
                return Ok(false);
            }

            info!(producer_id, consumer_id = %consumer_id, "Consuming remote producer");
            watch_remote_track(
                track,
                producer_id.to_string(),
                consumer_id,
                ctx.track_ended.clone(),
            );
            Ok(true)
        }
        Ok(None) => {
            ctx.room.abort_consume(producer_id);
            Ok(false)
        }
        Err(e) => {
            ctx.room.abort_consume(producer_id);
            warn!(producer_id, "Consume failed: {}", e);
            Err(e)
        }
    }
}

async fn attempt(ctx: &ConsumeContext<'_>, producer_id: &str) -> Result<Option<RemoteMedia>> {
    let response: ConsumeResponse = ctx
        .channel
        .request(
            methods::CONSUME,
            &ConsumeParams {
                room_id: ctx.room_id.to_string(),
                producer_id: producer_id.to_string(),
                rtp_capabilities: ctx.device.rtp_capabilities(),
                consumer_transport_id: ctx.transport.id().to_string(),
            },
        )
        .await?;

    if !ctx.room.has_producer(producer_id) {
        debug!(producer_id, "Producer closed before the consumer was created");
        return Ok(None);
    }

    let variant = response.variant;
    let consumer = ctx
        .transport
        .consume(ConsumerOptions {
            id: response.id,
            producer_id: producer_id.to_string(),
            kind: response.kind,
            rtp_parameters: response.rtp_parameters,
            variant,
        })
        .await?;

    if let Err(e) = consumer.resume().await {
        consumer.close();
        return Err(e);
    }

    let stream = MediaStream::new(vec![consumer.track()]);
    Ok(Some(RemoteMedia::new(consumer, stream, variant)))
}

fn watch_remote_track(
    track: crate::media::MediaTrack,
    producer_id: String,
    consumer_id: String,
    tx: mpsc::UnboundedSender<RemoteTrackEnded>,
) {
    tokio::spawn(async move {
        if track.ended().await == EndReason::Ended {
            debug!(producer_id = %producer_id, "Remote track ended");
            let _ = tx.send(RemoteTrackEnded {
                producer_id,
                consumer_id,
            });
        }
    });
}
