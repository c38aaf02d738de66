//! Headless webinar participant
//!
//! Joins a room through the signaling server, optionally publishes synthetic
//! camera and microphone producers, and logs everything the room does.
//!
//! # Usage
//!
//! ```bash
//! # Host a room with a synthetic camera
//! cargo run --bin webinar-probe -- \
//!   --signaling-url ws://localhost:3016 \
//!   --room weekly-sync \
//!   --user-id probe-host --first-name Probe --last-name Host \
//!   --host --camera
//!
//! # Attend and raise a hand
//! cargo run --bin webinar-probe -- \
//!   --room weekly-sync --user-id probe-1 --raise-hand
//!
//! # Settings from a TOML file (flags still override the user and room)
//! cargo run --bin webinar-probe -- --config ./probe.toml
//! ```

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use webinar_room::media::{HeadlessCapture, HeadlessEngine};
use webinar_room::{
    JoinOutcome, MediaVariant, Participant, ParticipantRole, SessionConfig, SessionNotice,
    WebinarSession,
};

/// Webinar room probe
///
/// Headless participant for exercising a webinar signaling server.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long, env = "WEBINAR_CONFIG")]
    config: Option<PathBuf>,

    /// WebSocket signaling URL
    #[arg(long, env = "WEBINAR_SIGNALING_URL")]
    signaling_url: Option<String>,

    /// Room to join
    #[arg(long, env = "WEBINAR_ROOM")]
    room: Option<String>,

    /// Local user id
    #[arg(long, env = "WEBINAR_USER_ID")]
    user_id: Option<String>,

    /// First name shown to the room
    #[arg(long, default_value = "Webinar", env = "WEBINAR_FIRST_NAME")]
    first_name: String,

    /// Last name shown to the room
    #[arg(long, default_value = "Probe", env = "WEBINAR_LAST_NAME")]
    last_name: String,

    /// Join as host (creates the room)
    #[arg(long, default_value_t = false, env = "WEBINAR_HOST")]
    host: bool,

    /// Publish a synthetic camera track
    #[arg(long, default_value_t = false)]
    camera: bool,

    /// Publish a synthetic microphone track
    #[arg(long, default_value_t = false)]
    microphone: bool,

    /// Raise a hand once joined
    #[arg(long, default_value_t = false)]
    raise_hand: bool,

    /// Per-request timeout in milliseconds
    #[arg(long, env = "WEBINAR_REQUEST_TIMEOUT_MS")]
    request_timeout_ms: Option<u64>,
}

fn build_config(args: &Args) -> anyhow::Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => SessionConfig::default(),
    };

    if let Some(url) = &args.signaling_url {
        config.signaling_url = url.clone();
    }
    if let Some(room) = &args.room {
        config.room_id = room.clone();
    }
    if let Some(user_id) = &args.user_id {
        config.user = Participant {
            id: user_id.clone(),
            first_name: args.first_name.clone(),
            last_name: args.last_name.clone(),
            role: if args.host {
                ParticipantRole::Host
            } else {
                ParticipantRole::Attendee
            },
        };
    } else if args.host {
        config.user.role = ParticipantRole::Host;
    }
    if args.request_timeout_ms.is_some() {
        config.request_timeout_ms = args.request_timeout_ms;
    }

    config.validate()?;
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("webinar-probe")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args))
}

async fn async_main(args: Args) -> anyhow::Result<()> {
    init_tracing();

    let config = build_config(&args)?;
    info!(
        version = webinar_room::version(),
        signaling_url = %config.signaling_url,
        room_id = %config.room_id,
        user_id = %config.user.id,
        role = ?config.user.role,
        "Webinar probe starting"
    );

    let (session, mut notices) = WebinarSession::connect(
        config,
        Arc::new(HeadlessEngine::new()),
        Arc::new(HeadlessCapture::new()),
    )
    .await?;

    let outcome = match session.start().await? {
        Some(outcome) => outcome,
        None => session.join().await?,
    };
    if let JoinOutcome::Rejected(message) = outcome {
        warn!("Join rejected: {}", message);
        session.shutdown().await;
        return Ok(());
    }

    let publish = [
        (args.camera, MediaVariant::Video),
        (args.microphone, MediaVariant::Audio),
    ];
    for (enabled, slot) in publish {
        if enabled {
            if let Err(e) = session.set_slot_enabled(slot, true).await {
                error!(%slot, "Failed to publish: {}", e);
            }
        }
    }
    if args.raise_hand {
        session.raise_hand()?;
    }

    let mut snapshots = session.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down");
                break;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                info!(
                    phase = ?snapshot.phase,
                    participants = snapshot.participants.len(),
                    producers = snapshot.remote_producers.len(),
                    consumers = snapshot.consumers.len(),
                    "Room updated"
                );
            }
            notice = notices.recv() => match notice {
                Some(SessionNotice::NavigateAway) | Some(SessionNotice::ReloadRequired) | None => {
                    info!("Session is over");
                    break;
                }
                Some(notice) => info!(?notice, "Session notice"),
            },
        }
    }

    session.shutdown().await;
    info!("Webinar probe stopped");
    Ok(())
}

fn init_tracing() {
    // RUST_LOG wins; default to info
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
