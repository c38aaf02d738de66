//! Local producer slots: toggles, capture failures, screen share end

mod harness;

use harness::{eventually, remote, settle, TestSession};
use webinar_room::media::{CaptureSource, ReadyState};
use webinar_room::{Error, MediaVariant};

async fn joined_host() -> TestSession {
    let t = TestSession::host();
    t.session.start().await.unwrap();
    t
}

#[tokio::test]
async fn test_video_toggle_round_trip() {
    let t = joined_host().await;

    assert!(t.session.toggle_video().await.unwrap());
    assert!(t.session.toggles().is_video);
    assert!(t.session.snapshot().toggles.is_video);

    let camera = t.capture.acquired_from(CaptureSource::Camera);
    assert_eq!(camera.len(), 1);
    assert!(camera[0].tracks()[0].label().contains("1280x720"));

    let produce = &t.server.requests("produce")[0];
    assert_eq!(produce["kind"], "video");
    assert_eq!(produce["variant"], "video");
    assert_eq!(produce["producerTransportId"], "transport-2");
    assert_eq!(t.server.requests("connectTransport")[0]["transportId"], "transport-2");

    assert!(!t.session.toggle_video().await.unwrap());
    assert!(!t.session.toggles().is_video);

    t.server.wait_for_count("closeProducer", 1).await;
    let close = &t.server.requests("closeProducer")[0];
    assert_eq!(close["producerId"], "server-producer-1");
    assert_eq!(close["roomId"], "room-1");
    assert!(camera[0]
        .tracks()
        .iter()
        .all(|track| track.ready_state() == ReadyState::Ended));
}

#[tokio::test]
async fn test_every_slot_toggles_symmetrically() {
    let t = joined_host().await;

    for slot in MediaVariant::ALL {
        assert!(t.session.toggle(slot).await.unwrap());
        assert!(t.session.toggles().get(slot));
        assert!(!t.session.toggle(slot).await.unwrap());
        assert!(!t.session.toggles().get(slot));
    }

    let acquired = t.capture.acquired();
    assert_eq!(acquired.len(), 3);
    for stream in acquired {
        assert!(!stream.is_active());
    }
    t.server.wait_for_count("closeProducer", 3).await;
    assert_eq!(t.server.count("produce"), 3);
    assert_eq!(t.server.count("closeProducer"), 3);
}

#[tokio::test]
async fn test_denied_capture_leaves_slot_off() {
    let t = joined_host().await;
    t.capture.deny(CaptureSource::Camera);

    let err = t.session.toggle_video().await.unwrap_err();
    assert!(matches!(err, Error::MediaAcquisitionError(_)));
    assert!(!t.session.toggles().is_video);
    assert_eq!(t.server.count("produce"), 0);

    t.capture.allow(CaptureSource::Camera);
    assert!(t.session.toggle_video().await.unwrap());
}

#[tokio::test]
async fn test_produce_failure_stops_acquired_tracks() {
    let t = joined_host().await;
    t.server.fail("produce", "router full");

    let err = t.session.toggle_audio().await.unwrap_err();
    assert!(matches!(err, Error::ServerError { .. }));
    assert!(!t.session.toggles().is_audio);

    let mic = t.capture.acquired_from(CaptureSource::Microphone);
    assert_eq!(mic.len(), 1);
    assert_eq!(mic[0].tracks()[0].ready_state(), ReadyState::Ended);
}

#[tokio::test]
async fn test_screen_share_ended_externally() {
    let t = joined_host().await;
    assert!(t.session.toggle_screen().await.unwrap());

    let display = t.capture.acquired_from(CaptureSource::Display);
    assert!(display[0].tracks()[0].label().contains("1920x1080"));

    // The platform's "stop sharing" control
    display[0].tracks()[0].end();

    let session = t.session.clone();
    eventually(move || !session.toggles().is_screen).await;
    t.server.wait_for_count("closeProducer", 1).await;
    assert_eq!(t.server.count("closeProducer"), 1);
    assert_eq!(t.server.requests("closeProducer")[0]["producerId"], "server-producer-1");
}

#[tokio::test]
async fn test_stale_screen_end_does_not_stop_new_share() {
    let t = joined_host().await;

    assert!(t.session.toggle_screen().await.unwrap());
    let first = t.capture.acquired_from(CaptureSource::Display)[0].clone();
    assert!(!t.session.toggle_screen().await.unwrap());
    assert!(t.session.toggle_screen().await.unwrap());

    // The first share was stopped locally, so ending it again is a no-op
    first.tracks()[0].end();
    settle().await;

    assert!(t.session.toggles().is_screen);
    assert_eq!(t.server.count("closeProducer"), 1);
}

#[tokio::test]
async fn test_concurrent_toggle_is_refused() {
    let t = joined_host().await;
    t.server.hold("produce");

    let first = {
        let session = t.session.clone();
        tokio::spawn(async move { session.toggle_video().await })
    };
    t.server.wait_for_held("produce", 1).await;

    let err = t.session.toggle_video().await.unwrap_err();
    assert!(matches!(err, Error::ToggleInProgress(MediaVariant::Video)));

    t.server.release("produce");
    assert!(first.await.unwrap().unwrap());
    assert!(t.session.toggles().is_video);
    assert_eq!(t.capture.acquired_from(CaptureSource::Camera).len(), 1);
}

#[tokio::test]
async fn test_set_slot_enabled_is_idempotent() {
    let t = joined_host().await;

    assert!(t.session.set_slot_enabled(MediaVariant::Audio, true).await.unwrap());
    assert!(!t.session.set_slot_enabled(MediaVariant::Audio, true).await.unwrap());
    assert!(t.session.set_slot_enabled(MediaVariant::Audio, false).await.unwrap());
    assert!(!t.session.set_slot_enabled(MediaVariant::Audio, false).await.unwrap());

    t.server.wait_for_count("closeProducer", 1).await;
    assert_eq!(t.server.count("produce"), 1);
    assert_eq!(t.server.count("closeProducer"), 1);
}

#[tokio::test]
async fn test_toggle_before_join_fails() {
    let t = TestSession::attendee();
    t.session.start().await.unwrap();

    let err = t.session.toggle_audio().await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
    assert!(t.capture.acquired().is_empty());
}

#[tokio::test]
async fn test_own_producer_is_not_consumed() {
    let t = joined_host().await;
    assert!(t.session.toggle_video().await.unwrap());

    t.server.broadcast(
        "newProducers",
        serde_json::json!({"producers": [remote("server-producer-1", MediaVariant::Video)]}),
    );
    t.server.announce(vec![remote("p-guest", MediaVariant::Audio)]);

    let session = t.session.clone();
    eventually(move || session.consumer_ids() == vec!["p-guest".to_string()]).await;
    assert_eq!(t.server.count("consume"), 1);
    assert!(t
        .session
        .remote_producers()
        .iter()
        .all(|p| p.producer_id != "server-producer-1"));
}
