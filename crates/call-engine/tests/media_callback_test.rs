//! Receive path tests: audio/video frame callbacks, far-end priming, and
//! group-call audio fan-out.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use common::{init_tracing, MockTransport};
use peercall_call_engine::{
    AudioBackend, AudioSink, AvEngine, AvEvent, CallStateFlags, FriendId, GroupId, PeerId,
    StaticSettings,
};

/// Counts frames played per allocated source.
#[derive(Default)]
struct RecordingBackend {
    sources: std::sync::Mutex<Vec<Arc<RecordingSink>>>,
}

#[derive(Default)]
struct RecordingSink {
    frames: AtomicU32,
}

impl AudioSink for RecordingSink {
    fn play(&self, _pcm: &[i16], _channels: u8, _rate: u32) {
        self.frames.fetch_add(1, Ordering::SeqCst);
    }
}

impl AudioBackend for RecordingBackend {
    fn create_source(&self) -> Arc<dyn AudioSink> {
        let sink = Arc::new(RecordingSink::default());
        self.sources.lock().unwrap().push(sink.clone());
        sink
    }
}

fn make_recording_engine(
    transport: Arc<MockTransport>,
) -> (AvEngine, Arc<RecordingBackend>, Arc<StaticSettings>) {
    init_tracing();
    let backend = Arc::new(RecordingBackend::default());
    let settings = Arc::new(StaticSettings::default());
    let engine = AvEngine::new(
        transport,
        backend.clone(),
        settings.clone(),
        settings.clone(),
    )
    .expect("engine construction");
    (engine, backend, settings)
}

fn played_total(backend: &RecordingBackend) -> u32 {
    backend
        .sources
        .lock()
        .unwrap()
        .iter()
        .map(|s| s.frames.load(Ordering::SeqCst))
        .sum()
}

async fn establish(engine: &AvEngine, friend: FriendId) {
    assert!(engine.start_call(friend, true).await);
    engine
        .on_call_state(
            friend,
            CallStateFlags::SENDING_AUDIO
                | CallStateFlags::ACCEPTING_AUDIO
                | CallStateFlags::SENDING_VIDEO
                | CallStateFlags::ACCEPTING_VIDEO,
        )
        .await;
}

/// 60 ms of mono 48 kHz playback audio, an accepted far-end length.
fn playback_frame() -> Vec<i16> {
    (0..2880).map(|i| ((i * 23) % 2048) as i16 - 1024).collect()
}

#[tokio::test]
async fn incoming_audio_reaches_the_sink() {
    let transport = MockTransport::new();
    let (engine, backend, _) = make_recording_engine(transport.clone());
    let friend = FriendId(1);

    establish(&engine, friend).await;
    engine
        .on_audio_frame(friend, &playback_frame(), 1, 48_000)
        .await;
    assert_eq!(played_total(&backend), 1);
}

#[tokio::test]
async fn unknown_or_muted_calls_drop_incoming_audio() {
    let transport = MockTransport::new();
    let (engine, backend, _) = make_recording_engine(transport.clone());
    let friend = FriendId(2);

    engine
        .on_audio_frame(friend, &playback_frame(), 1, 48_000)
        .await;
    assert_eq!(played_total(&backend), 0);

    establish(&engine, friend).await;
    engine.toggle_mute_output(friend).await;
    engine
        .on_audio_frame(friend, &playback_frame(), 1, 48_000)
        .await;
    assert_eq!(played_total(&backend), 0);
}

#[tokio::test]
async fn incoming_video_lands_in_the_video_source() {
    let transport = MockTransport::new();
    let (engine, _, _) = make_recording_engine(transport.clone());
    let friend = FriendId(3);

    establish(&engine, friend).await;
    let source = engine.video_source(friend).await.unwrap();
    let mut frames = source.take_frames().unwrap();

    let (w, h) = (64u16, 48u16);
    let y = vec![100u8; w as usize * h as usize];
    let c = vec![100u8; (w as usize / 2) * (h as usize / 2)];
    engine
        .on_video_frame(friend, w, h, &y, &c, &c, w as u32, (w / 2) as u32, (w / 2) as u32)
        .await;

    let frame = frames.try_recv().unwrap();
    assert_eq!((frame.width, frame.height), (w, h));
    assert_eq!(frame.y.len(), y.len());

    // Unknown ids drop the frame on the floor.
    engine
        .on_video_frame(FriendId(99), w, h, &y, &c, &c, w as u32, (w / 2) as u32, (w / 2) as u32)
        .await;
    assert!(frames.try_recv().is_err());
}

#[tokio::test]
async fn group_audio_fans_out_per_peer() {
    let transport = MockTransport::new();
    let (engine, backend, _) = make_recording_engine(transport.clone());
    let group = GroupId(1);
    let mut events = engine.take_event_receiver().await.unwrap();

    engine.join_group_call(group).await;

    let alice = PeerId::new("alice-pk");
    let bob = PeerId::new("bob-pk");
    engine
        .on_group_audio(group, alice.clone(), &playback_frame(), 1, 48_000)
        .await;
    engine
        .on_group_audio(group, bob.clone(), &playback_frame(), 1, 48_000)
        .await;
    engine
        .on_group_audio(group, alice.clone(), &playback_frame(), 1, 48_000)
        .await;

    // One source per peer, three frames played in total.
    assert_eq!(backend.sources.lock().unwrap().len(), 2);
    assert_eq!(played_total(&backend), 3);

    assert_eq!(
        events.try_recv().unwrap(),
        AvEvent::GroupPeerAudio {
            group,
            peer: alice.clone()
        }
    );

    // Removing a peer invalidates their source; the next frame allocates a
    // fresh one.
    engine.remove_group_peer(group, &alice).await;
    engine
        .on_group_audio(group, alice.clone(), &playback_frame(), 1, 48_000)
        .await;
    assert_eq!(backend.sources.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn blocked_peers_are_dropped_before_any_event() {
    let transport = MockTransport::new();
    let (engine, backend, settings) = make_recording_engine(transport.clone());
    let group = GroupId(2);
    let mut events = engine.take_event_receiver().await.unwrap();

    engine.join_group_call(group).await;
    let mallory = PeerId::new("mallory-pk");
    settings
        .blocked_peers
        .write()
        .unwrap()
        .push(mallory.clone());

    engine
        .on_group_audio(group, mallory, &playback_frame(), 1, 48_000)
        .await;
    assert_eq!(played_total(&backend), 0);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn muted_group_output_drops_audio() {
    let transport = MockTransport::new();
    let (engine, backend, _) = make_recording_engine(transport.clone());
    let group = GroupId(3);

    engine.join_group_call(group).await;
    engine.mute_group_output(group, true).await;
    assert!(engine.is_group_output_muted(group).await);

    engine
        .on_group_audio(group, PeerId::new("pk"), &playback_frame(), 1, 48_000)
        .await;
    assert_eq!(played_total(&backend), 0);
}

#[tokio::test]
async fn duplicate_group_join_is_rejected() {
    let transport = MockTransport::new();
    let (engine, _, _) = make_recording_engine(transport.clone());
    let group = GroupId(4);

    engine.join_group_call(group).await;
    engine.mute_group_input(group, true).await;

    // A second join must not replace the existing session.
    engine.join_group_call(group).await;
    assert!(engine.is_group_input_muted(group).await);
}
