//! Call state machine tests: invite/answer/cancel races, transport-driven
//! state transitions, and engine teardown.

mod common;

use common::{make_engine, MockTransport};
use tokio_test::assert_ok;
use peercall_call_engine::{
    AvEngine, AvEvent, CallStateFlags, EncoderOption, FriendId, GroupId,
};

fn audio_flags() -> CallStateFlags {
    CallStateFlags::SENDING_AUDIO | CallStateFlags::ACCEPTING_AUDIO
}

fn av_flags() -> CallStateFlags {
    audio_flags() | CallStateFlags::SENDING_VIDEO | CallStateFlags::ACCEPTING_VIDEO
}

/// Start an outgoing call and drive it to the established state.
async fn establish(engine: &AvEngine, friend: FriendId, video: bool) {
    assert!(engine.start_call(friend, video).await);
    let flags = if video { av_flags() } else { audio_flags() };
    engine.on_call_state(friend, flags).await;
    assert!(engine.is_call_active(friend).await);
}

#[tokio::test]
async fn duplicate_start_call_is_rejected() {
    let transport = MockTransport::new();
    let (engine, _) = make_engine(transport.clone());
    let friend = FriendId(1);

    assert!(engine.start_call(friend, false).await);
    assert!(engine.is_call_started(friend).await);

    // Second start against the same friend: refused, registry unchanged,
    // no transport call issued.
    let calls_before = transport.in_call.lock().unwrap().len();
    assert!(!engine.start_call(friend, false).await);
    assert!(engine.is_call_started(friend).await);
    assert_eq!(transport.in_call.lock().unwrap().len(), calls_before);
}

#[tokio::test]
async fn start_call_transport_rejection_creates_no_session() {
    let transport = MockTransport::new();
    let (engine, _) = make_engine(transport.clone());
    transport
        .fail_call
        .store(true, std::sync::atomic::Ordering::SeqCst);

    assert!(!engine.start_call(FriendId(7), false).await);
    assert!(!engine.is_call_started(FriendId(7)).await);
}

#[tokio::test]
async fn cancel_unknown_call_returns_false_without_event() {
    let transport = MockTransport::new();
    let (engine, _) = make_engine(transport.clone());
    let mut events = engine.take_event_receiver().await.unwrap();

    assert!(!engine.cancel_call(FriendId(99)).await);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn cancel_failure_leaves_registry_intact() {
    let transport = MockTransport::new();
    let (engine, _) = make_engine(transport.clone());
    let friend = FriendId(3);
    let mut events = engine.take_event_receiver().await.unwrap();

    assert!(engine.start_call(friend, false).await);
    transport
        .fail_control
        .store(true, std::sync::atomic::Ordering::SeqCst);

    assert!(!engine.cancel_call(friend).await);
    assert!(engine.is_call_started(friend).await);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn cancel_erases_and_emits_ended() {
    let transport = MockTransport::new();
    let (engine, _) = make_engine(transport.clone());
    let friend = FriendId(4);
    let mut events = engine.take_event_receiver().await.unwrap();

    establish(&engine, friend, false).await;
    // Drain the Started event.
    assert!(matches!(events.try_recv(), Ok(AvEvent::Started { .. })));

    assert!(engine.cancel_call(friend).await);
    assert!(!engine.is_call_started(friend).await);
    assert_eq!(
        events.try_recv().unwrap(),
        AvEvent::Ended {
            friend,
            error: false
        }
    );
}

#[tokio::test]
async fn invite_then_answer_marks_active() {
    let transport = MockTransport::new();
    let (engine, _) = make_engine(transport.clone());
    let friend = FriendId(5);
    let mut events = engine.take_event_receiver().await.unwrap();

    transport.seed_remote_call(friend);
    engine.on_call_invite(friend, true, true).await;
    assert_eq!(
        events.try_recv().unwrap(),
        AvEvent::Invited {
            friend,
            video: true
        }
    );
    assert!(engine.is_call_started(friend).await);
    assert!(!engine.is_call_active(friend).await);

    assert!(engine.answer_call(friend, true).await);
    assert!(engine.is_call_active(friend).await);
}

#[tokio::test]
async fn answer_applies_bitrate_tier_from_fps_setting() {
    let transport = MockTransport::new();
    let (engine, settings) = make_engine(transport.clone());
    let friend = FriendId(6);
    settings
        .video_fps
        .store(30, std::sync::atomic::Ordering::Relaxed);

    transport.seed_remote_call(friend);
    engine.on_call_invite(friend, true, true).await;
    assert!(engine.answer_call(friend, true).await);

    let options = transport.option_sets.lock().unwrap().clone();
    assert_eq!(
        options,
        vec![
            (friend, EncoderOption::VideoBitrateAutoset, 0),
            (friend, EncoderOption::VideoMaxBitrate, 11_000),
            (friend, EncoderOption::VideoMinBitrate, 10_000),
        ]
    );
}

#[tokio::test]
async fn constrained_tier_enables_autoset() {
    let transport = MockTransport::new();
    let (engine, settings) = make_engine(transport.clone());
    let friend = FriendId(16);
    settings
        .video_fps
        .store(20, std::sync::atomic::Ordering::Relaxed);

    assert!(engine.start_call(friend, true).await);
    let options = transport.option_sets.lock().unwrap().clone();
    assert_eq!(
        options,
        vec![
            (friend, EncoderOption::VideoBitrateAutoset, 1),
            (friend, EncoderOption::VideoMaxBitrate, 180),
            (friend, EncoderOption::VideoMinBitrate, 2_700),
        ]
    );
}

#[tokio::test]
async fn answer_failure_cancels_and_erases() {
    let transport = MockTransport::new();
    let (engine, _) = make_engine(transport.clone());
    let friend = FriendId(8);

    transport.seed_remote_call(friend);
    engine.on_call_invite(friend, true, false).await;
    transport
        .fail_answer
        .store(true, std::sync::atomic::Ordering::SeqCst);

    assert!(!engine.answer_call(friend, false).await);
    assert!(!engine.is_call_started(friend).await);
}

#[tokio::test]
#[should_panic(expected = "answer_call without an invite-created session")]
async fn answer_without_invite_is_a_contract_violation() {
    let transport = MockTransport::new();
    let (engine, _) = make_engine(transport.clone());
    // No invite callback ever created a session for this id.
    engine.answer_call(FriendId(55), false).await;
}

#[tokio::test]
async fn duplicate_invite_is_rejected_with_cancel() {
    let transport = MockTransport::new();
    let (engine, _) = make_engine(transport.clone());
    let friend = FriendId(9);
    let mut events = engine.take_event_receiver().await.unwrap();

    transport.seed_remote_call(friend);
    engine.on_call_invite(friend, true, false).await;
    assert!(matches!(events.try_recv(), Ok(AvEvent::Invited { .. })));

    engine.on_call_invite(friend, true, false).await;
    // The duplicate produced a cancel control and no second event.
    assert_eq!(transport.cancelled(), vec![friend]);
    assert!(events.try_recv().is_err());
    assert!(engine.is_call_started(friend).await);
}

#[tokio::test]
async fn finished_state_removes_session_and_emits_ended() {
    let transport = MockTransport::new();
    let (engine, _) = make_engine(transport.clone());
    let friend = FriendId(10);
    let mut events = engine.take_event_receiver().await.unwrap();

    establish(&engine, friend, false).await;
    assert!(matches!(events.try_recv(), Ok(AvEvent::Started { .. })));

    engine
        .on_call_state(friend, CallStateFlags::FINISHED)
        .await;
    assert!(!engine.is_call_started(friend).await);
    assert_eq!(
        events.try_recv().unwrap(),
        AvEvent::Ended {
            friend,
            error: false
        }
    );
    // Exactly one notification.
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn error_state_emits_ended_with_error_flag() {
    let transport = MockTransport::new();
    let (engine, _) = make_engine(transport.clone());
    let friend = FriendId(11);
    let mut events = engine.take_event_receiver().await.unwrap();

    establish(&engine, friend, false).await;
    assert!(matches!(events.try_recv(), Ok(AvEvent::Started { .. })));

    engine.on_call_state(friend, CallStateFlags::ERROR).await;
    assert!(!engine.is_call_started(friend).await);
    assert_eq!(
        events.try_recv().unwrap(),
        AvEvent::Ended {
            friend,
            error: true
        }
    );
}

#[tokio::test]
async fn ringing_to_established_emits_started() {
    let transport = MockTransport::new();
    let (engine, _) = make_engine(transport.clone());
    let friend = FriendId(12);
    let mut events = engine.take_event_receiver().await.unwrap();

    assert!(engine.start_call(friend, true).await);
    assert!(!engine.is_call_active(friend).await);

    engine.on_call_state(friend, av_flags()).await;
    assert_eq!(
        events.try_recv().unwrap(),
        AvEvent::Started {
            friend,
            video: true
        }
    );
    assert!(engine.is_call_active(friend).await);
}

#[tokio::test]
async fn unknown_state_callback_is_ignored() {
    let transport = MockTransport::new();
    let (engine, _) = make_engine(transport.clone());
    let mut events = engine.take_event_receiver().await.unwrap();

    engine
        .on_call_state(FriendId(77), CallStateFlags::FINISHED)
        .await;
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn peer_video_pause_stops_the_source() {
    let transport = MockTransport::new();
    let (engine, _) = make_engine(transport.clone());
    let friend = FriendId(13);

    establish(&engine, friend, true).await;
    let source = engine.video_source(friend).await.unwrap();
    assert!(!source.is_stopped());

    // Peer stops sending video: the sink goes quiet.
    engine.on_call_state(friend, audio_flags()).await;
    assert!(source.is_stopped());
    assert!(engine.is_call_started(friend).await);

    // Peer resumes: the sink is restarted.
    engine.on_call_state(friend, av_flags()).await;
    assert!(!source.is_stopped());
}

#[tokio::test]
async fn mute_toggles_flip_state() {
    let transport = MockTransport::new();
    let (engine, _) = make_engine(transport.clone());
    let friend = FriendId(14);

    establish(&engine, friend, false).await;
    assert!(!engine.is_call_input_muted(friend).await);
    assert!(!engine.is_call_output_muted(friend).await);

    engine.toggle_mute_input(friend).await;
    engine.toggle_mute_output(friend).await;
    assert!(engine.is_call_input_muted(friend).await);
    assert!(engine.is_call_output_muted(friend).await);

    engine.toggle_mute_input(friend).await;
    assert!(!engine.is_call_input_muted(friend).await);

    // Toggles against unknown ids are no-ops.
    engine.toggle_mute_input(FriendId(500)).await;
    assert!(!engine.is_call_input_muted(FriendId(500)).await);
}

#[tokio::test]
async fn shutdown_cancels_every_outstanding_call() {
    let transport = MockTransport::new();
    let (engine, _) = make_engine(transport.clone());
    engine.start().await.unwrap();

    establish(&engine, FriendId(20), false).await;
    establish(&engine, FriendId(21), true).await;
    engine.join_group_call(GroupId(5)).await;
    engine.join_group_call(GroupId(6)).await;

    engine.shutdown().await;

    assert!(!engine.is_call_started(FriendId(20)).await);
    assert!(!engine.is_call_started(FriendId(21)).await);
    assert!(!engine.is_group_call_started(GroupId(5)).await);
    assert!(!engine.is_group_call_started(GroupId(6)).await);
    assert!(!engine.is_running());

    let mut cancelled = transport.cancelled();
    cancelled.sort();
    assert_eq!(cancelled, vec![FriendId(20), FriendId(21)]);

    // A late callback after teardown finds no session and is a no-op.
    engine
        .on_call_state(FriendId(20), CallStateFlags::FINISHED)
        .await;
}

#[tokio::test]
async fn engine_cannot_start_twice() {
    let transport = MockTransport::new();
    let (engine, _) = make_engine(transport.clone());

    tokio_test::assert_ok!(engine.start().await);
    assert!(engine.start().await.is_err());
    engine.shutdown().await;
}

#[tokio::test]
async fn iteration_loop_drives_the_transport() {
    let transport = MockTransport::new();
    let (engine, _) = make_engine(transport.clone());

    engine.start().await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    engine.shutdown().await;

    assert!(transport.iterations.load(std::sync::atomic::Ordering::SeqCst) >= 2);
}
