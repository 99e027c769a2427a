//! Tests for local commands and room capabilities.
//!
//! Verifies:
//! - Each command is refused with `NotPermitted` when its capability is off
//! - Accepted commands drive local media and broadcast on the data channel
//! - Capabilities can change at runtime
//! - Render acquisition failure leaves a peer audio-only

#![allow(clippy::unwrap_used, clippy::expect_used)]

use call_session::actors::{Capabilities, Capability};
use call_session::errors::CallError;
use call_test_utils::{MediaCall, MockRenderSurface, TestCall, TestPeer};

#[tokio::test]
async fn test_commands_refused_without_capability() {
    let call = TestCall::builder()
        .capabilities(Capabilities::none())
        .spawn();
    call.handle.on_joined().await.unwrap();

    assert_eq!(
        call.handle.set_audio_enabled(true).await,
        Err(CallError::NotPermitted(Capability::PublishAudio))
    );
    assert_eq!(
        call.handle.set_video_enabled(false).await,
        Err(CallError::NotPermitted(Capability::PublishVideo))
    );
    assert_eq!(
        call.handle.set_hand_raised(true).await,
        Err(CallError::NotPermitted(Capability::RaiseHand))
    );
    assert_eq!(
        call.handle.set_screen_share(true).await,
        Err(CallError::NotPermitted(Capability::ScreenShare))
    );
    assert_eq!(
        call.handle.hang_up(true).await,
        Err(CallError::NotPermitted(Capability::EndForAll))
    );

    assert!(call.media.calls().is_empty());
    assert!(call.signaling.data_channel_messages().is_empty());
    assert!(call.signaling.leaves().is_empty());
    assert_eq!(call.handle.metrics().snapshot().commands_rejected, 5);

    // A plain hang-up needs no capability.
    call.handle.hang_up(false).await.unwrap();
    assert!(call.handle.call_state().is_ended());
}

#[tokio::test]
async fn test_accepted_commands_drive_media_and_data_channel() {
    let call = TestCall::spawn();
    call.handle.on_joined().await.unwrap();

    call.handle.set_audio_enabled(true).await.unwrap();
    call.handle.set_audio_enabled(false).await.unwrap();
    call.handle.set_video_enabled(true).await.unwrap();
    call.handle.set_hand_raised(true).await.unwrap();
    call.handle.set_hand_raised(false).await.unwrap();
    call.handle.set_screen_share(true).await.unwrap();

    assert_eq!(
        call.media.calls(),
        vec![
            MediaCall::Audio(true),
            MediaCall::Audio(false),
            MediaCall::Video(true),
            MediaCall::ScreenShare(true),
        ]
    );
    assert_eq!(
        call.signaling.data_channel_messages(),
        vec![
            r#"{"type":"audioOn"}"#.to_string(),
            r#"{"type":"audioOff"}"#.to_string(),
            r#"{"type":"videoOn"}"#.to_string(),
            r#"{"type":"raiseHand"}"#.to_string(),
            r#"{"type":"lowerHand"}"#.to_string(),
        ]
    );

    let local = call.state().await.local_media;
    assert!(!local.audio_enabled);
    assert!(local.video_enabled);
    assert!(!local.hand_raised);
    assert!(local.screen_sharing);
}

#[tokio::test]
async fn test_capabilities_update_at_runtime() {
    let call = TestCall::spawn();

    call.handle
        .update_capabilities(Capabilities {
            raise_hand: false,
            ..Capabilities::all()
        })
        .await
        .unwrap();
    assert_eq!(
        call.handle.set_hand_raised(true).await,
        Err(CallError::NotPermitted(Capability::RaiseHand))
    );

    call.handle
        .update_capabilities(Capabilities::all())
        .await
        .unwrap();
    call.handle.set_hand_raised(true).await.unwrap();
    assert!(call.state().await.local_media.hand_raised);
}

#[tokio::test(start_paused = true)]
async fn test_render_failure_falls_back_to_audio_only() {
    let surface = MockRenderSurface::builder().capacity(1).build();
    let call = TestCall::builder().surface(surface).spawn();
    let alice = TestPeer::video("alice");
    let bob = TestPeer::video("bob");

    call.handle.on_joined().await.unwrap();
    call.join(&alice).await;
    call.stream_added(&alice, 1).await;
    call.join(&bob).await;
    call.stream_added(&bob, 2).await;
    call.settle().await;

    let state = call.state().await;
    assert_eq!(call.roster_ids().await, vec!["alice-video", "bob-video"]);
    let bob_view = state.roster.peers.get(1).unwrap();
    assert!(bob_view.has_remote_stream);
    assert_eq!(bob_view.render_target, None);
    assert_eq!(state.render_targets_active, 1);
    assert!(!call.surface.was_acquired("bob-video"));
}

#[tokio::test]
async fn test_remote_data_channel_messages() {
    let call = TestCall::spawn();
    let alice = TestPeer::video("alice");
    call.handle.on_joined().await.unwrap();
    call.join(&alice).await;

    call.data_channel(&alice, "videoOff").await;
    call.data_channel(&alice, r#"{"type":"raiseHand"}"#).await;
    call.data_channel(&alice, "speaking").await;
    call.data_channel(&alice, "somethingNew").await;

    let state = call.state().await;
    let view = state.roster.peers.first().unwrap();
    assert!(view.video_disabled);
    assert!(view.hand_raised);
    assert!(view.is_speaking);

    call.data_channel(&alice, "stoppedSpeaking").await;
    call.data_channel(&alice, "lowerHand").await;
    let state = call.state().await;
    let view = state.roster.peers.first().unwrap();
    assert!(!view.is_speaking);
    assert!(!view.hand_raised);

    // Unknown peer and unknown message are both dropped.
    call.data_channel(&TestPeer::video("ghost"), "audioOff").await;
    let _ = call.state().await;
    assert_eq!(call.handle.metrics().snapshot().events_dropped, 2);
}
