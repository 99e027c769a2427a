//! Tests for batched roster reconciliation through the orchestrator.
//!
//! Uses tokio's test-util time control features to verify:
//! - First peer appears without waiting for the batch timer
//! - Join/leave inside one window cancels out
//! - Trickling events do not postpone the flush
//! - No duplicate leg identifiers after any flush
//! - A displayed peer rejoining inside one window gets a fresh row and target

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashSet;
use std::time::Duration;

use call_session::actors::PresentationEvent;
use call_session::state::CallState;
use call_test_utils::{TestCall, TestPeer};

// ============================================================================
// First peer and cancellation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_first_peer_is_visible_immediately() {
    let call = TestCall::spawn();
    let alice = TestPeer::video("alice");

    call.handle.on_joined().await.unwrap();
    call.join(&alice).await;

    // No time has passed, yet alice is on screen.
    assert_eq!(call.roster_ids().await, vec!["alice-video"]);
    assert_eq!(call.handle.call_state(), CallState::InCall);
    assert!(!call.state().await.batch_timer_armed);
}

#[tokio::test(start_paused = true)]
async fn test_join_then_leave_in_one_window_cancels() {
    let call = TestCall::spawn();
    let alice = TestPeer::video("alice");
    let bob = TestPeer::video("bob");

    call.join(&alice).await;
    call.join(&bob).await;
    call.stream_added(&bob, 2).await;
    call.leave(&bob).await;

    let state = call.state().await;
    assert!(state.pending.is_empty());

    call.settle().await;

    assert_eq!(call.roster_ids().await, vec!["alice-video"]);
    // Stream arrived before cancellation: the target was released immediately.
    let bob_target = call.surface.handle_for("bob-video").unwrap();
    assert_eq!(call.surface.release_count(bob_target), 1);
    assert_eq!(call.state().await.render_targets_active, 0);
}

#[tokio::test(start_paused = true)]
async fn test_join_leave_without_stream_never_acquires() {
    let call = TestCall::spawn();
    let alice = TestPeer::video("alice");
    let bob = TestPeer::video("bob");

    call.join(&alice).await;
    call.join(&bob).await;
    call.leave(&bob).await;
    call.settle().await;

    assert_eq!(call.roster_ids().await, vec!["alice-video"]);
    assert!(!call.surface.was_acquired("bob-video"));
}

// ============================================================================
// Debounce
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_trickle_flushes_relative_to_first_change() {
    let call = TestCall::spawn();
    call.join(&TestPeer::video("p0")).await;

    // One join every 100ms: a reset-on-change timer would never fire.
    for i in 1..=8 {
        call.join(&TestPeer::video(format!("p{i}"))).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let state = call.state().await;
    assert!(state.roster.peers.len() > 1);
    assert!(call.handle.metrics().snapshot().roster_flushes >= 1);

    call.settle().await;
    assert_eq!(call.roster_ids().await.len(), 9);
}

#[tokio::test(start_paused = true)]
async fn test_burst_is_published_as_one_snapshot() {
    let call = TestCall::spawn();
    call.join(&TestPeer::video("first")).await;
    let mut events = call.handle.subscribe();

    for i in 0..20 {
        call.join(&TestPeer::video(format!("burst-{i}"))).await;
    }
    call.settle().await;

    let mut snapshots = 0;
    while let Ok(event) = events.try_recv() {
        if let PresentationEvent::RosterSnapshotChanged(snapshot) = event {
            snapshots += 1;
            assert_eq!(snapshot.peers.len(), 21);
        }
    }
    assert_eq!(snapshots, 1);
}

// ============================================================================
// Uniqueness and convergence
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_no_duplicates_after_churn() {
    let call = TestCall::spawn();
    let peers: Vec<TestPeer> = (0..6).map(|i| TestPeer::video(format!("u{i}"))).collect();

    call.join(peers.first().unwrap()).await;
    for round in 0..4 {
        for (i, peer) in peers.iter().enumerate() {
            call.join(peer).await;
            call.join(peer).await;
            if (i + round) % 2 == 0 {
                call.leave(peer).await;
                call.join(peer).await;
            }
            if (i + round) % 3 == 0 {
                call.leave(peer).await;
            }
        }
        call.settle().await;

        let ids = call.roster_ids().await;
        let unique: HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len(), "duplicate after round {round}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_add_remove_add_converges_to_present() {
    let call = TestCall::spawn();
    let alice = TestPeer::video("alice");
    let bob = TestPeer::video("bob");

    call.join(&alice).await;
    call.join(&bob).await;
    call.leave(&bob).await;
    call.join(&bob.clone().with_name("Bob")).await;
    call.settle().await;

    let state = call.state().await;
    assert_eq!(call.roster_ids().await, vec!["alice-video", "bob-video"]);
    assert_eq!(state.roster.peers.get(1).unwrap().display_name, "Bob");

    // Displayed peer: leave then rejoin inside one window keeps the slot.
    call.leave(&alice).await;
    call.join(&alice).await;
    call.settle().await;
    assert_eq!(call.roster_ids().await, vec!["alice-video", "bob-video"]);
}

#[tokio::test(start_paused = true)]
async fn test_update_for_pending_peer_is_replayed() {
    let call = TestCall::spawn();
    let alice = TestPeer::video("alice");
    let bob = TestPeer::video("bob");

    call.join(&alice).await;
    call.join(&bob).await;
    call.data_channel(&bob, "audioOff").await;
    call.data_channel(&bob, "raiseHand").await;

    let state = call.state().await;
    assert_eq!(state.pending.updates, 1);
    assert_eq!(state.roster.peers.len(), 1);

    call.settle().await;

    let state = call.state().await;
    let bob_view = state.roster.peers.get(1).unwrap();
    assert!(bob_view.audio_disabled);
    assert!(bob_view.hand_raised);
}

#[tokio::test(start_paused = true)]
async fn test_displayed_peer_rejoining_in_one_window_releases_old_target() {
    let call = TestCall::spawn();
    let alice = TestPeer::video("alice");
    let bob = TestPeer::video("bob");

    call.join(&alice).await;
    call.join(&bob).await;
    call.settle().await;
    call.stream_added(&alice, 1).await;
    let old_target = call.surface.handle_for("alice-video").unwrap();

    call.leave(&alice).await;
    call.join(&alice).await;
    call.settle().await;

    assert_eq!(call.surface.release_count(old_target), 1);
    assert_eq!(call.roster_ids().await, vec!["bob-video", "alice-video"]);

    let state = call.state().await;
    assert_eq!(state.render_targets_active, 0);
    let row = state
        .roster
        .peers
        .iter()
        .find(|p| p.peer_identifier.as_str() == "alice-video")
        .unwrap();
    assert!(!row.has_remote_stream);
    assert_eq!(row.render_target, None);
}

#[tokio::test(start_paused = true)]
async fn test_rejoined_leg_stream_before_flush_gets_fresh_target() {
    let call = TestCall::spawn();
    let alice = TestPeer::video("alice");
    let bob = TestPeer::video("bob");

    call.join(&alice).await;
    call.join(&bob).await;
    call.settle().await;
    call.stream_added(&alice, 1).await;
    let old_target = call.surface.handle_for("alice-video").unwrap();

    call.leave(&alice).await;
    call.join(&alice).await;
    call.stream_added(&alice, 2).await;
    let new_target = call.surface.handle_for("alice-video").unwrap();
    assert_ne!(new_target, old_target);
    call.settle().await;

    assert_eq!(call.surface.release_count(old_target), 1);
    assert_eq!(call.surface.release_count(new_target), 0);

    let state = call.state().await;
    assert_eq!(state.render_targets_active, 1);
    let row = state
        .roster
        .peers
        .iter()
        .find(|p| p.peer_identifier.as_str() == "alice-video")
        .unwrap();
    assert!(row.has_remote_stream);
    assert_eq!(row.render_target, Some(new_target));
}

// ============================================================================
// End-to-end
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_alice_leaves_bob_joins_single_flush() {
    let call = TestCall::spawn();
    let alice = TestPeer::video("alice");
    let bob = TestPeer::video("bob");

    call.handle.on_joined().await.unwrap();
    assert_eq!(call.state().await.call_state, CallState::WaitingForParticipants);

    call.join(&alice).await;
    call.stream_added(&alice, 1).await;
    assert_eq!(call.roster_ids().await, vec!["alice-video"]);
    assert_eq!(call.handle.call_state(), CallState::InCall);

    let flushes_before = call.handle.metrics().snapshot().roster_flushes;
    call.join(&bob).await;
    call.leave(&alice).await;

    // Nothing visible changes inside the window.
    assert_eq!(call.roster_ids().await, vec!["alice-video"]);

    call.settle().await;

    assert_eq!(call.roster_ids().await, vec!["bob-video"]);
    assert_eq!(
        call.handle.metrics().snapshot().roster_flushes,
        flushes_before + 1
    );
    let alice_target = call.surface.handle_for("alice-video").unwrap();
    assert_eq!(call.surface.release_count(alice_target), 1);
    assert_eq!(call.handle.call_state(), CallState::InCall);

    // A late stream-removed for alice is ignored and releases nothing more.
    call.stream_removed(&alice, 1).await;
    call.settle().await;
    assert_eq!(call.surface.release_count(alice_target), 1);
}

#[tokio::test(start_paused = true)]
async fn test_last_peer_leaving_returns_to_waiting() {
    let call = TestCall::spawn();
    let alice = TestPeer::video("alice");

    call.handle.on_joined().await.unwrap();
    call.join(&alice).await;
    assert_eq!(call.handle.call_state(), CallState::InCall);

    call.leave(&alice).await;
    assert_eq!(call.state().await.call_state, CallState::InCall);

    call.settle().await;
    assert_eq!(call.handle.call_state(), CallState::WaitingForParticipants);
    assert!(call.roster_ids().await.is_empty());
}
