//! Call lifecycle state machine.
//!
//! ```text
//!             joined           roster non-empty
//! Joining ───────────▶ Waiting ◀───────────────▶ InCall
//!    ▲                          roster empty
//!    │ rejoined
//!    │
//! Reconnecting / SwitchingRoom  ◀── any non-terminal state
//!
//! any non-terminal state ──▶ Ended { reason }
//! ```
//!
//! Every method returns `Some(Transition)` only when the state actually
//! changed. Callers hang side effects off that, so repeating a transition
//! never fires them twice.

use serde::Serialize;

/// Why a call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Local hang-up, leaving the others in the call.
    HungUp,
    /// Local hang-up that ended the call for everyone.
    EndedForAll,
    /// Signaling reported an unrecoverable failure.
    SignalingFailure,
    /// Reconnection did not succeed within the allowed time.
    ReconnectTimedOut,
}

impl EndReason {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            EndReason::HungUp => "hung_up",
            EndReason::EndedForAll => "ended_for_all",
            EndReason::SignalingFailure => "signaling_failure",
            EndReason::ReconnectTimedOut => "reconnect_timed_out",
        }
    }
}

/// Lifecycle state of the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CallState {
    Joining,
    WaitingForParticipants,
    InCall,
    Reconnecting,
    SwitchingRoom,
    Ended { reason: EndReason },
}

impl CallState {
    /// Returns the state name for metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            CallState::Joining => "joining",
            CallState::WaitingForParticipants => "waiting_for_participants",
            CallState::InCall => "in_call",
            CallState::Reconnecting => "reconnecting",
            CallState::SwitchingRoom => "switching_room",
            CallState::Ended { .. } => "ended",
        }
    }

    #[must_use]
    pub const fn is_ended(&self) -> bool {
        matches!(self, CallState::Ended { .. })
    }
}

/// A state change that happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: CallState,
    pub to: CallState,
}

/// Owns the call's lifecycle state.
#[derive(Debug)]
pub struct CallSessionStateMachine {
    state: CallState,
}

impl Default for CallSessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl CallSessionStateMachine {
    /// A new call starts in `Joining`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: CallState::Joining,
        }
    }

    #[must_use]
    pub fn state(&self) -> CallState {
        self.state
    }

    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.state.is_ended()
    }

    /// Local client joined signaling.
    pub fn joined(&mut self) -> Option<Transition> {
        match self.state {
            CallState::Joining => self.move_to(CallState::WaitingForParticipants),
            _ => None,
        }
    }

    /// Recompute the derived Waiting/InCall state after a roster change.
    pub fn roster_changed(&mut self, roster_is_empty: bool) -> Option<Transition> {
        match (self.state, roster_is_empty) {
            (CallState::WaitingForParticipants, false) => self.move_to(CallState::InCall),
            (CallState::InCall, true) => self.move_to(CallState::WaitingForParticipants),
            _ => None,
        }
    }

    /// Signaling lost its connection and is retrying.
    pub fn reconnecting(&mut self) -> Option<Transition> {
        match self.state {
            CallState::Reconnecting | CallState::Ended { .. } => None,
            _ => self.move_to(CallState::Reconnecting),
        }
    }

    /// Signaling is back (after a reconnect or in the new room).
    pub fn rejoined(&mut self) -> Option<Transition> {
        match self.state {
            CallState::Reconnecting | CallState::SwitchingRoom => self.move_to(CallState::Joining),
            _ => None,
        }
    }

    /// The call is moving to another room.
    pub fn switching_room(&mut self) -> Option<Transition> {
        match self.state {
            CallState::SwitchingRoom | CallState::Ended { .. } => None,
            _ => self.move_to(CallState::SwitchingRoom),
        }
    }

    /// Terminal transition.
    pub fn end(&mut self, reason: EndReason) -> Option<Transition> {
        if self.is_ended() {
            return None;
        }
        self.move_to(CallState::Ended { reason })
    }

    fn move_to(&mut self, to: CallState) -> Option<Transition> {
        let from = self.state;
        self.state = to;
        Some(Transition { from, to })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_join_then_roster_drives_in_call() {
        let mut sm = CallSessionStateMachine::new();
        assert_eq!(sm.state(), CallState::Joining);

        // Roster changes before the local join do not leave Joining.
        assert!(sm.roster_changed(false).is_none());

        let t = sm.joined().unwrap();
        assert_eq!(t.from, CallState::Joining);
        assert_eq!(t.to, CallState::WaitingForParticipants);
        assert!(sm.joined().is_none());

        assert_eq!(sm.roster_changed(false).unwrap().to, CallState::InCall);
        assert!(sm.roster_changed(false).is_none());
        assert_eq!(
            sm.roster_changed(true).unwrap().to,
            CallState::WaitingForParticipants
        );
    }

    #[test]
    fn test_reconnecting_is_idempotent() {
        let mut sm = CallSessionStateMachine::new();
        sm.joined();
        sm.roster_changed(false);

        assert!(sm.reconnecting().is_some());
        assert!(sm.reconnecting().is_none());
        assert_eq!(sm.state(), CallState::Reconnecting);

        // Roster emptiness does not leave Reconnecting.
        assert!(sm.roster_changed(true).is_none());

        assert_eq!(sm.rejoined().unwrap().to, CallState::Joining);
        assert!(sm.rejoined().is_none());
    }

    #[test]
    fn test_switching_room_then_rejoin() {
        let mut sm = CallSessionStateMachine::new();
        sm.joined();

        assert!(sm.switching_room().is_some());
        assert!(sm.switching_room().is_none());
        assert_eq!(sm.rejoined().unwrap().to, CallState::Joining);
    }

    #[test]
    fn test_ended_is_terminal() {
        let mut sm = CallSessionStateMachine::new();
        let t = sm.end(EndReason::HungUp).unwrap();
        assert_eq!(
            t.to,
            CallState::Ended {
                reason: EndReason::HungUp
            }
        );

        assert!(sm.end(EndReason::SignalingFailure).is_none());
        assert!(sm.reconnecting().is_none());
        assert!(sm.switching_room().is_none());
        assert!(sm.rejoined().is_none());
        assert!(sm.joined().is_none());
        assert!(sm.is_ended());
        // First reason sticks.
        assert_eq!(
            sm.state(),
            CallState::Ended {
                reason: EndReason::HungUp
            }
        );
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(CallState::InCall.as_str(), "in_call");
        assert_eq!(
            CallState::Ended {
                reason: EndReason::ReconnectTimedOut
            }
            .as_str(),
            "ended"
        );
        assert_eq!(EndReason::EndedForAll.as_str(), "ended_for_all");
    }

    #[test]
    fn test_state_serializes_with_tag() {
        let json = serde_json::to_string(&CallState::Ended {
            reason: EndReason::SignalingFailure,
        })
        .unwrap();
        assert_eq!(json, r#"{"state":"ended","reason":"signaling_failure"}"#);
    }
}
