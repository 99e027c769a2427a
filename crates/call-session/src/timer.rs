//! Generation-tagged one-shot timers.
//!
//! A timer is a spawned task that sleeps and then posts [`TimerFired`] back to
//! the owning actor. The message only carries the timer kind and a generation
//! counter. Cancelling aborts the task and bumps the generation, so a firing
//! that was already queued before the cancel is recognised as stale and
//! ignored.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Which timer fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Roster debounce window.
    Batch,
    /// Upper bound on how long a reconnect may take.
    Reconnect,
}

impl TimerKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            TimerKind::Batch => "batch",
            TimerKind::Reconnect => "reconnect",
        }
    }
}

/// Posted to the actor when a timer expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub kind: TimerKind,
    pub generation: u64,
}

/// One-shot timer that is armed at most once at a time.
#[derive(Debug)]
pub struct OneShotTimer {
    kind: TimerKind,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl OneShotTimer {
    #[must_use]
    pub fn new(kind: TimerKind) -> Self {
        Self {
            kind,
            generation: 0,
            task: None,
        }
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.task.is_some()
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Arm the timer to fire after `delay`.
    ///
    /// Arming an already armed timer is a no-op and returns `false`; the
    /// deadline stays anchored to the first arm.
    pub fn arm(&mut self, delay: Duration, notify: &mpsc::Sender<TimerFired>) -> bool {
        if self.is_armed() {
            return false;
        }

        self.generation = self.generation.wrapping_add(1);
        let fired = TimerFired {
            kind: self.kind,
            generation: self.generation,
        };
        let notify = notify.clone();
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = notify.send(fired).await;
        }));

        debug!(
            target: "call.timer",
            kind = self.kind.as_str(),
            generation = self.generation,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Timer armed"
        );
        true
    }

    /// Cancel the timer. Returns whether it was armed.
    pub fn cancel(&mut self) -> bool {
        match self.task.take() {
            Some(task) => {
                task.abort();
                self.generation = self.generation.wrapping_add(1);
                debug!(
                    target: "call.timer",
                    kind = self.kind.as_str(),
                    "Timer cancelled"
                );
                true
            }
            None => false,
        }
    }

    /// Accept a firing if it belongs to the current arm; disarms the timer.
    pub fn accept(&mut self, fired: TimerFired) -> bool {
        if fired.kind != self.kind || fired.generation != self.generation || self.task.is_none() {
            debug!(
                target: "call.timer",
                kind = fired.kind.as_str(),
                generation = fired.generation,
                current_generation = self.generation,
                "Ignoring stale timer firing"
            );
            return false;
        }
        self.task = None;
        true
    }
}

impl Drop for OneShotTimer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
