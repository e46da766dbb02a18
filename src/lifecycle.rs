//! Connection lifecycle state machine.
//!
//! ```text
//! Unstarted → Listening → Connected → Registered → Running → Stopped
//! ```
//!
//! Any state may jump to `Stopped`; `Stopped` is terminal. The current state
//! is published on a `watch` channel so the read loop, the writer task and
//! callers of [`Plugin::wait`](crate::Plugin::wait) all observe the stop
//! transition exactly once without polling.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

/// Lifecycle state of a plugin connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unstarted,
    Listening,
    Connected,
    Registered,
    Running,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Unstarted => "unstarted",
            LifecycleState::Listening => "listening",
            LifecycleState::Connected => "connected",
            LifecycleState::Registered => "registered",
            LifecycleState::Running => "running",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Shared handle to the lifecycle state.
///
/// Cheaply cloneable; all clones observe the same state.
#[derive(Clone)]
pub struct Lifecycle {
    tx: Arc<watch::Sender<LifecycleState>>,
}

impl Lifecycle {
    /// Create a lifecycle in `Unstarted`.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(LifecycleState::Unstarted);
        Self { tx: Arc::new(tx) }
    }

    /// Current state.
    pub fn state(&self) -> LifecycleState {
        *self.tx.borrow()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.tx.subscribe()
    }

    /// Move to `next` unless already stopped.
    ///
    /// Returns `false` if the lifecycle was stopped first.
    pub fn advance(&self, next: LifecycleState) -> bool {
        let advanced = self.tx.send_if_modified(|state| {
            if *state == LifecycleState::Stopped {
                return false;
            }
            *state = next;
            true
        });
        if advanced {
            tracing::debug!("Plugin lifecycle: {}", next);
        }
        advanced
    }

    /// Transition to `Stopped`.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn stop(&self) -> bool {
        let stopped = self.tx.send_if_modified(|state| {
            if *state == LifecycleState::Stopped {
                return false;
            }
            *state = LifecycleState::Stopped;
            true
        });
        if stopped {
            tracing::debug!("Plugin lifecycle: stopped");
        }
        stopped
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.state() == LifecycleState::Stopped
    }

    /// Resolve once the lifecycle reaches `Stopped`.
    pub async fn stopped(&self) {
        let mut rx = self.subscribe();
        // The sender lives in `self`, so `wait_for` cannot observe a closed channel.
        let _ = rx.wait_for(|state| *state == LifecycleState::Stopped).await;
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
