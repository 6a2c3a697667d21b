//! Cancellation of a recovery session.
//!
//! A [`RecoveryController`] is shared between the session and whoever may stop
//! it (a "stop" button, component teardown, Ctrl-C). The session checks it
//! before every device call, every node request and before committing results,
//! and races slow round trips against [`RecoveryController::cancelled`].

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::{RecoveryError, RecoveryResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControllerState {
    Running,
    Aborted,
    Finished,
}

/// Shared abort signal of one recovery session.
#[derive(Debug, Clone)]
pub struct RecoveryController {
    state: Arc<watch::Sender<ControllerState>>,
}

impl RecoveryController {
    /// Creates a controller in the running state.
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(ControllerState::Running);
        Self {
            state: Arc::new(state),
        }
    }

    /// Requests the session to stop. Has no effect once finished.
    pub fn abort(&self) {
        let aborted = self.transition(ControllerState::Aborted);
        if aborted {
            log::warn!("recovery aborted");
        }
    }

    /// Whether [`abort`](Self::abort) has been called.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        *self.state.borrow() == ControllerState::Aborted
    }

    /// Marks the session as done and wakes every pending [`cancelled`](Self::cancelled)
    /// future so their tasks can be released.
    pub fn finish(&self) {
        self.transition(ControllerState::Finished);
    }

    /// Whether [`finish`](Self::finish) has been called.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        *self.state.borrow() == ControllerState::Finished
    }

    /// Fails with [`RecoveryError::Cancelled`] if the controller was aborted.
    ///
    /// # Errors
    /// Returns [`RecoveryError::Cancelled`] once aborted.
    pub fn check(&self) -> RecoveryResult<()> {
        if self.is_aborted() {
            return Err(RecoveryError::Cancelled);
        }
        Ok(())
    }

    /// Resolves once the controller is aborted or finished.
    pub async fn cancelled(&self) {
        let mut receiver = self.state.subscribe();
        // The sender lives as long as `self`, so this only returns on a state change.
        let _ = receiver
            .wait_for(|state| *state != ControllerState::Running)
            .await;
    }

    /// Checks the controller, then drives `future` unless the controller is
    /// aborted or finished first. The future is dropped on cancellation.
    ///
    /// # Errors
    /// Returns [`RecoveryError::Cancelled`] if the controller stops before the
    /// future completes.
    pub async fn guard<F: Future>(&self, future: F) -> RecoveryResult<F::Output> {
        self.check()?;
        tokio::select! {
            biased;
            () = self.cancelled() => Err(RecoveryError::Cancelled),
            output = future => Ok(output),
        }
    }

    fn transition(&self, to: ControllerState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == ControllerState::Running {
                *state = to;
                true
            } else {
                false
            }
        })
    }
}

impl Default for RecoveryController {
    fn default() -> Self {
        Self::new()
    }
}
