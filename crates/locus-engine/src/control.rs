//! Cooperative pause/stop signal shared between a controller and a running loop.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Paused,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Stopped")]
pub struct Stopped;

/// Cheap to clone; all clones observe the same state.
#[derive(Debug, Clone)]
pub struct RunControl {
    state: Arc<watch::Sender<RunState>>,
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

impl RunControl {
    pub fn new() -> Self {
        let (state, _) = watch::channel(RunState::Running);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == RunState::Stopped
    }

    /// Returns false unless the loop was running.
    pub fn pause(&self) -> bool {
        self.swap(RunState::Running, RunState::Paused)
    }

    /// Returns false unless the loop was paused.
    pub fn resume(&self) -> bool {
        self.swap(RunState::Paused, RunState::Running)
    }

    pub fn stop(&self) {
        self.state.send_if_modified(|state| {
            let changed = *state != RunState::Stopped;
            *state = RunState::Stopped;
            changed
        });
    }

    /// Re-arm for a new run.
    pub fn reset(&self) {
        self.state.send_replace(RunState::Running);
    }

    fn swap(&self, from: RunState, to: RunState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    /// Return once running; wait out a pause; fail if stopped.
    pub async fn checkpoint(&self) -> Result<(), Stopped> {
        let mut rx = self.state.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            match state {
                RunState::Running => return Ok(()),
                RunState::Stopped => return Err(Stopped),
                RunState::Paused => {
                    if rx.changed().await.is_err() {
                        return Err(Stopped);
                    }
                }
            }
        }
    }

    /// Resolves once stopped.
    pub async fn stopped(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|state| *state == RunState::Stopped).await;
    }

    /// Sleep that ends early when stopped.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Stopped> {
        let mut rx = self.state.subscribe();
        if *rx.borrow_and_update() == RunState::Stopped {
            return Err(Stopped);
        }
        let sleep = tokio::time::sleep(duration);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return Ok(()),
                changed = rx.changed() => {
                    if changed.is_err() || *rx.borrow_and_update() == RunState::Stopped {
                        return Err(Stopped);
                    }
                }
            }
        }
    }
}
