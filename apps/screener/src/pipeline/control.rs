//! Pause/cancel signalling between the orchestrator and the running stage.
//!
//! The orchestrator keeps the `RunControl`; every stage gets a cloned
//! `RunSignal` and polls it at its checkpoints (between items, pages,
//! analysis units and sync chunks).

use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Returned by a checkpoint once the run has been cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("run cancelled")]
pub struct Cancelled;

/// Owner side of a run's control signals.
#[derive(Debug)]
pub struct RunControl {
    cancel: CancellationToken,
    paused: watch::Sender<bool>,
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

impl RunControl {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            cancel: CancellationToken::new(),
            paused,
        }
    }

    pub fn signal(&self) -> RunSignal {
        RunSignal {
            cancel: self.cancel.clone(),
            paused: self.paused.subscribe(),
        }
    }

    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Stage side of a run's control signals.
#[derive(Debug, Clone)]
pub struct RunSignal {
    cancel: CancellationToken,
    paused: watch::Receiver<bool>,
}

impl RunSignal {
    /// A signal that is never paused or cancelled.
    pub fn detached() -> Self {
        RunControl::new().signal()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Waits out a pause. Returns `Err(Cancelled)` if the run is cancelled
    /// before or while waiting.
    pub async fn checkpoint(&self) -> Result<(), Cancelled> {
        let mut paused = self.paused.clone();
        loop {
            if self.cancel.is_cancelled() {
                return Err(Cancelled);
            }
            if !*paused.borrow_and_update() {
                return Ok(());
            }
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(Cancelled),
                changed = paused.changed() => {
                    // Controller dropped: nobody can resume us, so stop waiting.
                    if changed.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Sleeps for `duration` unless the run is cancelled first.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        if duration.is_zero() {
            return if self.is_cancelled() { Err(Cancelled) } else { Ok(()) };
        }
        tokio::select! {
            _ = self.cancel.cancelled() => Err(Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}
