//! Pause gate shared by the workers of a pool

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Open/closed flag workers check before each operation
///
/// Checking an open gate is a single atomic load.
#[derive(Debug, Default)]
pub struct PauseGate {
    paused: AtomicBool,
    resumed: Notify,
}

impl PauseGate {
    /// Create an open gate
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the gate; workers block at their next check
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    /// Open the gate and wake every blocked worker
    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.resumed.notify_waiters();
    }

    /// True while closed
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Wait until the gate is open
    ///
    /// Returns `false` if `cancel` fired while waiting.
    pub async fn wait(&self, cancel: &CancellationToken) -> bool {
        loop {
            if !self.is_paused() {
                return true;
            }

            let notified = self.resumed.notified();
            tokio::pin!(notified);
            // Register before re-checking so a resume in between is not missed
            notified.as_mut().enable();
            if !self.is_paused() {
                return true;
            }

            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = &mut notified => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_open_gate_passes() {
        let gate = PauseGate::new();
        assert!(gate.wait(&CancellationToken::new()).await);
    }

    #[tokio::test]
    async fn test_resume_releases_waiter() {
        let gate = Arc::new(PauseGate::new());
        gate.pause();

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.wait(&CancellationToken::new()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        gate.resume();
        let opened = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter not released")
            .unwrap();
        assert!(opened);
    }

    #[tokio::test]
    async fn test_cancel_releases_paused_waiter() {
        let gate = PauseGate::new();
        gate.pause();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        assert!(!gate.wait(&cancel).await);
        assert!(gate.is_paused());
    }
}
