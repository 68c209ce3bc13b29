//! Epoch-based cancellation for seek, play and pause requests.
//!
//! The controller holds one `SeekEpoch`. Every new request calls `advance()`,
//! which invalidates all outstanding tokens and returns the new owner's token.
//! Async continuations check `is_current()` before acting on the media element
//! or emitting notifications, and race `cancelled()` at every wait point, so a
//! superseded request goes quiet even if its runtime callback fires late.

use log::trace;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct EpochShared {
    current: AtomicU64,
    notify: Notify,
}

/// Epoch counter identifying the current owner of the media position
#[derive(Debug, Clone, Default)]
pub struct SeekEpoch {
    shared: Arc<EpochShared>,
}

impl SeekEpoch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new request: cancels every outstanding token
    pub fn advance(&self) -> SeekToken {
        let id = self.shared.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.notify.notify_waiters();
        trace!("Seek epoch advanced: {}", id);
        SeekToken {
            id,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Cancel outstanding work without starting a new request
    pub fn cancel_all(&self) {
        self.advance();
    }

    pub fn current(&self) -> u64 {
        self.shared.current.load(Ordering::SeqCst)
    }
}

/// Token carried by one request
#[derive(Debug, Clone)]
pub struct SeekToken {
    id: u64,
    shared: Arc<EpochShared>,
}

impl SeekToken {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Still the newest request
    pub fn is_current(&self) -> bool {
        self.shared.current.load(Ordering::SeqCst) == self.id
    }

    pub fn is_cancelled(&self) -> bool {
        !self.is_current()
    }

    /// Resolves once a newer request has been issued
    pub async fn cancelled(&self) {
        loop {
            // Register before checking so an advance in between still wakes us
            let notified = self.shared.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_advance_supersedes() {
        let epoch = SeekEpoch::new();
        assert_eq!(epoch.current(), 0);

        let first = epoch.advance();
        assert!(first.is_current());
        assert_eq!(first.id(), 1);

        let second = epoch.advance();
        assert!(first.is_cancelled());
        assert!(second.is_current());
        assert_eq!(epoch.current(), 2);

        epoch.cancel_all();
        assert!(second.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wakes_on_advance() {
        let epoch = SeekEpoch::new();
        let token = epoch.advance();

        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(!waiter.is_finished());

        epoch.advance();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("cancel wakes waiter")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_stale() {
        let epoch = SeekEpoch::new();
        let token = epoch.advance();
        epoch.advance();
        token.cancelled().await;
    }
}
