//! Level-triggered boolean signal shared between a session task and its driver.

use tokio::sync::watch;

/// A set/clear flag that tasks can wait on.
///
/// Waiting is cancel-safe: dropping a pending [`Signal::wait`] future leaves
/// the flag untouched, so the same wait can be re-armed on the next exchange.
#[derive(Debug)]
pub struct Signal {
    tx: watch::Sender<bool>,
}

impl Signal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn set(&self) {
        self.tx.send_replace(true);
    }

    pub fn clear(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the flag is set. Returns immediately if it already is.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|set| *set).await;
    }

    /// Wait for the flag, then consume it.
    pub async fn wait_and_clear(&self) {
        self.wait().await;
        self.clear();
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn starts_cleared() {
        let signal = Signal::new();
        assert!(!signal.is_set());
    }

    #[test]
    fn wait_is_pending_until_set() {
        let signal = Signal::new();
        let mut wait = task::spawn(signal.wait());
        assert_pending!(wait.poll());

        signal.set();
        assert!(wait.is_woken());
        assert_ready!(wait.poll());
    }

    #[test]
    fn wait_and_clear_consumes_the_flag() {
        let signal = Signal::new();
        signal.set();

        let mut wait = task::spawn(signal.wait_and_clear());
        assert_ready!(wait.poll());
        drop(wait);
        assert!(!signal.is_set());

        let mut again = task::spawn(signal.wait_and_clear());
        assert_pending!(again.poll());
    }

    #[test]
    fn dropped_wait_leaves_flag_intact() {
        let signal = Signal::new();
        let mut wait = task::spawn(signal.wait());
        assert_pending!(wait.poll());
        drop(wait);

        signal.set();
        assert!(signal.is_set());
    }
}
