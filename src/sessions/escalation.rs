//! Two-signal handshake between an out-of-context handler running inside a
//! session and the exchange driver outside it.
//!
//! 1. The handler raises `requested` and parks on `input_supplied`.
//! 2. The driver observes `requested`, reports `out_of_context`, clears it.
//! 3. On the next exchange the driver raises `input_supplied` (only if a
//!    handler is parked), drops any `requested` left over from a timed-out
//!    exchange, and pushes the fresh utterance.
//! 4. The handler consumes `input_supplied` and returns to the program.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::conversation::{ContextHandler, ConversationState, Signal};

#[derive(Debug, Default)]
pub struct EscalationHandshake {
    requested: Signal,
    input_supplied: Signal,
    /// Guards every transition of the parked flag together with the signals
    /// it pairs with.
    handler_waiting: Mutex<bool>,
    timeout: Option<Duration>,
}

impl EscalationHandshake {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    /// Handler side. Returns `false` if the wait timed out.
    pub async fn request_and_wait(&self) -> bool {
        {
            let mut waiting = self.handler_waiting.lock();
            *waiting = true;
            self.input_supplied.clear();
            self.requested.set();
        }

        let supplied = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.input_supplied.wait())
                .await
                .is_ok(),
            None => {
                self.input_supplied.wait().await;
                true
            }
        };

        let mut waiting = self.handler_waiting.lock();
        *waiting = false;
        self.input_supplied.clear();
        if !supplied {
            self.requested.clear();
        }
        supplied
    }

    /// Driver side: release a parked handler. Returns whether one was parked.
    ///
    /// A `requested` raised after an earlier exchange stopped waiting belongs
    /// to the utterance this call answers, so it is dropped here.
    pub fn supply_input(&self) -> bool {
        let waiting = self.handler_waiting.lock();
        if *waiting {
            self.requested.clear();
            self.input_supplied.set();
        }
        *waiting
    }

    pub async fn wait_requested(&self) {
        self.requested.wait().await;
    }

    pub fn is_requested(&self) -> bool {
        self.requested.is_set()
    }

    pub fn clear_requested(&self) {
        self.requested.clear();
    }

    pub fn is_handler_waiting(&self) -> bool {
        *self.handler_waiting.lock()
    }
}

/// Bottom-of-stack handler for exchange sessions: hands the utterance back
/// to the caller and waits for it to supply new input.
pub struct ExchangeEscalation {
    handshake: Arc<EscalationHandshake>,
}

impl ExchangeEscalation {
    pub fn new(handshake: Arc<EscalationHandshake>) -> Self {
        Self { handshake }
    }
}

#[async_trait]
impl ContextHandler for ExchangeEscalation {
    async fn handle(&self, state: &ConversationState, text: &str) -> Result<()> {
        tracing::debug!(session_id = %state.session_id(), "reporting out-of-context input: {text}");
        if !self.handshake.request_and_wait().await {
            tracing::warn!(
                session_id = %state.session_id(),
                "no input supplied for out-of-context escalation before timeout, resuming program"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::NullSink;
    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn supply_without_parked_handler_is_ignored() {
        let handshake = EscalationHandshake::new(None);
        assert!(!handshake.supply_input());
        assert!(!handshake.is_requested());
    }

    #[test]
    fn handler_parks_until_input_supplied() {
        let handshake = EscalationHandshake::new(None);
        let mut handler = task::spawn(handshake.request_and_wait());
        assert_pending!(handler.poll());
        assert!(handshake.is_requested());
        assert!(handshake.is_handler_waiting());

        handshake.clear_requested();
        assert_pending!(handler.poll());

        assert!(handshake.supply_input());
        assert!(assert_ready!(handler.poll()));
        drop(handler);
        assert!(!handshake.is_handler_waiting());

        let mut next = task::spawn(handshake.request_and_wait());
        assert_pending!(next.poll());
    }

    #[test]
    fn supplying_input_drops_stale_request() {
        let handshake = EscalationHandshake::new(None);
        let mut handler = task::spawn(handshake.request_and_wait());
        assert_pending!(handler.poll());
        assert!(handshake.is_requested());

        assert!(handshake.supply_input());
        assert!(!handshake.is_requested());
        assert!(assert_ready!(handler.poll()));
    }

    #[tokio::test]
    async fn late_supply_after_timeout_does_not_release_next_handler() {
        let handshake = EscalationHandshake::new(Some(Duration::from_millis(20)));
        assert!(!handshake.request_and_wait().await);
        assert!(!handshake.supply_input());

        let mut next = task::spawn(handshake.request_and_wait());
        assert_pending!(next.poll());
        assert!(handshake.is_handler_waiting());
    }

    #[tokio::test]
    async fn handler_gives_up_after_timeout() {
        let handshake = EscalationHandshake::new(Some(Duration::from_millis(20)));
        assert!(!handshake.request_and_wait().await);
        assert!(!handshake.is_requested());
        assert!(!handshake.is_handler_waiting());
    }

    #[tokio::test]
    async fn requested_resolves_when_handler_runs() {
        let handshake = Arc::new(EscalationHandshake::new(None));
        let state = Arc::new(ConversationState::new(Arc::new(NullSink)));
        let _guard = state.out_of_context(Arc::new(ExchangeEscalation::new(handshake.clone())));

        let escalating = {
            let state = state.clone();
            tokio::spawn(async move { state.escalate_out_of_context("huh").await })
        };

        tokio::time::timeout(Duration::from_secs(1), handshake.wait_requested())
            .await
            .expect("handler should request escalation");
        handshake.clear_requested();
        assert!(handshake.supply_input());
        escalating.await.unwrap().unwrap();
    }
}
