//! Turn channel: the FIFO of incoming utterances plus the "awaiting input" edge.

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TryRecvError};

use super::error::ConversationError;
use super::signal::Signal;

/// Unbounded, ordered, single-consumer queue of user utterances.
///
/// The program side calls [`TurnChannel::next`]; the driver side calls
/// [`TurnChannel::push`] and [`TurnChannel::await_next_request`].
/// The `gate` mutex makes "queue is empty, raise the awaiting signal" atomic
/// with respect to "clear the awaiting signal, enqueue", so the driver never
/// observes a stale idle signal for an utterance it has already pushed.
pub struct TurnChannel {
    tx: mpsc::UnboundedSender<String>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    gate: Mutex<()>,
    awaiting_input: Signal,
}

impl TurnChannel {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
            gate: Mutex::new(()),
            awaiting_input: Signal::new(),
        }
    }

    /// Enqueue an utterance. Never blocks.
    pub fn push(&self, text: impl Into<String>) {
        let _gate = self.gate.lock();
        self.awaiting_input.clear();
        // The receiver lives in `self`, so sending cannot fail.
        let _ = self.tx.send(text.into());
    }

    /// Take the oldest unconsumed utterance, suspending if there is none.
    ///
    /// When the queue is empty the awaiting-input signal is raised before
    /// suspending; that is how a driver learns the program reached a turn
    /// boundary.
    pub async fn next(&self) -> Result<String, ConversationError> {
        let mut rx = self.rx.lock().await;
        {
            let _gate = self.gate.lock();
            match rx.try_recv() {
                Ok(text) => return Ok(text),
                Err(TryRecvError::Empty) => self.awaiting_input.set(),
                Err(TryRecvError::Disconnected) => return Err(ConversationError::InputClosed),
            }
        }
        rx.recv().await.ok_or(ConversationError::InputClosed)
    }

    /// Suspend until the program is blocked waiting for input, then consume
    /// the signal. Resolves at most once per raise.
    pub async fn await_next_request(&self) {
        self.awaiting_input.wait_and_clear().await;
    }

    /// Whether the program is currently parked in [`TurnChannel::next`] with
    /// nothing to read.
    pub fn is_awaiting_input(&self) -> bool {
        self.awaiting_input.is_set()
    }
}

impl Default for TurnChannel {
    fn default() -> Self {
        Self::new()
    }
}
