//! A session container hosts exactly one conversation program task and makes
//! its blocked / escalating / terminal status observable from outside.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::escalation::{EscalationHandshake, ExchangeEscalation};
use super::traits::{SessionOptions, SessionStatus};
use crate::conversation::{ConversationState, OutputSink, Program, ResponseBuffer};

pub struct SessionContainer {
    key: String,
    program_name: String,
    state: Arc<ConversationState>,
    responses: Arc<ResponseBuffer>,
    escalation: Arc<EscalationHandshake>,
    status: watch::Receiver<SessionStatus>,
    exchange_lock: tokio::sync::Mutex<()>,
    task: JoinHandle<()>,
}

impl SessionContainer {
    /// Start `program` in a supervised task.
    ///
    /// When the program returns, fails or panics, the supervisor calls
    /// `on_terminal` with the conversation's unique id *before* publishing
    /// the terminal status. Must be called from within a tokio runtime.
    pub fn spawn<F>(key: &str, program: Arc<dyn Program>, options: SessionOptions, on_terminal: F) -> Self
    where
        F: FnOnce(&str) + Send + 'static,
    {
        let responses = Arc::new(ResponseBuffer::new());
        let sink: Arc<dyn OutputSink> = match options.output_sink {
            Some(sink) => sink,
            None => responses.clone(),
        };
        let state = Arc::new(ConversationState::new(sink));

        let escalation = Arc::new(EscalationHandshake::new(options.escalation_timeout));
        if options.report_out_of_context {
            state.push_context_handler(Arc::new(ExchangeEscalation::new(escalation.clone())));
        }

        let (status_tx, status_rx) = watch::channel(SessionStatus::Running);
        let program_name = program.name().to_string();

        tracing::debug!(
            session = %key,
            session_id = %state.session_id(),
            program = %program_name,
            "starting conversation program"
        );

        let task = tokio::spawn({
            let state = state.clone();
            let key = key.to_string();
            let config = options.config;
            async move {
                let outcome = AssertUnwindSafe(program.run(state.clone(), config))
                    .catch_unwind()
                    .await;

                let status = match outcome {
                    Ok(Ok(outputs)) => {
                        tracing::debug!(session = %key, success = outputs.success, "conversation program finished");
                        SessionStatus::Completed { outputs }
                    }
                    Ok(Err(e)) => {
                        let error = format!("{e:#}");
                        tracing::warn!(session = %key, error = %error, "conversation program failed");
                        SessionStatus::Failed { error }
                    }
                    Err(panic) => {
                        let error = panic_message(panic.as_ref());
                        tracing::warn!(session = %key, error = %error, "conversation program panicked");
                        SessionStatus::Failed { error }
                    }
                };

                on_terminal(state.session_id());
                status_tx.send_replace(status);
            }
        });

        Self {
            key: key.to_string(),
            program_name,
            state,
            responses,
            escalation,
            status: status_rx,
            exchange_lock: tokio::sync::Mutex::new(()),
            task,
        }
    }

    /// External session identifier this container was registered under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Unique id of this container's conversation.
    pub fn instance_id(&self) -> &str {
        self.state.session_id()
    }

    pub fn program_name(&self) -> &str {
        &self.program_name
    }

    pub fn state(&self) -> &Arc<ConversationState> {
        &self.state
    }

    pub fn escalation(&self) -> &EscalationHandshake {
        &self.escalation
    }

    /// Take every buffered utterance and empty the buffer.
    pub fn collect_and_clear_output(&self) -> Vec<String> {
        self.responses.collect_and_clear()
    }

    pub fn status(&self) -> SessionStatus {
        let status = self.status.borrow().clone();
        if !status.is_terminal() && self.task.is_finished() {
            return SessionStatus::Failed {
                error: "conversation task ended without reporting a result".into(),
            };
        }
        status
    }

    pub fn is_finished(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn is_failed(&self) -> bool {
        self.status().is_failed()
    }

    /// Resolve once the program task reached a terminal state.
    pub async fn wait_finished(&self) {
        let mut status = self.status.clone();
        // A closed channel means the task is gone, which is terminal too.
        let _ = status.wait_for(SessionStatus::is_terminal).await;
    }

    /// Serializes exchanges against this session.
    pub async fn lock_exchange(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.exchange_lock.lock().await
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "conversation program panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{program_fn, Outputs};
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(1);

    async fn greet_then_listen(state: Arc<ConversationState>, _config: Option<Value>) -> anyhow::Result<Outputs> {
        state.say("hi").await?;
        loop {
            state.user_input().await?;
        }
    }

    async fn say_bye(state: Arc<ConversationState>, _config: Option<Value>) -> anyhow::Result<Outputs> {
        state.say("bye").await?;
        Ok(Outputs::control("done"))
    }

    async fn explode(_state: Arc<ConversationState>, _config: Option<Value>) -> anyhow::Result<Outputs> {
        anyhow::bail!("kaboom")
    }

    async fn panic_inside(_state: Arc<ConversationState>, _config: Option<Value>) -> anyhow::Result<Outputs> {
        panic!("wires crossed")
    }

    fn noop(_: &str) {}

    #[tokio::test]
    async fn buffers_output_until_collected() {
        let container = SessionContainer::spawn(
            "s1",
            Arc::new(program_fn("greet", greet_then_listen)),
            SessionOptions::default(),
            noop,
        );
        tokio::time::timeout(WAIT, container.state().turns().await_next_request())
            .await
            .unwrap();

        assert_eq!(container.collect_and_clear_output(), vec!["hi"]);
        assert!(container.collect_and_clear_output().is_empty());
        assert!(!container.is_finished());
        assert_eq!(container.program_name(), "greet");
    }

    #[tokio::test]
    async fn completion_runs_hook_then_publishes_outputs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let hook_calls = calls.clone();
        let container = SessionContainer::spawn(
            "s2",
            Arc::new(program_fn("bye", say_bye)),
            SessionOptions::default(),
            move |_| {
                hook_calls.fetch_add(1, Ordering::SeqCst);
            },
        );

        tokio::time::timeout(WAIT, container.wait_finished()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            container.status(),
            SessionStatus::Completed {
                outputs: Outputs::control("done")
            }
        );
        assert_eq!(container.collect_and_clear_output(), vec!["bye"]);

        // Waiting again on a finished session resolves immediately.
        tokio::time::timeout(WAIT, container.wait_finished()).await.unwrap();
    }

    #[tokio::test]
    async fn program_error_marks_failed() {
        let container = SessionContainer::spawn(
            "s3",
            Arc::new(program_fn("explode", explode)),
            SessionOptions::default(),
            noop,
        );
        tokio::time::timeout(WAIT, container.wait_finished()).await.unwrap();

        assert!(container.is_failed());
        match container.status() {
            SessionStatus::Failed { error } => assert!(error.contains("kaboom")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn program_panic_marks_failed() {
        let container = SessionContainer::spawn(
            "s4",
            Arc::new(program_fn("panic", panic_inside)),
            SessionOptions::default(),
            noop,
        );
        tokio::time::timeout(WAIT, container.wait_finished()).await.unwrap();

        match container.status() {
            SessionStatus::Failed { error } => assert_eq!(error, "wires crossed"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exchange_options_install_escalation_handler() {
        let container = SessionContainer::spawn(
            "s5",
            Arc::new(program_fn("greet", greet_then_listen)),
            SessionOptions::exchange(None, None),
            noop,
        );
        assert_eq!(container.state().context_depth(), 1);
        assert!(!container.escalation().is_requested());
    }

    #[tokio::test]
    async fn direct_sink_bypasses_buffer() {
        let sink = Arc::new(ResponseBuffer::new());
        let container = SessionContainer::spawn(
            "s6",
            Arc::new(program_fn("bye", say_bye)),
            SessionOptions::push(sink.clone()),
            noop,
        );
        tokio::time::timeout(WAIT, container.wait_finished()).await.unwrap();

        assert!(container.collect_and_clear_output().is_empty());
        assert_eq!(sink.collect_and_clear(), vec!["bye"]);
    }
}
