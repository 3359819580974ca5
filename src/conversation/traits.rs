//! Capabilities a conversation consumes: output sinks, out-of-context
//! handlers and the conversation program itself.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

use super::outputs::Outputs;
use super::state::ConversationState;

/// Destination for bot utterances.
///
/// `emit` completes only after the destination acknowledged the utterance,
/// so a sink doing network I/O back-pressures the program that called `say`.
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn emit(&self, text: &str, media: Option<&str>) -> Result<()>;
}

/// Fallback invoked when a program cannot interpret an utterance.
///
/// A handler may call [`ConversationState::user_input`] itself, consuming
/// additional turns before control returns to the program.
#[async_trait]
pub trait ContextHandler: Send + Sync {
    async fn handle(&self, state: &ConversationState, text: &str) -> Result<()>;
}

/// User-authored sequential conversation logic, run once per session.
#[async_trait]
pub trait Program: Send + Sync {
    async fn run(&self, state: Arc<ConversationState>, config: Option<Value>) -> Result<Outputs>;

    fn name(&self) -> &str;
}

/// [`Program`] backed by an async function or closure.
pub struct FnProgram<F> {
    name: String,
    f: F,
}

/// Wrap an async function as a [`Program`].
pub fn program_fn<F, Fut>(name: &str, f: F) -> FnProgram<F>
where
    F: Fn(Arc<ConversationState>, Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Outputs>> + Send + 'static,
{
    FnProgram {
        name: name.to_string(),
        f,
    }
}

#[async_trait]
impl<F, Fut> Program for FnProgram<F>
where
    F: Fn(Arc<ConversationState>, Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Outputs>> + Send + 'static,
{
    async fn run(&self, state: Arc<ConversationState>, config: Option<Value>) -> Result<Outputs> {
        (self.f)(state, config).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Handler that answers every out-of-context utterance with a fixed line.
pub struct SayFallback {
    line: String,
}

impl SayFallback {
    pub fn new(line: impl Into<String>) -> Self {
        Self { line: line.into() }
    }
}

#[async_trait]
impl ContextHandler for SayFallback {
    async fn handle(&self, state: &ConversationState, _text: &str) -> Result<()> {
        state.say(&self.line).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::NullSink;

    async fn finish_with_flag(
        _state: Arc<ConversationState>,
        config: Option<Value>,
    ) -> Result<Outputs> {
        let flag = config
            .as_ref()
            .and_then(|c| c.get("flag"))
            .cloned()
            .unwrap_or(Value::Null);
        Ok(Outputs::new().with("flag", flag))
    }

    #[tokio::test]
    async fn fn_program_passes_config_through() {
        let program = program_fn("flagger", finish_with_flag);
        assert_eq!(program.name(), "flagger");

        let state = Arc::new(ConversationState::new(Arc::new(NullSink)));
        let outputs = program
            .run(state, Some(serde_json::json!({"flag": "on"})))
            .await
            .unwrap();
        assert_eq!(outputs.outputs["flag"], "on");
    }

    #[tokio::test]
    async fn say_fallback_utters_its_line() {
        let state = ConversationState::new(Arc::new(NullSink));
        SayFallback::new("what?").handle(&state, "gibberish").await.unwrap();
        assert_eq!(state.transcript().last().unwrap().text, "what?");
    }
}
