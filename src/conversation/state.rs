//! Per-session conversation state: transcript, memory, turn channel, output
//! sink and the stack of out-of-context handlers.

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::traits::{ContextHandler, OutputSink};
use super::turn::TurnChannel;

/// Who produced a transcript entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Bot,
}

/// A single transcript item. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub speaker: Speaker,
    pub text: String,
    pub media: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Entry {
    fn new(speaker: Speaker, text: &str, media: Option<&str>) -> Self {
        Self {
            speaker,
            text: text.to_string(),
            media: media.map(str::to_string),
            timestamp: Utc::now(),
        }
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let who = match self.speaker {
            Speaker::User => "USER",
            Speaker::Bot => "BOT",
        };
        match &self.media {
            Some(media) => write!(f, "{who} >> {} #img#: {media}", self.text),
            None => write!(f, "{who} >> {}", self.text),
        }
    }
}

pub fn generate_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Everything one conversation owns.
///
/// Shared between the program task and its driver as `Arc<ConversationState>`.
/// Locks are held only for the duration of a lookup or append, never across
/// an `.await`.
pub struct ConversationState {
    session_id: String,
    transcript: Mutex<Vec<Entry>>,
    memory: Mutex<HashMap<String, Value>>,
    turns: TurnChannel,
    output: Arc<dyn OutputSink>,
    context_handlers: Mutex<Vec<Arc<dyn ContextHandler>>>,
}

impl ConversationState {
    pub fn new(output: Arc<dyn OutputSink>) -> Self {
        Self {
            session_id: generate_session_id(),
            transcript: Mutex::new(Vec::new()),
            memory: Mutex::new(HashMap::new()),
            turns: TurnChannel::new(),
            output,
            context_handlers: Mutex::new(Vec::new()),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn turns(&self) -> &TurnChannel {
        &self.turns
    }

    /// Utter a line. Completes once the output sink acknowledged it.
    pub async fn say(&self, text: &str) -> Result<()> {
        self.say_with_media(text, None).await
    }

    pub async fn say_with_media(&self, text: &str, media: Option<&str>) -> Result<()> {
        tracing::debug!(session_id = %self.session_id, media = ?media, "BOT: {text}");
        self.transcript.lock().push(Entry::new(Speaker::Bot, text, media));
        self.output.emit(text, media).await
    }

    /// Driver side: deliver an utterance to the program.
    pub fn push_user_input(&self, text: impl Into<String>) {
        self.turns.push(text);
    }

    /// Wait for the next utterance and record it in the transcript.
    pub async fn user_input(&self) -> Result<String> {
        let text = self.turns.next().await?;
        tracing::debug!(session_id = %self.session_id, "USER: {text}");
        self.transcript.lock().push(Entry::new(Speaker::User, &text, None));
        Ok(text)
    }

    pub fn last_user_input(&self) -> Option<String> {
        self.transcript
            .lock()
            .iter()
            .rev()
            .find(|entry| entry.speaker == Speaker::User)
            .map(|entry| entry.text.clone())
    }

    pub fn transcript(&self) -> Vec<Entry> {
        self.transcript.lock().clone()
    }

    // ── Memory ──────────────────────────────────────────────────

    pub fn memory_get(&self, key: &str) -> Option<Value> {
        self.memory.lock().get(key).cloned()
    }

    pub fn memory_set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.memory.lock().insert(key.into(), value.into());
    }

    /// Merge a payload into memory; incoming keys win.
    pub fn memory_merge<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.memory.lock().extend(entries);
    }

    /// Run `f` with exclusive access to the memory map.
    pub fn with_memory<R>(&self, f: impl FnOnce(&mut HashMap<String, Value>) -> R) -> R {
        f(&mut self.memory.lock())
    }

    pub fn memory_snapshot(&self) -> Map<String, Value> {
        self.memory
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    // ── Out-of-context handlers ─────────────────────────────────

    pub fn push_context_handler(&self, handler: Arc<dyn ContextHandler>) {
        self.context_handlers.lock().push(handler);
    }

    pub fn pop_context_handler(&self) -> Option<Arc<dyn ContextHandler>> {
        self.context_handlers.lock().pop()
    }

    pub fn context_depth(&self) -> usize {
        self.context_handlers.lock().len()
    }

    /// Push `handler` for the lifetime of the returned guard.
    pub fn out_of_context(&self, handler: Arc<dyn ContextHandler>) -> OutOfContextGuard<'_> {
        self.push_context_handler(handler);
        OutOfContextGuard { state: self }
    }

    /// Hand `text` to the innermost handler. No-op when none is installed.
    pub async fn escalate_out_of_context(&self, text: &str) -> Result<()> {
        let top = self.context_handlers.lock().last().cloned();
        match top {
            Some(handler) => {
                tracing::debug!(session_id = %self.session_id, "out of context: {text}");
                handler.handle(self, text).await
            }
            None => Ok(()),
        }
    }
}

/// Pops its handler when dropped, on every exit path.
#[must_use = "the handler is popped as soon as the guard is dropped"]
pub struct OutOfContextGuard<'a> {
    state: &'a ConversationState,
}

impl Drop for OutOfContextGuard<'_> {
    fn drop(&mut self) {
        self.state.pop_context_handler();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{ResponseBuffer, SayFallback};
    use async_trait::async_trait;

    fn buffered() -> (ConversationState, Arc<ResponseBuffer>) {
        let buffer = Arc::new(ResponseBuffer::new());
        (ConversationState::new(buffer.clone()), buffer)
    }

    /// Reads one more utterance and echoes it back with a prefix.
    struct Clarify;

    #[async_trait]
    impl ContextHandler for Clarify {
        async fn handle(&self, state: &ConversationState, text: &str) -> Result<()> {
            state.say(&format!("what do you mean by '{text}'?")).await?;
            let answer = state.user_input().await?;
            state.say(&format!("got it: {answer}")).await
        }
    }

    #[test]
    fn session_ids_are_unique() {
        let (a, _) = buffered();
        let (b, _) = buffered();
        assert_ne!(a.session_id(), b.session_id());
        assert!(!a.session_id().is_empty());
    }

    #[tokio::test]
    async fn say_records_then_emits() {
        let (state, buffer) = buffered();
        state.say("hi").await.unwrap();
        state
            .say_with_media("look", Some("https://img.example/a.png"))
            .await
            .unwrap();

        let transcript = state.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].speaker, Speaker::Bot);
        assert_eq!(transcript[1].media.as_deref(), Some("https://img.example/a.png"));
        assert_eq!(buffer.collect_and_clear(), vec!["hi", "look"]);
    }

    #[tokio::test]
    async fn user_input_appends_user_entry() {
        let (state, _) = buffered();
        assert!(state.last_user_input().is_none());

        state.push_user_input("first");
        state.push_user_input("second");
        assert_eq!(state.user_input().await.unwrap(), "first");
        state.say("ok").await.unwrap();
        assert_eq!(state.last_user_input().as_deref(), Some("first"));

        assert_eq!(state.user_input().await.unwrap(), "second");
        assert_eq!(state.last_user_input().as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn memory_merge_is_last_writer_wins() {
        let (state, _) = buffered();
        state.memory_set("name", "ada");
        state.memory_set("lang", "en");
        state.memory_merge([("lang".to_string(), Value::from("fr"))]);

        let snapshot = state.memory_snapshot();
        assert_eq!(snapshot["name"], "ada");
        assert_eq!(snapshot["lang"], "fr");
        assert_eq!(state.memory_get("missing"), None);
    }

    #[tokio::test]
    async fn escalation_without_handler_is_noop() {
        let (state, buffer) = buffered();
        state.escalate_out_of_context("???").await.unwrap();
        assert!(buffer.is_empty());
        assert!(state.transcript().is_empty());
    }

    #[tokio::test]
    async fn escalation_uses_innermost_handler() {
        let (state, buffer) = buffered();
        let _outer = state.out_of_context(Arc::new(SayFallback::new("outer")));
        {
            let _inner = state.out_of_context(Arc::new(SayFallback::new("inner")));
            state.escalate_out_of_context("x").await.unwrap();
        }
        state.escalate_out_of_context("y").await.unwrap();

        assert_eq!(buffer.collect_and_clear(), vec!["inner", "outer"]);
    }

    #[tokio::test]
    async fn guard_pops_on_early_error_return() {
        async fn failing_sub_dialogue(state: &ConversationState) -> Result<()> {
            let _guard = state.out_of_context(Arc::new(SayFallback::new("sorry")));
            anyhow::bail!("sub dialogue failed")
        }

        let (state, _) = buffered();
        assert!(failing_sub_dialogue(&state).await.is_err());
        assert_eq!(state.context_depth(), 0);
    }

    #[tokio::test]
    async fn handler_may_consume_extra_turns() {
        let (state, buffer) = buffered();
        let _guard = state.out_of_context(Arc::new(Clarify));
        state.push_user_input("pizza please");

        state.escalate_out_of_context("blorp").await.unwrap();

        assert_eq!(
            buffer.collect_and_clear(),
            vec!["what do you mean by 'blorp'?", "got it: pizza please"]
        );
        assert_eq!(state.last_user_input().as_deref(), Some("pizza please"));
    }

    #[test]
    fn entry_display_marks_speaker_and_media() {
        let bot = Entry::new(Speaker::Bot, "hello", None);
        let user = Entry::new(Speaker::User, "pic", Some("u.png"));
        assert_eq!(bot.to_string(), "BOT >> hello");
        assert_eq!(user.to_string(), "USER >> pic #img#: u.png");
    }
}
