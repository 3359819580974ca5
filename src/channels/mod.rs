//! Push-based chat channels.
//!
//! A channel turns inbound chat messages into utterances for per-sender
//! sessions, and sends whatever the program says straight back to the chat.
//! There is no reconciler here: output is delivered as it is produced.

pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::conversation::{OutputSink, Program};
use crate::sessions::{SessionOptions, SessionRegistry};

pub use telegram::TelegramChannel;

/// One inbound chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    /// Conversation key; one session per sender.
    pub sender: String,
    /// Where replies go (chat id, channel id, ...).
    pub reply_target: String,
    pub content: String,
    /// Human-readable author, for logs.
    pub user_label: String,
}

#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, text: &str, media: Option<&str>, recipient: &str) -> Result<()>;

    /// Forward inbound messages to `tx` until the channel stops or the
    /// receiver is dropped.
    async fn listen(&self, tx: mpsc::Sender<ChannelMessage>) -> Result<()>;
}

/// Output sink bound to one chat.
pub struct ChannelSink {
    channel: Arc<dyn Channel>,
    recipient: String,
}

impl ChannelSink {
    pub fn new(channel: Arc<dyn Channel>, recipient: &str) -> Self {
        Self {
            channel,
            recipient: recipient.to_string(),
        }
    }
}

#[async_trait]
impl OutputSink for ChannelSink {
    async fn emit(&self, text: &str, media: Option<&str>) -> Result<()> {
        self.channel.send(text, media, &self.recipient).await
    }
}

/// Deliver one message to its sender's session, creating it if needed.
pub fn dispatch(
    channel: &Arc<dyn Channel>,
    registry: &SessionRegistry,
    program: &Arc<dyn Program>,
    config: Option<Value>,
    message: ChannelMessage,
) {
    let sink = Arc::new(ChannelSink::new(channel.clone(), &message.reply_target));
    let options = SessionOptions {
        config,
        ..SessionOptions::push(sink)
    };
    let session = registry.get_or_create(&message.sender, program.clone(), options);

    tracing::debug!(
        channel = %channel.name(),
        session = %message.sender,
        user = %message.user_label,
        "inbound message"
    );
    session.state().memory_set("user_id", message.sender.clone());
    session.state().push_user_input(message.content);
}

/// Run `program` behind `channel` until the channel stops listening.
pub async fn run_channel(
    channel: Arc<dyn Channel>,
    program: Arc<dyn Program>,
    config: Option<Value>,
    registry: SessionRegistry,
) -> Result<()> {
    let (tx, mut rx) = mpsc::channel(100);
    let listener = tokio::spawn({
        let channel = channel.clone();
        async move { channel.listen(tx).await }
    });

    tracing::info!(channel = %channel.name(), program = %program.name(), "channel started");
    while let Some(message) = rx.recv().await {
        dispatch(&channel, &registry, &program, config.clone(), message);
    }

    listener.await??;
    tracing::info!(channel = %channel.name(), "channel stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::standard;
    use crate::conversation::{program_fn, ConversationState, Outputs};
    use parking_lot::Mutex;
    use std::time::Duration;

    /// Emits a fixed script of messages, then stops; records every send.
    struct ScriptedChannel {
        inbound: Vec<ChannelMessage>,
        sent: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedChannel {
        fn new(inbound: Vec<ChannelMessage>) -> Self {
            Self {
                inbound,
                sent: Mutex::new(Vec::new()),
            }
        }

        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().clone()
        }
    }

    #[async_trait]
    impl Channel for ScriptedChannel {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn send(&self, text: &str, _media: Option<&str>, recipient: &str) -> Result<()> {
            self.sent.lock().push((recipient.to_string(), text.to_string()));
            Ok(())
        }

        async fn listen(&self, tx: mpsc::Sender<ChannelMessage>) -> Result<()> {
            for message in &self.inbound {
                tx.send(message.clone()).await?;
            }
            Ok(())
        }
    }

    fn message(sender: &str, content: &str) -> ChannelMessage {
        ChannelMessage {
            sender: sender.to_string(),
            reply_target: format!("chat-{sender}"),
            content: content.to_string(),
            user_label: format!("@{sender}"),
        }
    }

    async fn repeat_forever(state: Arc<ConversationState>, _config: Option<Value>) -> Result<Outputs> {
        loop {
            let text = state.user_input().await?;
            let user = state.memory_get("user_id").unwrap_or(Value::Null);
            state
                .say(&format!("{}: {text}", user.as_str().unwrap_or("?")))
                .await?;
        }
    }

    async fn wait_for_sends(channel: &ScriptedChannel, count: usize) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while channel.sent().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn each_sender_gets_its_own_session() {
        let channel = Arc::new(ScriptedChannel::new(vec![
            message("1", "hello"),
            message("2", "hey"),
            message("1", "again"),
        ]));
        let registry = SessionRegistry::new();

        run_channel(
            channel.clone(),
            Arc::new(program_fn("repeat", repeat_forever)),
            None,
            registry.clone(),
        )
        .await
        .unwrap();

        wait_for_sends(&channel, 3).await;
        assert_eq!(registry.keys(), vec!["1", "2"]);

        let sent = channel.sent();
        let to_one: Vec<_> = sent.iter().filter(|(to, _)| to == "chat-1").map(|(_, t)| t.as_str()).collect();
        assert_eq!(to_one, vec!["1: hello", "1: again"]);
        assert!(sent.contains(&("chat-2".to_string(), "2: hey".to_string())));
    }

    #[tokio::test]
    async fn finished_session_restarts_on_next_message() {
        let channel: Arc<dyn Channel> = Arc::new(ScriptedChannel::new(Vec::new()));
        let registry = SessionRegistry::new();
        let program: Arc<dyn Program> = Arc::new(program_fn("echo", standard::echo));

        dispatch(&channel, &registry, &program, None, message("7", "one"));
        let first = registry.get("7").unwrap();
        tokio::time::timeout(Duration::from_secs(1), first.wait_finished())
            .await
            .unwrap();
        assert!(registry.get("7").is_none());

        dispatch(&channel, &registry, &program, None, message("7", "two"));
        let second = registry.get("7").unwrap();
        assert_ne!(first.instance_id(), second.instance_id());
    }
}
