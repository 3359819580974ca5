//! Telegram bot channel using long-polling `getUpdates`.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;

use super::{Channel, ChannelMessage};
use crate::config::TelegramConfig;

const API_BASE: &str = "https://api.telegram.org";
const RETRY_DELAY: Duration = Duration::from_secs(5);

pub struct TelegramChannel {
    bot_token: String,
    allowed_users: Vec<String>,
    poll_timeout_secs: u64,
    api_base: String,
    client: Client,
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig) -> Self {
        Self::with_api_base(config, API_BASE)
    }

    pub fn with_api_base(config: &TelegramConfig, api_base: &str) -> Self {
        Self {
            bot_token: config.bot_token.clone(),
            allowed_users: config
                .allowed_users
                .iter()
                .map(|u| u.trim_start_matches('@').to_string())
                .collect(),
            poll_timeout_secs: config.poll_timeout_secs,
            api_base: api_base.trim_end_matches('/').to_string(),
            client: Client::builder()
                .timeout(Duration::from_secs(config.poll_timeout_secs + 15))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token)
    }

    fn is_allowed(&self, username: Option<&str>, user_id: &str) -> bool {
        self.allowed_users.is_empty()
            || self
                .allowed_users
                .iter()
                .any(|allowed| Some(allowed.as_str()) == username || allowed == user_id)
    }

    /// Convert one `getUpdates` item into a message, if it is an allowed
    /// text message.
    fn parse_update(&self, update: &Value) -> Option<ChannelMessage> {
        let message = update.get("message")?;
        let text = message.get("text")?.as_str()?;
        let chat_id = message.get("chat")?.get("id")?.as_i64()?.to_string();

        let from = message.get("from");
        let username = from
            .and_then(|f| f.get("username"))
            .and_then(Value::as_str);
        let user_id = from
            .and_then(|f| f.get("id"))
            .and_then(Value::as_i64)
            .map(|id| id.to_string())
            .unwrap_or_default();

        if !self.is_allowed(username, &user_id) {
            tracing::warn!(
                user = username.unwrap_or("unknown"),
                user_id = %user_id,
                "ignoring Telegram message from user outside the allow-list"
            );
            return None;
        }

        Some(ChannelMessage {
            sender: chat_id.clone(),
            reply_target: chat_id,
            content: text.to_string(),
            user_label: username.map_or_else(|| user_id.clone(), |u| format!("@{u}")),
        })
    }

    async fn call(&self, method: &str, body: &Value) -> Result<Value> {
        let response = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await?;
        let status = response.status();
        let payload: Value = response.json().await?;
        if !status.is_success() || payload.get("ok") != Some(&Value::Bool(true)) {
            let description = payload
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            anyhow::bail!("Telegram {method} failed ({status}): {description}");
        }
        Ok(payload)
    }
}

/// Highest `update_id` in a batch, plus one.
fn next_offset(updates: &[Value], current: i64) -> i64 {
    updates
        .iter()
        .filter_map(|u| u.get("update_id").and_then(Value::as_i64))
        .map(|id| id + 1)
        .fold(current, i64::max)
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, text: &str, media: Option<&str>, recipient: &str) -> Result<()> {
        match media {
            Some(photo) => {
                self.call(
                    "sendPhoto",
                    &serde_json::json!({ "chat_id": recipient, "photo": photo, "caption": text }),
                )
                .await?;
            }
            None => {
                self.call(
                    "sendMessage",
                    &serde_json::json!({ "chat_id": recipient, "text": text }),
                )
                .await?;
            }
        }
        Ok(())
    }

    async fn listen(&self, tx: mpsc::Sender<ChannelMessage>) -> Result<()> {
        let mut offset: i64 = 0;
        loop {
            let body = serde_json::json!({
                "offset": offset,
                "timeout": self.poll_timeout_secs,
                "allowed_updates": ["message"],
            });
            let updates = match self.call("getUpdates", &body).await {
                Ok(payload) => payload
                    .get("result")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default(),
                Err(e) => {
                    tracing::warn!("Telegram poll failed, retrying: {e:#}");
                    tokio::time::sleep(RETRY_DELAY).await;
                    continue;
                }
            };

            offset = next_offset(&updates, offset);
            for update in &updates {
                if let Some(message) = self.parse_update(update) {
                    if tx.send(message).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }
}
