//! Remote components: conversation programs served by another exchange
//! endpoint and driven turn by turn from inside a local conversation.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::conversation::{ConversationState, Outputs, Program};
use crate::exchange::{ExchangeRequest, ExchangeResponse};

const MAX_ERROR_BODY_CHARS: usize = 200;

/// Something that can serve exchanges for a component.
#[async_trait]
pub trait ComponentClient: Send + Sync {
    async fn exchange(
        &self,
        component_id: &str,
        session_id: &str,
        request: &ExchangeRequest,
    ) -> Result<ExchangeResponse>;

    fn name(&self) -> &str;
}

/// JSON-over-HTTP client for a remote exchange gateway.
pub struct HttpComponentClient {
    base_url: String,
    client: Client,
}

impl HttpComponentClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_timeout(base_url, Duration::from_secs(60))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::builder()
                .timeout(timeout)
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    pub fn exchange_url(&self, component_id: &str, session_id: &str) -> String {
        format!("{}/api/exchange/{component_id}/{session_id}", self.base_url)
    }
}

#[async_trait]
impl ComponentClient for HttpComponentClient {
    async fn exchange(
        &self,
        component_id: &str,
        session_id: &str,
        request: &ExchangeRequest,
    ) -> Result<ExchangeResponse> {
        let url = self.exchange_url(component_id, session_id);
        let response = self.client.post(&url).json(request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "component {component_id} exchange failed ({status}): {}",
                truncate_error(&body)
            );
        }

        Ok(response.json().await?)
    }

    fn name(&self) -> &str {
        "http"
    }
}

fn truncate_error(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        return body.to_string();
    }
    let end = body
        .char_indices()
        .nth(MAX_ERROR_BODY_CHARS)
        .map_or(body.len(), |(i, _)| i);
    format!("{}...", &body[..end])
}

/// Local program that proxies a remote component.
///
/// Program config keys: `user_input` (first utterance, otherwise read from
/// the user), `context` (sent with every exchange) and anything else, which
/// is forwarded as exchange `parameters`.
pub struct RemoteComponent {
    component_id: String,
    client: Arc<dyn ComponentClient>,
}

impl RemoteComponent {
    pub fn new(component_id: &str, client: Arc<dyn ComponentClient>) -> Self {
        Self {
            component_id: component_id.to_string(),
            client,
        }
    }

    async fn call(
        &self,
        state: &ConversationState,
        user_input: String,
        context: &Map<String, Value>,
        parameters: &Map<String, Value>,
    ) -> Result<ExchangeResponse> {
        let request = ExchangeRequest {
            user_input,
            context: context.clone(),
            parameters: parameters.clone(),
            source_language_code: state
                .memory_get("source_language_code")
                .and_then(|v| v.as_str().map(str::to_string)),
        };
        let response = self
            .client
            .exchange(&self.component_id, state.session_id(), &request)
            .await?;
        state.memory_merge(response.updated_context.clone());
        Ok(response)
    }
}

async fn emit_responses(state: &ConversationState, response: &ExchangeResponse) -> Result<()> {
    if response.responses.is_empty() {
        if !response.response.is_empty() {
            state.say(&response.response).await?;
        }
        return Ok(());
    }
    for utterance in &response.responses {
        state
            .say_with_media(&utterance.text, utterance.image.as_deref())
            .await?;
    }
    Ok(())
}

#[async_trait]
impl Program for RemoteComponent {
    async fn run(&self, state: Arc<ConversationState>, config: Option<Value>) -> Result<Outputs> {
        let mut parameters = match config {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        parameters.remove("blueprint_id");
        let preset = match parameters.remove("user_input") {
            Some(Value::String(text)) if !text.is_empty() => Some(text),
            _ => None,
        };
        let context = match parameters.remove("context") {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };

        let first = match preset {
            Some(text) => text,
            None => state.user_input().await?,
        };
        let mut response = self.call(&state, first, &context, &parameters).await?;

        while !response.component_done {
            emit_responses(&state, &response).await?;
            if response.out_of_context {
                let last = state.last_user_input().unwrap_or_default();
                state.escalate_out_of_context(&last).await?;
            }
            let text = state.user_input().await?;
            response = self.call(&state, text, &context, &parameters).await?;
        }

        emit_responses(&state, &response).await?;
        Ok(Outputs {
            success: !response.component_failed,
            outputs: response.outputs,
        })
    }

    fn name(&self) -> &str {
        &self.component_id
    }
}
