//! Wire shapes of the exchange protocol.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One external request carrying exactly one new utterance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRequest {
    #[serde(default)]
    pub user_input: String,
    /// Merged into the conversation memory before the utterance is delivered.
    #[serde(default)]
    pub context: Map<String, Value>,
    /// Overlaid on the component's static configuration when a new session
    /// is created.
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_language_code: Option<String>,
}

impl ExchangeRequest {
    pub fn new(user_input: impl Into<String>) -> Self {
        Self {
            user_input: user_input.into(),
            ..Self::default()
        }
    }

    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = context;
        self
    }

    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }
}

/// One bot utterance in an exchange response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Utterance {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image: None,
        }
    }
}

/// Bounded reply to an [`ExchangeRequest`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeResponse {
    pub responses: Vec<Utterance>,
    /// All utterances joined with a single space.
    pub response: String,
    pub component_done: bool,
    pub component_failed: bool,
    pub out_of_context: bool,
    pub updated_context: Map<String, Value>,
    pub outputs: Map<String, Value>,
    /// Seconds spent serving the exchange.
    pub response_time: f64,
}

impl ExchangeResponse {
    pub fn texts(&self) -> Vec<&str> {
        self.responses.iter().map(|u| u.text.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_parses_to_defaults() {
        let request: ExchangeRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request, ExchangeRequest::default());
    }

    #[test]
    fn request_reads_context_and_parameters() {
        let request: ExchangeRequest = serde_json::from_str(
            r#"{"user_input":"hi","context":{"name":"ada"},"parameters":{"line":"yo"},"source_language_code":"fr"}"#,
        )
        .unwrap();
        assert_eq!(request.user_input, "hi");
        assert_eq!(request.context["name"], "ada");
        assert_eq!(request.parameters["line"], "yo");
        assert_eq!(request.source_language_code.as_deref(), Some("fr"));
    }

    #[test]
    fn response_tolerates_missing_fields() {
        let response: ExchangeResponse =
            serde_json::from_str(r#"{"response":"hello","component_done":true}"#).unwrap();
        assert!(response.component_done);
        assert!(response.responses.is_empty());
        assert_eq!(response.response, "hello");
    }

    #[test]
    fn utterance_omits_missing_image() {
        let json = serde_json::to_string(&Utterance::text("hi")).unwrap();
        assert_eq!(json, r#"{"text":"hi"}"#);
    }
}
