//! Stateless request/response facade over stateful conversation sessions.
//!
//! Each exchange carries one utterance and returns everything the program
//! said until it blocked on the next input, finished, or escalated.

pub mod reconciler;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

pub use reconciler::{reconcile, wait_for_turn, TurnOutcome};
pub use types::{ExchangeRequest, ExchangeResponse, Utterance};

use crate::components::{merge_config, ComponentRegistry};
use crate::config::ExchangeConfig;
use crate::sessions::{SessionOptions, SessionRegistry};

#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("Component: {0} not found")]
    ComponentNotFound(String),
}

/// Wait bounds applied to every exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExchangeSettings {
    pub turn_timeout: Option<Duration>,
    pub escalation_timeout: Option<Duration>,
}

impl From<&ExchangeConfig> for ExchangeSettings {
    fn from(config: &ExchangeConfig) -> Self {
        let secs = |s: u64| (s > 0).then(|| Duration::from_secs(s));
        Self {
            turn_timeout: secs(config.turn_timeout_secs),
            escalation_timeout: secs(config.escalation_timeout_secs),
        }
    }
}

/// Routes exchanges to sessions, creating them from registered components.
#[derive(Clone)]
pub struct ExchangeService {
    sessions: SessionRegistry,
    components: Arc<ComponentRegistry>,
    settings: ExchangeSettings,
}

impl ExchangeService {
    pub fn new(components: Arc<ComponentRegistry>, settings: ExchangeSettings) -> Self {
        Self {
            sessions: SessionRegistry::new(),
            components,
            settings,
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    pub fn settings(&self) -> ExchangeSettings {
        self.settings
    }

    /// Serve one exchange for `session_id`.
    ///
    /// A live session is reused even when `component_id` is unknown; a new
    /// one is only created from a registered component.
    pub async fn exchange(
        &self,
        component_id: &str,
        session_id: &str,
        request: &ExchangeRequest,
    ) -> Result<ExchangeResponse, ExchangeError> {
        let session = match self.components.get(component_id) {
            Some(component) => {
                let config = merge_config(component.config.as_ref(), &request.parameters);
                self.sessions.get_or_create(
                    session_id,
                    component.program.clone(),
                    SessionOptions::exchange(config, self.settings.escalation_timeout),
                )
            }
            None => self
                .sessions
                .get(session_id)
                .ok_or_else(|| ExchangeError::ComponentNotFound(component_id.to_string()))?,
        };

        tracing::debug!(component = %component_id, session = %session_id, "exchange");
        Ok(reconcile(&session, request, self.settings.turn_timeout).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn service() -> ExchangeService {
        let settings = ExchangeSettings {
            turn_timeout: Some(Duration::from_secs(2)),
            escalation_timeout: None,
        };
        ExchangeService::new(Arc::new(ComponentRegistry::with_builtins()), settings)
    }

    #[test]
    fn zero_seconds_disables_bounds() {
        let settings = ExchangeSettings::from(&ExchangeConfig {
            turn_timeout_secs: 0,
            escalation_timeout_secs: 45,
        });
        assert_eq!(settings.turn_timeout, None);
        assert_eq!(settings.escalation_timeout, Some(Duration::from_secs(45)));
    }

    #[tokio::test]
    async fn unknown_component_without_session_is_rejected() {
        let err = service()
            .exchange("missing", "s1", &ExchangeRequest::new("hi"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Component: missing not found");
    }

    #[tokio::test]
    async fn live_session_is_reused_under_any_component_id() {
        let service = service();
        let first = service
            .exchange("greeter", "s1", &ExchangeRequest::new("hey"))
            .await
            .unwrap();
        assert_eq!(first.texts(), vec!["Welcome to sample bot", "hello back, how can I help"]);

        let second = service
            .exchange("whatever", "s1", &ExchangeRequest::new("a drink"))
            .await
            .unwrap();
        assert_eq!(second.texts(), vec!["what drink do you want?"]);
    }

    #[tokio::test]
    async fn parameters_configure_new_sessions() {
        let service = service();
        let request = ExchangeRequest::new("")
            .with_parameters(json!({"line": "custom line"}).as_object().cloned().unwrap());
        let response = service.exchange("oneturn_say", "s2", &request).await.unwrap();

        assert!(response.component_done);
        assert_eq!(response.response, "custom line");
        assert!(service.sessions().is_empty());
    }
}
