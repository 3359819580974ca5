//! Session lifecycle types shared by containers, the registry and drivers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::conversation::{OutputSink, Outputs};

/// Lifecycle of the program task hosted by a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Completed { outputs: Outputs },
    Failed { error: String },
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Result reported to drivers: the program's outputs, a failed result
    /// carrying the error, or `None` while still running.
    pub fn outputs(&self) -> Option<Outputs> {
        match self {
            Self::Running => None,
            Self::Completed { outputs } => Some(outputs.clone()),
            Self::Failed { error } => Some(Outputs::failed(error.clone())),
        }
    }
}

/// How a new session is wired when the registry has to create one.
#[derive(Clone, Default)]
pub struct SessionOptions {
    /// Direct output destination. `None` buffers utterances in the container
    /// for batch collection by an exchange driver.
    pub output_sink: Option<Arc<dyn OutputSink>>,
    /// Configuration handed to the program.
    pub config: Option<Value>,
    /// Install the exchange escalation handler at the bottom of the handler
    /// stack, so unhandled out-of-context utterances are reported to the
    /// driver instead of being dropped.
    pub report_out_of_context: bool,
    /// Upper bound on how long that handler waits for fresh input.
    pub escalation_timeout: Option<Duration>,
}

impl SessionOptions {
    /// Options for a session driven by the stateless exchange API.
    pub fn exchange(config: Option<Value>, escalation_timeout: Option<Duration>) -> Self {
        Self {
            output_sink: None,
            config,
            report_out_of_context: true,
            escalation_timeout,
        }
    }

    /// Options for a session whose output goes straight to `sink`.
    pub fn push(sink: Arc<dyn OutputSink>) -> Self {
        Self {
            output_sink: Some(sink),
            ..Self::default()
        }
    }
}
