use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Structured result of a finished conversation program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outputs {
    pub success: bool,
    #[serde(default)]
    pub outputs: Map<String, Value>,
}

impl Outputs {
    pub fn new() -> Self {
        Self {
            success: true,
            outputs: Map::new(),
        }
    }

    /// A failed result carrying the failure message under `error`.
    pub fn failed(error: impl Into<String>) -> Self {
        let mut outputs = Map::new();
        outputs.insert("error".to_string(), Value::String(error.into()));
        Self {
            success: false,
            outputs,
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.outputs.insert(key.into(), value.into());
        self
    }

    /// Shorthand for the `control` output used by branching components.
    pub fn control(value: impl Into<String>) -> Self {
        Self::new().with("control", value.into())
    }
}

impl Default for Outputs {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_successful_and_empty() {
        let outputs = Outputs::default();
        assert!(outputs.success);
        assert!(outputs.outputs.is_empty());
    }

    #[test]
    fn failed_records_error_message() {
        let outputs = Outputs::failed("boom");
        assert!(!outputs.success);
        assert_eq!(outputs.outputs["error"], "boom");
    }

    #[test]
    fn control_sets_branch_output() {
        let outputs = Outputs::control("yes").with("score", 3);
        assert_eq!(outputs.outputs["control"], "yes");
        assert_eq!(outputs.outputs["score"], 3);
    }
}
