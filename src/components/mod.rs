//! Local component dispatch table.
//!
//! A component is a named conversation program plus its static configuration.
//! Drivers resolve components by id; the exchange gateway additionally overlays
//! per-request `parameters` onto the static configuration.

pub mod greeter;
pub mod standard;

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::conversation::{program_fn, Program};
use crate::remote::{HttpComponentClient, RemoteComponent};

#[derive(Clone)]
pub struct Component {
    pub program: Arc<dyn Program>,
    pub config: Option<Value>,
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Default)]
pub struct ComponentRegistry {
    components: BTreeMap<String, Component>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the standard components.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register("echo", Arc::new(program_fn("echo", standard::echo)))
            .register("oneturn_say", Arc::new(program_fn("oneturn_say", standard::oneturn_say)))
            .register(
                "oneturn_followup",
                Arc::new(program_fn("oneturn_followup", standard::oneturn_followup)),
            )
            .register("say_followup", Arc::new(program_fn("say_followup", standard::say_followup)))
            .register("navigation", Arc::new(program_fn("navigation", standard::navigation)))
            .register(
                "save_to_context",
                Arc::new(program_fn("save_to_context", standard::save_to_context)),
            )
            .register(
                "aggregate_context",
                Arc::new(program_fn("aggregate_context", standard::aggregate_context)),
            )
            .register(
                "input_aggregator",
                Arc::new(program_fn("input_aggregator", standard::input_aggregator)),
            )
            .register("greeter", Arc::new(program_fn("greeter", greeter::greeter)));
        registry
    }

    /// Builtins, remote proxies from `[remote]`, then the static documents
    /// from `[components.<id>]`.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::with_builtins();

        if let Some(base_url) = config.remote_base_url() {
            let client = Arc::new(HttpComponentClient::with_timeout(
                base_url,
                Duration::from_secs(config.remote.timeout_secs),
            ));
            for id in &config.remote.components {
                registry.register(id, Arc::new(RemoteComponent::new(id, client.clone())));
                tracing::debug!(component = %id, remote = %base_url, "registered remote component");
            }
        }

        for (id, document) in &config.components {
            if !registry.set_config(id, document.clone()) {
                tracing::warn!(component = %id, "config for unknown component ignored");
            }
        }
        registry
    }

    pub fn register(&mut self, id: &str, program: Arc<dyn Program>) -> &mut Self {
        self.register_with_config(id, program, None)
    }

    pub fn register_with_config(
        &mut self,
        id: &str,
        program: Arc<dyn Program>,
        config: Option<Value>,
    ) -> &mut Self {
        if self.components.contains_key(id) {
            tracing::debug!(component = %id, "replacing registered component");
        }
        self.components
            .insert(id.to_string(), Component { program, config });
        self
    }

    /// Replace the static configuration of an already registered component.
    /// Returns `false` when `id` is unknown.
    pub fn set_config(&mut self, id: &str, config: Value) -> bool {
        match self.components.get_mut(id) {
            Some(component) => {
                component.config = Some(config);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<&Component> {
        self.components.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.components.contains_key(id)
    }

    /// Registered ids in sorted order.
    pub fn ids(&self) -> Vec<String> {
        self.components.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Static configuration document served for `id`.
    pub fn config(&self, id: &str) -> Value {
        self.components
            .get(id)
            .and_then(|c| c.config.clone())
            .unwrap_or_else(|| serde_json::json!({ "blueprint_id": id }))
    }
}

/// Overlay request `parameters` onto a component's static configuration.
/// Request keys win. A non-object base is replaced by the parameters.
pub fn merge_config(base: Option<&Value>, parameters: &Map<String, Value>) -> Option<Value> {
    if parameters.is_empty() {
        return base.cloned();
    }
    let mut merged = match base {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };
    merged.extend(parameters.iter().map(|(k, v)| (k.clone(), v.clone())));
    Some(Value::Object(merged))
}
