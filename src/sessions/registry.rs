//! In-memory session registry keyed by external session id.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use super::container::SessionContainer;
use super::traits::SessionOptions;
use crate::conversation::Program;

type SessionMap = HashMap<String, Arc<SessionContainer>>;

/// Maps session id to its live container. Cheap to clone.
///
/// `get_or_create` runs its check-then-insert under a single lock, so two
/// near-simultaneous first requests for one id always share one container.
/// Eviction is driven by each container's own completion hook and removes
/// only the exact instance that finished.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<SessionMap>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the live container for `key`, creating one if there is none or
    /// the existing one failed. Must be called from within a tokio runtime.
    pub fn get_or_create(
        &self,
        key: &str,
        program: Arc<dyn Program>,
        options: SessionOptions,
    ) -> Arc<SessionContainer> {
        let mut sessions = self.sessions.lock();

        if let Some(existing) = sessions.get(key) {
            if !existing.is_failed() {
                return existing.clone();
            }
            tracing::debug!(session = %key, "replacing failed session");
        }

        let map = Arc::downgrade(&self.sessions);
        let owner = key.to_string();
        let container = Arc::new(SessionContainer::spawn(key, program, options, move |instance| {
            evict(&map, &owner, instance);
        }));

        sessions.insert(key.to_string(), container.clone());
        tracing::info!(session = %key, session_id = %container.instance_id(), "session created");
        container
    }

    pub fn get(&self, key: &str) -> Option<Arc<SessionContainer>> {
        self.sessions.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.sessions.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.sessions.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

fn evict(map: &Weak<Mutex<SessionMap>>, key: &str, instance: &str) {
    let Some(map) = map.upgrade() else {
        return;
    };
    let mut sessions = map.lock();
    let is_same_instance = sessions
        .get(key)
        .is_some_and(|container| container.instance_id() == instance);
    if is_same_instance {
        sessions.remove(key);
        tracing::debug!(session = %key, session_id = %instance, "session evicted");
    }
}
