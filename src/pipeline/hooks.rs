use crate::signal::Connection;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// Result of an initial-value hook
///
/// `value` always replaces the loaded value. `changed` decides whether the
/// key is persisted on the next flush; equality is never re-checked.
#[derive(Debug, Clone, PartialEq)]
pub struct InitialValue {
    pub changed: bool,
    pub value: Value,
}

impl InitialValue {
    pub fn unchanged(value: Value) -> Self {
        InitialValue {
            changed: false,
            value,
        }
    }

    pub fn changed(value: Value) -> Self {
        InitialValue {
            changed: true,
            value,
        }
    }
}

pub type InitialValueHook = dyn Fn(&Value) -> InitialValue + Send + Sync;

#[derive(Default)]
struct HooksInner {
    next_id: u64,
    hooks: HashMap<String, (u64, Arc<InitialValueHook>)>,
}

/// At most one initial-value hook per key
///
/// Registering again for a key replaces the previous hook. A remover only
/// removes the hook it registered, never a later replacement.
#[derive(Clone, Default)]
pub struct InitialValueHooks {
    inner: Arc<Mutex<HooksInner>>,
}

impl InitialValueHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        key: &str,
        hook: impl Fn(&Value) -> InitialValue + Send + Sync + 'static,
    ) -> Connection {
        let id = {
            let mut inner = self.inner.lock();
            inner.next_id += 1;
            let id = inner.next_id;
            inner.hooks.insert(key.to_string(), (id, Arc::new(hook)));
            id
        };

        let weak: Weak<Mutex<HooksInner>> = Arc::downgrade(&self.inner);
        let key = key.to_string();
        Connection::new(move || {
            if let Some(inner) = weak.upgrade() {
                let mut inner = inner.lock();
                if inner.hooks.get(&key).is_some_and(|(current, _)| *current == id) {
                    inner.hooks.remove(&key);
                }
            }
        })
    }

    pub fn get(&self, key: &str) -> Option<Arc<InitialValueHook>> {
        self.inner.lock().hooks.get(key).map(|(_, hook)| hook.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for InitialValueHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<String> = self.inner.lock().hooks.keys().cloned().collect();
        keys.sort();
        f.debug_struct("InitialValueHooks").field("keys", &keys).finish()
    }
}
