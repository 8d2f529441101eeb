//! Player Session
//!
//! The in-memory authoritative copy of one connected player's data. All
//! writes go through one mutation path that:
//!
//! 1. rejects keys outside the default registry (warn, no-op)
//! 2. resolves the new value (literal or transform of the current value)
//! 3. skips unchanged scalar values; arrays and objects always count as changed
//! 4. updates `current` and the dirty set
//! 5. pushes `(key, value)` to this player's client
//! 6. runs the key's listeners in registration order

use crate::replication::Replicator;
use crate::schema::DefaultRegistry;
use crate::signal::{CallbackList, Connection, ConnectionSet};
use crate::PlayerDataError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Opaque player identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub u64);

impl PlayerId {
    /// Record key used in every backing store
    pub fn store_key(&self) -> String {
        format!("Player_{}", self.0)
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-key change listener
pub type ChangeListener = dyn Fn(&Value) + Send + Sync;

/// A value or a transform of the current value
pub enum Update {
    Value(Value),
    Transform(Box<dyn FnOnce(&Value) -> Value + Send>),
}

impl Update {
    pub fn transform(f: impl FnOnce(&Value) -> Value + Send + 'static) -> Self {
        Update::Transform(Box::new(f))
    }
}

impl From<Value> for Update {
    fn from(value: Value) -> Self {
        Update::Value(value)
    }
}

/// Arrays and objects are never compared for equality
pub fn is_structural(value: &Value) -> bool {
    value.is_array() || value.is_object()
}

/// Loaded state handed over by the load pipeline
#[derive(Debug, Clone, Default)]
pub struct SessionSeed {
    pub current: HashMap<String, Value>,
    pub dirty: HashMap<String, Value>,
    pub degraded: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct SessionState {
    current: HashMap<String, Value>,
    dirty: HashMap<String, Value>,
    degraded: BTreeSet<String>,
}

/// One connected player's data, change tracking and listeners
pub struct PlayerSession {
    player: PlayerId,
    registry: Arc<DefaultRegistry>,
    replicator: Arc<dyn Replicator>,
    state: Mutex<SessionState>,
    listeners: HashMap<String, CallbackList<ChangeListener>>,
    connections: ConnectionSet,
    connected: AtomicBool,
    loaded: AtomicBool,
}

impl PlayerSession {
    pub fn new(
        player: PlayerId,
        registry: Arc<DefaultRegistry>,
        replicator: Arc<dyn Replicator>,
        seed: SessionSeed,
    ) -> Self {
        let listeners = registry
            .keys()
            .map(|key| (key.to_string(), CallbackList::new()))
            .collect();

        PlayerSession {
            player,
            registry,
            replicator,
            state: Mutex::new(SessionState {
                current: seed.current,
                dirty: seed.dirty,
                degraded: seed.degraded,
            }),
            listeners,
            connections: ConnectionSet::new(),
            connected: AtomicBool::new(true),
            loaded: AtomicBool::new(false),
        }
    }

    pub fn player(&self) -> PlayerId {
        self.player
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.state.lock().current.get(key).cloned()
    }

    /// Copy of every key/value
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.state.lock().current.clone()
    }

    pub fn is_dirty(&self, key: &str) -> bool {
        self.state.lock().dirty.contains_key(key)
    }

    /// Keys mutated since the last flush, sorted
    pub fn dirty_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state.lock().dirty.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Keys whose load gave up after exhausting retries or had no store
    pub fn degraded_keys(&self) -> Vec<String> {
        self.state.lock().degraded.iter().cloned().collect()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Lifecycle connections torn down when the player leaves
    pub fn connections(&self) -> &ConnectionSet {
        &self.connections
    }

    /// Set a key to a value. Returns true if the value was committed.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> bool {
        self.apply(key, Update::Value(value.into()))
    }

    /// Set a key to a function of its current value
    pub fn update(&self, key: &str, f: impl FnOnce(&Value) -> Value + Send + 'static) -> bool {
        self.apply(key, Update::transform(f))
    }

    /// Apply every entry of a batch, each through the single-key path
    pub fn set_many<K: AsRef<str>>(&self, entries: impl IntoIterator<Item = (K, Value)>) -> usize {
        entries
            .into_iter()
            .filter(|(key, value)| self.set(key.as_ref(), value.clone()))
            .count()
    }

    pub fn apply(&self, key: &str, update: Update) -> bool {
        self.commit(key, update, true)
    }

    /// Register a listener for one key
    pub fn on_change(
        &self,
        key: &str,
        listener: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Result<Connection, PlayerDataError> {
        let list = self
            .listeners
            .get(key)
            .ok_or_else(|| PlayerDataError::UnknownKey(key.to_string()))?;
        Ok(list.connect(Arc::new(listener)))
    }

    fn commit(&self, key: &str, update: Update, mark_dirty: bool) -> bool {
        if !self.registry.contains(key) {
            warn!(player = %self.player, key, "set called for a key outside the registry; ignored");
            return false;
        }

        let old = self.get(key).unwrap_or(Value::Null);
        let new = match update {
            Update::Value(value) => value,
            Update::Transform(f) => f(&old),
        };

        {
            let mut state = self.state.lock();
            if !is_structural(&new) && state.current.get(key) == Some(&new) {
                return false;
            }
            state.current.insert(key.to_string(), new.clone());
            if mark_dirty {
                state.dirty.insert(key.to_string(), new.clone());
            }
        }

        self.replicator.push_change(self.player, key, &new);
        self.fire(key, &new);
        true
    }

    fn fire(&self, key: &str, value: &Value) {
        let Some(list) = self.listeners.get(key) else {
            return;
        };
        for listener in list.snapshot() {
            listener(value);
        }
    }

    /// Remove and return the dirty set
    pub(crate) fn take_dirty(&self) -> HashMap<String, Value> {
        std::mem::take(&mut self.state.lock().dirty)
    }

    /// Replace a flushed value with its store-coerced form without
    /// re-marking it dirty. No-op if the key changed since the flush began.
    pub(crate) fn apply_coerced(&self, key: &str, flushed: &Value, coerced: Value) -> bool {
        if self.state.lock().current.get(key) != Some(flushed) {
            debug!(player = %self.player, key, "key changed during flush; coercion skipped");
            return false;
        }
        self.commit(key, Update::Value(coerced), false)
    }

    pub(crate) fn mark_loaded(&self) {
        self.loaded.store(true, Ordering::Release);
    }

    pub(crate) fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for PlayerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerSession")
            .field("player", &self.player)
            .field("loaded", &self.is_loaded())
            .field("connected", &self.is_connected())
            .field("dirty", &self.dirty_keys())
            .finish()
    }
}
