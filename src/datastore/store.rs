//! Backing Store Abstraction
//!
//! The remote key-value storage service is reached through two traits:
//! [`DataStoreService`] opens a named store and [`DataStore`] reads and
//! writes individual player records in it. Every call may fail transiently.
//!
//! Implementations:
//! - `InMemoryDataStoreService`: For unit tests and DST
//! - `SimulatedDataStoreService`: Fault-injecting wrapper (see `simulated.rs`)

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Boxed future returned by store operations
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, DataStoreError>> + Send + 'a>>;

/// Error type for backing store operations
#[derive(Debug, Clone, PartialEq)]
pub enum DataStoreError {
    /// No value stored under the key
    NotFound(String),
    /// Request failed but may succeed if retried (network, throttling, timeout)
    Transient(String),
    /// Value rejected by the store (e.g. non-integer in an ordered store)
    InvalidValue(String),
}

impl DataStoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DataStoreError::NotFound(_))
    }
}

impl std::fmt::Display for DataStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataStoreError::NotFound(key) => write!(f, "Key not found: {}", key),
            DataStoreError::Transient(msg) => write!(f, "Transient store error: {}", msg),
            DataStoreError::InvalidValue(msg) => write!(f, "Invalid value: {}", msg),
        }
    }
}

impl std::error::Error for DataStoreError {}

/// Identity of a backing store
///
/// `name` is the versioned store name (prefix + schema version), `scope` is
/// the logical data key, `ordered` selects the ordered-numeric variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreId {
    pub name: String,
    pub scope: String,
    pub ordered: bool,
}

impl StoreId {
    pub fn new(name: impl Into<String>, scope: impl Into<String>, ordered: bool) -> Self {
        StoreId {
            name: name.into(),
            scope: scope.into(),
            ordered,
        }
    }
}

impl std::fmt::Display for StoreId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.ordered { "ordered" } else { "general" };
        write!(f, "{}/{} ({})", self.name, self.scope, kind)
    }
}

/// A single opened store holding one value per player record key
pub trait DataStore: Send + Sync + 'static {
    /// Read the value stored under `key`
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Value>;

    /// Write `value` under `key`, replacing any previous value
    fn set<'a>(&'a self, key: &'a str, value: &'a Value) -> StoreFuture<'a, ()>;
}

/// Opens stores by identity
pub trait DataStoreService: Send + Sync + 'static {
    fn open<'a>(&'a self, id: &'a StoreId) -> StoreFuture<'a, Arc<dyn DataStore>>;
}

/// True if `value` is accepted by an ordered-numeric store
pub fn is_integer(value: &Value) -> bool {
    value.is_i64() || value.is_u64()
}

// ============================================================================
// InMemoryDataStoreService - For tests and DST
// ============================================================================

/// Request counters shared by every store opened from one service
#[derive(Debug, Default)]
struct RequestCounters {
    opens: AtomicU64,
    gets: AtomicU64,
    sets: AtomicU64,
}

/// Snapshot of request counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestCounts {
    pub opens: u64,
    pub gets: u64,
    pub sets: u64,
}

/// In-memory store for unit tests and deterministic simulation
#[derive(Debug, Clone)]
pub struct InMemoryDataStore {
    id: StoreId,
    data: Arc<RwLock<HashMap<String, Value>>>,
    counters: Arc<RequestCounters>,
}

impl InMemoryDataStore {
    pub fn id(&self) -> &StoreId {
        &self.id
    }

    /// Number of records held (for testing)
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl DataStore for InMemoryDataStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Value> {
        Box::pin(async move {
            self.counters.gets.fetch_add(1, Ordering::Relaxed);
            self.data
                .read()
                .get(key)
                .cloned()
                .ok_or_else(|| DataStoreError::NotFound(format!("{} in {}", key, self.id)))
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: &'a Value) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.counters.sets.fetch_add(1, Ordering::Relaxed);
            if self.id.ordered && !is_integer(value) {
                return Err(DataStoreError::InvalidValue(format!(
                    "ordered store {} requires an integer, got {}",
                    self.id, value
                )));
            }
            self.data.write().insert(key.to_string(), value.clone());
            Ok(())
        })
    }
}

/// In-memory backing service; stores persist for the life of the service
#[derive(Debug, Clone, Default)]
pub struct InMemoryDataStoreService {
    stores: Arc<RwLock<HashMap<StoreId, InMemoryDataStore>>>,
    counters: Arc<RequestCounters>,
}

impl InMemoryDataStoreService {
    pub fn new() -> Self {
        Self::default()
    }

    fn store(&self, id: &StoreId) -> InMemoryDataStore {
        if let Some(store) = self.stores.read().get(id) {
            return store.clone();
        }
        self.stores
            .write()
            .entry(id.clone())
            .or_insert_with(|| InMemoryDataStore {
                id: id.clone(),
                data: Arc::new(RwLock::new(HashMap::new())),
                counters: self.counters.clone(),
            })
            .clone()
    }

    /// Seed a record directly, bypassing request counters (for testing)
    pub fn insert(&self, id: &StoreId, key: &str, value: Value) {
        self.store(id).data.write().insert(key.to_string(), value);
    }

    /// Read a record directly, bypassing request counters (for testing)
    pub fn peek(&self, id: &StoreId, key: &str) -> Option<Value> {
        self.stores
            .read()
            .get(id)
            .and_then(|store| store.data.read().get(key).cloned())
    }

    /// True if a store with this identity was ever opened or seeded
    pub fn has_store(&self, id: &StoreId) -> bool {
        self.stores.read().contains_key(id)
    }

    /// Identities of every store created so far
    pub fn store_ids(&self) -> Vec<StoreId> {
        self.stores.read().keys().cloned().collect()
    }

    pub fn request_counts(&self) -> RequestCounts {
        RequestCounts {
            opens: self.counters.opens.load(Ordering::Relaxed),
            gets: self.counters.gets.load(Ordering::Relaxed),
            sets: self.counters.sets.load(Ordering::Relaxed),
        }
    }
}

impl DataStoreService for InMemoryDataStoreService {
    fn open<'a>(&'a self, id: &'a StoreId) -> StoreFuture<'a, Arc<dyn DataStore>> {
        Box::pin(async move {
            self.counters.opens.fetch_add(1, Ordering::Relaxed);
            let store: Arc<dyn DataStore> = Arc::new(self.store(id));
            Ok(store)
        })
    }
}
