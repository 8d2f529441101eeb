//! Store Resolver
//!
//! Maps every registry key to its backing store once at startup. Keys are
//! resolved concurrently; a key whose store cannot be opened within the
//! retry bound stays unresolved without affecting its siblings.

use crate::config::PlayerDataConfig;
use crate::datastore::{DataStore, DataStoreService, StoreId};
use crate::retry::{with_retries, RetryPolicy};
use crate::schema::DefaultRegistry;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Resolved store for one key
#[derive(Clone)]
pub struct StoreHandle {
    id: StoreId,
    store: Arc<dyn DataStore>,
}

impl StoreHandle {
    pub fn new(id: StoreId, store: Arc<dyn DataStore>) -> Self {
        StoreHandle { id, store }
    }

    pub fn id(&self) -> &StoreId {
        &self.id
    }

    pub fn is_ordered(&self) -> bool {
        self.id.ordered
    }

    pub fn store(&self) -> &Arc<dyn DataStore> {
        &self.store
    }
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle").field("id", &self.id).finish()
    }
}

/// Outcome of resolving one key
#[derive(Debug, Clone)]
pub enum StoreResolution {
    Resolved(StoreHandle),
    /// Never persisted; no store was contacted
    Ephemeral,
    /// Every attempt to open the store failed
    Unavailable,
}

impl StoreResolution {
    pub fn handle(&self) -> Option<&StoreHandle> {
        match self {
            StoreResolution::Resolved(handle) => Some(handle),
            _ => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreResolution::Unavailable)
    }
}

/// Read-only key to store mapping, shared by load and flush
#[derive(Debug, Default)]
pub struct StoreResolver {
    resolutions: HashMap<String, StoreResolution>,
}

impl StoreResolver {
    /// Resolve every key in `registry` concurrently
    pub async fn resolve_all(
        service: &dyn DataStoreService,
        registry: &DefaultRegistry,
        config: &PlayerDataConfig,
    ) -> Self {
        let store_name = config.store_name();
        let policy = RetryPolicy::new(config.resolve_retries, config.retry_backoff());

        let tasks = registry.iter().map(|(key, entry)| {
            let store_name = store_name.clone();
            async move {
                if entry.is_ephemeral() {
                    return (key.to_string(), StoreResolution::Ephemeral);
                }
                let id = StoreId::new(store_name, key, entry.is_ordered());
                let target = id.to_string();
                let resolution = match with_retries(policy, "open", &target, || service.open(&id)).await {
                    Ok(store) => StoreResolution::Resolved(StoreHandle::new(id, store)),
                    Err(e) => {
                        warn!(key, error = %e, "store unavailable; key will not be persisted");
                        StoreResolution::Unavailable
                    }
                };
                (key.to_string(), resolution)
            }
        });

        let resolutions: HashMap<String, StoreResolution> = join_all(tasks).await.into_iter().collect();
        let resolver = StoreResolver { resolutions };
        info!(
            store = %store_name,
            keys = resolver.resolutions.len(),
            unavailable = resolver.unavailable_keys().len(),
            "store resolution complete"
        );
        resolver
    }

    /// Handle for `key`; absent for ephemeral keys and failed resolutions alike
    pub fn get_store(&self, key: &str) -> Option<&StoreHandle> {
        self.resolutions.get(key).and_then(StoreResolution::handle)
    }

    pub fn resolution(&self, key: &str) -> Option<&StoreResolution> {
        self.resolutions.get(key)
    }

    /// Keys whose store could not be opened, sorted
    pub fn unavailable_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .resolutions
            .iter()
            .filter(|(_, r)| r.is_unavailable())
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buggify::faults::datastore as faults;
    use crate::datastore::{
        DataStoreError, InMemoryDataStoreService, SimulatedDataStoreService,
        SimulatedStoreConfig, StoreFuture,
    };
    use crate::io::SimulatedRng;
    use crate::schema::DefaultEntry;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails every open of one scope, delegates the rest
    struct ScopeDown {
        inner: InMemoryDataStoreService,
        scope: &'static str,
        failed_opens: AtomicUsize,
    }

    impl DataStoreService for ScopeDown {
        fn open<'a>(&'a self, id: &'a StoreId) -> StoreFuture<'a, Arc<dyn DataStore>> {
            Box::pin(async move {
                if id.scope == self.scope {
                    self.failed_opens.fetch_add(1, Ordering::SeqCst);
                    return Err(DataStoreError::Transient("scope offline".into()));
                }
                self.inner.open(id).await
            })
        }
    }

    fn registry() -> DefaultRegistry {
        DefaultRegistry::new()
            .with("Wins", DefaultEntry::new(0).ordered())
            .with("Items", DefaultEntry::new(json!([])))
            .with("Temp", DefaultEntry::new(0).ephemeral())
    }

    #[tokio::test]
    async fn test_resolves_each_kind() {
        let service = InMemoryDataStoreService::new();
        let config = PlayerDataConfig::test().with_version(3);

        let resolver = StoreResolver::resolve_all(&service, &registry(), &config).await;

        let wins = resolver.get_store("Wins").unwrap();
        assert!(wins.is_ordered());
        assert_eq!(wins.id().name, "PlayerData3");
        assert!(!resolver.get_store("Items").unwrap().is_ordered());
        assert!(resolver.get_store("Temp").is_none());
        assert!(matches!(
            resolver.resolution("Temp"),
            Some(StoreResolution::Ephemeral)
        ));
        // Ephemeral keys never reach the backend
        assert_eq!(service.request_counts().opens, 2);
    }

    #[tokio::test]
    async fn test_exhausted_key_is_unavailable_siblings_resolve() {
        let inner = InMemoryDataStoreService::new();
        let service = ScopeDown {
            inner: inner.clone(),
            scope: "Items",
            failed_opens: AtomicUsize::new(0),
        };
        let config = PlayerDataConfig {
            resolve_retries: 3,
            ..PlayerDataConfig::test()
        };

        let resolver = StoreResolver::resolve_all(&service, &registry(), &config).await;

        assert!(resolver.get_store("Items").is_none());
        assert!(matches!(
            resolver.resolution("Items"),
            Some(StoreResolution::Unavailable)
        ));
        let wins = resolver.get_store("Wins").unwrap();
        assert!(wins.is_ordered());
        assert!(matches!(
            resolver.resolution("Wins"),
            Some(StoreResolution::Resolved(_))
        ));
        assert!(matches!(
            resolver.resolution("Temp"),
            Some(StoreResolution::Ephemeral)
        ));
        assert_eq!(resolver.unavailable_keys(), vec!["Items"]);
        assert_eq!(service.failed_opens.load(Ordering::SeqCst), 3);
        assert_eq!(inner.request_counts().opens, 1);
    }

    #[tokio::test]
    async fn test_every_key_exhausted_all_unavailable() {
        let inner = InMemoryDataStoreService::new();
        let service = SimulatedDataStoreService::new(
            inner.clone(),
            SimulatedRng::new(7),
            SimulatedStoreConfig::no_faults().with_fault(faults::OPEN_FAIL, 1.0),
        );
        let config = PlayerDataConfig {
            resolve_retries: 3,
            ..PlayerDataConfig::test()
        };

        let resolver = StoreResolver::resolve_all(&service, &registry(), &config).await;

        assert!(resolver.get_store("Wins").is_none());
        assert!(resolver.get_store("Items").is_none());
        assert_eq!(resolver.unavailable_keys(), vec!["Items", "Wins"]);
        assert_eq!(service.stats().open_attempts, 6);
    }
}
