use super::Pipeline;
use crate::datastore::DataStoreError;
use crate::resolver::StoreResolution;
use crate::retry::with_retries;
use crate::schema::DefaultEntry;
use crate::session::{PlayerId, SessionSeed};
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, warn};

/// Per-key load result
#[derive(Debug)]
struct KeyLoad {
    key: String,
    value: Value,
    dirty: bool,
    degraded: bool,
}

/// Where a key's starting value came from
enum Source {
    Persisted(Value),
    Missing,
    /// Store unreachable or retries exhausted; treated as missing
    Degraded,
}

impl Pipeline {
    /// Fetch every registry key for `player` concurrently
    pub async fn load(&self, player: PlayerId) -> SessionSeed {
        let record = player.store_key();
        let tasks = self
            .registry
            .iter()
            .map(|(key, entry)| self.load_key(player, &record, key, entry));

        let mut seed = SessionSeed::default();
        for load in join_all(tasks).await {
            if load.dirty {
                seed.dirty.insert(load.key.clone(), load.value.clone());
            }
            if load.degraded {
                seed.degraded.insert(load.key.clone());
            }
            seed.current.insert(load.key, load.value);
        }

        debug!(
            player = %player,
            keys = seed.current.len(),
            dirty = seed.dirty.len(),
            degraded = seed.degraded.len(),
            "player data loaded"
        );
        seed
    }

    async fn load_key(
        &self,
        player: PlayerId,
        record: &str,
        key: &str,
        entry: &DefaultEntry,
    ) -> KeyLoad {
        let source = if entry.is_ephemeral() {
            Source::Missing
        } else {
            self.fetch(player, record, key).await
        };

        let (existed, degraded, loaded) = match source {
            Source::Persisted(value) => (true, false, value),
            // Deep copy so no two sessions share a default structure
            Source::Missing => (false, false, entry.value().clone()),
            Source::Degraded => (false, true, entry.value().clone()),
        };

        let (changed, value) = match self.hooks.get(key) {
            Some(hook) => {
                let result = hook(&loaded);
                (result.changed, result.value)
            }
            None => (false, loaded),
        };

        let dirty = !entry.is_ephemeral() && (changed || !existed);
        KeyLoad {
            key: key.to_string(),
            value,
            dirty,
            degraded,
        }
    }

    async fn fetch(&self, player: PlayerId, record: &str, key: &str) -> Source {
        let handle = match self.resolver.resolution(key) {
            Some(StoreResolution::Resolved(handle)) => handle,
            _ => {
                debug!(player = %player, key, "no store for key; using default");
                return Source::Degraded;
            }
        };

        let target = format!("{} {}", key, record);
        match with_retries(self.load_policy(), "get", &target, || handle.store().get(record)).await {
            Ok(value) => Source::Persisted(value),
            Err(DataStoreError::NotFound(_)) => Source::Missing,
            Err(e) => {
                warn!(
                    player = %player,
                    key,
                    error = %e,
                    "load gave up; using default for this session"
                );
                Source::Degraded
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::buggify::faults::datastore as faults;
    use crate::config::PlayerDataConfig;
    use crate::datastore::{
        DataStoreService, InMemoryDataStoreService, SimulatedDataStoreService,
        SimulatedStoreConfig, StoreId,
    };
    use crate::io::SimulatedRng;
    use crate::pipeline::{InitialValue, InitialValueHooks, Pipeline};
    use crate::resolver::StoreResolver;
    use crate::schema::{DefaultEntry, DefaultRegistry};
    use crate::session::PlayerId;
    use serde_json::json;
    use std::sync::Arc;

    fn registry() -> DefaultRegistry {
        DefaultRegistry::new()
            .with("Wins", DefaultEntry::new(0).ordered())
            .with("Items", DefaultEntry::new(json!([])))
            .with("Temp", DefaultEntry::new(0).ephemeral())
    }

    async fn pipeline(service: &dyn DataStoreService, hooks: InitialValueHooks) -> Pipeline {
        let config = PlayerDataConfig::test();
        let registry = registry();
        let resolver = StoreResolver::resolve_all(service, &registry, &config).await;
        Pipeline::new(Arc::new(registry), resolver, hooks, config)
    }

    #[tokio::test]
    async fn test_first_load_seeds_defaults_dirty() {
        let service = InMemoryDataStoreService::new();
        let pipeline = pipeline(&service, InitialValueHooks::new()).await;

        let seed = pipeline.load(PlayerId(1)).await;

        assert_eq!(seed.current["Wins"], json!(0));
        assert_eq!(seed.current["Items"], json!([]));
        assert_eq!(seed.current["Temp"], json!(0));
        assert!(seed.dirty.contains_key("Wins"));
        assert!(seed.dirty.contains_key("Items"));
        assert!(!seed.dirty.contains_key("Temp"));
        assert!(seed.degraded.is_empty());
    }

    #[tokio::test]
    async fn test_persisted_value_not_dirty() {
        let service = InMemoryDataStoreService::new();
        service.insert(&StoreId::new("PlayerData0", "Wins", true), "Player_1", json!(5));
        let pipeline = pipeline(&service, InitialValueHooks::new()).await;

        let seed = pipeline.load(PlayerId(1)).await;

        assert_eq!(seed.current["Wins"], json!(5));
        assert!(!seed.dirty.contains_key("Wins"));
    }

    #[tokio::test]
    async fn test_hook_change_marks_dirty() {
        let service = InMemoryDataStoreService::new();
        service.insert(
            &StoreId::new("PlayerData0", "Items", false),
            "Player_1",
            json!([1, 0, 2]),
        );
        let hooks = InitialValueHooks::new();
        let _conn = hooks.register("Items", |value| {
            let items = value.as_array().cloned().unwrap_or_default();
            let kept: Vec<_> = items.iter().filter(|v| **v != json!(0)).cloned().collect();
            if kept.len() == items.len() {
                InitialValue::unchanged(value.clone())
            } else {
                InitialValue::changed(json!(kept))
            }
        });
        let pipeline = pipeline(&service, hooks).await;

        let seed = pipeline.load(PlayerId(1)).await;

        assert_eq!(seed.current["Items"], json!([1, 2]));
        assert!(seed.dirty.contains_key("Items"));
    }

    #[tokio::test]
    async fn test_hook_replaces_value_without_dirtying() {
        let service = InMemoryDataStoreService::new();
        service.insert(&StoreId::new("PlayerData0", "Wins", true), "Player_1", json!(5));
        let hooks = InitialValueHooks::new();
        let _conn = hooks.register("Wins", |_| InitialValue::unchanged(json!(6)));
        let pipeline = pipeline(&service, hooks).await;

        let seed = pipeline.load(PlayerId(1)).await;

        assert_eq!(seed.current["Wins"], json!(6));
        assert!(!seed.dirty.contains_key("Wins"));
    }

    fn failing_gets(inner: InMemoryDataStoreService) -> SimulatedDataStoreService<InMemoryDataStoreService, SimulatedRng> {
        SimulatedDataStoreService::new(
            inner,
            SimulatedRng::new(3),
            SimulatedStoreConfig::no_faults().with_fault(faults::GET_FAIL, 1.0),
        )
    }

    #[tokio::test]
    async fn test_exhausted_get_seeds_default_dirty() {
        let inner = InMemoryDataStoreService::new();
        inner.insert(&StoreId::new("PlayerData0", "Wins", true), "Player_1", json!(5));
        let service = failing_gets(inner);
        let pipeline = pipeline(&service, InitialValueHooks::new()).await;

        let seed = pipeline.load(PlayerId(1)).await;

        assert_eq!(seed.current["Wins"], json!(0));
        assert!(seed.degraded.contains("Wins"));
        assert!(seed.dirty.contains_key("Wins"));
        assert!(!seed.dirty.contains_key("Temp"));
        // 2 persisted keys x 5 attempts
        assert_eq!(service.stats().get_attempts, 10);
    }

    #[tokio::test]
    async fn test_exhausted_get_keeps_hook_change_dirty() {
        let service = failing_gets(InMemoryDataStoreService::new());
        let hooks = InitialValueHooks::new();
        let _conn = hooks.register("Items", |_| InitialValue::changed(json!([42])));
        let pipeline = pipeline(&service, hooks).await;

        let seed = pipeline.load(PlayerId(1)).await;

        assert_eq!(seed.current["Items"], json!([42]));
        assert_eq!(seed.dirty.get("Items"), Some(&json!([42])));
        assert!(seed.degraded.contains("Items"));
    }

    #[tokio::test]
    async fn test_defaults_are_not_shared() {
        let service = InMemoryDataStoreService::new();
        let pipeline = pipeline(&service, InitialValueHooks::new()).await;

        let mut a = pipeline.load(PlayerId(1)).await;
        let b = pipeline.load(PlayerId(2)).await;
        if let Some(items) = a.current.get_mut("Items").and_then(|v| v.as_array_mut()) {
            items.push(json!(9));
        }

        assert_eq!(b.current["Items"], json!([]));
        assert_eq!(pipeline.registry().get("Items").unwrap().value(), &json!([]));
    }
}
