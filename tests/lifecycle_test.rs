//! Player Data Lifecycle Tests
//!
//! End-to-end behaviour of the manager against in-memory and scripted
//! backing stores: first-time seeding, persisted loads, initial-value
//! hooks, ordered-key coercion, ephemeral keys and unresolved stores.

use player_store::datastore::{
    DataStore, DataStoreError, DataStoreService, InMemoryDataStoreService, StoreFuture,
};
use player_store::replication::NullReplicator;
use player_store::{
    DefaultEntry, DefaultRegistry, HostEnvironment, HostEvent, InitialValue, PlayerDataConfig,
    PlayerDataManager, PlayerId, StoreId, StoreResolution,
};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

const P: PlayerId = PlayerId(7);

fn registry() -> DefaultRegistry {
    DefaultRegistry::new()
        .with("Wins", DefaultEntry::new(0).ordered())
        .with("Items", DefaultEntry::new(json!([])))
        .with("Temp", DefaultEntry::new(0).ephemeral())
}

fn wins() -> StoreId {
    StoreId::new("PlayerData0", "Wins", true)
}

fn items() -> StoreId {
    StoreId::new("PlayerData0", "Items", false)
}

fn temp() -> StoreId {
    StoreId::new("PlayerData0", "Temp", false)
}

async fn ready_manager(
    service: Arc<dyn DataStoreService>,
    config: PlayerDataConfig,
) -> Arc<PlayerDataManager> {
    let manager = Arc::new(PlayerDataManager::new(config, service, Arc::new(NullReplicator)));
    manager.init(registry(), None).await.unwrap();
    manager
}

/// Service whose `open` always fails for the listed keys
struct FailingOpen {
    inner: InMemoryDataStoreService,
    failing: HashSet<String>,
    attempts: AtomicUsize,
}

impl DataStoreService for FailingOpen {
    fn open<'a>(&'a self, id: &'a StoreId) -> StoreFuture<'a, Arc<dyn DataStore>> {
        Box::pin(async move {
            if self.failing.contains(&id.scope) {
                self.attempts.fetch_add(1, Ordering::SeqCst);
                return Err(DataStoreError::Transient("service unavailable".into()));
            }
            self.inner.open(id).await
        })
    }
}

// =============================================================================
// Load
// =============================================================================

#[tokio::test]
async fn test_first_entry_seeds_defaults() {
    let service = InMemoryDataStoreService::new();
    let manager = ready_manager(Arc::new(service.clone()), PlayerDataConfig::test()).await;

    let session = manager.player_added(P).await.unwrap();

    assert_eq!(session.get("Wins"), Some(json!(0)));
    assert_eq!(session.get("Items"), Some(json!([])));
    assert_eq!(session.get("Temp"), Some(json!(0)));
    assert_eq!(session.dirty_keys(), vec!["Items", "Wins"]);

    let report = manager.save_player(P).await.unwrap();

    assert_eq!(report.saved, vec!["Items", "Wins"]);
    assert_eq!(service.peek(&wins(), "Player_7"), Some(json!(0)));
    assert_eq!(service.peek(&items(), "Player_7"), Some(json!([])));
    assert!(!service.has_store(&temp()));
}

#[tokio::test]
async fn test_persisted_value_loads_clean() {
    let service = InMemoryDataStoreService::new();
    service.insert(&wins(), "Player_7", json!(5));
    let manager = ready_manager(Arc::new(service.clone()), PlayerDataConfig::test()).await;

    let session = manager.player_added(P).await.unwrap();

    assert_eq!(session.get("Wins"), Some(json!(5)));
    assert!(!session.is_dirty("Wins"));
}

#[tokio::test]
async fn test_initial_value_hook_reports_change() {
    let service = InMemoryDataStoreService::new();
    service.insert(&items(), "Player_7", json!([1, 0, 2]));
    let manager = Arc::new(PlayerDataManager::new(
        PlayerDataConfig::test(),
        Arc::new(service.clone()),
        Arc::new(NullReplicator),
    ));
    let _hook = manager.on_initial_value("Items", |value| {
        let items = value.as_array().cloned().unwrap_or_default();
        let kept: Vec<Value> = items.iter().filter(|v| **v != json!(0)).cloned().collect();
        if kept.len() == items.len() {
            InitialValue::unchanged(value.clone())
        } else {
            InitialValue::changed(json!(kept))
        }
    });
    manager.init(registry(), None).await.unwrap();

    let session = manager.player_added(P).await.unwrap();

    assert_eq!(session.get("Items"), Some(json!([1, 2])));
    assert!(session.is_dirty("Items"));
}

#[tokio::test]
async fn test_removed_hook_not_applied() {
    let service = InMemoryDataStoreService::new();
    service.insert(&items(), "Player_7", json!([1, 0]));
    let manager = ready_manager(Arc::new(service.clone()), PlayerDataConfig::test()).await;
    let mut hook = manager.on_initial_value("Items", |_| InitialValue::changed(json!([])));

    hook.disconnect();
    let session = manager.player_added(P).await.unwrap();

    assert_eq!(session.get("Items"), Some(json!([1, 0])));
}

// =============================================================================
// Flush
// =============================================================================

#[tokio::test]
async fn test_last_set_value_is_persisted() {
    let service = InMemoryDataStoreService::new();
    let manager = ready_manager(Arc::new(service.clone()), PlayerDataConfig::test()).await;
    let session = manager.player_added(P).await.unwrap();

    session.set("Items", json!(["a"]));
    session.set("Items", json!(["a", "b"]));
    session.update("Wins", |v| json!(v.as_i64().unwrap_or(0) + 4));
    manager.save_player(P).await.unwrap();

    assert_eq!(service.peek(&items(), "Player_7"), Some(json!(["a", "b"])));
    assert_eq!(service.peek(&wins(), "Player_7"), Some(json!(4)));
}

#[tokio::test]
async fn test_ordered_key_coerced_on_flush() {
    let service = InMemoryDataStoreService::new();
    let manager = ready_manager(Arc::new(service.clone()), PlayerDataConfig::test()).await;
    let session = manager.player_added(P).await.unwrap();
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let seen_in_cb = seen.clone();
    let _conn = session
        .on_change("Wins", move |v| seen_in_cb.lock().push(v.clone()))
        .unwrap();

    session.set("Wins", 3.7);
    manager.save_player(P).await.unwrap();

    assert_eq!(service.peek(&wins(), "Player_7"), Some(json!(3)));
    assert_eq!(session.get("Wins"), Some(json!(3)));
    assert_eq!(*seen.lock(), vec![json!(3.7), json!(3)]);
    assert!(!session.is_dirty("Wins"));
}

#[tokio::test]
async fn test_ephemeral_key_resets_each_session() {
    let service = InMemoryDataStoreService::new();
    let manager = ready_manager(Arc::new(service.clone()), PlayerDataConfig::test()).await;
    let session = manager.player_added(P).await.unwrap();

    session.set("Temp", 42);
    manager.player_removing(P).await;
    let session = manager.player_added(P).await.unwrap();

    assert_eq!(session.get("Temp"), Some(json!(0)));
    assert!(!service.has_store(&temp()));
}

#[tokio::test]
async fn test_unresolved_store_degrades_key() {
    let inner = InMemoryDataStoreService::new();
    let service = Arc::new(FailingOpen {
        inner: inner.clone(),
        failing: HashSet::from(["Items".to_string()]),
        attempts: AtomicUsize::new(0),
    });
    let manager = ready_manager(service.clone(), PlayerDataConfig::test()).await;

    assert_eq!(service.attempts.load(Ordering::SeqCst), 10);
    assert!(manager.get_store_handle("Items").is_none());
    assert!(matches!(
        manager.store_resolution("Items"),
        Some(StoreResolution::Unavailable)
    ));

    let session = manager.player_added(P).await.unwrap();
    assert_eq!(session.get("Items"), Some(json!([])));
    assert_eq!(session.degraded_keys(), vec!["Items"]);

    session.set("Items", json!([1]));
    let report = manager.save_player(P).await.unwrap();

    assert_eq!(report.skipped, vec!["Items"]);
    assert!(!inner.has_store(&items()));
    assert_eq!(inner.peek(&wins(), "Player_7"), Some(json!(0)));
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_host_events_before_ready_are_loaded() {
    let service = InMemoryDataStoreService::new();
    let manager = Arc::new(PlayerDataManager::new(
        PlayerDataConfig::test(),
        Arc::new(service.clone()),
        Arc::new(NullReplicator),
    ));
    let loaded = Arc::new(AtomicUsize::new(0));
    let loaded_in_cb = loaded.clone();
    let _conn = manager.on_player_loaded(move |event| {
        let loaded = loaded_in_cb.clone();
        async move {
            event.session.set("Items", json!(["starter"]));
            loaded.fetch_add(1, Ordering::SeqCst);
        }
    });
    let (events, rx) = mpsc::unbounded_channel();
    let host = tokio::spawn(manager.clone().run_host_events(rx));

    events.send(HostEvent::Joined(PlayerId(1))).unwrap();
    events.send(HostEvent::Joined(PlayerId(2))).unwrap();
    manager.init(registry(), None).await.unwrap();
    events.send(HostEvent::Shutdown).unwrap();
    host.await.unwrap();

    assert_eq!(loaded.load(Ordering::SeqCst), 2);
    assert!(manager.players().is_empty());
    for player in ["Player_1", "Player_2"] {
        assert_eq!(service.peek(&items(), player), Some(json!(["starter"])));
    }
}

#[tokio::test]
async fn test_host_leave_after_load_flushes() {
    let service = InMemoryDataStoreService::new();
    let manager = ready_manager(Arc::new(service.clone()), PlayerDataConfig::test()).await;
    let (events, rx) = mpsc::unbounded_channel();
    let host = tokio::spawn(manager.clone().run_host_events(rx));

    events.send(HostEvent::Joined(P)).unwrap();
    while !manager
        .get_player_session(P)
        .is_some_and(|session| session.is_loaded())
    {
        tokio::task::yield_now().await;
    }
    if let Some(session) = manager.get_player_session(P) {
        session.set("Wins", 2);
    }
    events.send(HostEvent::Leaving(P)).unwrap();
    events.send(HostEvent::Shutdown).unwrap();
    host.await.unwrap();

    assert_eq!(service.peek(&wins(), "Player_7"), Some(json!(2)));
}

#[tokio::test]
async fn test_leave_disconnects_lifecycle_connections() {
    let service = InMemoryDataStoreService::new();
    let manager = ready_manager(Arc::new(service), PlayerDataConfig::test()).await;
    let session = manager.player_added(P).await.unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_in_cb = calls.clone();
    let conn = session
        .on_change("Wins", move |_| {
            calls_in_cb.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    session.connections().add(conn);

    manager.player_removing(P).await;
    session.set("Wins", 1);

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(session.connections().is_closed());
}

#[tokio::test]
async fn test_shutdown_skips_flush_in_development() {
    let service = InMemoryDataStoreService::new();
    let config = PlayerDataConfig {
        environment: HostEnvironment::Development,
        ..PlayerDataConfig::test()
    };
    let manager = ready_manager(Arc::new(service.clone()), config).await;
    manager.player_added(P).await.unwrap();

    manager.shutdown().await;

    assert!(manager.players().is_empty());
    assert_eq!(service.peek(&wins(), "Player_7"), None);
}

#[tokio::test]
async fn test_shutdown_flushes_in_production() {
    let service = InMemoryDataStoreService::new();
    let manager = ready_manager(Arc::new(service.clone()), PlayerDataConfig::test()).await;
    let session = manager.player_added(P).await.unwrap();
    session.set("Wins", 9);

    manager.shutdown().await;

    assert_eq!(service.peek(&wins(), "Player_7"), Some(json!(9)));
    assert!(!session.is_connected());
}

#[tokio::test]
async fn test_autosave_flushes_periodically() {
    let service = InMemoryDataStoreService::new();
    let config = PlayerDataConfig {
        autosave_interval_secs: Some(1),
        ..PlayerDataConfig::test()
    };
    let manager = ready_manager(Arc::new(service.clone()), config).await;
    let session = manager.player_added(P).await.unwrap();
    manager.save_player(P).await.unwrap();
    session.set("Wins", 12);

    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;

    assert_eq!(service.peek(&wins(), "Player_7"), Some(json!(12)));
    assert!(session.dirty_keys().is_empty());
}
