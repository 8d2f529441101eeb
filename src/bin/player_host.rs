//! Player Data Host
//!
//! Runs the player data manager against a simulated backing store and
//! drives a scripted join / play / leave / shutdown sequence, with one
//! client mirror attached.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | PLAYERSTORE_* | see `PlayerDataConfig` | Store, retry and autosave tunables |
//! | PLAYERSTORE_SIM_SEED | 42 | Seed for simulated store faults |
//! | PLAYERSTORE_SIM_CHAOS | false | Use high-chaos fault rates |
//! | RUST_LOG | info | Log filter |
//! | PLAYERSTORE_LOG_JSON | false | JSON log output |

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use player_store::datastore::{
    InMemoryDataStoreService, SimulatedDataStoreService, SimulatedStoreConfig,
};
use player_store::io::SimulatedRng;
use player_store::observability::{init_tracing, LogConfig};
use player_store::{
    ClientMirror, DefaultEntry, DefaultRegistry, HostEvent, InitialValue, PlayerDataConfig,
    PlayerDataManager, PlayerId, PlayerSession, ReplicationHub,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

const DEFAULT_SIM_SEED: u64 = 42;
const SESSION_WAIT_POLLS_MAX: u32 = 200;

fn registry() -> DefaultRegistry {
    DefaultRegistry::new()
        .with("Wins", DefaultEntry::new(0).ordered())
        .with("Coins", DefaultEntry::new(100))
        .with("Items", DefaultEntry::new(json!([])))
        .with("Settings", DefaultEntry::new(json!({"music": true})))
        .with("InMatch", DefaultEntry::new(false).ephemeral())
}

async fn wait_for_session(manager: &PlayerDataManager, player: PlayerId) -> Option<Arc<PlayerSession>> {
    for _ in 0..SESSION_WAIT_POLLS_MAX {
        if let Some(session) = manager.get_player_session(player).filter(|s| s.is_loaded()) {
            return Some(session);
        }
        tokio::time::sleep(manager.config().snapshot_poll_interval()).await;
    }
    None
}

#[tokio::main]
async fn main() {
    let log_config = LogConfig::from_env();
    if let Err(e) = init_tracing(&log_config) {
        eprintln!("failed to initialize tracing: {}", e);
    }

    let config = PlayerDataConfig::from_env();
    let seed = std::env::var("PLAYERSTORE_SIM_SEED")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_SIM_SEED);
    let store_config = match std::env::var("PLAYERSTORE_SIM_CHAOS").as_deref() {
        Ok("1") | Ok("true") => SimulatedStoreConfig::high_chaos(),
        _ => SimulatedStoreConfig::default(),
    };
    info!(seed, store = %config.store_name(), "starting player host");

    let backing = InMemoryDataStoreService::new();
    let service = Arc::new(SimulatedDataStoreService::new(
        backing.clone(),
        SimulatedRng::new(seed),
        store_config,
    ));
    let hub = Arc::new(ReplicationHub::new());
    let manager = Arc::new(PlayerDataManager::new(config, service.clone(), hub.clone()));

    // Zero-count entries are dropped from inventories on load
    let _items_hook = manager.on_initial_value("Items", |value| {
        let items = value.as_array().cloned().unwrap_or_default();
        let kept: Vec<Value> = items.iter().filter(|v| **v != json!(0)).cloned().collect();
        if kept.len() == items.len() {
            InitialValue::unchanged(value.clone())
        } else {
            InitialValue::changed(json!(kept))
        }
    });
    let _loaded = manager.on_player_loaded(|event| async move {
        info!(player = %event.player, coins = ?event.snapshot.get("Coins"), "welcome");
        event.session.set("InMatch", true);
    });

    let (events, rx) = mpsc::unbounded_channel();
    let host = tokio::spawn(manager.clone().run_host_events(rx));

    // Joins may arrive before stores are resolved
    let players = [PlayerId(1), PlayerId(2)];
    for player in players {
        let _ = events.send(HostEvent::Joined(player));
    }
    if let Err(e) = manager.init(registry(), None).await {
        warn!(error = %e, "init failed");
        return;
    }

    let endpoint = hub.connect(players[0], manager.clone());
    let Some(mirror) = ClientMirror::connect(endpoint, manager.config().snapshot_poll_interval()).await
    else {
        warn!("client mirror closed before snapshot");
        return;
    };
    let mut wins_listener = mirror.on_change("Wins", |value| info!(wins = %value, "client saw wins change"));

    for player in players {
        let Some(session) = wait_for_session(&manager, player).await else {
            warn!(player = %player, "session not loaded");
            continue;
        };
        session.update("Coins", |coins| json!(coins.as_i64().unwrap_or(0) + 25));
        session.update("Items", |items| {
            let mut items = items.as_array().cloned().unwrap_or_default();
            items.push(json!("sword"));
            Value::Array(items)
        });
        session.set("Wins", 2.5);
    }

    match manager.save_player(players[0]).await {
        Ok(report) => info!(saved = ?report.saved, failed = ?report.failed, "explicit save"),
        Err(e) => warn!(error = %e, "explicit save failed"),
    }
    tokio::task::yield_now().await;
    info!(wins = ?mirror.get("Wins"), "client mirror after save");
    wins_listener.disconnect();

    let _ = events.send(HostEvent::Leaving(players[1]));
    let _ = events.send(HostEvent::Shutdown);
    if let Err(e) = host.await {
        warn!(error = %e, "host event loop failed");
    }

    let stats = service.stats();
    info!(
        opens = stats.open_attempts,
        gets = stats.get_attempts,
        sets = stats.set_attempts,
        set_failures = stats.set_failures,
        replicated = hub.pushes_sent(),
        "player host finished"
    );
    for id in backing.store_ids() {
        for player in players {
            if let Some(value) = backing.peek(&id, &player.store_key()) {
                info!(store = %id, player = %player, value = %value, "persisted");
            }
        }
    }
}
