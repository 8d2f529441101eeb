//! Deterministic Simulation Testing for Player Data
//!
//! Shadow-state harness that drives a [`PlayerDataManager`] over a
//! fault-injecting backing store:
//! - Deterministic random join / mutate / save / leave workloads
//! - Fault injection at the store layer (open, get, set, timeout, throttle)
//! - Invariant checking against a model of what should be persisted
//! - Seed-based reproducibility for debugging
//!
//! ```text
//! for seed in 0..10000 {
//!     let mut harness = PlayerDSTHarness::new(PlayerDSTConfig::chaos(seed)).await;
//!     harness.run(500).await;
//!     harness.check_invariants().await;  // violations carry the seed
//! }
//! ```

use crate::config::PlayerDataConfig;
use crate::datastore::{
    is_integer, InMemoryDataStoreService, SimulatedDataStoreService, SimulatedStoreConfig,
    SimulatedStoreStats, StoreId,
};
use crate::io::simulation::SimulatedRng;
use crate::io::Rng;
use crate::manager::PlayerDataManager;
use crate::pipeline::flush::floor_to_integer;
use crate::replication::ReplicationHub;
use crate::resolver::StoreResolution;
use crate::schema::{DefaultEntry, DefaultRegistry};
use crate::session::PlayerId;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Configuration for player data DST
#[derive(Debug, Clone)]
pub struct PlayerDSTConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Backing store fault configuration
    pub store_config: SimulatedStoreConfig,
    /// Distinct player identities in the workload
    pub players: u64,
    /// Probability of a join (vs other operations)
    pub join_probability: f64,
    /// Probability of a leave
    pub leave_probability: f64,
    /// Probability of an explicit save
    pub save_probability: f64,
}

impl Default for PlayerDSTConfig {
    fn default() -> Self {
        PlayerDSTConfig {
            seed: 0,
            store_config: SimulatedStoreConfig::default(),
            players: 4,
            join_probability: 0.1,
            leave_probability: 0.08,
            save_probability: 0.1,
        }
    }
}

impl PlayerDSTConfig {
    pub fn new(seed: u64) -> Self {
        PlayerDSTConfig {
            seed,
            ..Default::default()
        }
    }

    /// Calm mode - no fault injection
    pub fn calm(seed: u64) -> Self {
        PlayerDSTConfig {
            seed,
            store_config: SimulatedStoreConfig::no_faults(),
            ..Default::default()
        }
    }

    /// Moderate fault injection
    pub fn moderate(seed: u64) -> Self {
        PlayerDSTConfig {
            seed,
            store_config: SimulatedStoreConfig {
                latency_range_us: (0, 0),
                ..SimulatedStoreConfig::default()
            },
            ..Default::default()
        }
    }

    /// Chaos mode - aggressive fault injection
    pub fn chaos(seed: u64) -> Self {
        PlayerDSTConfig {
            seed,
            store_config: SimulatedStoreConfig {
                latency_range_us: (0, 0),
                ..SimulatedStoreConfig::high_chaos()
            },
            leave_probability: 0.12,
            ..Default::default()
        }
    }
}

/// Workload operation
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerOperation {
    Join(PlayerId),
    Leave(PlayerId),
    Set {
        player: PlayerId,
        key: String,
        value: Value,
    },
    Save(PlayerId),
}

/// Outcome of an operation
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutcome {
    Success,
    /// Nothing to do (player absent, value unchanged)
    Skipped,
    /// Completed with keys that could not be saved
    Degraded(usize),
}

/// Workload generator
pub struct PlayerWorkload {
    rng: SimulatedRng,
    config: PlayerDSTConfig,
    operation_counter: u64,
}

impl PlayerWorkload {
    pub fn new(config: PlayerDSTConfig) -> Self {
        PlayerWorkload {
            rng: SimulatedRng::new(config.seed),
            config,
            operation_counter: 0,
        }
    }

    /// Generate the next operation
    pub fn next_operation(&mut self) -> PlayerOperation {
        self.operation_counter += 1;
        let player = PlayerId(self.rng.gen_range(1, self.config.players + 1));
        let roll = self.rng.next_u64() as f64 / u64::MAX as f64;
        let c = &self.config;

        if roll < c.join_probability {
            PlayerOperation::Join(player)
        } else if roll < c.join_probability + c.leave_probability {
            PlayerOperation::Leave(player)
        } else if roll < c.join_probability + c.leave_probability + c.save_probability {
            PlayerOperation::Save(player)
        } else {
            let (key, value) = match self.rng.gen_range(0, 3) {
                0 => ("Wins", json!(self.rng.gen_range(0, 1000) as f64 / 10.0)),
                1 => {
                    let len = self.rng.gen_range(0, 4);
                    let items: Vec<u64> = (0..len).map(|_| self.rng.gen_range(0, 10)).collect();
                    ("Items", json!(items))
                }
                _ => ("Temp", json!(self.operation_counter)),
            };
            PlayerOperation::Set {
                player,
                key: key.to_string(),
                value,
            }
        }
    }
}

/// Result of a DST run
#[derive(Debug, Clone)]
pub struct PlayerDSTResult {
    pub seed: u64,
    pub total_operations: u64,
    pub successful_operations: u64,
    pub skipped_operations: u64,
    pub degraded_operations: u64,
    pub joins: u64,
    pub leaves: u64,
    pub saves: u64,
    pub store_stats: SimulatedStoreStats,
    pub invariant_violations: Vec<String>,
    pub history: Vec<(PlayerOperation, OperationOutcome)>,
}

impl PlayerDSTResult {
    pub fn new(seed: u64) -> Self {
        PlayerDSTResult {
            seed,
            total_operations: 0,
            successful_operations: 0,
            skipped_operations: 0,
            degraded_operations: 0,
            joins: 0,
            leaves: 0,
            saves: 0,
            store_stats: SimulatedStoreStats::default(),
            invariant_violations: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.invariant_violations.is_empty()
    }

    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Seed {}: {} ops ({} ok, {} skipped, {} degraded), {} joins, {} leaves, {} saves, {} violations",
            self.seed,
            self.total_operations,
            self.successful_operations,
            self.skipped_operations,
            self.degraded_operations,
            self.joins,
            self.leaves,
            self.saves,
            self.invariant_violations.len()
        );
        let faults = self.store_stats.buggify.summary();
        if !faults.is_empty() {
            summary.push_str(&format!("\n  faults: {}", faults));
        }
        summary
    }
}

type DSTService = SimulatedDataStoreService<InMemoryDataStoreService, SimulatedRng>;

/// Registry exercised by the harness: one key of each kind
pub fn dst_registry() -> DefaultRegistry {
    DefaultRegistry::new()
        .with("Wins", DefaultEntry::new(0).ordered())
        .with("Items", DefaultEntry::new(json!([])))
        .with("Temp", DefaultEntry::new(0).ephemeral())
}

/// Main DST harness for the player data lifecycle
pub struct PlayerDSTHarness {
    config: PlayerDSTConfig,
    service: Arc<DSTService>,
    inner: InMemoryDataStoreService,
    manager: Arc<PlayerDataManager>,
    workload: PlayerWorkload,
    result: PlayerDSTResult,
    /// Ground truth for calm runs: what each player's record should hold
    expected: HashMap<PlayerId, HashMap<String, Value>>,
    /// Players whose persisted state is no longer predictable
    tainted: BTreeSet<PlayerId>,
}

impl PlayerDSTHarness {
    pub async fn new(config: PlayerDSTConfig) -> Self {
        let inner = InMemoryDataStoreService::new();
        // Different seed for the store than for the workload
        let rng = SimulatedRng::new(config.seed.wrapping_add(1));
        let service = Arc::new(SimulatedDataStoreService::new(
            inner.clone(),
            rng,
            config.store_config.clone(),
        ));

        let manager = Arc::new(PlayerDataManager::new(
            PlayerDataConfig::test(),
            service.clone(),
            Arc::new(ReplicationHub::new()),
        ));
        let mut result = PlayerDSTResult::new(config.seed);
        if let Err(e) = manager.init(dst_registry(), None).await {
            result
                .invariant_violations
                .push(format!("init failed: {}", e));
        }

        PlayerDSTHarness {
            workload: PlayerWorkload::new(config.clone()),
            config,
            service,
            inner,
            manager,
            result,
            expected: HashMap::new(),
            tainted: BTreeSet::new(),
        }
    }

    pub fn manager(&self) -> &Arc<PlayerDataManager> {
        &self.manager
    }

    /// Run the workload for a specified number of operations
    pub async fn run(&mut self, operations: usize) {
        for _ in 0..operations {
            let op = self.workload.next_operation();
            self.execute_operation(op).await;
        }
    }

    async fn execute_operation(&mut self, op: PlayerOperation) {
        self.result.total_operations += 1;

        let outcome = match &op {
            PlayerOperation::Join(player) => self.execute_join(*player).await,
            PlayerOperation::Leave(player) => self.execute_leave(*player).await,
            PlayerOperation::Set { player, key, value } => {
                self.execute_set(*player, key, value.clone())
            }
            PlayerOperation::Save(player) => self.execute_save(*player).await,
        };

        match outcome {
            OperationOutcome::Success => self.result.successful_operations += 1,
            OperationOutcome::Skipped => self.result.skipped_operations += 1,
            OperationOutcome::Degraded(_) => self.result.degraded_operations += 1,
        }
        self.result.history.push((op, outcome));
    }

    async fn execute_join(&mut self, player: PlayerId) -> OperationOutcome {
        let Ok(session) = self.manager.player_added(player).await else {
            return OperationOutcome::Skipped;
        };
        self.result.joins += 1;

        let snapshot = session.snapshot();
        for key in ["Wins", "Items", "Temp"] {
            if !snapshot.contains_key(key) {
                self.violation(format!("player {} loaded without key {}", player, key));
            }
        }
        if snapshot.get("Temp") != Some(&json!(0)) {
            self.violation(format!(
                "player {} ephemeral key not reset: {:?}",
                player,
                snapshot.get("Temp")
            ));
        }

        let degraded = session.degraded_keys();
        if !degraded.is_empty() {
            // Defaults were used instead of persisted data
            self.tainted.insert(player);
            return OperationOutcome::Degraded(degraded.len());
        }

        if !self.tainted.contains(&player) {
            let expected = self.expected_for(player);
            for (key, value) in &expected {
                if snapshot.get(key) != Some(value) {
                    self.violation(format!(
                        "player {} loaded {}={:?}, expected {}",
                        player,
                        key,
                        snapshot.get(key),
                        value
                    ));
                }
            }
        }
        self.expected.entry(player).or_insert_with(|| {
            HashMap::from([
                ("Wins".to_string(), json!(0)),
                ("Items".to_string(), json!([])),
            ])
        });
        OperationOutcome::Success
    }

    async fn execute_leave(&mut self, player: PlayerId) -> OperationOutcome {
        let Some(session) = self.manager.get_player_session(player) else {
            return OperationOutcome::Skipped;
        };
        self.manager.player_removing(player).await;
        self.result.leaves += 1;

        if session.is_connected() {
            self.violation(format!("player {} still connected after leave", player));
        }
        if self.manager.get_player_session(player).is_some() {
            self.violation(format!("player {} still registered after leave", player));
        }
        self.record_flush_faults(player);
        OperationOutcome::Success
    }

    fn execute_set(&mut self, player: PlayerId, key: &str, value: Value) -> OperationOutcome {
        let Some(session) = self.manager.get_player_session(player) else {
            return OperationOutcome::Skipped;
        };
        if !session.set(key, value.clone()) {
            return OperationOutcome::Skipped;
        }
        if session.get(key).as_ref() != Some(&value) {
            self.violation(format!("player {} set {} not applied", player, key));
        }
        if key != "Temp" {
            let persisted = floor_to_integer(&value).unwrap_or(value);
            self.expected
                .entry(player)
                .or_default()
                .insert(key.to_string(), persisted);
        }
        OperationOutcome::Success
    }

    async fn execute_save(&mut self, player: PlayerId) -> OperationOutcome {
        let Ok(report) = self.manager.save_player(player).await else {
            return OperationOutcome::Skipped;
        };
        self.result.saves += 1;
        if !report.failed.is_empty() {
            self.tainted.insert(player);
            return OperationOutcome::Degraded(report.failed.len());
        }
        if report.saved.iter().any(|k| k == "Temp") {
            self.violation(format!("player {} ephemeral key was saved", player));
        }
        OperationOutcome::Success
    }

    /// Any failed set since the last check makes the model unreliable
    fn record_flush_faults(&mut self, player: PlayerId) {
        if self.service.stats().set_failures > 0 {
            self.tainted.insert(player);
        }
    }

    fn expected_for(&self, player: PlayerId) -> HashMap<String, Value> {
        self.expected.get(&player).cloned().unwrap_or_default()
    }

    fn violation(&mut self, message: String) {
        self.result
            .invariant_violations
            .push(format!("seed {}: {}", self.config.seed, message));
    }

    /// Shut down the manager, then check invariants against the store
    pub async fn check_invariants(&mut self) {
        self.manager.shutdown().await;

        if !self.manager.players().is_empty() {
            self.violation("sessions remain after shutdown".to_string());
        }

        self.check_ephemeral_never_stored();
        self.check_ordered_values_are_integers();
        self.check_persisted_matches_model();

        self.result.store_stats = self.service.stats();
    }

    fn store_id(&self, key: &str, ordered: bool) -> StoreId {
        StoreId::new(self.manager.config().store_name(), key, ordered)
    }

    fn check_ephemeral_never_stored(&mut self) {
        let temp = self.store_id("Temp", false);
        if self.inner.has_store(&temp) {
            self.violation("ephemeral key store was opened".to_string());
        }
        if !matches!(
            self.manager.store_resolution("Temp"),
            Some(StoreResolution::Ephemeral)
        ) {
            self.violation("ephemeral key resolved to a store".to_string());
        }
    }

    fn check_ordered_values_are_integers(&mut self) {
        let wins = self.store_id("Wins", true);
        for player in 1..=self.config.players {
            let record = PlayerId(player).store_key();
            if let Some(value) = self.inner.peek(&wins, &record) {
                if !is_integer(&value) {
                    self.violation(format!("ordered value for {} is {}", record, value));
                }
            }
        }
    }

    fn check_persisted_matches_model(&mut self) {
        // Only meaningful when nothing could have been lost
        let stats = self.service.stats();
        if stats.set_failures > 0 || stats.get_failures > 0 || stats.open_failures > 0 {
            return;
        }

        let players: Vec<PlayerId> = self.expected.keys().copied().collect();
        for player in players {
            if self.tainted.contains(&player) {
                continue;
            }
            let record = player.store_key();
            for (key, value) in self.expected_for(player) {
                let id = self.store_id(&key, key == "Wins");
                let stored = self.inner.peek(&id, &record);
                if stored.as_ref() != Some(&value) {
                    self.violation(format!(
                        "{} {} persisted {:?}, expected {}",
                        record, key, stored, value
                    ));
                }
            }
        }
    }

    pub fn result(&self) -> &PlayerDSTResult {
        &self.result
    }

    pub fn into_result(self) -> PlayerDSTResult {
        self.result
    }
}

/// Run a batch of DST runs with consecutive seeds
pub async fn run_dst_batch(
    base_seed: u64,
    count: usize,
    ops_per_run: usize,
    config_fn: impl Fn(u64) -> PlayerDSTConfig,
) -> Vec<PlayerDSTResult> {
    let mut results = Vec::with_capacity(count);

    for i in 0..count {
        let seed = base_seed + i as u64;
        let mut harness = PlayerDSTHarness::new(config_fn(seed)).await;
        harness.run(ops_per_run).await;
        harness.check_invariants().await;
        results.push(harness.into_result());
    }

    results
}

/// Summary of batch results
pub fn summarize_batch(results: &[PlayerDSTResult]) -> String {
    let total = results.len();
    let passed = results.iter().filter(|r| r.is_success()).count();
    let failed_seeds: Vec<u64> = results
        .iter()
        .filter(|r| !r.is_success())
        .map(|r| r.seed)
        .collect();
    let total_ops: u64 = results.iter().map(|r| r.total_operations).sum();
    let total_saves: u64 = results.iter().map(|r| r.saves).sum();

    let mut summary = format!(
        "Batch: {}/{} passed, {} total ops, {} saves",
        passed, total, total_ops, total_saves
    );
    if !failed_seeds.is_empty() {
        summary.push_str(&format!("\nFailed seeds: {:?}", failed_seeds));
    }
    summary
}
