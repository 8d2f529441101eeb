//! Simulated Backing Store with Fault Injection
//!
//! DST-compatible wrapper that injects transient failures, timeouts,
//! throttling and latency using buggify. Every store opened through the
//! wrapper shares one RNG, so a seed reproduces the exact failure sequence.

use crate::buggify::faults::datastore as faults;
use crate::buggify::{BuggifyStats, FaultConfig};
use crate::datastore::{DataStore, DataStoreError, DataStoreService, StoreFuture, StoreId};
use crate::io::Rng;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

/// Configuration for simulated fault injection
#[derive(Debug, Clone)]
pub struct SimulatedStoreConfig {
    /// Per-fault probabilities
    pub faults: FaultConfig,
    /// Simulated latency range in microseconds (min, max)
    pub latency_range_us: (u64, u64),
}

impl Default for SimulatedStoreConfig {
    fn default() -> Self {
        SimulatedStoreConfig {
            faults: FaultConfig::default(),
            latency_range_us: (0, 500),
        }
    }
}

impl SimulatedStoreConfig {
    /// High chaos configuration for stress testing
    pub fn high_chaos() -> Self {
        SimulatedStoreConfig {
            faults: FaultConfig::high_chaos(),
            latency_range_us: (0, 2_000),
        }
    }

    /// No faults - for baseline testing
    pub fn no_faults() -> Self {
        SimulatedStoreConfig {
            faults: FaultConfig::disabled(),
            latency_range_us: (0, 0),
        }
    }

    /// Override one fault probability (builder style)
    pub fn with_fault(mut self, fault_id: &'static str, probability: f64) -> Self {
        self.faults.enabled = true;
        self.faults = self.faults.set(fault_id, probability);
        self
    }
}

/// Statistics for fault injection
#[derive(Debug, Clone, Default)]
pub struct SimulatedStoreStats {
    pub open_attempts: u64,
    pub open_failures: u64,
    pub get_attempts: u64,
    pub get_failures: u64,
    pub set_attempts: u64,
    pub set_failures: u64,
    pub timeouts: u64,
    pub throttled: u64,
    pub buggify: BuggifyStats,
}

struct SimulatedInner<R: Rng> {
    rng: R,
    stats: SimulatedStoreStats,
}

/// Outcome of the pre-request fault roll
enum Injected {
    None,
    Timeout,
    Throttled,
    Fail,
}

/// State shared by the service wrapper and every store it opened
struct Shared<R: Rng> {
    config: SimulatedStoreConfig,
    state: Mutex<SimulatedInner<R>>,
}

impl<R: Rng> Shared<R> {
    /// Roll timeout, throttle, then the operation-specific failure
    fn roll(&self, fail_fault: &str) -> Injected {
        let mut guard = self.state.lock();
        let s = &mut *guard;
        let config = &self.config.faults;

        if crate::buggify!(&mut s.rng, config, &mut s.stats.buggify, faults::TIMEOUT) {
            s.stats.timeouts += 1;
            return Injected::Timeout;
        }
        if crate::buggify!(&mut s.rng, config, &mut s.stats.buggify, faults::THROTTLED) {
            s.stats.throttled += 1;
            return Injected::Throttled;
        }
        if crate::buggify!(&mut s.rng, config, &mut s.stats.buggify, fail_fault) {
            return Injected::Fail;
        }
        Injected::None
    }

    async fn latency(&self) {
        let (min, max) = self.config.latency_range_us;
        if min == 0 && max == 0 {
            return;
        }
        let latency_us = {
            let mut s = self.state.lock();
            if max > min {
                s.rng.gen_range(min, max)
            } else {
                min
            }
        };
        if latency_us > 0 {
            tokio::time::sleep(std::time::Duration::from_micros(latency_us)).await;
        }
    }
}

fn injected_error(injected: Injected, op: &str) -> Option<DataStoreError> {
    match injected {
        Injected::None => None,
        Injected::Timeout => Some(DataStoreError::Transient(format!("simulated {} timeout", op))),
        Injected::Throttled => Some(DataStoreError::Transient(format!(
            "simulated {} request throttled",
            op
        ))),
        Injected::Fail => Some(DataStoreError::Transient(format!("simulated {} failure", op))),
    }
}

/// Simulated service that wraps another service and injects faults
pub struct SimulatedDataStoreService<S: DataStoreService, R: Rng> {
    inner: S,
    shared: Arc<Shared<R>>,
}

impl<S: DataStoreService, R: Rng> SimulatedDataStoreService<S, R> {
    /// Create a new simulated service with the given RNG
    pub fn new(inner: S, rng: R, config: SimulatedStoreConfig) -> Self {
        SimulatedDataStoreService {
            inner,
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(SimulatedInner {
                    rng,
                    stats: SimulatedStoreStats::default(),
                }),
            }),
        }
    }

    /// The wrapped service
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Get current statistics
    pub fn stats(&self) -> SimulatedStoreStats {
        self.shared.state.lock().stats.clone()
    }

    /// Reset statistics
    pub fn reset_stats(&self) {
        self.shared.state.lock().stats = SimulatedStoreStats::default();
    }
}

impl<S: DataStoreService, R: Rng> DataStoreService for SimulatedDataStoreService<S, R> {
    fn open<'a>(&'a self, id: &'a StoreId) -> StoreFuture<'a, Arc<dyn DataStore>> {
        Box::pin(async move {
            self.shared.state.lock().stats.open_attempts += 1;
            self.shared.latency().await;

            if let Some(err) = injected_error(self.shared.roll(faults::OPEN_FAIL), "open") {
                self.shared.state.lock().stats.open_failures += 1;
                return Err(err);
            }

            let store = self.inner.open(id).await?;
            let wrapped: Arc<dyn DataStore> = Arc::new(SimulatedDataStore {
                inner: store,
                shared: self.shared.clone(),
            });
            Ok(wrapped)
        })
    }
}

/// Store handle returned by [`SimulatedDataStoreService::open`]
struct SimulatedDataStore<R: Rng> {
    inner: Arc<dyn DataStore>,
    shared: Arc<Shared<R>>,
}

impl<R: Rng> DataStore for SimulatedDataStore<R> {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Value> {
        Box::pin(async move {
            self.shared.state.lock().stats.get_attempts += 1;
            self.shared.latency().await;

            if let Some(err) = injected_error(self.shared.roll(faults::GET_FAIL), "get") {
                self.shared.state.lock().stats.get_failures += 1;
                return Err(err);
            }
            self.inner.get(key).await
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: &'a Value) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.shared.state.lock().stats.set_attempts += 1;
            self.shared.latency().await;

            if let Some(err) = injected_error(self.shared.roll(faults::SET_FAIL), "set") {
                self.shared.state.lock().stats.set_failures += 1;
                return Err(err);
            }
            self.inner.set(key, value).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::InMemoryDataStoreService;
    use crate::io::SimulatedRng;
    use serde_json::json;

    fn wins() -> StoreId {
        StoreId::new("PlayerData0", "Wins", true)
    }

    #[tokio::test]
    async fn test_simulated_store_no_faults() {
        let inner = InMemoryDataStoreService::new();
        let service = SimulatedDataStoreService::new(
            inner.clone(),
            SimulatedRng::new(42),
            SimulatedStoreConfig::no_faults(),
        );

        let store = service.open(&wins()).await.unwrap();
        store.set("Player_1", &json!(4)).await.unwrap();
        assert_eq!(store.get("Player_1").await.unwrap(), json!(4));

        let stats = service.stats();
        assert_eq!(stats.open_attempts, 1);
        assert_eq!(stats.set_attempts, 1);
        assert_eq!(stats.set_failures, 0);
        assert_eq!(stats.get_attempts, 1);
        assert_eq!(stats.get_failures, 0);
        assert_eq!(inner.peek(&wins(), "Player_1"), Some(json!(4)));
    }

    #[tokio::test]
    async fn test_simulated_store_deterministic() {
        let seed = 12345u64;
        let config = SimulatedStoreConfig::no_faults().with_fault(faults::SET_FAIL, 0.5);

        let run = |config: SimulatedStoreConfig| async move {
            let service = SimulatedDataStoreService::new(
                InMemoryDataStoreService::new(),
                SimulatedRng::new(seed),
                config,
            );
            let store = service.open(&wins()).await.unwrap();
            let mut results = Vec::new();
            for i in 0..20 {
                results.push(store.set(&format!("Player_{}", i), &json!(i)).await.is_ok());
            }
            results
        };

        assert_eq!(
            run(config.clone()).await,
            run(config).await,
            "Deterministic stores should behave identically"
        );
    }

    #[tokio::test]
    async fn test_open_always_fails() {
        let service = SimulatedDataStoreService::new(
            InMemoryDataStoreService::new(),
            SimulatedRng::new(9),
            SimulatedStoreConfig::no_faults().with_fault(faults::OPEN_FAIL, 1.0),
        );

        for _ in 0..5 {
            let err = service.open(&wins()).await.err().unwrap();
            assert!(matches!(err, DataStoreError::Transient(_)));
        }
        let stats = service.stats();
        assert_eq!(stats.open_attempts, 5);
        assert_eq!(stats.open_failures, 5);
        assert!(!service.inner().has_store(&wins()));
    }

    #[tokio::test]
    async fn test_failed_set_does_not_write() {
        let inner = InMemoryDataStoreService::new();
        let service = SimulatedDataStoreService::new(
            inner.clone(),
            SimulatedRng::new(5),
            SimulatedStoreConfig::no_faults().with_fault(faults::SET_FAIL, 1.0),
        );

        let store = service.open(&wins()).await.unwrap();
        assert!(store.set("Player_1", &json!(1)).await.is_err());
        assert_eq!(inner.peek(&wins(), "Player_1"), None);
        assert_eq!(service.stats().set_failures, 1);
    }
}
