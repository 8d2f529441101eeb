//! BUGGIFY - FoundationDB-Style Fault Injection
//!
//! Every remote-store call in the simulated backing store is a potential
//! fault injection site. Decisions are drawn from a caller-owned [`Rng`]
//! so that a seed fully determines which calls fail.
//!
//! # Usage
//!
//! ```ignore
//! if buggify!(&mut rng, &config, &mut stats, faults::datastore::GET_FAIL) {
//!     return Err(DataStoreError::Transient("simulated get failure".into()));
//! }
//! ```

pub mod config;
pub mod faults;

pub use config::FaultConfig;
pub use faults::ALL_FAULTS;

use crate::io::Rng;
use std::collections::BTreeMap;

/// Checks and triggers seen at one fault site
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultCounter {
    pub checks: u64,
    pub triggers: u64,
}

/// Per-site injection counters, keyed by fault id
#[derive(Debug, Clone, Default)]
pub struct BuggifyStats {
    sites: BTreeMap<String, FaultCounter>,
}

impl BuggifyStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, fault_id: &str) -> FaultCounter {
        self.sites.get(fault_id).copied().unwrap_or_default()
    }

    pub fn triggered(&self, fault_id: &str) -> u64 {
        self.counter(fault_id).triggers
    }

    fn record(&mut self, fault_id: &str, triggered: bool) {
        let counter = self.sites.entry(fault_id.to_string()).or_default();
        counter.checks += 1;
        if triggered {
            counter.triggers += 1;
        }
    }

    /// One line per site that fired at least once, e.g. `datastore.get_fail 3/120`
    pub fn summary(&self) -> String {
        self.sites
            .iter()
            .filter(|(_, c)| c.triggers > 0)
            .map(|(id, c)| format!("{} {}/{}", id, c.triggers, c.checks))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Core buggify check - called by the macro
///
/// Returns true if the fault should be injected.
#[inline]
pub fn should_buggify<R: Rng>(
    rng: &mut R,
    config: &FaultConfig,
    stats: &mut BuggifyStats,
    fault_id: &str,
) -> bool {
    let prob = config.get(fault_id);
    // Always draw: the RNG sequence does not depend on which faults are enabled
    let draw = rng.gen_range(0, 1_000_000) as f64 / 1_000_000.0;
    let triggered = draw < prob;
    stats.record(fault_id, triggered);
    triggered
}

/// BUGGIFY macro - the main interface for fault injection
#[macro_export]
macro_rules! buggify {
    ($rng:expr, $config:expr, $stats:expr, $fault_id:expr) => {
        $crate::buggify::should_buggify($rng, $config, $stats, $fault_id)
    };
}
