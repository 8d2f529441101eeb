//! Fault configuration

use super::faults::datastore;
use std::collections::HashMap;

/// Per-fault probabilities plus a global switch and multiplier
#[derive(Debug, Clone)]
pub struct FaultConfig {
    /// Master switch; when false nothing is ever injected
    pub enabled: bool,
    /// Scales every probability (clamped to 1.0 after scaling)
    pub multiplier: f64,
    probabilities: HashMap<&'static str, f64>,
}

impl Default for FaultConfig {
    fn default() -> Self {
        let mut config = FaultConfig::disabled();
        config.enabled = true;
        config
            .set(datastore::OPEN_FAIL, 0.01)
            .set(datastore::GET_FAIL, 0.01)
            .set(datastore::SET_FAIL, 0.01)
            .set(datastore::TIMEOUT, 0.005)
            .set(datastore::THROTTLED, 0.005)
    }
}

impl FaultConfig {
    /// No faults at all - baseline behaviour
    pub fn disabled() -> Self {
        FaultConfig {
            enabled: false,
            multiplier: 1.0,
            probabilities: HashMap::new(),
        }
    }

    /// High chaos configuration for stress testing
    pub fn high_chaos() -> Self {
        FaultConfig::default()
            .set(datastore::OPEN_FAIL, 0.2)
            .set(datastore::GET_FAIL, 0.2)
            .set(datastore::SET_FAIL, 0.2)
            .set(datastore::TIMEOUT, 0.05)
            .set(datastore::THROTTLED, 0.05)
    }

    /// Set the probability for one fault (builder style)
    pub fn set(mut self, fault_id: &'static str, probability: f64) -> Self {
        self.probabilities
            .insert(fault_id, probability.clamp(0.0, 1.0));
        self
    }

    /// Effective probability for a fault id
    pub fn get(&self, fault_id: &str) -> f64 {
        if !self.enabled {
            return 0.0;
        }
        let base = self.probabilities.get(fault_id).copied().unwrap_or(0.0);
        (base * self.multiplier).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_is_zero() {
        let config = FaultConfig::disabled().set(datastore::GET_FAIL, 1.0);
        assert_eq!(config.get(datastore::GET_FAIL), 0.0);
    }

    #[test]
    fn test_multiplier_clamps() {
        let mut config = FaultConfig::default().set(datastore::SET_FAIL, 0.6);
        config.multiplier = 3.0;
        assert_eq!(config.get(datastore::SET_FAIL), 1.0);
        assert_eq!(config.get("unknown.fault"), 0.0);
    }
}
