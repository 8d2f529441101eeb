use super::Pipeline;
use crate::datastore::is_integer;
use crate::retry::with_retries;
use crate::session::PlayerSession;
use futures::future::join_all;
use serde_json::{Number, Value};
use tracing::{debug, warn};

/// Per-key outcome of one flush
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub saved: Vec<String>,
    /// Gave up after exhausting retries; dropped from the batch
    pub failed: Vec<String>,
    /// Ephemeral or without a resolved store
    pub skipped: Vec<String>,
}

impl FlushReport {
    pub fn is_empty(&self) -> bool {
        self.saved.is_empty() && self.failed.is_empty() && self.skipped.is_empty()
    }

    fn sort(&mut self) {
        self.saved.sort();
        self.failed.sort();
        self.skipped.sort();
    }
}

enum KeyFlush {
    Saved(String),
    Failed(String),
    Skipped(String),
}

/// Floor a non-integer number.
///
/// `None` when no coercion is needed, and also when the floored value is
/// outside the `i64` / `u64` range (see [`needs_floor`]).
pub fn floor_to_integer(value: &Value) -> Option<Value> {
    if !needs_floor(value) {
        return None;
    }
    let floored = value.as_f64()?.floor();
    let number = if (I64_MIN_F64..I64_END_F64).contains(&floored) {
        Number::from(floored as i64)
    } else if (0.0..U64_END_F64).contains(&floored) {
        Number::from(floored as u64)
    } else {
        return None;
    };
    Some(Value::Number(number))
}

/// True for numbers an ordered store would reject as non-integers
pub fn needs_floor(value: &Value) -> bool {
    value.is_number() && !is_integer(value)
}

// Half-open bounds: 2^63 and 2^64 are the first values past each range
const I64_MIN_F64: f64 = i64::MIN as f64;
const I64_END_F64: f64 = 9_223_372_036_854_775_808.0;
const U64_END_F64: f64 = 18_446_744_073_709_551_616.0;

impl Pipeline {
    /// Write every dirty key of `session` to its store.
    ///
    /// The dirty set is taken up front, so a key mutated while the flush is
    /// in flight stays dirty for the next flush. Failed keys are dropped.
    pub async fn flush(&self, session: &PlayerSession) -> FlushReport {
        let mut batch: Vec<(String, Value)> = session.take_dirty().into_iter().collect();
        if batch.is_empty() {
            return FlushReport::default();
        }
        batch.sort_by(|a, b| a.0.cmp(&b.0));

        let record = session.player().store_key();
        let tasks = batch
            .into_iter()
            .map(|(key, value)| self.flush_key(session, &record, key, value));

        let mut report = FlushReport::default();
        for outcome in join_all(tasks).await {
            match outcome {
                KeyFlush::Saved(key) => report.saved.push(key),
                KeyFlush::Failed(key) => report.failed.push(key),
                KeyFlush::Skipped(key) => report.skipped.push(key),
            }
        }
        report.sort();

        debug!(
            player = %session.player(),
            saved = report.saved.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "player data flushed"
        );
        report
    }

    async fn flush_key(
        &self,
        session: &PlayerSession,
        record: &str,
        key: String,
        value: Value,
    ) -> KeyFlush {
        let persisted = self.registry.get(&key).is_some_and(|entry| !entry.is_ephemeral());
        if !persisted {
            return KeyFlush::Skipped(key);
        }
        let Some(handle) = self.resolver.get_store(&key) else {
            debug!(player = %session.player(), key = %key, "no store for key; not persisted");
            return KeyFlush::Skipped(key);
        };

        let write = if handle.is_ordered() && needs_floor(&value) {
            let Some(floored) = floor_to_integer(&value) else {
                warn!(
                    player = %session.player(),
                    key = %key,
                    value = %value,
                    "ordered value outside integer range; not saved"
                );
                return KeyFlush::Failed(key);
            };
            session.apply_coerced(&key, &value, floored.clone());
            floored
        } else {
            value
        };

        let target = format!("{} {}", key, record);
        match with_retries(self.save_policy(), "set", &target, || {
            handle.store().set(record, &write)
        })
        .await
        {
            Ok(()) => KeyFlush::Saved(key),
            Err(e) => {
                warn!(
                    player = %session.player(),
                    key = %key,
                    error = %e,
                    "save gave up; change dropped"
                );
                KeyFlush::Failed(key)
            }
        }
    }
}
