//! Default Registry
//!
//! Declarative schema for player data: one [`DefaultEntry`] per logical key,
//! supplied once at initialization and read-only afterwards.

use serde_json::Value;
use std::collections::BTreeMap;

/// Default value and persistence flags for one key
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultEntry {
    value: Value,
    ordered: bool,
    ephemeral: bool,
}

impl DefaultEntry {
    /// General (unordered, persisted) entry
    pub fn new(value: impl Into<Value>) -> Self {
        register_default(value, false, false)
    }

    /// Persist in the ordered-numeric store variant.
    ///
    /// Ignored unless the default value is numeric.
    pub fn ordered(self) -> Self {
        register_default(self.value, true, self.ephemeral)
    }

    /// Never persist; the value resets to the default every session
    pub fn ephemeral(mut self) -> Self {
        self.ephemeral = true;
        self
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn is_ordered(&self) -> bool {
        self.ordered
    }

    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }
}

/// Build a [`DefaultEntry`]; `ordered` is forced false for non-numeric values
pub fn register_default(value: impl Into<Value>, ordered: bool, ephemeral: bool) -> DefaultEntry {
    let value = value.into();
    let ordered = ordered && value.is_number();
    DefaultEntry {
        value,
        ordered,
        ephemeral,
    }
}

/// Mapping from key to [`DefaultEntry`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefaultRegistry {
    entries: BTreeMap<String, DefaultEntry>,
}

impl DefaultRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry (builder style). A repeated key replaces the earlier entry.
    pub fn with(mut self, key: impl Into<String>, entry: DefaultEntry) -> Self {
        self.entries.insert(key.into(), entry);
        self
    }

    pub fn get(&self, key: &str) -> Option<&DefaultEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DefaultEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Keys that are written to a backing store
    pub fn persisted_keys(&self) -> impl Iterator<Item = &str> {
        self.iter()
            .filter(|(_, entry)| !entry.is_ephemeral())
            .map(|(k, _)| k)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, DefaultEntry)> for DefaultRegistry {
    fn from_iter<I: IntoIterator<Item = (String, DefaultEntry)>>(iter: I) -> Self {
        DefaultRegistry {
            entries: iter.into_iter().collect(),
        }
    }
}
