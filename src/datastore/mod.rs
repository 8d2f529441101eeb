//! Backing Store Collaborators
//!
//! Trait-based access to the remote key-value storage service plus the
//! in-memory and fault-injecting implementations used by tests and the
//! simulation harness.

pub mod simulated;
pub mod store;

pub use simulated::{SimulatedDataStoreService, SimulatedStoreConfig, SimulatedStoreStats};
pub use store::{
    is_integer, DataStore, DataStoreError, DataStoreService, InMemoryDataStore,
    InMemoryDataStoreService, RequestCounts, StoreFuture, StoreId,
};
