pub mod io;
pub mod buggify;
pub mod config;
pub mod datastore;
pub mod error;
pub mod observability;
pub mod schema;
pub mod signal;
pub mod retry;
pub mod resolver;
pub mod session;
pub mod replication;
pub mod pipeline;
pub mod manager;
pub mod autosave;
pub mod host;
pub mod dst;

pub use config::{HostEnvironment, PlayerDataConfig};
pub use datastore::{DataStore, DataStoreError, DataStoreService, StoreId};
pub use error::PlayerDataError;
pub use host::HostEvent;
pub use manager::{LifecycleState, PlayerDataManager, PlayerLoaded};
pub use pipeline::{FlushReport, InitialValue};
pub use replication::{ClientMirror, ReplicationHub, ReplicationMessage};
pub use resolver::{StoreHandle, StoreResolution};
pub use schema::{register_default, DefaultEntry, DefaultRegistry};
pub use session::{PlayerId, PlayerSession, Update};
pub use signal::{CallbackList, Connection, ConnectionSet};
