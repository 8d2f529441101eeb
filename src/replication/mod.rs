//! Client Replication
//!
//! The server pushes every committed mutation to exactly the owning
//! player's client. A client builds a [`ClientMirror`] by polling for an
//! initial snapshot until the server session is loaded, then applies the
//! pushed changes key by key.
//!
//! ```text
//! PlayerSession::set ──► Replicator::push_change ──► ReplicationHub
//!                                                        │ (per-player channel)
//!                                                        ▼
//!                     request_snapshot (poll) ──► ClientMirror ──► listeners
//! ```

pub mod hub;
pub mod message;
pub mod mirror;

pub use hub::{ClientEndpoint, ReplicationHub};
pub use message::ReplicationMessage;
pub use mirror::ClientMirror;

use crate::session::PlayerId;
use serde_json::Value;
use std::collections::HashMap;

/// Server-side sink for committed changes
pub trait Replicator: Send + Sync + 'static {
    /// Send `(key, value)` to this player's client only
    fn push_change(&self, player: PlayerId, key: &str, value: &Value);

    /// The player's session is gone; release any client channel
    fn disconnect(&self, _player: PlayerId) {}
}

/// Answers a client's initial snapshot request
pub trait SnapshotSource: Send + Sync + 'static {
    /// Full key/value snapshot, or `None` while the session is not loaded
    fn snapshot(&self, player: PlayerId) -> Option<HashMap<String, Value>>;
}

/// Replicator for hosts without connected clients
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReplicator;

impl Replicator for NullReplicator {
    fn push_change(&self, _player: PlayerId, _key: &str, _value: &Value) {}
}
