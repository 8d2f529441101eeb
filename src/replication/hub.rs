use super::{ReplicationMessage, Replicator, SnapshotSource};
use crate::session::PlayerId;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

pub type ReplicationSender = mpsc::UnboundedSender<ReplicationMessage>;
pub type ReplicationReceiver = mpsc::UnboundedReceiver<ReplicationMessage>;

/// In-process replication channel: one outbound queue per connected client
#[derive(Debug, Default)]
pub struct ReplicationHub {
    clients: RwLock<HashMap<PlayerId, ReplicationSender>>,
    pushes_sent: AtomicU64,
    pushes_dropped: AtomicU64,
}

impl ReplicationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client for `player`, replacing any previous connection
    pub fn connect(&self, player: PlayerId, source: Arc<dyn SnapshotSource>) -> ClientEndpoint {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(old) = self.clients.write().insert(player, tx) {
            let _ = old.send(ReplicationMessage::Closed);
        }
        debug!(player = %player, "replication client connected");
        ClientEndpoint { player, rx, source }
    }

    pub fn is_connected(&self, player: PlayerId) -> bool {
        self.clients.read().contains_key(&player)
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Changes delivered to a client queue
    pub fn pushes_sent(&self) -> u64 {
        self.pushes_sent.load(Ordering::Relaxed)
    }

    /// Changes for players without a connected client
    pub fn pushes_dropped(&self) -> u64 {
        self.pushes_dropped.load(Ordering::Relaxed)
    }
}

impl Replicator for ReplicationHub {
    fn push_change(&self, player: PlayerId, key: &str, value: &Value) {
        let delivered = match self.clients.read().get(&player) {
            Some(tx) => tx
                .send(ReplicationMessage::change(key, value.clone()))
                .is_ok(),
            None => false,
        };

        if delivered {
            self.pushes_sent.fetch_add(1, Ordering::Relaxed);
        } else {
            self.pushes_dropped.fetch_add(1, Ordering::Relaxed);
            debug!(player = %player, key, "no replication client; change not pushed");
        }
    }

    fn disconnect(&self, player: PlayerId) {
        if let Some(tx) = self.clients.write().remove(&player) {
            let _ = tx.send(ReplicationMessage::Closed);
            debug!(player = %player, "replication client disconnected");
        }
    }
}

/// Client side of one player's replication channel
pub struct ClientEndpoint {
    player: PlayerId,
    rx: ReplicationReceiver,
    source: Arc<dyn SnapshotSource>,
}

impl ClientEndpoint {
    pub fn player(&self) -> PlayerId {
        self.player
    }

    /// Ask the server for the full state; `None` until the session is loaded
    pub async fn request_snapshot(&self) -> Option<HashMap<String, Value>> {
        tokio::task::yield_now().await;
        self.source.snapshot(self.player)
    }

    /// Next pushed message; `None` once the server side is gone
    pub async fn recv(&mut self) -> Option<ReplicationMessage> {
        self.rx.recv().await
    }

    /// Non-blocking receive; `Err` when empty or disconnected
    pub fn try_recv(&mut self) -> Result<ReplicationMessage, mpsc::error::TryRecvError> {
        self.rx.try_recv()
    }
}
