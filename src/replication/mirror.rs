use super::{ClientEndpoint, ReplicationMessage};
use crate::session::{ChangeListener, PlayerId};
use crate::signal::{CallbackList, Connection};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tracing::debug;

/// Read-only client copy of one player's data
///
/// Seeded once from a snapshot, then patched by pushed changes. Listeners
/// fire after each patch in registration order.
pub struct ClientMirror {
    player: PlayerId,
    values: RwLock<HashMap<String, Value>>,
    listeners: RwLock<HashMap<String, CallbackList<ChangeListener>>>,
    closed: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ClientMirror {
    /// Poll for the initial snapshot until the server session is ready,
    /// then start applying pushed changes.
    ///
    /// Returns `None` if the server closes the channel before a snapshot
    /// was served.
    pub async fn connect(mut endpoint: ClientEndpoint, poll_interval: Duration) -> Option<Arc<Self>> {
        let player = endpoint.player();
        let mut polls = 0u64;

        let snapshot = loop {
            if let Some(snapshot) = endpoint.request_snapshot().await {
                break snapshot;
            }
            // Changes queued before the snapshot are already reflected in it
            loop {
                match endpoint.try_recv() {
                    Ok(ReplicationMessage::Closed) | Err(TryRecvError::Disconnected) => {
                        debug!(player = %player, "replication closed before snapshot");
                        return None;
                    }
                    Ok(_) => continue,
                    Err(TryRecvError::Empty) => break,
                }
            }
            polls += 1;
            tokio::time::sleep(poll_interval).await;
        };
        debug!(player = %player, polls, keys = snapshot.len(), "client snapshot received");

        let mirror = Arc::new(ClientMirror::from_snapshot(player, snapshot));
        let weak = Arc::downgrade(&mirror);
        let task = tokio::spawn(async move {
            while let Some(msg) = endpoint.recv().await {
                let Some(mirror) = weak.upgrade() else { break };
                if !mirror.apply(msg) {
                    break;
                }
            }
            if let Some(mirror) = weak.upgrade() {
                mirror.closed.store(true, Ordering::Release);
            }
        });
        *mirror.task.lock() = Some(task);
        Some(mirror)
    }

    /// Mirror seeded from an already obtained snapshot, with no channel
    pub fn from_snapshot(player: PlayerId, snapshot: HashMap<String, Value>) -> Self {
        ClientMirror {
            player,
            values: RwLock::new(snapshot),
            listeners: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    pub fn player(&self) -> PlayerId {
        self.player
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }

    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.values.read().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Register a listener for one key
    pub fn on_change(
        &self,
        key: &str,
        listener: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Connection {
        let mut listeners = self.listeners.write();
        listeners
            .entry(key.to_string())
            .or_default()
            .connect(Arc::new(listener))
    }

    /// Apply one pushed message. Returns false once the channel is closed.
    pub fn apply(&self, msg: ReplicationMessage) -> bool {
        match msg {
            ReplicationMessage::Change { key, value } => {
                self.values.write().insert(key.clone(), value.clone());
                let callbacks = self
                    .listeners
                    .read()
                    .get(&key)
                    .map(|list| list.snapshot())
                    .unwrap_or_default();
                for callback in callbacks {
                    callback(&value);
                }
                true
            }
            ReplicationMessage::Closed => {
                self.closed.store(true, Ordering::Release);
                false
            }
        }
    }
}

impl Drop for ClientMirror {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}
