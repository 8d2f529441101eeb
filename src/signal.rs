//! Callback and connection registries
//!
//! [`CallbackList`] is an ordered list of callbacks with per-entry removers.
//! Invocation iterates over a snapshot, so a callback may disconnect itself
//! or others mid-pass. [`ConnectionSet`] collects removers and background
//! tasks owned by one session so they can all be torn down together.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;

/// Handle that removes a registration when disconnected
pub struct Connection {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Connection {
    pub fn new(remove: impl FnOnce() + Send + Sync + 'static) -> Self {
        Connection {
            remove: Some(Box::new(remove)),
        }
    }

    /// Connection whose disconnect does nothing
    pub fn empty() -> Self {
        Connection { remove: None }
    }

    /// Connection that aborts a background task
    pub fn from_task(handle: JoinHandle<()>) -> Self {
        Connection::new(move || handle.abort())
    }

    /// Remove the registration. Idempotent.
    pub fn disconnect(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.remove.is_some()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("connected", &self.is_connected())
            .finish()
    }
}

struct ListInner<F: ?Sized> {
    next_id: u64,
    entries: Vec<(u64, Arc<F>)>,
}

/// Ordered callback registry
pub struct CallbackList<F: ?Sized> {
    inner: Arc<Mutex<ListInner<F>>>,
}

impl<F: ?Sized + Send + Sync + 'static> CallbackList<F> {
    pub fn new() -> Self {
        CallbackList {
            inner: Arc::new(Mutex::new(ListInner {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Append a callback; it runs after every callback connected before it
    pub fn connect(&self, callback: Arc<F>) -> Connection {
        let id = {
            let mut inner = self.inner.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.entries.push((id, callback));
            id
        };

        let weak: Weak<Mutex<ListInner<F>>> = Arc::downgrade(&self.inner);
        Connection::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.lock().entries.retain(|(entry_id, _)| *entry_id != id);
            }
        })
    }

    /// Callbacks in registration order, detached from the list
    pub fn snapshot(&self) -> Vec<Arc<F>> {
        self.inner
            .lock()
            .entries
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }
}

impl<F: ?Sized + Send + Sync + 'static> Default for CallbackList<F> {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle connections owned by one session
#[derive(Debug, Default)]
pub struct ConnectionSet {
    connections: Mutex<Vec<Connection>>,
    closed: AtomicBool,
}

impl ConnectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a connection. After `disconnect_all` it is disconnected at once.
    pub fn add(&self, mut connection: Connection) {
        if self.closed.load(Ordering::Acquire) {
            connection.disconnect();
            return;
        }
        self.connections.lock().push(connection);
    }

    /// Track a background task; disconnecting aborts it
    pub fn add_task(&self, handle: JoinHandle<()>) {
        self.add(Connection::from_task(handle));
    }

    /// Disconnect everything tracked so far and close the set
    pub fn disconnect_all(&self) {
        self.closed.store(true, Ordering::Release);
        let drained = std::mem::take(&mut *self.connections.lock());
        for mut connection in drained {
            connection.disconnect();
        }
    }

    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
