//! Lifecycle Orchestrator
//!
//! `PlayerDataManager` owns store resolution, the active session registry
//! and the player loaded / initial value registries. Lifecycle per process:
//!
//! ```text
//! Uninitialized ──init()──► Resolving ──► Ready (terminal)
//! ```
//!
//! Host integration calls [`PlayerDataManager::player_added`],
//! [`PlayerDataManager::player_removing`] and [`PlayerDataManager::shutdown`]
//! directly, or feeds [`crate::HostEvent`]s to
//! [`PlayerDataManager::run_host_events`].

use crate::autosave::AutosaveWorker;
use crate::config::PlayerDataConfig;
use crate::datastore::DataStoreService;
use crate::pipeline::{FlushReport, InitialValue, InitialValueHooks, Pipeline};
use crate::replication::{Replicator, SnapshotSource};
use crate::resolver::{StoreHandle, StoreResolution, StoreResolver};
use crate::schema::DefaultRegistry;
use crate::session::{PlayerId, PlayerSession};
use crate::signal::{CallbackList, Connection};
use crate::PlayerDataError;
use futures::future::{join_all, BoxFuture};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Resolving,
    Ready,
}

/// Payload of the player loaded notification
#[derive(Debug, Clone)]
pub struct PlayerLoaded {
    pub player: PlayerId,
    pub session: Arc<PlayerSession>,
    pub snapshot: HashMap<String, Value>,
}

pub type PlayerLoadedCallback = dyn Fn(PlayerLoaded) -> BoxFuture<'static, ()> + Send + Sync;

/// Player data lifecycle manager
pub struct PlayerDataManager {
    config: PlayerDataConfig,
    service: Arc<dyn DataStoreService>,
    replicator: Arc<dyn Replicator>,
    hooks: InitialValueHooks,
    loaded_callbacks: CallbackList<PlayerLoadedCallback>,
    state: Mutex<LifecycleState>,
    ready: watch::Sender<bool>,
    pipeline: OnceLock<Arc<Pipeline>>,
    sessions: RwLock<HashMap<PlayerId, Arc<PlayerSession>>>,
    /// Loads in flight. `Some(flush)` once the player left mid-load.
    loading: Mutex<HashMap<PlayerId, Option<bool>>>,
    autosave: Mutex<Option<JoinHandle<()>>>,
}

impl PlayerDataManager {
    pub fn new(
        config: PlayerDataConfig,
        service: Arc<dyn DataStoreService>,
        replicator: Arc<dyn Replicator>,
    ) -> Self {
        let (ready, _) = watch::channel(false);
        PlayerDataManager {
            config: config.normalized(),
            service,
            replicator,
            hooks: InitialValueHooks::new(),
            loaded_callbacks: CallbackList::new(),
            state: Mutex::new(LifecycleState::Uninitialized),
            ready,
            pipeline: OnceLock::new(),
            sessions: RwLock::new(HashMap::new()),
            loading: Mutex::new(HashMap::new()),
            autosave: Mutex::new(None),
        }
    }

    /// Resolve every store and arm the manager. Callable exactly once.
    ///
    /// `version` overrides the configured schema version.
    pub async fn init(
        self: &Arc<Self>,
        registry: DefaultRegistry,
        version: Option<u32>,
    ) -> Result<(), PlayerDataError> {
        {
            let mut state = self.state.lock();
            if *state != LifecycleState::Uninitialized {
                return Err(PlayerDataError::AlreadyInitialized);
            }
            *state = LifecycleState::Resolving;
        }

        let mut config = self.config.clone();
        if let Some(version) = version {
            config.version = version;
        }
        info!(store = %config.store_name(), keys = registry.len(), "resolving player data stores");

        let resolver = StoreResolver::resolve_all(self.service.as_ref(), &registry, &config).await;
        let autosave = config.autosave_interval();
        let pipeline = Pipeline::new(Arc::new(registry), resolver, self.hooks.clone(), config);
        if self.pipeline.set(Arc::new(pipeline)).is_err() {
            return Err(PlayerDataError::AlreadyInitialized);
        }

        *self.state.lock() = LifecycleState::Ready;
        self.ready.send_replace(true);
        info!("player data ready");

        if let Some(period) = autosave {
            let worker = AutosaveWorker::new(Arc::downgrade(self), period);
            *self.autosave.lock() = Some(tokio::spawn(worker.run()));
            debug!(period_secs = period.as_secs(), "autosave started");
        }
        Ok(())
    }

    /// Resolves once `init` has completed
    pub async fn wait_until_ready(&self) {
        let mut ready = self.ready.subscribe();
        let _ = ready.wait_for(|ready| *ready).await;
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// Effective configuration; includes the version override once ready
    pub fn config(&self) -> &PlayerDataConfig {
        match self.pipeline.get() {
            Some(pipeline) => pipeline.config(),
            None => &self.config,
        }
    }

    pub fn registry(&self) -> Option<&Arc<DefaultRegistry>> {
        self.pipeline.get().map(|pipeline| pipeline.registry())
    }

    fn pipeline(&self) -> Result<&Arc<Pipeline>, PlayerDataError> {
        self.pipeline.get().ok_or(PlayerDataError::NotReady)
    }

    pub fn get_player_session(&self, player: PlayerId) -> Option<Arc<PlayerSession>> {
        self.sessions.read().get(&player).cloned()
    }

    /// Players with a published session, sorted
    pub fn players(&self) -> Vec<PlayerId> {
        let mut players: Vec<PlayerId> = self.sessions.read().keys().copied().collect();
        players.sort();
        players
    }

    /// Run `callback` for every player once their data is loaded.
    ///
    /// All callbacks for one player are awaited before the session is
    /// marked loaded.
    pub fn on_player_loaded<F, Fut>(&self, callback: F) -> Connection
    where
        F: Fn(PlayerLoaded) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback: Arc<PlayerLoadedCallback> =
            Arc::new(move |event: PlayerLoaded| -> BoxFuture<'static, ()> { Box::pin(callback(event)) });
        self.loaded_callbacks.connect(callback)
    }

    /// Register the initial-value hook for `key`, replacing any previous one
    pub fn on_initial_value(
        &self,
        key: &str,
        hook: impl Fn(&Value) -> InitialValue + Send + Sync + 'static,
    ) -> Connection {
        self.hooks.register(key, hook)
    }

    /// Handle for `key`; absent when ephemeral, unresolved or not ready
    pub fn get_store_handle(&self, key: &str) -> Option<StoreHandle> {
        self.pipeline
            .get()
            .and_then(|pipeline| pipeline.resolver().get_store(key).cloned())
    }

    /// How `key` was resolved; distinguishes ephemeral from unavailable
    pub fn store_resolution(&self, key: &str) -> Option<StoreResolution> {
        self.pipeline
            .get()
            .and_then(|pipeline| pipeline.resolver().resolution(key).cloned())
    }

    /// Handle for `key`, or the reason there is none
    pub fn require_store(&self, key: &str) -> Result<StoreHandle, PlayerDataError> {
        match self.pipeline()?.resolver().resolution(key) {
            Some(StoreResolution::Resolved(handle)) => Ok(handle.clone()),
            Some(_) => Err(PlayerDataError::StoreUnavailable(key.to_string())),
            None => Err(PlayerDataError::UnknownKey(key.to_string())),
        }
    }

    /// Load a joining player and publish their session
    pub async fn player_added(&self, player: PlayerId) -> Result<Arc<PlayerSession>, PlayerDataError> {
        self.begin_load(player)?;
        self.finish_load(player).await
    }

    /// Claim the load slot for `player`
    pub(crate) fn begin_load(&self, player: PlayerId) -> Result<(), PlayerDataError> {
        self.pipeline()?;
        let mut loading = self.loading.lock();
        if loading.contains_key(&player) || self.sessions.read().contains_key(&player) {
            warn!(player = %player, "player already loaded; join ignored");
            return Err(PlayerDataError::AlreadyLoaded(player));
        }
        loading.insert(player, None);
        Ok(())
    }

    pub(crate) async fn finish_load(
        &self,
        player: PlayerId,
    ) -> Result<Arc<PlayerSession>, PlayerDataError> {
        let pipeline = self.pipeline()?;
        debug!(player = %player, "loading player data");

        let seed = pipeline.load(player).await;
        let session = Arc::new(PlayerSession::new(
            player,
            pipeline.registry().clone(),
            self.replicator.clone(),
            seed,
        ));

        let exit = {
            let mut loading = self.loading.lock();
            let exit = loading.remove(&player).flatten();
            if exit.is_none() {
                self.sessions.write().insert(player, session.clone());
            }
            exit
        };

        if let Some(flush) = exit {
            info!(player = %player, "player left during load; session not published");
            self.release(pipeline, &session, flush).await;
            return Ok(session);
        }

        let event = PlayerLoaded {
            player,
            session: session.clone(),
            snapshot: session.snapshot(),
        };
        let callbacks = self.loaded_callbacks.snapshot();
        join_all(callbacks.iter().map(|callback| callback(event.clone()))).await;

        if !session.is_connected() {
            info!(player = %player, "player left before loaded callbacks finished");
            return Ok(session);
        }
        session.mark_loaded();
        info!(
            player = %player,
            degraded = session.degraded_keys().len(),
            "player data loaded"
        );
        Ok(session)
    }

    /// Tear down, flush and remove a leaving player's session
    pub async fn player_removing(&self, player: PlayerId) {
        let Ok(pipeline) = self.pipeline() else {
            return;
        };

        let session = {
            let mut loading = self.loading.lock();
            if let Some(exit) = loading.get_mut(&player) {
                *exit = Some(true);
                debug!(player = %player, "player leaving during load; deferred");
                return;
            }
            self.sessions.read().get(&player).cloned()
        };
        let Some(session) = session else {
            debug!(player = %player, "no session for leaving player");
            return;
        };

        self.release(pipeline, &session, true).await;

        let mut sessions = self.sessions.write();
        if sessions
            .get(&player)
            .is_some_and(|current| Arc::ptr_eq(current, &session))
        {
            sessions.remove(&player);
        }
        info!(player = %player, "player data released");
    }

    async fn release(&self, pipeline: &Pipeline, session: &PlayerSession, flush: bool) {
        session.connections().disconnect_all();
        if flush {
            let report = pipeline.flush(session).await;
            if !report.failed.is_empty() {
                warn!(
                    player = %session.player(),
                    failed = ?report.failed,
                    "some keys were not saved"
                );
            }
        }
        session.mark_disconnected();
        self.replicator.disconnect(session.player());
    }

    /// Flush one player's dirty keys now
    pub async fn save_player(&self, player: PlayerId) -> Result<FlushReport, PlayerDataError> {
        let pipeline = self.pipeline()?;
        let session = self
            .get_player_session(player)
            .ok_or(PlayerDataError::PlayerNotFound(player))?;
        Ok(pipeline.flush(&session).await)
    }

    /// Flush every connected session concurrently; returns sessions flushed
    pub async fn save_all(&self) -> usize {
        let Ok(pipeline) = self.pipeline() else {
            return 0;
        };
        let sessions: Vec<Arc<PlayerSession>> = self
            .sessions
            .read()
            .values()
            .filter(|session| session.is_connected())
            .cloned()
            .collect();
        join_all(sessions.iter().map(|session| pipeline.flush(session))).await;
        sessions.len()
    }

    /// Flush and disconnect every remaining session concurrently
    pub async fn shutdown(&self) {
        if let Some(task) = self.autosave.lock().take() {
            task.abort();
        }
        let Ok(pipeline) = self.pipeline() else {
            return;
        };
        let flush = pipeline.config().flush_on_shutdown();

        let sessions: Vec<Arc<PlayerSession>> = {
            let mut loading = self.loading.lock();
            for exit in loading.values_mut().filter(|exit| exit.is_none()) {
                *exit = Some(flush);
            }
            self.sessions.read().values().cloned().collect()
        };
        info!(sessions = sessions.len(), flush, "shutting down player data");

        join_all(
            sessions
                .iter()
                .map(|session| self.release(pipeline, session, flush)),
        )
        .await;

        self.sessions.write().retain(|_, session| session.is_connected());
    }
}

impl SnapshotSource for PlayerDataManager {
    fn snapshot(&self, player: PlayerId) -> Option<HashMap<String, Value>> {
        self.sessions
            .read()
            .get(&player)
            .filter(|session| session.is_loaded())
            .map(|session| session.snapshot())
    }
}

impl Drop for PlayerDataManager {
    fn drop(&mut self) {
        if let Some(task) = self.autosave.get_mut().take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for PlayerDataManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerDataManager")
            .field("state", &self.state())
            .field("players", &self.players())
            .finish()
    }
}
