//! Load and Flush Pipelines
//!
//! Both pipelines fan out one task per key and join them before returning.
//! Per-key failures are retried, logged and contained; no key's failure
//! affects its siblings or the surrounding session.
//!
//! ```text
//! load:  registry key ─► store.get (retries) ─► default on miss ─► hook ─► SessionSeed
//! flush: dirty key ─► floor if ordered ─► coerce session ─► store.set (retries)
//! ```

pub mod flush;
pub mod hooks;
pub mod load;

pub use flush::FlushReport;
pub use hooks::{InitialValue, InitialValueHook, InitialValueHooks};

use crate::config::PlayerDataConfig;
use crate::resolver::StoreResolver;
use crate::retry::RetryPolicy;
use crate::schema::DefaultRegistry;
use std::sync::Arc;

/// Everything load and flush need, fixed once store resolution completes
#[derive(Debug)]
pub struct Pipeline {
    registry: Arc<DefaultRegistry>,
    resolver: StoreResolver,
    hooks: InitialValueHooks,
    config: PlayerDataConfig,
}

impl Pipeline {
    pub fn new(
        registry: Arc<DefaultRegistry>,
        resolver: StoreResolver,
        hooks: InitialValueHooks,
        config: PlayerDataConfig,
    ) -> Self {
        Pipeline {
            registry,
            resolver,
            hooks,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<DefaultRegistry> {
        &self.registry
    }

    pub fn resolver(&self) -> &StoreResolver {
        &self.resolver
    }

    pub fn config(&self) -> &PlayerDataConfig {
        &self.config
    }

    fn load_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.config.load_retries, self.config.retry_backoff())
    }

    fn save_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.config.save_retries, self.config.retry_backoff())
    }
}
