use crate::manager::PlayerDataManager;
use std::sync::Weak;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::debug;

/// Periodically flushes every connected session
///
/// Holds only a weak reference; the loop ends once the manager is dropped.
pub struct AutosaveWorker {
    manager: Weak<PlayerDataManager>,
    period: Duration,
}

impl AutosaveWorker {
    pub fn new(manager: Weak<PlayerDataManager>, period: Duration) -> Self {
        AutosaveWorker { manager, period }
    }

    pub async fn run(self) {
        let mut tick = interval(self.period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        tick.tick().await;

        loop {
            tick.tick().await;
            let Some(manager) = self.manager.upgrade() else {
                break;
            };
            let saved = manager.save_all().await;
            debug!(sessions = saved, "autosave pass complete");
        }
    }
}
