use crate::manager::PlayerDataManager;
use crate::session::PlayerId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Process notifications from the game host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    Joined(PlayerId),
    Leaving(PlayerId),
    Shutdown,
}

impl PlayerDataManager {
    /// Drive the manager from host events until shutdown.
    ///
    /// Events received before `init` completes are held until ready, so
    /// players who joined early are still loaded. Loads and leaves for
    /// different players run concurrently. On shutdown, in-flight loads and
    /// leaves run to completion before the remaining sessions are flushed.
    pub async fn run_host_events(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<HostEvent>) {
        self.wait_until_ready().await;
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
                event = events.recv() => match event {
                    Some(HostEvent::Joined(player)) => {
                        // Claim the slot now so a following leave sees the load
                        if self.begin_load(player).is_ok() {
                            let manager = self.clone();
                            tasks.spawn(async move {
                                let _ = manager.finish_load(player).await;
                            });
                        }
                    }
                    Some(HostEvent::Leaving(player)) => {
                        let manager = self.clone();
                        tasks.spawn(async move { manager.player_removing(player).await });
                    }
                    Some(HostEvent::Shutdown) => {
                        info!("host shutdown received");
                        break;
                    }
                    None => {
                        debug!("host event channel closed");
                        break;
                    }
                },
            }
        }

        while tasks.join_next().await.is_some() {}
        self.shutdown().await;
    }
}
