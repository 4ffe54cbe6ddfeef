// ============================
// crates/backend-lib/src/sweeper.rs
// ============================
//! Periodic background cleanup tasks.
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Owner of a background sweep task. Dropping it stops the task.
#[derive(Debug)]
pub struct SweeperHandle {
    handle: JoinHandle<()>,
}

impl SweeperHandle {
    /// Run `sweep` every `period`, starting one period from now
    pub(crate) fn spawn<F>(period: Duration, mut sweep: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                sweep();
            }
        });
        Self { handle }
    }

    /// Stop the sweeper and wait for it to finish
    pub async fn shutdown(mut self) {
        self.handle.abort();
        // Cancellation is the expected outcome here
        let _ = (&mut self.handle).await;
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
