//! Background Tasks
//!
//! Fire-and-forget work (post-send webhooks and persistence) tracked so it can
//! be drained on shutdown. Each failure is logged once, never propagated.

use std::fmt::Display;
use std::future::Future;

use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `fut` detached from the caller.
    pub fn spawn<F, E>(&self, label: &'static str, fut: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        self.tracker.spawn(async move {
            match fut.await {
                Ok(()) => debug!(task = label, "Background task finished"),
                Err(e) => warn!(task = label, error = %e, "Background task failed"),
            }
        });
    }

    /// Tasks still running.
    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Wait for every task spawned so far; new spawns are accepted afterwards.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
