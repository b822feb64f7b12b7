use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::coordinator::FetchCoordinator;
use crate::listings::Category;

/// Debounces tab selections so a burst of switches issues one foreground load.
pub struct TabSwitcher {
    coordinator: Arc<FetchCoordinator>,
    debounce: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl TabSwitcher {
    pub fn new(coordinator: Arc<FetchCoordinator>, debounce: Duration) -> Self {
        Self {
            coordinator,
            debounce,
            pending: Mutex::new(None),
        }
    }

    pub fn coordinator(&self) -> &Arc<FetchCoordinator> {
        &self.coordinator
    }

    pub fn select(&self, category: Category) {
        let coordinator = Arc::clone(&self.coordinator);
        let debounce = self.debounce;
        let task = tokio::spawn(async move {
            sleep(debounce).await;
            // Detached so a later selection only cancels the timer, never a started load.
            tokio::spawn(async move {
                if let Err(err) = coordinator.load(category, false).await {
                    warn!(?err, %category, "tab load failed");
                }
            });
        });

        if let Some(previous) = self.pending.lock().replace(task) {
            if !previous.is_finished() {
                debug!(%category, "replacing pending tab selection");
            }
            previous.abort();
        }
    }
}

impl Drop for TabSwitcher {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.lock().take() {
            pending.abort();
        }
    }
}
