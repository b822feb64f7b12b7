use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch, Notify};
use tokio::time::sleep;
use tracing::{debug, trace, warn};

use crate::errors::{AppError, AppResult};
use crate::listings::{normalize_listings, Category, Listings, ListingsCache, ListingsSource};
use crate::prefetch::PrefetchScheduler;
use crate::telemetry::TelemetryClient;

/// What a UI surface renders: the last published listings plus request status.
#[derive(Debug, Clone, Default)]
pub struct ListingsView {
    pub data: Listings,
    pub is_fetching: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub enum LoadOutcome {
    Cached(Listings),
    Fetched(Listings),
    /// A newer call on the same coordinator took over; nothing was applied.
    Superseded,
}

impl LoadOutcome {
    pub fn listings(&self) -> Option<&Listings> {
        match self {
            LoadOutcome::Cached(listings) | LoadOutcome::Fetched(listings) => Some(listings),
            LoadOutcome::Superseded => None,
        }
    }

    pub fn into_listings(self) -> Option<Listings> {
        match self {
            LoadOutcome::Cached(listings) | LoadOutcome::Fetched(listings) => Some(listings),
            LoadOutcome::Superseded => None,
        }
    }

    pub fn is_superseded(&self) -> bool {
        matches!(self, LoadOutcome::Superseded)
    }
}

#[derive(Default)]
pub(crate) struct CancelHandle {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelHandle {
    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub(crate) async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Clone)]
pub(crate) struct InFlightTicket {
    generation: u64,
    handle: Arc<CancelHandle>,
}

impl InFlightTicket {
    pub(crate) fn handle(&self) -> &CancelHandle {
        &self.handle
    }
}

#[derive(Default)]
struct SlotState {
    generation: u64,
    active: Option<InFlightTicket>,
}

// Slot of one: only the active ticket may commit.
#[derive(Default)]
pub(crate) struct InFlightSlot {
    state: Mutex<SlotState>,
}

impl InFlightSlot {
    pub(crate) fn begin(&self) -> InFlightTicket {
        let mut state = self.state.lock();
        if let Some(previous) = state.active.take() {
            previous.handle.cancel();
        }
        state.generation += 1;
        let ticket = InFlightTicket {
            generation: state.generation,
            handle: Arc::new(CancelHandle::default()),
        };
        state.active = Some(ticket.clone());
        ticket
    }

    pub(crate) fn finish<R>(&self, ticket: &InFlightTicket, commit: impl FnOnce() -> R) -> Option<R> {
        let mut state = self.state.lock();
        match &state.active {
            Some(active) if active.generation == ticket.generation => {
                state.active = None;
                Some(commit())
            }
            _ => None,
        }
    }

    #[cfg(test)]
    pub(crate) fn is_busy(&self) -> bool {
        self.state.lock().active.is_some()
    }
}

enum FetchFailure {
    Cancelled,
    Failed(AppError),
}

pub struct FetchCoordinator {
    cache: ListingsCache,
    source: Arc<dyn ListingsSource>,
    prefetch: PrefetchScheduler,
    prefetch_tx: mpsc::UnboundedSender<Category>,
    in_flight: InFlightSlot,
    state: watch::Sender<ListingsView>,
    telemetry: TelemetryClient,
}

impl FetchCoordinator {
    /// Fails with [`AppError::Config`] when called outside a tokio runtime.
    pub fn new(
        cache: ListingsCache,
        source: Arc<dyn ListingsSource>,
        prefetch: PrefetchScheduler,
        telemetry: TelemetryClient,
    ) -> AppResult<Arc<Self>> {
        let runtime = Handle::try_current().map_err(|_| {
            AppError::Config("listings coordinator requires a tokio runtime".into())
        })?;
        let (prefetch_tx, prefetch_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ListingsView::default());
        let delay = prefetch.delay();
        Ok(Arc::new_cyclic(|coordinator| {
            runtime.spawn(run_prefetch_worker(coordinator.clone(), prefetch_rx, delay));
            Self {
                cache,
                source,
                prefetch,
                prefetch_tx,
                in_flight: InFlightSlot::default(),
                state,
                telemetry,
            }
        }))
    }

    pub fn subscribe(&self) -> watch::Receiver<ListingsView> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> ListingsView {
        self.state.borrow().clone()
    }

    #[cfg(test)]
    pub(crate) fn has_request_in_flight(&self) -> bool {
        self.in_flight.is_busy()
    }

    pub async fn load(&self, category: Category, background: bool) -> AppResult<LoadOutcome> {
        if let Some(entry) = self.cache.get(&category) {
            if self.cache.is_fresh(&entry) {
                debug!(%category, background, "serving fresh listings from cache");
                if !background {
                    self.publish_data(entry.data.clone());
                }
                self.record(
                    "listings_cache_hit",
                    json!({ "category": category.as_tag(), "background": background }),
                );
                return Ok(LoadOutcome::Cached(entry.data));
            }
            if !background {
                debug!(%category, "showing stale listings while revalidating");
                self.publish_data(entry.data);
            }
        }

        self.state.send_modify(|view| {
            if !background {
                view.is_fetching = true;
            }
            view.error = None;
        });

        let ticket = self.in_flight.begin();
        let fetched = tokio::select! {
            biased;
            _ = ticket.handle().cancelled() => Err(FetchFailure::Cancelled),
            result = self.fetch_normalized(category) => result.map_err(FetchFailure::Failed),
        };

        match fetched {
            Ok(listings) => {
                let committed = self.in_flight.finish(&ticket, || {
                    self.cache.set(category, Arc::clone(&listings));
                    self.state.send_modify(|view| {
                        view.data = Arc::clone(&listings);
                        view.is_fetching = false;
                    });
                });
                if committed.is_none() {
                    trace!(%category, "discarding listings from superseded request");
                    return Ok(LoadOutcome::Superseded);
                }
                trace!(%category, count = listings.len(), background, "listings committed");
                self.record(
                    "listings_fetched",
                    json!({
                        "category": category.as_tag(),
                        "count": listings.len(),
                        "background": background,
                    }),
                );
                self.schedule_prefetch(category);
                Ok(LoadOutcome::Fetched(listings))
            }
            Err(FetchFailure::Cancelled) => {
                trace!(%category, "listings request superseded");
                Ok(LoadOutcome::Superseded)
            }
            Err(FetchFailure::Failed(err)) => {
                let message = err.to_string();
                let committed = self.in_flight.finish(&ticket, || {
                    self.state.send_modify(|view| {
                        view.error = Some(message.clone());
                        view.is_fetching = false;
                    });
                });
                if committed.is_none() {
                    trace!(%category, "ignoring failure of superseded request");
                    return Ok(LoadOutcome::Superseded);
                }
                warn!(?err, %category, background, "listings fetch failed");
                self.record(
                    "listings_fetch_failed",
                    json!({ "category": category.as_tag(), "error": message }),
                );
                Err(err)
            }
        }
    }

    async fn fetch_normalized(&self, category: Category) -> AppResult<Listings> {
        let payload = self.source.fetch(category).await?;
        Ok(Arc::new(normalize_listings(category, payload)))
    }

    fn publish_data(&self, data: Listings) {
        self.state.send_modify(|view| view.data = data);
    }

    fn schedule_prefetch(&self, loaded: Category) {
        let Some(other) = self.prefetch.plan(loaded) else {
            return;
        };
        debug!(%loaded, %other, "scheduling background prefetch");
        self.record(
            "prefetch_scheduled",
            json!({ "loaded": loaded.as_tag(), "prefetch": other.as_tag() }),
        );
        if self.prefetch_tx.send(other).is_err() {
            warn!(%other, "prefetch worker stopped; skipping prefetch");
        }
    }

    fn record(&self, name: &str, payload: Value) {
        if let Err(err) = self.telemetry.record(name, payload) {
            warn!(?err, "failed to record telemetry event");
        }
    }
}

async fn run_prefetch_worker(
    coordinator: Weak<FetchCoordinator>,
    mut requests: mpsc::UnboundedReceiver<Category>,
    delay: Duration,
) {
    while let Some(category) = requests.recv().await {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            sleep(delay).await;
            let Some(coordinator) = coordinator.upgrade() else {
                return;
            };
            if let Err(err) = coordinator.load(category, true).await {
                warn!(?err, %category, "background prefetch failed");
            }
        });
    }
}
