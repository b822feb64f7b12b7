mod cache;
mod config;
mod conversation;
mod coordinator;
mod errors;
mod geocode;
mod listings;
mod prefetch;
mod tabs;
mod telemetry;

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use cache::{CacheEntry, TtlCache};
pub use config::{AppConfig, PublicAppConfig};
pub use conversation::{ConversationState, ConversationTracker, NavigationEvent};
pub use coordinator::{FetchCoordinator, ListingsView, LoadOutcome};
pub use errors::{AppError, AppResult};
pub use geocode::{
    Coordinates, GeocodeCache, GeocodeGateway, GeocodeProvider, HttpGeocodeProvider,
    ResolvedAddress,
};
pub use listings::{
    normalize_listing, normalize_listings, Category, HttpListingsSource, ListingRecord, Listings,
    ListingsCache, ListingsSource,
};
pub use prefetch::PrefetchScheduler;
pub use tabs::TabSwitcher;
pub use telemetry::{TelemetryClient, TelemetryEvent};

/// Process-wide wiring: shared caches and clients handed to every UI surface.
pub struct MapDataRuntime {
    config: AppConfig,
    listings_cache: ListingsCache,
    source: Arc<dyn ListingsSource>,
    geocoder: Option<GeocodeGateway>,
    telemetry: TelemetryClient,
}

impl MapDataRuntime {
    pub fn initialize() -> AppResult<Self> {
        init_tracing();
        Self::from_config(AppConfig::from_env())
    }

    pub fn from_config(config: AppConfig) -> AppResult<Self> {
        let telemetry = TelemetryClient::from_config(&config)?;
        let listings_cache = ListingsCache::new(config.cache_ttl());
        let source = HttpListingsSource::new(config.listings_api_url.clone(), config.http_timeout())?;
        let geocoder =
            GeocodeGateway::maybe_from_config(&config, GeocodeCache::new(), telemetry.clone())?;
        if geocoder.is_none() {
            warn!("GOOGLE_API_KEY not set; address lookups are disabled");
        }
        info!(
            listings_api_url = %config.listings_api_url,
            ttl_secs = config.listings_cache_ttl_secs,
            "map data runtime ready"
        );

        Ok(Self {
            config,
            listings_cache,
            source: Arc::new(source),
            geocoder,
            telemetry,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn listings_cache(&self) -> &ListingsCache {
        &self.listings_cache
    }

    pub fn telemetry(&self) -> &TelemetryClient {
        &self.telemetry
    }

    /// A new coordinator over the shared cache; create one per UI surface.
    pub fn coordinator(&self) -> AppResult<Arc<FetchCoordinator>> {
        FetchCoordinator::new(
            self.listings_cache.clone(),
            Arc::clone(&self.source),
            PrefetchScheduler::new(self.listings_cache.clone(), self.config.prefetch_delay()),
            self.telemetry.clone(),
        )
    }

    pub fn tab_switcher(&self) -> AppResult<TabSwitcher> {
        Ok(TabSwitcher::new(self.coordinator()?, self.config.tab_debounce()))
    }

    pub async fn resolve_address(&self, address: &str) -> AppResult<ResolvedAddress> {
        let geocoder = self
            .geocoder
            .as_ref()
            .ok_or_else(|| AppError::Config("geocoding requires GOOGLE_API_KEY".into()))?;
        geocoder.resolve(address).await
    }

    pub fn shutdown(&self) {
        if let Err(err) = self.telemetry.flush() {
            warn!(?err, "failed to flush telemetry queue");
        }
    }
}

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,givit_map_cache=debug"));
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init();
    });
}
