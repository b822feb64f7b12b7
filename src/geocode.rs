use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::telemetry::TelemetryClient;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResolvedAddress {
    pub lat: f64,
    pub lng: f64,
    pub cached: bool,
}

impl ResolvedAddress {
    fn new(coords: Coordinates, cached: bool) -> Self {
        Self {
            lat: coords.lat,
            lng: coords.lng,
            cached,
        }
    }
}

/// Exact-match address store. Keys are the literal caller strings; entries are never
/// evicted or overwritten.
#[derive(Clone, Default)]
pub struct GeocodeCache {
    entries: Arc<RwLock<HashMap<String, Coordinates>>>,
}

impl GeocodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: &str) -> Option<Coordinates> {
        self.entries.read().get(address).copied()
    }

    /// Keeps the first coordinates written for `address` and returns them.
    pub fn insert(&self, address: &str, coords: Coordinates) -> Coordinates {
        *self
            .entries
            .write()
            .entry(address.to_string())
            .or_insert(coords)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
pub trait GeocodeProvider: Send + Sync {
    /// Candidate coordinates in provider order; an empty list means no match.
    async fn lookup(&self, address: &str) -> AppResult<Vec<Coordinates>>;
}

#[derive(Clone)]
pub struct GeocodeGateway {
    cache: GeocodeCache,
    provider: Arc<dyn GeocodeProvider>,
    telemetry: TelemetryClient,
}

impl GeocodeGateway {
    pub fn new(
        cache: GeocodeCache,
        provider: Arc<dyn GeocodeProvider>,
        telemetry: TelemetryClient,
    ) -> Self {
        Self {
            cache,
            provider,
            telemetry,
        }
    }

    /// `None` when no provider credential is configured.
    pub fn maybe_from_config(
        config: &AppConfig,
        cache: GeocodeCache,
        telemetry: TelemetryClient,
    ) -> AppResult<Option<Self>> {
        let Some(api_key) = config.google_api_key.clone() else {
            return Ok(None);
        };
        let provider = HttpGeocodeProvider::new(
            config.geocode_endpoint.clone(),
            api_key,
            config.http_timeout(),
        )?
        .with_region(config.geocode_region.clone())
        .with_language(config.geocode_language.clone());
        Ok(Some(Self::new(cache, Arc::new(provider), telemetry)))
    }

    pub fn cache(&self) -> &GeocodeCache {
        &self.cache
    }

    pub async fn resolve(&self, address: &str) -> AppResult<ResolvedAddress> {
        if address.is_empty() {
            return Err(AppError::Validation("address is required".into()));
        }

        if let Some(coords) = self.cache.get(address) {
            debug!(address, "geocode cache hit");
            self.record("geocode_cache_hit", json!({}));
            return Ok(ResolvedAddress::new(coords, true));
        }

        self.record("geocode_provider_call", json!({}));
        let candidates = match self.provider.lookup(address).await {
            Ok(candidates) => candidates,
            Err(AppError::Provider(message)) => return Err(AppError::Provider(message)),
            Err(err) => {
                warn!(?err, "geocoding provider failed");
                return Err(AppError::Provider(err.to_string()));
            }
        };

        let Some(first) = candidates.into_iter().next() else {
            debug!(address, "geocoding provider returned no results");
            self.record("geocode_not_found", json!({}));
            return Err(AppError::NotFound(address.to_string()));
        };

        let coords = self.cache.insert(address, first);
        Ok(ResolvedAddress::new(coords, false))
    }

    /// Joins the non-empty parts as `"street, city"` and resolves that string.
    pub async fn resolve_parts(&self, street: &str, city: &str) -> AppResult<ResolvedAddress> {
        let query = [street, city]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(", ");
        self.resolve(&query).await
    }

    fn record(&self, name: &str, payload: Value) {
        if let Err(err) = self.telemetry.record(name, payload) {
            warn!(?err, "failed to record telemetry event");
        }
    }
}

pub struct HttpGeocodeProvider {
    http: Client,
    endpoint: String,
    api_key: SecretString,
    region: Option<String>,
    language: Option<String>,
}

impl HttpGeocodeProvider {
    pub fn new(endpoint: String, api_key: SecretString, timeout: Duration) -> AppResult<Self> {
        let http = Client::builder()
            .user_agent("givit-map-cache/0.1.0")
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::Config(format!("geocode http client: {err}")))?;
        Ok(Self {
            http,
            endpoint,
            api_key,
            region: None,
            language: None,
        })
    }

    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language;
        self
    }
}

#[async_trait]
impl GeocodeProvider for HttpGeocodeProvider {
    async fn lookup(&self, address: &str) -> AppResult<Vec<Coordinates>> {
        #[derive(Deserialize)]
        struct Response {
            status: Option<String>,
            error_message: Option<String>,
            #[serde(default)]
            results: Vec<ResponseResult>,
        }

        #[derive(Deserialize)]
        struct ResponseResult {
            geometry: ResponseGeometry,
        }

        #[derive(Deserialize)]
        struct ResponseGeometry {
            location: Coordinates,
        }

        let mut query = vec![("address", address), ("key", self.api_key.expose_secret())];
        if let Some(region) = &self.region {
            query.push(("region", region.as_str()));
        }
        if let Some(language) = &self.language {
            query.push(("language", language.as_str()));
        }

        let response = self
            .http
            .get(&self.endpoint)
            .query(&query)
            .send()
            .await
            .map_err(|err| AppError::Provider(format!("request failed: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Provider(format!("provider responded with HTTP {status}")));
        }

        let parsed: Response = response
            .json()
            .await
            .map_err(|err| AppError::Provider(format!("malformed response: {err}")))?;

        match parsed.status.as_deref() {
            None | Some("OK") | Some("ZERO_RESULTS") => Ok(parsed
                .results
                .into_iter()
                .map(|result| result.geometry.location)
                .collect()),
            Some(other) => Err(AppError::Provider(match parsed.error_message {
                Some(message) => format!("{other}: {message}"),
                None => other.to_string(),
            })),
        }
    }
}
