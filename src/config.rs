use std::path::PathBuf;
use std::time::Duration;
use std::{env, io};

use secrecy::SecretString;
use serde::Serialize;
use tracing::debug;

pub const DEFAULT_LISTINGS_API_URL: &str = "https://giveit-backend.onrender.com/api";
pub const DEFAULT_GEOCODE_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/geocode/json";
pub const DEFAULT_CACHE_TTL_SECS: u64 = 5 * 60;
pub const DEFAULT_PREFETCH_DELAY_MS: u64 = 100;
pub const DEFAULT_TAB_DEBOUNCE_MS: u64 = 150;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;
const DEFAULT_TELEMETRY_BATCH_SIZE: usize = 25;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub listings_api_url: String,
    pub listings_cache_ttl_secs: u64,
    pub prefetch_delay_ms: u64,
    pub tab_debounce_ms: u64,
    pub http_timeout_secs: u64,
    pub geocode_endpoint: String,
    pub geocode_region: Option<String>,
    pub geocode_language: Option<String>,
    pub google_api_key: Option<SecretString>,
    pub telemetry_enabled_by_default: bool,
    pub telemetry_batch_size: usize,
    pub telemetry_dir: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PublicAppConfig {
    pub listings_api_url: String,
    pub listings_cache_ttl_secs: u64,
    pub prefetch_delay_ms: u64,
    pub tab_debounce_ms: u64,
    pub http_timeout_secs: u64,
    pub geocode_endpoint: String,
    pub geocode_region: Option<String>,
    pub geocode_language: Option<String>,
    pub has_google_api_key: bool,
    pub telemetry_enabled_by_default: bool,
    pub telemetry_batch_size: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        Self {
            listings_api_url: env::var("LISTINGS_API_URL")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_LISTINGS_API_URL.to_string()),
            listings_cache_ttl_secs: parse_u64("LISTINGS_CACHE_TTL_SECS", DEFAULT_CACHE_TTL_SECS),
            prefetch_delay_ms: parse_u64("PREFETCH_DELAY_MS", DEFAULT_PREFETCH_DELAY_MS),
            tab_debounce_ms: parse_u64("TAB_DEBOUNCE_MS", DEFAULT_TAB_DEBOUNCE_MS),
            http_timeout_secs: parse_u64("HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS).max(1),
            geocode_endpoint: env::var("GEOCODE_ENDPOINT")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_GEOCODE_ENDPOINT.to_string()),
            geocode_region: non_empty("GEOCODE_REGION"),
            geocode_language: non_empty("GEOCODE_LANGUAGE"),
            google_api_key: non_empty("GOOGLE_API_KEY").map(SecretString::from),
            telemetry_enabled_by_default: parse_bool("TELEMETRY_ENABLED", true),
            telemetry_batch_size: parse_usize("TELEMETRY_BATCH_SIZE", DEFAULT_TELEMETRY_BATCH_SIZE)
                .max(1),
            telemetry_dir: non_empty("TELEMETRY_DIR").map(PathBuf::from),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.listings_cache_ttl_secs)
    }

    pub fn prefetch_delay(&self) -> Duration {
        Duration::from_millis(self.prefetch_delay_ms)
    }

    pub fn tab_debounce(&self) -> Duration {
        Duration::from_millis(self.tab_debounce_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn public_profile(&self) -> PublicAppConfig {
        PublicAppConfig {
            listings_api_url: self.listings_api_url.clone(),
            listings_cache_ttl_secs: self.listings_cache_ttl_secs,
            prefetch_delay_ms: self.prefetch_delay_ms,
            tab_debounce_ms: self.tab_debounce_ms,
            http_timeout_secs: self.http_timeout_secs,
            geocode_endpoint: self.geocode_endpoint.clone(),
            geocode_region: self.geocode_region.clone(),
            geocode_language: self.geocode_language.clone(),
            has_google_api_key: self.google_api_key.is_some(),
            telemetry_enabled_by_default: self.telemetry_enabled_by_default,
            telemetry_batch_size: self.telemetry_batch_size,
        }
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default)
}
