use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::cache::TtlCache;
use crate::errors::{AppError, AppResult};

pub type Listings = Arc<Vec<ListingRecord>>;
pub type ListingsCache = TtlCache<Category, Listings>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Rentals,
    Services,
    RentalRequests,
    ServiceRequests,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Rentals,
        Category::Services,
        Category::RentalRequests,
        Category::ServiceRequests,
    ];

    pub fn as_tag(&self) -> &'static str {
        match self {
            Category::Rentals => "rentals",
            Category::Services => "services",
            Category::RentalRequests => "rental_requests",
            Category::ServiceRequests => "service_requests",
        }
    }

    /// Offers pair with their requests; the pairing is symmetric.
    pub fn complement(&self) -> Category {
        match self {
            Category::Services => Category::ServiceRequests,
            Category::ServiceRequests => Category::Services,
            Category::Rentals => Category::RentalRequests,
            Category::RentalRequests => Category::Rentals,
        }
    }

    pub fn parse(value: &str) -> AppResult<Self> {
        let tag = value.trim();
        if tag.is_empty() {
            return Err(AppError::Validation("category is required".into()));
        }
        Category::ALL
            .into_iter()
            .find(|category| category.as_tag() == tag)
            .ok_or_else(|| AppError::Validation(format!("unknown category: {tag}")))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingRecord {
    pub id: String,
    pub lat: f64,
    pub lng: f64,
    pub category: Category,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Keeps response order; items without usable coordinates are dropped.
pub fn normalize_listings(category: Category, payload: Value) -> Vec<ListingRecord> {
    let Value::Array(items) = payload else {
        debug!(%category, "listings payload is not an array; treating as empty");
        return Vec::new();
    };

    let total = items.len();
    let records: Vec<ListingRecord> = items
        .into_iter()
        .filter_map(|item| normalize_listing(category, item))
        .collect();
    if records.len() < total {
        trace!(
            %category,
            dropped = total - records.len(),
            "dropped listings without finite coordinates"
        );
    }
    records
}

pub fn normalize_listing(category: Category, raw: Value) -> Option<ListingRecord> {
    let Value::Object(mut fields) = raw else {
        return None;
    };

    // GeoJSON order: coordinates[0] is longitude, coordinates[1] is latitude.
    let lat = resolve_axis(&fields, "lat", 1)?;
    let lng = resolve_axis(&fields, "lng", 0)?;
    let id = resolve_id(&fields);

    for key in ["id", "lat", "lng", "category"] {
        fields.remove(key);
    }

    Some(ListingRecord {
        id,
        lat,
        lng,
        category,
        fields,
    })
}

fn resolve_axis(fields: &Map<String, Value>, flat: &str, index: usize) -> Option<f64> {
    match fields.get(flat) {
        Some(value) if !value.is_null() => finite(value),
        _ => fields
            .get("location")
            .and_then(|location| location.get("coordinates"))
            .and_then(|pair| pair.get(index))
            .and_then(finite),
    }
}

fn finite(value: &Value) -> Option<f64> {
    value.as_f64().filter(|number| number.is_finite())
}

fn resolve_id(fields: &Map<String, Value>) -> String {
    ["_id", "id"]
        .into_iter()
        .filter_map(|key| fields.get(key))
        .find_map(|value| match value {
            Value::String(text) if !text.is_empty() => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        })
        .unwrap_or_default()
}

#[async_trait]
pub trait ListingsSource: Send + Sync {
    /// Raw response body for `category`. Non-2xx statuses are `AppError::Transport`.
    async fn fetch(&self, category: Category) -> AppResult<Value>;
}

pub struct HttpListingsSource {
    http: Client,
    base_url: String,
}

impl HttpListingsSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let http = Client::builder()
            .user_agent("givit-map-cache/0.1.0")
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::Config(format!("listings http client: {err}")))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    pub fn url_for(&self, category: Category) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            category.as_tag()
        )
    }
}

#[async_trait]
impl ListingsSource for HttpListingsSource {
    async fn fetch(&self, category: Category) -> AppResult<Value> {
        let response = self.http.get(self.url_for(category)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Transport {
                status: status.as_u16(),
            });
        }
        let body = response
            .json::<Value>()
            .await
            .map_err(|err| AppError::Network(format!("invalid listings body: {err}")))?;
        Ok(body)
    }
}
