use std::sync::Arc;
use std::time::Duration;

use httptest::matchers::{all_of, contains, request, url_decoded};
use httptest::responders::{json_encoded, status_code};
use httptest::{Expectation, Server};
use secrecy::SecretString;
use serde_json::json;
use tempfile::tempdir;

use givit_map_cache::{
    AppConfig, AppError, Category, FetchCoordinator, GeocodeCache, GeocodeGateway,
    HttpGeocodeProvider, HttpListingsSource, ListingsCache, LoadOutcome, MapDataRuntime,
    PrefetchScheduler, TelemetryClient,
};

fn coordinator_at(base_url: String, cache: &ListingsCache) -> Arc<FetchCoordinator> {
    let source = HttpListingsSource::new(base_url, Duration::from_secs(5)).unwrap();
    FetchCoordinator::new(
        cache.clone(),
        Arc::new(source),
        PrefetchScheduler::new(cache.clone(), Duration::from_millis(100)),
        TelemetryClient::in_memory(),
    )
    .unwrap()
}

fn coordinator_for(server: &Server, cache: &ListingsCache) -> Arc<FetchCoordinator> {
    coordinator_at(server.url("/api").to_string(), cache)
}

fn geocoder_for(server: &Server) -> GeocodeGateway {
    let provider = HttpGeocodeProvider::new(
        server.url("/maps/api/geocode/json").to_string(),
        SecretString::from("test-key".to_string()),
        Duration::from_secs(5),
    )
    .unwrap()
    .with_region(Some("il".into()))
    .with_language(Some("he".into()));
    GeocodeGateway::new(
        GeocodeCache::new(),
        Arc::new(provider),
        TelemetryClient::in_memory(),
    )
}

#[tokio::test]
async fn listings_are_fetched_once_and_normalized() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/api/services"))
            .times(1)
            .respond_with(json_encoded(json!([
                { "_id": "s1", "lat": 32.08, "lng": 34.78, "title": "Bike repair" },
                { "_id": "s2", "location": { "type": "Point", "coordinates": [34.9896, 32.7940] } },
                { "_id": "s3", "lat": "not a number", "lng": 34.78 }
            ]))),
    );

    let cache = ListingsCache::new(Duration::from_secs(300));
    cache.set(Category::ServiceRequests, Arc::new(Vec::new()));
    let coordinator = coordinator_for(&server, &cache);

    let first = coordinator.load(Category::Services, false).await.unwrap();
    let second = coordinator.load(Category::Services, false).await.unwrap();

    assert!(matches!(first, LoadOutcome::Fetched(_)));
    assert!(matches!(second, LoadOutcome::Cached(_)));

    let listings = second.into_listings().unwrap();
    assert_eq!(listings.len(), 2);
    assert_eq!(listings[1].id, "s2");
    assert!((listings[1].lat - 32.794).abs() < 1e-9);
    assert!((listings[1].lng - 34.9896).abs() < 1e-9);
    assert!(listings.iter().all(|record| record.category == Category::Services));
}

#[tokio::test]
async fn non_success_status_is_a_transport_error() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/api/rentals"))
            .times(1)
            .respond_with(status_code(503)),
    );

    let cache = ListingsCache::new(Duration::from_secs(300));
    let coordinator = coordinator_for(&server, &cache);

    let err = coordinator.load(Category::Rentals, false).await.unwrap_err();
    assert!(matches!(err, AppError::Transport { status: 503 }));

    let view = coordinator.snapshot();
    assert!(!view.is_fetching);
    assert_eq!(
        view.error.as_deref(),
        Some("listings service responded with HTTP 503")
    );
    assert!(cache.get(&Category::Rentals).is_none());
}

#[tokio::test]
async fn unreachable_service_is_a_network_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let cache = ListingsCache::new(Duration::from_secs(300));
    let coordinator = coordinator_at(format!("http://127.0.0.1:{port}/api"), &cache);

    let err = coordinator.load(Category::Rentals, false).await.unwrap_err();
    assert!(matches!(err, AppError::Network(_)));

    let view = coordinator.snapshot();
    assert!(!view.is_fetching);
    assert!(view.error.is_some());
    assert!(cache.get(&Category::Rentals).is_none());
}

#[tokio::test]
async fn non_array_body_loads_as_empty() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/api/rental_requests"))
            .times(1)
            .respond_with(json_encoded(json!({ "message": "maintenance" }))),
    );

    let cache = ListingsCache::new(Duration::from_secs(300));
    cache.set(Category::Rentals, Arc::new(Vec::new()));
    let coordinator = coordinator_for(&server, &cache);

    let outcome = coordinator
        .load(Category::RentalRequests, false)
        .await
        .unwrap();
    assert!(outcome.listings().unwrap().is_empty());
    assert!(cache.get(&Category::RentalRequests).is_some());
}

#[tokio::test]
async fn geocode_results_are_cached_per_literal_address() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/maps/api/geocode/json"),
            request::query(url_decoded(contains(("address", "221B Baker St")))),
            request::query(url_decoded(contains(("key", "test-key")))),
            request::query(url_decoded(contains(("region", "il")))),
            request::query(url_decoded(contains(("language", "he")))),
        ])
        .times(1)
        .respond_with(json_encoded(json!({
            "status": "OK",
            "results": [
                { "geometry": { "location": { "lat": 51.5237, "lng": -0.1585 } } },
                { "geometry": { "location": { "lat": 0.0, "lng": 0.0 } } }
            ]
        }))),
    );

    let geocoder = geocoder_for(&server);
    let first = geocoder.resolve("221B Baker St").await.unwrap();
    let second = geocoder.resolve("221B Baker St").await.unwrap();

    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(first.lat, 51.5237);
    assert_eq!(first.lng, -0.1585);
    assert_eq!((first.lat, first.lng), (second.lat, second.lng));
}

#[tokio::test]
async fn geocode_failures_are_classified_and_not_cached() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/maps/api/geocode/json"),
            request::query(url_decoded(contains(("address", "Nowhere")))),
        ])
        .times(1)
        .respond_with(json_encoded(json!({ "status": "ZERO_RESULTS", "results": [] }))),
    );
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/maps/api/geocode/json"),
            request::query(url_decoded(contains(("address", "Denied")))),
        ])
        .times(1)
        .respond_with(json_encoded(json!({
            "status": "REQUEST_DENIED",
            "error_message": "The provided API key is invalid.",
            "results": []
        }))),
    );
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/maps/api/geocode/json"),
            request::query(url_decoded(contains(("address", "Broken")))),
        ])
        .times(1)
        .respond_with(status_code(500)),
    );

    let geocoder = geocoder_for(&server);

    let err = geocoder.resolve("Nowhere").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = geocoder.resolve("Denied").await.unwrap_err();
    match err {
        AppError::Provider(message) => assert!(message.contains("REQUEST_DENIED")),
        other => panic!("unexpected error: {other:?}"),
    }

    let err = geocoder.resolve("Broken").await.unwrap_err();
    assert!(matches!(err, AppError::Provider(_)));

    assert!(geocoder.cache().is_empty());
}

#[tokio::test]
async fn runtime_wires_shared_cache_and_telemetry_buffer() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/api/rentals"))
            .times(1)
            .respond_with(json_encoded(json!([{ "_id": "r1", "lat": 31.77, "lng": 35.21 }]))),
    );

    let dir = tempdir().unwrap();
    let mut config = AppConfig::from_env();
    config.listings_api_url = server.url("/api").to_string();
    config.listings_cache_ttl_secs = 300;
    config.google_api_key = None;
    config.telemetry_enabled_by_default = true;
    config.telemetry_batch_size = 100;
    config.telemetry_dir = Some(dir.path().to_path_buf());

    let runtime = MapDataRuntime::from_config(config).unwrap();
    runtime
        .listings_cache()
        .set(Category::RentalRequests, Arc::new(Vec::new()));

    let map_tab = runtime.coordinator().unwrap();
    let list_tab = runtime.coordinator().unwrap();
    map_tab.load(Category::Rentals, false).await.unwrap();
    let shared = list_tab.load(Category::Rentals, false).await.unwrap();
    assert!(matches!(shared, LoadOutcome::Cached(_)));

    let err = runtime.resolve_address("221B Baker St").await.unwrap_err();
    assert!(matches!(err, AppError::Config(_)));

    runtime.shutdown();
    let buffer = std::fs::read_to_string(runtime.telemetry().buffer_path().unwrap()).unwrap();
    assert!(buffer.contains("listings_fetched"));
    assert!(buffer.contains("listings_cache_hit"));
}
