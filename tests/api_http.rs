// tests/api_http.rs
//
// HTTP-level tests against the real Router, driven with tower::oneshot
// so no socket is opened. The pipeline behind the cache runs on fixture
// pages and the static city table only.
//
// Covered:
// - GET /health
// - GET /api/events: the public contract, end to end
// - CORS headers for browser clients
// - the static landing page fallback

use std::sync::Arc;
use std::time::Duration;

use http::{header, Request, StatusCode};
use serde_json::Value;
use shuttle_axum::axum::{
    body::{self, Body},
    Router,
};
use tower::ServiceExt as _;

use running_events_aggregator::api::{self, AppState};
use running_events_aggregator::cache::EventCache;
use running_events_aggregator::geo::GeoResolver;
use running_events_aggregator::ingest::sources::RussiaRunningSource;
use running_events_aggregator::ingest::types::EventSource;
use running_events_aggregator::ingest::EventPipeline;

const BODY_LIMIT: usize = 1024 * 1024;

const PAGE1: &str = include_str!("fixtures/russia_running_page1.json");
const EMPTY: &str = include_str!("fixtures/russia_running_empty.json");

/// The binary's router shape, backed by fixture pages. Fixture events sit
/// far enough in the future that the wall clock keeps them.
fn test_router() -> Router {
    let sources: Vec<Box<dyn EventSource>> = vec![Box::new(
        RussiaRunningSource::from_fixture_pages(vec![PAGE1, EMPTY]),
    )];
    let pipeline = EventPipeline::new(sources, Arc::new(GeoResolver::static_only()));
    let state = AppState {
        cache: Arc::new(EventCache::new(pipeline, Duration::from_secs(300))),
    };
    api::create_router(state)
}

#[tokio::test]
async fn health_returns_200_ok() {
    let app = test_router();
    let req = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .expect("build GET /health");
    let resp = app.oneshot(req).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    assert_eq!(String::from_utf8(bytes).expect("utf8 body").trim(), "ok");
}

#[tokio::test]
async fn events_endpoint_serves_the_public_contract() {
    let app = test_router();
    let req = Request::builder()
        .method("GET")
        .uri("/api/events")
        .body(Body::empty())
        .expect("build GET /api/events");
    let resp = app.oneshot(req).await.expect("oneshot /api/events");
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read events body")
        .to_vec();
    let parsed: Value = serde_json::from_slice(&bytes).expect("events json");
    let events = parsed.as_array().expect("events response is an array");

    // The fixture page carries a past race, a duplicate, and an item
    // without an id; four events survive.
    assert_eq!(events.len(), 4);
    for event in events {
        for field in ["name", "date", "city", "lon", "lat", "link"] {
            assert!(event.get(field).is_some(), "event missing '{field}'");
        }
    }

    assert_eq!(events[0]["name"], "Московский марафон");
    assert_eq!(events[0]["date"], "2032-09-20T09:00:00Z");
    assert!(events[0]["link"]
        .as_str()
        .expect("link is a string")
        .starts_with("https://reg.russiarunning.com/events/"));

    // Venue coordinates from the upstream stay verbatim.
    assert_eq!(events[1]["lon"], 30.3609);
    assert_eq!(events[1]["lat"], 59.9311);

    // Missing coordinates resolve through the static city table.
    assert_eq!(events[2]["city"], "Казань");
    assert_eq!(events[2]["lon"], 49.1221);
    assert_eq!(events[3]["city"], "Пермь");
    assert_eq!(events[3]["lat"], 58.0105);
}

#[tokio::test]
async fn responses_allow_cross_origin_reads() {
    let app = test_router();
    let req = Request::builder()
        .method("GET")
        .uri("/api/events")
        .header(header::ORIGIN, "http://localhost:5173")
        .body(Body::empty())
        .expect("build GET with origin");
    let resp = app.oneshot(req).await.expect("oneshot with origin");

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(
        resp.headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_some(),
        "CORS header missing"
    );
}

#[tokio::test]
async fn the_landing_page_is_served_from_public() {
    let app = test_router();
    let req = Request::builder()
        .method("GET")
        .uri("/")
        .body(Body::empty())
        .expect("build GET /");
    let resp = app.oneshot(req).await.expect("oneshot /");
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read page")
        .to_vec();
    let html = String::from_utf8(bytes).expect("utf8 page");
    assert!(html.contains("Беговые события"));
}
