// src/api.rs
use std::sync::Arc;

use shuttle_axum::axum::{extract::State, routing::get, Json, Router};
use tower_http::{cors::CorsLayer, services::ServeDir};

use crate::cache::EventCache;
use crate::config::AppConfig;
use crate::geo::nominatim::NominatimBackend;
use crate::geo::GeoResolver;
use crate::ingest::sources::{probeg, russia_running, ProbegSource, RussiaRunningSource};
use crate::ingest::types::{EventSource, RunningEvent};
use crate::ingest::EventPipeline;

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<EventCache<EventPipeline>>,
}

impl AppState {
    /// Wire resolver, sources, pipeline, and cache from config. A source
    /// whose base URL does not parse is dropped with a warning rather
    /// than taking the whole service down.
    pub fn from_config(cfg: &AppConfig) -> Self {
        let resolver = Arc::new(if cfg.geocoding_enabled {
            GeoResolver::with_backend(NominatimBackend::new())
        } else {
            GeoResolver::static_only()
        });

        let mut sources: Vec<Box<dyn EventSource>> = Vec::new();
        if cfg.russia_running.enabled {
            match RussiaRunningSource::from_url(
                cfg.russia_running
                    .base_url
                    .as_deref()
                    .unwrap_or(russia_running::DEFAULT_BASE_URL),
                cfg.russia_running.max_pages,
                cfg.russia_running.timeout(),
            ) {
                Ok(src) => sources.push(Box::new(src)),
                Err(e) => {
                    tracing::warn!(
                        error = ?e,
                        source = russia_running::SOURCE_NAME,
                        "source disabled"
                    )
                }
            }
        }
        if cfg.probeg.enabled {
            match ProbegSource::from_url(
                cfg.probeg
                    .base_url
                    .as_deref()
                    .unwrap_or(probeg::DEFAULT_BASE_URL),
                cfg.probeg.max_pages,
                cfg.probeg.timeout(),
            ) {
                Ok(src) => sources.push(Box::new(src)),
                Err(e) => {
                    tracing::warn!(
                        error = ?e,
                        source = probeg::SOURCE_NAME,
                        "source disabled"
                    )
                }
            }
        }

        let pipeline = EventPipeline::new(sources, resolver);
        Self {
            cache: Arc::new(EventCache::new(pipeline, cfg.cache_ttl())),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/events", get(list_events))
        .fallback_service(ServeDir::new("public"))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// The read path: whatever the cache holds, refreshed on demand. An empty
/// list (no refresh has ever succeeded) is still a 200; the map page just
/// renders nothing.
async fn list_events(State(state): State<AppState>) -> Json<Vec<RunningEvent>> {
    let events = state.cache.get().await;
    Json(events.as_ref().clone())
}
