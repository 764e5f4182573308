// src/metrics.rs
use axum::{routing::get, Router};
use metrics::{describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::config::AppConfig;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and publish the static configuration
    /// gauges. Call once at startup, before the first refresh runs.
    pub fn init(cfg: &AppConfig) -> Self {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("prometheus: install recorder");

        describe_gauge!("event_cache_ttl_secs", "Configured snapshot staleness threshold.");
        gauge!("event_cache_ttl_secs").set(cfg.cache_ttl_secs as f64);

        describe_gauge!("ingest_sources_enabled", "Sources enabled by configuration.");
        let enabled = [cfg.russia_running.enabled, cfg.probeg.enabled]
            .iter()
            .filter(|on| **on)
            .count();
        gauge!("ingest_sources_enabled").set(enabled as f64);

        Self { handle }
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
