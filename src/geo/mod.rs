// src/geo/mod.rs
//! Venue coordinate resolution: static city table, unbounded lookup cache,
//! and a rate-limited external geocoding backend.

pub mod nominatim;

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use metrics::{counter, describe_counter};
use once_cell::sync::{Lazy, OnceCell};
use tokio::time::Instant;

/// Minimum spacing between two external geocoding calls, process-wide.
/// Slightly above one second to stay inside the public endpoint's policy.
pub const MIN_LOOKUP_SPACING: Duration = Duration::from_millis(1100);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lon: f64,
    pub lat: f64,
}

/// City centers we can answer without any network call. Covers the cities
/// that host the bulk of listed races.
static CITY_COORDS: Lazy<HashMap<&'static str, Coordinates>> = Lazy::new(|| {
    HashMap::from([
        ("Москва", Coordinates { lon: 37.6173, lat: 55.7558 }),
        ("Санкт-Петербург", Coordinates { lon: 30.3351, lat: 59.9343 }),
        ("Екатеринбург", Coordinates { lon: 60.6122, lat: 56.8389 }),
        ("Новосибирск", Coordinates { lon: 82.9346, lat: 55.0084 }),
        ("Казань", Coordinates { lon: 49.1221, lat: 55.8304 }),
        ("Нижний Новгород", Coordinates { lon: 44.0018, lat: 56.3287 }),
        ("Челябинск", Coordinates { lon: 61.4478, lat: 55.1644 }),
        ("Самара", Coordinates { lon: 50.1001, lat: 53.2001 }),
        ("Омск", Coordinates { lon: 73.3682, lat: 54.9887 }),
        ("Ростов-на-Дону", Coordinates { lon: 39.7231, lat: 47.2357 }),
        ("Уфа", Coordinates { lon: 55.9587, lat: 54.7348 }),
        ("Красноярск", Coordinates { lon: 92.8734, lat: 56.0184 }),
        ("Воронеж", Coordinates { lon: 39.1985, lat: 51.6720 }),
        ("Пермь", Coordinates { lon: 56.2397, lat: 58.0105 }),
        ("Волгоград", Coordinates { lon: 44.5167, lat: 48.7080 }),
    ])
});

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "geocode_static_hits_total",
            "Lookups answered by the static city table."
        );
        describe_counter!("geocode_cache_hits_total", "Lookups answered by the in-process cache.");
        describe_counter!("geocode_lookups_total", "External geocoding calls attempted.");
        describe_counter!(
            "geocode_failures_total",
            "External geocoding calls that produced no usable coordinates."
        );
    });
}

/// Cache key for a place name: trimmed, lowercased, inner whitespace collapsed.
/// The static table, by contrast, is matched on the exact (trimmed) name.
pub fn normalize_place(place: &str) -> String {
    place
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Low-level geocoding call. Separated behind a trait so tests can count
/// external calls; all failure modes collapse to `None`.
#[async_trait::async_trait]
pub trait GeocodeBackend: Send + Sync {
    async fn lookup(&self, place: &str) -> Option<Coordinates>;
    fn name(&self) -> &'static str;
}

/// Resolves place names to coordinates: static table first, then the
/// process-wide cache, then (if configured) the external backend behind an
/// interval gate. Cache entries are never evicted; the set of distinct city
/// names is small and re-querying the external endpoint would cost more
/// than the memory does.
pub struct GeoResolver {
    backend: Option<Box<dyn GeocodeBackend>>,
    cache: Mutex<HashMap<String, Coordinates>>,
    gate: tokio::sync::Mutex<Option<Instant>>,
}

impl GeoResolver {
    /// Static table and cache only; unknown places stay unresolved.
    pub fn static_only() -> Self {
        Self {
            backend: None,
            cache: Mutex::new(HashMap::new()),
            gate: tokio::sync::Mutex::new(None),
        }
    }

    pub fn with_backend(backend: impl GeocodeBackend + 'static) -> Self {
        Self {
            backend: Some(Box::new(backend)),
            ..Self::static_only()
        }
    }

    /// Resolve a place name. Returns `None` when nothing (table, cache,
    /// backend) can place it; the caller decides what a miss means.
    pub async fn resolve(&self, place: &str) -> Option<Coordinates> {
        ensure_metrics_described();

        let place = place.trim();
        if place.is_empty() {
            return None;
        }

        if let Some(c) = CITY_COORDS.get(place) {
            counter!("geocode_static_hits_total").increment(1);
            return Some(*c);
        }

        let key = normalize_place(place);
        if let Some(c) = self.cached(&key) {
            counter!("geocode_cache_hits_total").increment(1);
            return Some(c);
        }

        let backend = self.backend.as_ref()?;

        // The gate serializes external calls and carries the instant of the
        // previous one; the next call sleeps until the spacing has elapsed.
        // Static and cache hits never reach this point.
        let mut gate = self.gate.lock().await;
        if let Some(c) = self.cached(&key) {
            // Another task resolved the same place while we queued.
            counter!("geocode_cache_hits_total").increment(1);
            return Some(c);
        }
        if let Some(last) = *gate {
            tokio::time::sleep_until(last + MIN_LOOKUP_SPACING).await;
        }
        counter!("geocode_lookups_total").increment(1);
        let found = backend.lookup(place).await;
        *gate = Some(Instant::now());

        // Cache before releasing the gate so a queued waiter's re-check
        // sees the result instead of repeating the lookup.
        match found {
            Some(c) => {
                tracing::debug!(place, backend = self.backend_name(), "geocoded");
                self.cache
                    .lock()
                    .expect("geocode cache poisoned")
                    .insert(key, c);
                Some(c)
            }
            None => {
                counter!("geocode_failures_total").increment(1);
                tracing::debug!(place, "geocoding produced nothing");
                None
            }
        }
    }

    fn cached(&self, key: &str) -> Option<Coordinates> {
        self.cache
            .lock()
            .expect("geocode cache poisoned")
            .get(key)
            .copied()
    }

    fn backend_name(&self) -> &'static str {
        self.backend.as_ref().map(|b| b.name()).unwrap_or("none")
    }
}
