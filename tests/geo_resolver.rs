// tests/geo_resolver.rs
//
// Resolver chain against a counting mock backend: static table shortcut,
// lifetime caching of successes, uncached failures, and the spacing gate
// between external calls (paused-clock tests, no real sleeping).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use running_events_aggregator::geo::{
    Coordinates, GeoResolver, GeocodeBackend, MIN_LOOKUP_SPACING,
};

struct CountingBackend {
    calls: Arc<AtomicUsize>,
    known_place: &'static str,
    delay: Duration,
}

#[async_trait]
impl GeocodeBackend for CountingBackend {
    async fn lookup(&self, place: &str) -> Option<Coordinates> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if place == self.known_place {
            Some(Coordinates { lon: 39.7303, lat: 43.6028 })
        } else {
            None
        }
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

fn sochi_backend(delay: Duration) -> (Arc<AtomicUsize>, CountingBackend) {
    let calls = Arc::new(AtomicUsize::new(0));
    let backend = CountingBackend {
        calls: Arc::clone(&calls),
        known_place: "Сочи",
        delay,
    };
    (calls, backend)
}

#[tokio::test]
async fn table_cities_never_reach_the_backend() {
    let (calls, backend) = sochi_backend(Duration::ZERO);
    let resolver = GeoResolver::with_backend(backend);

    let c = resolver.resolve("Москва").await.expect("table hit");
    assert_eq!((c.lon, c.lat), (37.6173, 55.7558));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn successful_lookups_are_cached_for_the_process_lifetime() {
    let (calls, backend) = sochi_backend(Duration::ZERO);
    let resolver = GeoResolver::with_backend(backend);

    let first = resolver.resolve("Сочи").await.expect("backend hit");
    // Different spelling, same normalized cache key.
    let second = resolver.resolve(" сочи ").await.expect("cache hit");

    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_lookups_are_not_cached() {
    let (calls, backend) = sochi_backend(Duration::ZERO);
    let resolver = GeoResolver::with_backend(backend);

    assert!(resolver.resolve("Тьмутаракань").await.is_none());
    assert!(resolver.resolve("Тьмутаракань").await.is_none());
    // Each miss goes back out; nothing negative is remembered.
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn external_calls_keep_their_minimum_spacing() {
    let (calls, backend) = sochi_backend(Duration::ZERO);
    let resolver = GeoResolver::with_backend(backend);

    let start = tokio::time::Instant::now();
    resolver.resolve("Сочи").await;
    // The first call goes straight through.
    assert_eq!(start.elapsed(), Duration::ZERO);

    resolver.resolve("Тюмень").await;
    assert!(start.elapsed() >= MIN_LOOKUP_SPACING);

    // The miss above still armed the gate.
    resolver.resolve("Абакан").await;
    assert!(start.elapsed() >= MIN_LOOKUP_SPACING * 2);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn concurrent_lookups_for_one_place_share_a_single_call() {
    let (calls, backend) = sochi_backend(Duration::from_millis(50));
    let resolver = GeoResolver::with_backend(backend);

    // The second task queues on the gate and finds the cache filled when
    // its turn comes.
    let (a, b) = tokio::join!(resolver.resolve("Сочи"), resolver.resolve("Сочи"));

    assert!(a.is_some());
    assert_eq!(a, b);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
