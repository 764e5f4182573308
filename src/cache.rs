// src/cache.rs
//! Snapshot cache over the ingest pipeline: reads serve the most recent
//! successful refresh, the first stale read triggers exactly one new
//! pipeline run, and a failed run keeps serving what we already had.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;

use crate::ingest::types::RunningEvent;

/// How long a snapshot stays fresh unless configured otherwise.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// The cache's one dependency: something that can produce the full event
/// list for a given instant.
#[async_trait::async_trait]
pub trait Refresher: Send + Sync {
    async fn refresh(&self, as_of: DateTime<Utc>) -> Result<Vec<RunningEvent>>;
}

#[async_trait::async_trait]
impl<T: Refresher + ?Sized> Refresher for Arc<T> {
    async fn refresh(&self, as_of: DateTime<Utc>) -> Result<Vec<RunningEvent>> {
        (**self).refresh(as_of).await
    }
}

struct Snapshot {
    events: Arc<Vec<RunningEvent>>,
    fetched_at: DateTime<Utc>,
}

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("event_cache_hits_total", "Reads served from a fresh snapshot.");
        describe_counter!("event_cache_refresh_total", "Refreshes that replaced the snapshot.");
        describe_counter!(
            "event_cache_refresh_failures_total",
            "Refreshes that failed; the previous snapshot kept serving."
        );
        describe_gauge!("event_cache_size", "Events in the current snapshot.");
    });
}

pub struct EventCache<R> {
    refresher: R,
    ttl: chrono::Duration,
    snapshot: RwLock<Option<Snapshot>>,
    // Taken by the one task allowed to refresh; waiters re-check freshness
    // after acquiring it instead of refreshing again.
    refresh_gate: tokio::sync::Mutex<()>,
}

impl<R: Refresher> EventCache<R> {
    pub fn new(refresher: R, ttl: Duration) -> Self {
        Self {
            refresher,
            ttl: chrono::Duration::from_std(ttl).expect("cache ttl out of range"),
            snapshot: RwLock::new(None),
            refresh_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub async fn get(&self) -> Arc<Vec<RunningEvent>> {
        self.get_at(Utc::now()).await
    }

    /// Read the event list as of `now`. Refreshes at most once per call,
    /// and concurrent stale readers coalesce onto a single refresh.
    pub async fn get_at(&self, now: DateTime<Utc>) -> Arc<Vec<RunningEvent>> {
        ensure_metrics_described();

        if let Some(events) = self.fresh(now) {
            counter!("event_cache_hits_total").increment(1);
            return events;
        }

        let _gate = self.refresh_gate.lock().await;
        if let Some(events) = self.fresh(now) {
            // A concurrent caller refreshed while we queued on the gate.
            counter!("event_cache_hits_total").increment(1);
            return events;
        }

        match self.refresher.refresh(now).await {
            Ok(events) => {
                let events = Arc::new(events);
                counter!("event_cache_refresh_total").increment(1);
                gauge!("event_cache_size").set(events.len() as f64);
                *self.snapshot.write().expect("event cache lock poisoned") = Some(Snapshot {
                    events: Arc::clone(&events),
                    fetched_at: now,
                });
                events
            }
            Err(e) => {
                counter!("event_cache_refresh_failures_total").increment(1);
                tracing::warn!(error = ?e, "refresh failed; serving previous snapshot");
                // fetched_at stays untouched, so the next read retries
                // instead of waiting out a full staleness window.
                self.any().unwrap_or_default()
            }
        }
    }

    pub fn last_refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.snapshot
            .read()
            .expect("event cache lock poisoned")
            .as_ref()
            .map(|s| s.fetched_at)
    }

    /// Events if the snapshot exists and is younger than the TTL at `now`.
    fn fresh(&self, now: DateTime<Utc>) -> Option<Arc<Vec<RunningEvent>>> {
        self.snapshot
            .read()
            .expect("event cache lock poisoned")
            .as_ref()
            .filter(|s| now - s.fetched_at < self.ttl)
            .map(|s| Arc::clone(&s.events))
    }

    /// Events regardless of age.
    fn any(&self) -> Option<Arc<Vec<RunningEvent>>> {
        self.snapshot
            .read()
            .expect("event cache lock poisoned")
            .as_ref()
            .map(|s| Arc::clone(&s.events))
    }
}
