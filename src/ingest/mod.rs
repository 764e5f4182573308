// src/ingest/mod.rs
pub mod normalize;
pub mod sources;
pub mod types;

use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;

use crate::cache::Refresher;
use crate::geo::GeoResolver;
use crate::ingest::normalize::normalize_event;
use crate::ingest::types::{EventSource, RunningEvent};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_events_total", "Raw candidates parsed from sources.");
        describe_counter!("ingest_kept_total", "Events kept after normalization + filtering.");
        describe_counter!(
            "ingest_rejected_total",
            "Candidates dropped during normalization, by reason."
        );
        describe_counter!(
            "ingest_source_errors_total",
            "Sources that yielded nothing for a whole refresh."
        );
        describe_counter!(
            "ingest_page_errors_total",
            "Page-level fetch/parse failures inside a source sweep."
        );
        describe_histogram!("ingest_parse_ms", "Page parse time in milliseconds.");
        describe_histogram!("ingest_source_fetch_ms", "Whole-source fetch time in milliseconds.");
        describe_gauge!("ingest_last_run_ts", "Unix ts when a refresh last completed.");
    });
}

/// Drives every configured source, normalizes what they produce, and merges
/// the survivors into one list. One instance lives behind the event cache
/// for the whole process.
pub struct EventPipeline {
    sources: Vec<Box<dyn EventSource>>,
    resolver: Arc<GeoResolver>,
}

impl EventPipeline {
    pub fn new(sources: Vec<Box<dyn EventSource>>, resolver: Arc<GeoResolver>) -> Self {
        Self { sources, resolver }
    }

    /// One full refresh pass as of `as_of`. A source failing wholesale is
    /// logged and skipped; the pass itself fails only when every source
    /// does, so one broken upstream never blanks the other's events.
    pub async fn refresh(&self, as_of: DateTime<Utc>) -> Result<Vec<RunningEvent>> {
        ensure_metrics_described();

        let mut events = Vec::new();
        let mut failed = 0usize;

        for src in &self.sources {
            let t0 = std::time::Instant::now();
            match src.fetch(as_of).await {
                Ok(raw) => {
                    histogram!("ingest_source_fetch_ms")
                        .record(t0.elapsed().as_secs_f64() * 1_000.0);
                    let total = raw.len();
                    let mut kept = 0usize;
                    for candidate in raw {
                        match normalize_event(candidate, as_of, &self.resolver).await {
                            Ok(ev) => {
                                kept += 1;
                                events.push(ev);
                            }
                            Err(rej) => {
                                counter!("ingest_rejected_total", "reason" => rej.reason())
                                    .increment(1);
                                tracing::debug!(
                                    source = src.name(),
                                    reason = rej.reason(),
                                    "candidate rejected"
                                );
                            }
                        }
                    }
                    tracing::info!(source = src.name(), total, kept, "source swept");
                }
                Err(e) => {
                    failed += 1;
                    tracing::warn!(error = ?e, source = src.name(), "source error");
                    counter!("ingest_source_errors_total").increment(1);
                }
            }
        }

        if !self.sources.is_empty() && failed == self.sources.len() {
            bail!("all {failed} sources failed");
        }

        // The same race can arrive from several upstreams under different
        // links; such duplicates are kept as-is. If that ever needs to
        // change, this merge point is where candidate keys (name + date,
        // or nearby coordinates) would be compared.
        counter!("ingest_kept_total").increment(events.len() as u64);
        gauge!("ingest_last_run_ts").set(as_of.timestamp() as f64);
        tracing::info!(kept = events.len(), sources = self.sources.len(), "refresh complete");
        Ok(events)
    }
}

#[async_trait::async_trait]
impl Refresher for EventPipeline {
    async fn refresh(&self, as_of: DateTime<Utc>) -> Result<Vec<RunningEvent>> {
        EventPipeline::refresh(self, as_of).await
    }
}
