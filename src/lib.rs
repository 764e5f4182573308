// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod cache;
pub mod config;
pub mod geo;
pub mod ingest;
pub mod metrics;

// ---- Re-exports for stable public API ----
pub use crate::api::create_router;
pub use crate::cache::{EventCache, Refresher};
pub use crate::ingest::types::{EventSource, RawDate, RawEvent, RunningEvent};
pub use crate::ingest::EventPipeline;
