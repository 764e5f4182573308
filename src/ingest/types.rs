// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use url::Url;

/// Event date as an upstream hands it over, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawDate {
    /// Upstream provided a machine-readable timestamp.
    Parsed(DateTime<Utc>),
    /// Free text, e.g. "14 сентября 2025". Resolved by the normalize stage.
    Text(String),
}

/// One upstream listing item, loosely typed. Lives only for the duration
/// of a single refresh pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub source: &'static str, // e.g. "russia_running", "probeg"
    pub external_id: Option<String>,
    pub name: String,
    pub date: RawDate,
    pub city: Option<String>,
    pub lon: Option<f64>,
    pub lat: Option<f64>,
    pub link: String, // absolute or relative to `base_url`
    pub base_url: Url,
}

/// The public entity served to clients. Fields mirror the JSON contract.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RunningEvent {
    pub name: String,
    pub date: DateTime<Utc>, // ISO-8601 on the wire
    pub city: String,
    pub lon: f64,
    pub lat: f64,
    pub link: String,
}

#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
    /// Fetch every upcoming listing this source currently exposes.
    /// `as_of` is the refresh instant; sources may use it to scope queries.
    async fn fetch(&self, as_of: DateTime<Utc>) -> Result<Vec<RawEvent>>;
    fn name(&self) -> &'static str;
}
