// src/geo/nominatim.rs
//! Nominatim-style geocoding backend. One candidate per query, identified
//! client, country-biased; every failure mode collapses to `None`.

use std::time::Duration;

use serde::Deserialize;

use super::{Coordinates, GeocodeBackend};

const SEARCH_ENDPOINT: &str = "https://nominatim.openstreetmap.org/search";

/// Appended to every query so bare city names land in the right country.
const COUNTRY_BIAS: &str = "Россия";

pub struct NominatimBackend {
    http: reqwest::Client,
    endpoint: String,
}

impl NominatimBackend {
    pub fn new() -> Self {
        Self::with_endpoint(SEARCH_ENDPOINT)
    }

    pub fn with_endpoint(endpoint: &str) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(
                "running-events-aggregator/0.1 (+github.com/velorun/running-events-aggregator)",
            )
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(5))
            .build()
            .expect("reqwest client");
        Self {
            http,
            endpoint: endpoint.to_string(),
        }
    }
}

impl Default for NominatimBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(deserialize_with = "de_coord")]
    lat: f64,
    #[serde(deserialize_with = "de_coord")]
    lon: f64,
}

/// The endpoint serializes coordinates as strings; tolerate numbers too.
fn de_coord<'de, D: serde::Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Text(String),
    }
    match Raw::deserialize(d)? {
        Raw::Num(v) => Ok(v),
        Raw::Text(s) => s.trim().parse::<f64>().map_err(serde::de::Error::custom),
    }
}

#[async_trait::async_trait]
impl GeocodeBackend for NominatimBackend {
    async fn lookup(&self, place: &str) -> Option<Coordinates> {
        let query = format!("{place}, {COUNTRY_BIAS}");
        let resp = self
            .http
            .get(&self.endpoint)
            .query(&[("q", query.as_str()), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let hits: Vec<Hit> = resp.json().await.ok()?;
        let hit = hits.first()?;
        if !hit.lon.is_finite() || !hit.lat.is_finite() {
            return None;
        }
        Some(Coordinates {
            lon: hit.lon,
            lat: hit.lat,
        })
    }

    fn name(&self) -> &'static str {
        "nominatim"
    }
}
