// src/ingest/sources/russia_running.rs
//! Structured-API source: the reg.russiarunning.com events listing.
//! Paginates until an empty page or the page ceiling; a failure mid-sweep
//! keeps what was already collected.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use metrics::{counter, histogram};
use serde::Deserialize;
use url::Url;

use crate::ingest::types::{EventSource, RawDate, RawEvent};

pub const SOURCE_NAME: &str = "russia_running";
pub const DEFAULT_BASE_URL: &str = "https://reg.russiarunning.com";
pub const DEFAULT_MAX_PAGES: u32 = 10;

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    data: Vec<Item>,
}

/// Wire shape of one listing item. Everything is optional and the numeric
/// fields arrive as numbers or strings depending on the upstream build.
#[derive(Debug, Deserialize)]
struct Item {
    #[serde(default, deserialize_with = "de_opt_id")]
    id: Option<String>,
    name: Option<String>,
    date: Option<String>,
    city: Option<String>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    longitude: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    latitude: Option<f64>,
}

fn de_opt_id<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(i64),
        Text(String),
    }
    Ok(match Option::<Raw>::deserialize(d)? {
        Some(Raw::Num(n)) => Some(n.to_string()),
        Some(Raw::Text(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    })
}

/// Numbers, numeric strings, or nothing. Unparsable and non-finite values
/// count as absent rather than failing the whole page.
fn de_opt_f64<'de, D>(d: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Text(String),
    }
    Ok(match Option::<Raw>::deserialize(d)? {
        Some(Raw::Num(v)) if v.is_finite() => Some(v),
        Some(Raw::Text(s)) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    })
}

fn parse_api_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(day) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return day.and_hms_opt(0, 0, 0).map(|n| Utc.from_utc_datetime(&n));
    }
    None
}

pub struct RussiaRunningSource {
    mode: Mode,
    base: Url,
    max_pages: u32,
}

enum Mode {
    /// Page bodies served in order; pagination past the end stops the sweep.
    Fixture(Vec<String>),
    Http {
        client: reqwest::Client,
    },
}

impl RussiaRunningSource {
    pub fn from_url(base_url: &str, max_pages: u32, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_url).context("russia_running base url")?;
        let client = reqwest::Client::builder()
            .user_agent(
                "running-events-aggregator/0.1 (+github.com/velorun/running-events-aggregator)",
            )
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .context("russia_running http client")?;
        Ok(Self {
            mode: Mode::Http { client },
            base,
            max_pages,
        })
    }

    pub fn from_fixture_pages<S: Into<String>>(pages: Vec<S>) -> Self {
        Self {
            mode: Mode::Fixture(pages.into_iter().map(Into::into).collect()),
            base: Url::parse(DEFAULT_BASE_URL).expect("default base url"),
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    async fn page_body(&self, page: u32) -> Result<Option<String>> {
        match &self.mode {
            Mode::Fixture(pages) => Ok(pages.get(page as usize - 1).cloned()),
            Mode::Http { client } => {
                let url = self.base.join("/api/v1/events").context("listing url")?;
                let resp = client
                    .get(url)
                    .query(&[
                        ("isForeign", "false"),
                        ("isCountry", "false"),
                        ("page", page.to_string().as_str()),
                    ])
                    .send()
                    .await
                    .context("listing request")?;
                if !resp.status().is_success() {
                    bail!("listing returned {}", resp.status());
                }
                Ok(Some(resp.text().await.context("listing body")?))
            }
        }
    }

    /// Parse one page body into `out`, skipping ids already seen in this
    /// sweep (the upstream repeats items across page boundaries). Returns
    /// how many items the page carried before any skipping.
    fn parse_page(
        &self,
        body: &str,
        seen: &mut HashSet<String>,
        out: &mut Vec<RawEvent>,
    ) -> Result<usize> {
        let t0 = std::time::Instant::now();
        let page: Page = serde_json::from_str(body).context("parsing listing json")?;
        let total = page.data.len();

        for item in page.data {
            let Some(id) = item.id else {
                continue; // no id, no detail link
            };
            if !seen.insert(id.clone()) {
                continue;
            }
            let Ok(link) = self.base.join(&format!("/events/{id}")) else {
                continue;
            };
            let date = match item.date.as_deref().and_then(parse_api_date) {
                Some(dt) => RawDate::Parsed(dt),
                None => RawDate::Text(item.date.unwrap_or_default()),
            };
            out.push(RawEvent {
                source: SOURCE_NAME,
                external_id: Some(id),
                name: item.name.unwrap_or_default(),
                date,
                city: item.city,
                lon: item.longitude,
                lat: item.latitude,
                link: link.into(),
                base_url: self.base.clone(),
            });
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_parse_ms").record(ms);
        counter!("ingest_events_total").increment(total as u64);
        Ok(total)
    }
}

#[async_trait]
impl EventSource for RussiaRunningSource {
    async fn fetch(&self, _as_of: DateTime<Utc>) -> Result<Vec<RawEvent>> {
        let mut out = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for page in 1..=self.max_pages {
            let body = match self.page_body(page).await {
                Ok(Some(b)) => b,
                Ok(None) => break,
                Err(e) if out.is_empty() => {
                    return Err(e.context("first listing page"));
                }
                Err(e) => {
                    tracing::warn!(
                        error = ?e,
                        source = SOURCE_NAME,
                        page,
                        "page failed; keeping collected"
                    );
                    counter!("ingest_page_errors_total").increment(1);
                    break;
                }
            };
            let found = match self.parse_page(&body, &mut seen, &mut out) {
                Ok(n) => n,
                Err(e) if out.is_empty() => {
                    return Err(e.context("first listing page"));
                }
                Err(e) => {
                    tracing::warn!(
                        error = ?e,
                        source = SOURCE_NAME,
                        page,
                        "page failed; keeping collected"
                    );
                    counter!("ingest_page_errors_total").increment(1);
                    break;
                }
            };
            if found == 0 {
                break;
            }
        }

        Ok(out)
    }

    fn name(&self) -> &'static str {
        SOURCE_NAME
    }
}
