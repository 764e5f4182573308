// src/ingest/normalize.rs
//! Turns loose upstream candidates into `RunningEvent`s: text cleanup,
//! date canonicalization, future-only filter, coordinate resolution,
//! link absolutization. Anything that cannot be made whole is rejected
//! with a reason; rejections are dropped items, not errors.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use once_cell::sync::OnceCell;
use url::Url;

use crate::geo::GeoResolver;
use crate::ingest::types::{RawDate, RawEvent, RunningEvent};

/// Why a candidate was dropped. Used as a metrics label, so the names are
/// stable snake_case strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    MissingName,
    UnparsableDate,
    PastEvent,
    MissingCity,
    UnresolvedLocation,
    BadLink,
}

impl Rejection {
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::MissingName => "missing_name",
            Rejection::UnparsableDate => "unparsable_date",
            Rejection::PastEvent => "past_event",
            Rejection::MissingCity => "missing_city",
            Rejection::UnresolvedLocation => "unresolved_location",
            Rejection::BadLink => "bad_link",
        }
    }
}

/// Cleanup for scraped or API-provided text: entity decode, whitespace
/// collapse (covers NBSP), trim.
pub fn clean_text(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").expect("whitespace regex"));
    re_ws.replace_all(&decoded, " ").trim().to_string()
}

/// Russian month names in the genitive form they take after a day numeral.
const RU_MONTHS: [(&str, u32); 12] = [
    ("января", 1),
    ("февраля", 2),
    ("марта", 3),
    ("апреля", 4),
    ("мая", 5),
    ("июня", 6),
    ("июля", 7),
    ("августа", 8),
    ("сентября", 9),
    ("октября", 10),
    ("ноября", 11),
    ("декабря", 12),
];

/// Parse a free-text date of the shape `<day> <month-name> <year>` anywhere
/// in the string, e.g. "Старт: 14 сентября 2025 г.". Impossible calendar
/// dates and unknown month words return `None`.
pub fn parse_text_date(s: &str) -> Option<NaiveDate> {
    static RE_DATE: OnceCell<regex::Regex> = OnceCell::new();
    let re = RE_DATE.get_or_init(|| {
        regex::Regex::new(r"(?i)(\d{1,2})\s+([а-яё]+)\s+(\d{4})").expect("date regex")
    });
    let caps = re.captures(s)?;
    let day: u32 = caps[1].parse().ok()?;
    let word = caps[2].to_lowercase();
    let month = RU_MONTHS
        .iter()
        .find(|(name, _)| *name == word)
        .map(|(_, m)| *m)?;
    let year: i32 = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Absolute link for a candidate: absolute input passes through, relative
/// input is joined onto the adapter's base URL. Also the canonical form
/// sources dedup on, so one race linked both ways still counts once.
pub(crate) fn absolutize(link: &str, base: &Url) -> Option<String> {
    let link = link.trim();
    if link.is_empty() {
        return None;
    }
    match Url::parse(link) {
        Ok(abs) => Some(abs.into()),
        Err(url::ParseError::RelativeUrlWithoutBase) => base.join(link).ok().map(Into::into),
        Err(_) => None,
    }
}

/// Normalize one candidate against the refresh instant `as_of`. Events
/// starting exactly at `as_of` are kept; strictly earlier ones are not.
pub async fn normalize_event(
    raw: RawEvent,
    as_of: DateTime<Utc>,
    resolver: &GeoResolver,
) -> Result<RunningEvent, Rejection> {
    let RawEvent {
        source: _,
        external_id: _,
        name,
        date,
        city,
        lon,
        lat,
        link,
        base_url,
    } = raw;

    let name = clean_text(&name);
    if name.is_empty() {
        return Err(Rejection::MissingName);
    }

    let date = match date {
        RawDate::Parsed(dt) => dt,
        RawDate::Text(text) => {
            let day = parse_text_date(&clean_text(&text)).ok_or(Rejection::UnparsableDate)?;
            let midnight = day.and_hms_opt(0, 0, 0).ok_or(Rejection::UnparsableDate)?;
            Utc.from_utc_datetime(&midnight)
        }
    };
    if date < as_of {
        return Err(Rejection::PastEvent);
    }

    let city = match city.as_deref().map(clean_text) {
        Some(c) if !c.is_empty() => c,
        _ => return Err(Rejection::MissingCity),
    };

    let (lon, lat) = match (lon, lat) {
        (Some(lon), Some(lat)) if lon.is_finite() && lat.is_finite() => (lon, lat),
        _ => match resolver.resolve(&city).await {
            Some(c) => (c.lon, c.lat),
            None => return Err(Rejection::UnresolvedLocation),
        },
    };

    let link = absolutize(&link, &base_url).ok_or(Rejection::BadLink)?;

    Ok(RunningEvent {
        name,
        date,
        city,
        lon,
        lat,
        link,
    })
}
