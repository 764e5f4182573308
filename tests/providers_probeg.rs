// tests/providers_probeg.rs
//
// Fixture-driven tests for the probeg.org calendar scraper: selector
// fallback across markup generations, per-sweep link dedup, pagination.

use chrono::{DateTime, TimeZone, Utc};
use running_events_aggregator::ingest::sources::ProbegSource;
use running_events_aggregator::ingest::types::{EventSource, RawDate};

const CALENDAR: &str = include_str!("fixtures/probeg_calendar.html");
const CALENDAR_ALT: &str = include_str!("fixtures/probeg_calendar_alt.html");
const EMPTY: &str = include_str!("fixtures/probeg_empty.html");

fn as_of() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
}

#[tokio::test]
async fn card_layout_extracts_blocks_and_skips_partial_ones() {
    let source = ProbegSource::from_fixture_pages(vec![CALENDAR, EMPTY]);
    let items = source.fetch(as_of()).await.expect("card layout sweep");

    // Five cards: one has no date text, one repeats an earlier link.
    assert_eq!(items.len(), 3);
    assert!(items.iter().all(|e| e.source == "probeg"));

    let cross = &items[0];
    assert_eq!(cross.name, "Кросс «Лисья гора»");
    assert_eq!(cross.link, "/race/5012"); // stays relative until normalization
    assert_eq!(cross.date, RawDate::Text("14 сентября 2032".to_string()));
    assert_eq!(cross.city.as_deref(), Some("Москва"));
    assert_eq!(cross.external_id, None);
}

#[tokio::test]
async fn absolute_links_and_nbsp_dates_come_through_raw() {
    let source = ProbegSource::from_fixture_pages(vec![CALENDAR, EMPTY]);
    let items = source.fetch(as_of()).await.expect("card layout sweep");

    let embankment = &items[1];
    assert_eq!(embankment.link, "https://probeg.org/race/5013");
    // The entity in the markup survives as U+00A0 for the date lexicon.
    assert_eq!(
        embankment.date,
        RawDate::Text("21\u{a0}сентября 2032".to_string())
    );

    // A missing city is tolerated at this stage.
    let trail = &items[2];
    assert_eq!(trail.link, "/race/5015");
    assert_eq!(trail.city, None);
}

#[tokio::test]
async fn fallback_selectors_cover_the_table_layout() {
    let source = ProbegSource::from_fixture_pages(vec![CALENDAR_ALT, EMPTY]);
    let items = source.fetch(as_of()).await.expect("table layout sweep");

    assert_eq!(items.len(), 3);
    let ural = &items[0];
    assert_eq!(ural.name, "Марафон «Европа — Азия»");
    assert_eq!(ural.link, "/race/6001");
    assert_eq!(ural.date, RawDate::Text("12 июня 2033".to_string()));
    assert_eq!(ural.city.as_deref(), Some("Екатеринбург"));
}

#[tokio::test]
async fn links_already_seen_in_the_sweep_are_dropped_across_pages() {
    let source = ProbegSource::from_fixture_pages(vec![CALENDAR, CALENDAR_ALT, EMPTY, CALENDAR]);
    let items = source.fetch(as_of()).await.expect("multi page sweep");

    // Page two repeats /race/5012; page four sits behind the empty page
    // and is never requested.
    assert_eq!(items.len(), 5);
    assert_eq!(
        items
            .iter()
            .filter(|e| e.link.ends_with("/race/5012"))
            .count(),
        1
    );
}

#[tokio::test]
async fn relative_and_absolute_links_to_one_race_count_once() {
    // A featured block often links the same race absolutely that the list
    // below links relatively.
    let page = r#"<html><body><ul>
         <li class="event-item">
           <a href="/race/7001">Ночной полумарафон</a>
           <span class="date">2 августа 2033</span>
           <span class="city">Казань</span>
         </li>
         <li class="event-item">
           <a href="https://probeg.org/race/7001">Ночной полумарафон</a>
           <span class="date">2 августа 2033</span>
           <span class="city">Казань</span>
         </li>
       </ul></body></html>"#;
    let source = ProbegSource::from_fixture_pages(vec![page]);
    let items = source.fetch(as_of()).await.expect("dual link sweep");

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].link, "/race/7001"); // first form wins, still raw
}

#[tokio::test]
async fn a_page_without_known_blocks_ends_the_sweep_quietly() {
    let source = ProbegSource::from_fixture_pages(vec![
        r#"<html><body><div id="maintenance">Идут технические работы</div></body></html>"#,
    ]);
    let items = source.fetch(as_of()).await.expect("unknown layout sweep");
    assert!(items.is_empty());
}

#[tokio::test]
async fn the_sweep_respects_the_page_ceiling() {
    let pages: Vec<String> = (0..12)
        .map(|i| {
            format!(
                r#"<html><body><ul>
                     <li class="event-item">
                       <a href="/race/{i}">Этап {i}</a>
                       <span class="date">1 мая 2033</span>
                       <span class="city">Казань</span>
                     </li>
                   </ul></body></html>"#
            )
        })
        .collect();
    let source = ProbegSource::from_fixture_pages(pages);
    let items = source.fetch(as_of()).await.expect("capped sweep");
    assert_eq!(items.len(), 10);
}
