//! BVG departures feed.
//!
//! One [`TransitSource`] per configured station, polling the
//! `v6.bvg.transport.rest` REST API.  Payload parsing is a pure function
//! ([`parse_payload`]) so it can be exercised against captured JSON without
//! network access.

use std::collections::HashSet;
use std::fmt::Write as _;

use chrono::{DateTime, FixedOffset};
use serde::Deserialize;

use super::{http_client, DataSource};
use crate::error::FetchError;

const API_BASE: &str = "https://v6.bvg.transport.rest";

/// How far into the future departures are requested, in minutes.
const FETCH_WINDOW_MIN: u32 = 600;
/// Maximum departures requested per station.
const FETCH_RESULTS: u32 = 12;

// ---------------------------------------------------------------------------
// Domain types
// ---------------------------------------------------------------------------

/// One station to poll, as listed in `stations.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct Station {
    /// Display name, used in logs and error messages.
    pub name: String,
    /// BVG stop id (e.g. 900023201 for Zoologischer Garten).
    pub station_id: u64,
    /// Which product classes to request (`"bus"`, `"suburban"`, ...).
    pub products: Vec<String>,
    /// Per-station refresh interval override, in seconds.
    #[serde(default)]
    pub interval_secs: Option<u64>,
}

/// BVG product class of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Product {
    Suburban,
    Subway,
    Tram,
    Bus,
    Ferry,
    Express,
    Regional,
    /// Anything the API reports that we don't know.
    Other,
}

impl Product {
    /// Every product class the departures endpoint accepts as a filter.
    pub const ALL: [Product; 7] = [
        Product::Suburban,
        Product::Subway,
        Product::Tram,
        Product::Bus,
        Product::Ferry,
        Product::Express,
        Product::Regional,
    ];

    /// The API's name for this product (query parameter and payload field).
    pub fn api_name(self) -> &'static str {
        match self {
            Product::Suburban => "suburban",
            Product::Subway => "subway",
            Product::Tram => "tram",
            Product::Bus => "bus",
            Product::Ferry => "ferry",
            Product::Express => "express",
            Product::Regional => "regional",
            Product::Other => "other",
        }
    }

    pub fn from_api(name: &str) -> Product {
        Product::ALL
            .into_iter()
            .find(|p| p.api_name() == name)
            .unwrap_or(Product::Other)
    }
}

/// A single upcoming departure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    /// API trip id.  Excluded from deduplication: the API assigns
    /// different trip ids to physically identical trips.
    pub trip_id: String,
    /// Line name as printed on the vehicle (e.g. "M49", "S41").
    pub line: String,
    pub product: Product,
    pub destination: String,
    /// Expected departure time, in the timezone the API reports.
    pub when: DateTime<FixedOffset>,
    /// Positive when late, negative when early.
    pub delay_minutes: i64,
}

impl Departure {
    /// "HH:MM" as shown on the board.
    pub fn time_label(&self) -> String {
        self.when.format("%H:%M").to_string()
    }

    /// "+3" / "-2", or empty when on time.
    pub fn delay_label(&self) -> String {
        match self.delay_minutes {
            0 => String::new(),
            d if d > 0 => format!("+{d}"),
            d => d.to_string(),
        }
    }

    /// Identity for deduplication — everything except the trip id.
    fn dedup_key(&self) -> (&str, DateTime<FixedOffset>, i64, Product) {
        (&self.line, self.when, self.delay_minutes, self.product)
    }
}

// ---------------------------------------------------------------------------
// Payload parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct DeparturesPayload {
    departures: Vec<RawDeparture>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDeparture {
    trip_id: String,
    /// Missing for cancelled trips.
    when: Option<String>,
    /// Delay in seconds; null when the API has no realtime data.
    delay: Option<i64>,
    cancelled: Option<bool>,
    line: RawLine,
    destination: RawStop,
}

#[derive(Debug, Deserialize)]
struct RawLine {
    name: String,
    product: String,
}

#[derive(Debug, Deserialize)]
struct RawStop {
    name: String,
}

/// Parse one departures response body into clean, deduplicated,
/// time-sorted [`Departure`]s.
///
/// `station_name` is only used in error messages.  An empty result after
/// filtering is an error: the API occasionally answers a known-busy stop
/// with an empty list, and callers treat that like any other failed fetch.
pub fn parse_payload(body: &str, station_name: &str) -> Result<Vec<Departure>, FetchError> {
    let payload: DeparturesPayload = serde_json::from_str(body)
        .map_err(|e| FetchError::Payload(format!("{station_name}: {e}")))?;

    let mut departures = Vec::with_capacity(payload.departures.len());
    for raw in payload.departures {
        if raw.cancelled == Some(true) {
            continue;
        }
        // Trips without a time can't be placed on the board.
        let Some(when_str) = raw.when else {
            continue;
        };
        let when = DateTime::parse_from_rfc3339(&when_str).map_err(|e| {
            FetchError::Payload(format!("{station_name}: bad departure time {when_str:?}: {e}"))
        })?;

        let destination = clean_destination(&raw.destination.name, &raw.line.name);

        departures.push(Departure {
            trip_id: raw.trip_id,
            line: raw.line.name,
            product: Product::from_api(&raw.line.product),
            destination,
            when,
            delay_minutes: raw.delay.unwrap_or(0) / 60,
        });
    }

    let mut departures = dedup(departures);
    departures.sort_by_key(|d| d.when);

    if departures.is_empty() {
        return Err(FetchError::Empty(format!(
            "{station_name}: no usable departures"
        )));
    }
    Ok(departures)
}

/// Strip the redundant "(Berlin)" suffix and mark the ring lines with
/// their direction of travel.
fn clean_destination(destination: &str, line: &str) -> String {
    let cleaned = destination.replace("(Berlin)", "");
    let cleaned = cleaned.trim();
    match line {
        "S41" => format!("⟳ {cleaned}"),
        "S42" => format!("⟲ {cleaned}"),
        _ => cleaned.to_string(),
    }
}

/// Drop duplicates, ignoring trip ids.  First occurrence wins.
fn dedup(departures: Vec<Departure>) -> Vec<Departure> {
    let mut seen = HashSet::new();
    departures
        .into_iter()
        .filter(|d| {
            let (line, when, delay, product) = d.dedup_key();
            seen.insert((line.to_string(), when, delay, product))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// The data source
// ---------------------------------------------------------------------------

/// Departure feed for one station.
pub struct TransitSource {
    station: Station,
}

impl TransitSource {
    pub fn new(station: Station) -> Self {
        Self { station }
    }
}

impl DataSource for TransitSource {
    type Output = Vec<Departure>;

    fn name(&self) -> &str {
        &self.station.name
    }

    fn fetch(&self) -> Result<Vec<Departure>, FetchError> {
        let mut params: Vec<(&str, String)> = vec![
            ("when", "now".into()),
            ("duration", FETCH_WINDOW_MIN.to_string()),
            ("results", FETCH_RESULTS.to_string()),
            ("linesOfStops", "false".into()),
            ("remarks", "true".into()),
            ("language", "de".into()),
        ];
        for product in Product::ALL {
            let wanted = self.station.products.iter().any(|p| p == product.api_name());
            params.push((product.api_name(), wanted.to_string()));
        }

        let body = http_client()?
            .get(format!(
                "{API_BASE}/stops/{}/departures",
                self.station.station_id
            ))
            .query(&params)
            .send()?
            .error_for_status()?
            .text()?;

        parse_payload(&body, &self.station.name)
    }
}

// ---------------------------------------------------------------------------
// Table mode
// ---------------------------------------------------------------------------

/// Render departures as a plain-text table for `--table` mode.
pub fn format_table(departures: &[Departure]) -> String {
    let headers = ["Line", "Destination", "Time", "Delay"];
    let rows: Vec<[String; 4]> = departures
        .iter()
        .map(|d| {
            [
                d.line.clone(),
                d.destination.clone(),
                d.time_label(),
                d.delay_label(),
            ]
        })
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row.iter()) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    for (w, h) in widths.iter().copied().zip(headers.iter()) {
        let _ = write!(out, "{h:<w$}  ");
    }
    out.push('\n');
    for w in widths.iter().copied() {
        let _ = write!(out, "{:-<w$}  ", "");
    }
    out.push('\n');
    for row in &rows {
        for (w, cell) in widths.iter().copied().zip(row.iter()) {
            let _ = write!(out, "{cell:<w$}  ");
        }
        out.push('\n');
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Trimmed-down capture of a real departures response.
    const SAMPLE: &str = r#"{
        "departures": [
            {
                "tripId": "1|2345|0|86|1",
                "when": "2026-08-06T14:32:00+02:00",
                "delay": 180,
                "line": { "name": "M49", "product": "bus" },
                "destination": { "name": "Staaken, Reimerweg (Berlin)" }
            },
            {
                "tripId": "1|2345|0|86|2",
                "when": "2026-08-06T14:25:00+02:00",
                "delay": null,
                "line": { "name": "S41", "product": "suburban" },
                "destination": { "name": "Ringbahn S41" }
            },
            {
                "tripId": "1|9999|0|86|3",
                "when": null,
                "cancelled": true,
                "line": { "name": "X9", "product": "bus" },
                "destination": { "name": "Flughafen BER" }
            }
        ]
    }"#;

    #[test]
    fn parses_and_sorts_by_departure_time() {
        let departures = parse_payload(SAMPLE, "Zoo").unwrap();

        assert_eq!(departures.len(), 2, "cancelled trip must be dropped");
        assert_eq!(departures[0].line, "S41", "earlier departure first");
        assert_eq!(departures[1].line, "M49");
    }

    #[test]
    fn converts_delay_seconds_to_minutes() {
        let departures = parse_payload(SAMPLE, "Zoo").unwrap();

        let m49 = departures.iter().find(|d| d.line == "M49").unwrap();
        assert_eq!(m49.delay_minutes, 3);

        let s41 = departures.iter().find(|d| d.line == "S41").unwrap();
        assert_eq!(s41.delay_minutes, 0, "null delay means on time");
    }

    #[test]
    fn strips_berlin_suffix_and_marks_ring_lines() {
        let departures = parse_payload(SAMPLE, "Zoo").unwrap();

        let m49 = departures.iter().find(|d| d.line == "M49").unwrap();
        assert_eq!(m49.destination, "Staaken, Reimerweg");

        let s41 = departures.iter().find(|d| d.line == "S41").unwrap();
        assert_eq!(s41.destination, "⟳ Ringbahn S41");
    }

    #[test]
    fn classifies_products() {
        let departures = parse_payload(SAMPLE, "Zoo").unwrap();
        assert_eq!(departures[0].product, Product::Suburban);
        assert_eq!(departures[1].product, Product::Bus);
    }

    #[test]
    fn unknown_product_maps_to_other() {
        assert_eq!(Product::from_api("maglev"), Product::Other);
    }

    #[test]
    fn duplicate_trips_with_different_ids_are_deduplicated() {
        let body = r#"{
            "departures": [
                {
                    "tripId": "id-a",
                    "when": "2026-08-06T14:32:00+02:00",
                    "delay": 0,
                    "line": { "name": "M49", "product": "bus" },
                    "destination": { "name": "Staaken" }
                },
                {
                    "tripId": "id-b",
                    "when": "2026-08-06T14:32:00+02:00",
                    "delay": 0,
                    "line": { "name": "M49", "product": "bus" },
                    "destination": { "name": "Staaken" }
                }
            ]
        }"#;

        let departures = parse_payload(body, "Zoo").unwrap();
        assert_eq!(departures.len(), 1);
    }

    #[test]
    fn empty_departure_list_is_an_error() {
        let err = parse_payload(r#"{ "departures": [] }"#, "Zoo").unwrap_err();
        assert!(matches!(err, FetchError::Empty(_)));
    }

    #[test]
    fn garbage_body_is_a_payload_error() {
        let err = parse_payload("not json", "Zoo").unwrap_err();
        assert!(matches!(err, FetchError::Payload(_)));
    }

    #[test]
    fn delay_labels() {
        let departures = parse_payload(SAMPLE, "Zoo").unwrap();
        let m49 = departures.iter().find(|d| d.line == "M49").unwrap();
        let s41 = departures.iter().find(|d| d.line == "S41").unwrap();

        assert_eq!(m49.delay_label(), "+3");
        assert_eq!(s41.delay_label(), "");
    }

    #[test]
    fn table_contains_all_departures() {
        let departures = parse_payload(SAMPLE, "Zoo").unwrap();
        let table = format_table(&departures);

        assert!(table.contains("Line"));
        assert!(table.contains("M49"));
        assert!(table.contains("⟳ Ringbahn S41"));
        assert!(table.contains("+3"));
    }
}
