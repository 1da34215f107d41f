use crate::models::{Coordinates, ListingRecord, ScanCombination, Source};
use crate::room_type::{detect_room_type, PropertyCategory};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

const ROOM_URL_BASE: &str = "https://www.airbnb.nl/rooms";

/// Context a raw entry was observed in.
#[derive(Debug, Clone)]
pub struct ObservedIn<'a> {
    pub municipality: &'a str,
    pub combination: ScanCombination,
    pub measured_at: DateTime<Utc>,
}

/// Build a record from one raw Airbnb search entry. Returns `None` when the
/// entry carries no listing id.
pub fn parse_airbnb_entry(entry: &Value, observed: &ObservedIn<'_>) -> Option<ListingRecord> {
    let listing_id = extract_listing_id(entry)?;
    let room_type = detect_room_type(entry);
    let property_type = PropertyCategory::from_room_type(&room_type).label().to_string();
    let (bedrooms, beds) = extract_beds_info(entry);
    let (rating, review_count) = extract_rating(entry);

    Some(ListingRecord {
        url: Some(format!("{}/{}", ROOM_URL_BASE, listing_id)),
        title: non_empty(entry["title"].as_str()).or_else(|| non_empty(entry["name"].as_str())),
        room_type: Some(room_type),
        property_type: Some(property_type),
        price: extract_price(entry),
        coordinates: extract_coordinates(entry),
        rating,
        review_count,
        bedrooms,
        beds,
        max_guests: extract_guest_capacity(entry),
        ..ListingRecord::bare(
            listing_id,
            Source::Airbnb,
            observed.municipality,
            observed.combination,
            observed.measured_at,
        )
    })
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Ids arrive as strings or numbers, under `room_id` or `id`.
pub fn extract_listing_id(entry: &Value) -> Option<String> {
    for field in ["room_id", "id"] {
        match &entry[field] {
            Value::String(s) if !s.trim().is_empty() => return Some(s.trim().to_string()),
            Value::Number(n) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

/// Nightly price from `price.unit.amount`; zero means unknown.
pub fn extract_price(entry: &Value) -> Option<f64> {
    number(&entry["price"]["unit"]["amount"]).filter(|p| *p > 0.0)
}

pub fn extract_rating(entry: &Value) -> (Option<f64>, Option<u32>) {
    let rating = number(&entry["rating"]["value"]).filter(|r| *r > 0.0);
    let reviews = number(&entry["rating"]["reviewCount"])
        .filter(|c| *c >= 0.0)
        .map(|c| c as u32);
    (rating, reviews)
}

/// The upstream spells longitude as `longitud` in some responses.
pub fn extract_coordinates(entry: &Value) -> Option<Coordinates> {
    let coords = &entry["coordinates"];
    let lat = number(&coords["latitude"])?;
    let lon = number(&coords["longitud"]).or_else(|| number(&coords["longitude"]))?;
    // A zero coordinate marks a missing value upstream
    if lat == 0.0 || lon == 0.0 {
        return None;
    }
    Some(Coordinates::new(lat, lon))
}

/// Bedroom and bed counts from the `BEDINFO` lines of `structuredContent`.
pub fn extract_beds_info(entry: &Value) -> (Option<u32>, Option<u32>) {
    let mut bedrooms = None;
    let mut beds: Option<u32> = None;

    for item in primary_lines(entry) {
        if item["type"].as_str() != Some("BEDINFO") {
            continue;
        }
        let body = item["body"].as_str().unwrap_or("").to_lowercase();
        for part in body.split(['·', ',']) {
            let Some((count, unit)) = leading_count(part) else {
                continue;
            };
            if unit.starts_with("slaapkamer") || unit.starts_with("bedroom") {
                bedrooms = Some(count);
            } else if unit.starts_with("bed") || unit.starts_with("slaapbank") {
                beds = Some(beds.unwrap_or(0) + count);
            }
        }
    }

    (bedrooms, beds)
}

/// Guest capacity from `personCapacity`, else from a "4 gasten" / "4 guests" line.
pub fn extract_guest_capacity(entry: &Value) -> Option<u32> {
    for field in ["personCapacity", "person_capacity"] {
        if let Some(capacity) = number(&entry[field]).filter(|c| *c > 0.0) {
            return Some(capacity as u32);
        }
    }

    primary_lines(entry)
        .filter_map(|item| item["body"].as_str())
        .find_map(|body| {
            guests_regex()
                .captures(&body.to_lowercase())
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse().ok())
        })
}

fn primary_lines(entry: &Value) -> impl Iterator<Item = &Value> {
    entry["structuredContent"]["primaryLine"]
        .as_array()
        .into_iter()
        .flatten()
}

fn leading_count(part: &str) -> Option<(u32, &str)> {
    let caps = count_regex().captures(part)?;
    let count = caps.get(1)?.as_str().parse().ok()?;
    let unit = caps.get(2)?.as_str();
    Some((count, unit))
}

fn count_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(\d+)\s+(\S+)").unwrap())
}

fn guests_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)\s+(?:gast|gasten|guest|guests)\b").unwrap())
}

/// Numbers sometimes arrive as strings.
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn observed() -> ObservedIn<'static> {
        ObservedIn {
            municipality: "Schagen",
            combination: ScanCombination::new(NaiveDate::from_ymd_opt(2025, 12, 1).unwrap(), 3, 2),
            measured_at: Utc::now(),
        }
    }

    fn full_entry() -> Value {
        json!({
            "room_id": "12345",
            "title": "Cottage in Petten",
            "category": "Entire cottage",
            "price": {"unit": {"amount": 129.0, "qualifier": "night"}},
            "rating": {"value": 4.87, "reviewCount": "61"},
            "coordinates": {"latitude": 52.7671, "longitud": 4.6601},
            "personCapacity": 4,
            "structuredContent": {
                "primaryLine": [
                    {"type": "BEDINFO", "body": "2 slaapkamers"},
                    {"type": "BEDINFO", "body": "2 bedden"},
                    {"type": "BEDINFO", "body": "1 slaapbank"}
                ]
            }
        })
    }

    #[test]
    fn test_parse_full_entry() {
        let record = parse_airbnb_entry(&full_entry(), &observed()).unwrap();
        assert_eq!(record.listing_id, "12345");
        assert_eq!(record.source, Source::Airbnb);
        assert_eq!(record.title.as_deref(), Some("Cottage in Petten"));
        assert_eq!(record.room_type.as_deref(), Some("entire_cottage"));
        assert_eq!(record.property_type.as_deref(), Some("Entire home"));
        assert_eq!(record.price, Some(129.0));
        assert_eq!(record.rating, Some(4.87));
        assert_eq!(record.review_count, Some(61));
        assert_eq!(record.coordinates, Some(Coordinates::new(52.7671, 4.6601)));
        assert_eq!(record.bedrooms, Some(2));
        assert_eq!(record.beds, Some(3));
        assert_eq!(record.max_guests, Some(4));
        assert_eq!(record.url.as_deref(), Some("https://www.airbnb.nl/rooms/12345"));
        assert_eq!(record.municipality, "Schagen");
    }

    #[test]
    fn test_entry_without_id_is_skipped() {
        let mut entry = full_entry();
        entry["room_id"] = Value::Null;
        assert!(parse_airbnb_entry(&entry, &observed()).is_none());
    }

    #[test]
    fn test_numeric_id_falls_back_to_id_field() {
        let entry = json!({"id": 987654321u64, "title": "Kamer"});
        let record = parse_airbnb_entry(&entry, &observed()).unwrap();
        assert_eq!(record.listing_id, "987654321");
        assert_eq!(record.coordinates, None);
        assert_eq!(record.price, None);
    }

    #[test]
    fn test_coordinates_accept_both_spellings() {
        let entry = json!({"coordinates": {"latitude": "52.1", "longitude": 4.5}});
        assert_eq!(extract_coordinates(&entry), Some(Coordinates::new(52.1, 4.5)));
        let missing = json!({"coordinates": {"latitude": 52.1}});
        assert_eq!(extract_coordinates(&missing), None);
    }

    #[test]
    fn test_guest_capacity_from_text() {
        let entry = json!({
            "structuredContent": {"primaryLine": [{"type": "GUESTS", "body": "6 gasten"}]}
        });
        assert_eq!(extract_guest_capacity(&entry), Some(6));
    }

    #[test]
    fn test_english_bed_info_on_one_line() {
        let entry = json!({
            "structuredContent": {"primaryLine": [{"type": "BEDINFO", "body": "1 bedroom · 2 beds"}]}
        });
        assert_eq!(extract_beds_info(&entry), (Some(1), Some(2)));
    }
}
