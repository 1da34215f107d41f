use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a listing was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Airbnb,
    Funda,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Airbnb => "airbnb",
            Source::Funda => "funda",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Finite and inside the WGS84 value ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// One logical query: check in on `date`, stay `nights`, for `guests` people.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScanCombination {
    pub date: NaiveDate,
    pub nights: u32,
    pub guests: u32,
}

impl ScanCombination {
    pub fn new(date: NaiveDate, nights: u32, guests: u32) -> Self {
        Self { date, nights, guests }
    }

    pub fn check_out(&self) -> NaiveDate {
        self.date + Duration::days(i64::from(self.nights))
    }

    /// Stable textual key, e.g. `2025-12-01/3n/2g`.
    pub fn key(&self) -> String {
        format!("{}/{}n/{}g", self.date.format("%Y-%m-%d"), self.nights, self.guests)
    }
}

impl fmt::Display for ScanCombination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}→{} ({}n, {}g)",
            self.date,
            self.check_out(),
            self.nights,
            self.guests
        )
    }
}

/// Municipality names are compared trimmed and lowercased, never by substring.
pub fn normalize_municipality(name: &str) -> String {
    name.trim().to_lowercase()
}

/// A combination scheduled for one municipality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScanTask {
    pub municipality: String,
    pub combination: ScanCombination,
}

impl ScanTask {
    pub fn new(municipality: impl Into<String>, combination: ScanCombination) -> Self {
        Self {
            municipality: municipality.into(),
            combination,
        }
    }

    pub fn key(&self) -> String {
        task_key(&self.municipality, &self.combination)
    }
}

pub fn task_key(municipality: &str, combination: &ScanCombination) -> String {
    format!("{}|{}", normalize_municipality(municipality), combination.key())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub listing_id: String,
    pub source: Source,
    pub municipality: String,
    pub title: Option<String>,
    /// Type as detected from the upstream entry, e.g. `private_room`.
    pub room_type: Option<String>,
    /// Standardised category, e.g. `Entire home`.
    pub property_type: Option<String>,
    pub price: Option<f64>,
    pub coordinates: Option<Coordinates>,
    pub rating: Option<f64>,
    pub review_count: Option<u32>,
    pub bedrooms: Option<u32>,
    pub beds: Option<u32>,
    pub max_guests: Option<u32>,
    pub url: Option<String>,
    pub combination: ScanCombination,
    pub measured_at: DateTime<Utc>,
}

impl ListingRecord {
    /// A record with only the identifying fields set.
    pub fn bare(
        listing_id: impl Into<String>,
        source: Source,
        municipality: impl Into<String>,
        combination: ScanCombination,
        measured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            listing_id: listing_id.into(),
            source,
            municipality: municipality.into(),
            title: None,
            room_type: None,
            property_type: None,
            price: None,
            coordinates: None,
            rating: None,
            review_count: None,
            bedrooms: None,
            beds: None,
            max_guests: None,
            url: None,
            combination,
            measured_at,
        }
    }

    /// Number of populated optional fields.
    pub fn completeness(&self) -> usize {
        [
            self.title.is_some(),
            self.room_type.is_some(),
            self.property_type.is_some(),
            self.price.is_some(),
            self.coordinates.is_some(),
            self.rating.is_some(),
            self.review_count.is_some(),
            self.bedrooms.is_some(),
            self.beds.is_some(),
            self.max_guests.is_some(),
            self.url.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }

    pub fn to_csv_record(&self) -> Vec<String> {
        fn opt<T: ToString>(value: &Option<T>) -> String {
            value.as_ref().map(ToString::to_string).unwrap_or_default()
        }

        vec![
            self.municipality.clone(),
            self.source.to_string(),
            self.listing_id.clone(),
            opt(&self.url),
            opt(&self.title),
            opt(&self.room_type),
            opt(&self.property_type),
            opt(&self.bedrooms),
            opt(&self.beds),
            opt(&self.max_guests),
            opt(&self.price),
            opt(&self.rating),
            opt(&self.review_count),
            opt(&self.coordinates.map(|c| c.lat)),
            opt(&self.coordinates.map(|c| c.lon)),
            self.combination.date.to_string(),
            self.combination.check_out().to_string(),
            self.combination.nights.to_string(),
            self.combination.guests.to_string(),
            self.measured_at.to_rfc3339(),
        ]
    }
}

pub const CSV_HEADER: [&str; 20] = [
    "municipality",
    "source",
    "listing_id",
    "listing_url",
    "listing_title",
    "room_type",
    "property_type",
    "bedrooms",
    "beds",
    "max_guests",
    "price",
    "rating",
    "reviews_count",
    "latitude",
    "longitude",
    "scan_checkin",
    "scan_checkout",
    "scan_nights",
    "scan_guests",
    "measurement_date",
];

#[cfg(test)]
mod tests {
    use super::*;

    fn combo() -> ScanCombination {
        ScanCombination::new(NaiveDate::from_ymd_opt(2025, 12, 30).unwrap(), 3, 2)
    }

    #[test]
    fn test_check_out_crosses_year() {
        assert_eq!(combo().check_out(), NaiveDate::from_ymd_opt(2026, 1, 2).unwrap());
    }

    #[test]
    fn test_task_key_normalizes_municipality() {
        assert_eq!(task_key("  Schagen ", &combo()), "schagen|2025-12-30/3n/2g");
        assert_eq!(task_key("SCHAGEN", &combo()), task_key("schagen", &combo()));
    }

    #[test]
    fn test_completeness_counts_populated_fields() {
        let mut record = ListingRecord::bare("1", Source::Airbnb, "Schagen", combo(), Utc::now());
        assert_eq!(record.completeness(), 0);
        record.title = Some("Cosy cottage".to_string());
        record.coordinates = Some(Coordinates::new(52.78, 4.8));
        assert_eq!(record.completeness(), 2);
    }

    #[test]
    fn test_coordinates_validity() {
        assert!(Coordinates::new(52.0, 4.0).is_valid());
        assert!(!Coordinates::new(91.0, 4.0).is_valid());
        assert!(!Coordinates::new(52.0, f64::NAN).is_valid());
        assert!(!Coordinates::new(52.0, -181.0).is_valid());
    }

    #[test]
    fn test_csv_record_matches_header_width() {
        let record = ListingRecord::bare("1", Source::Funda, "Schagen", combo(), Utc::now());
        assert_eq!(record.to_csv_record().len(), CSV_HEADER.len());
    }
}
