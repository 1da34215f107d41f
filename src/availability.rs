use crate::models::ListingRecord;
use chrono::{Duration, NaiveDate};
use std::collections::{BTreeMap, BTreeSet, HashSet};

const UNKNOWN_TYPE: &str = "Unknown";

#[derive(Debug, Clone, PartialEq)]
pub struct ListingAvailability {
    pub listing_id: String,
    pub title: Option<String>,
    pub property_type: Option<String>,
    pub municipality: String,
    pub days_available: usize,
    pub total_days: usize,
    /// Percentage, one decimal.
    pub availability_rate: f64,
}

impl ListingAvailability {
    pub fn to_csv_record(&self) -> Vec<String> {
        vec![
            self.listing_id.clone(),
            self.title.clone().unwrap_or_default(),
            self.property_type.clone().unwrap_or_default(),
            self.municipality.clone(),
            self.days_available.to_string(),
            self.total_days.to_string(),
            format!("{:.1}", self.availability_rate),
        ]
    }
}

pub const AVAILABILITY_CSV_HEADER: [&str; 7] = [
    "listing_id",
    "listing_title",
    "property_type",
    "municipality",
    "days_available",
    "total_days",
    "availability_rate",
];

/// Nights of a stay: check-in day up to, not including, check-out.
fn stay_days(record: &ListingRecord) -> impl Iterator<Item = NaiveDate> + '_ {
    (0..record.combination.nights).map(move |offset| record.combination.date + Duration::days(i64::from(offset)))
}

/// Days within `[start, end]` on which each listing was seen available.
/// Sorted by days available (most first), then listing id.
pub fn per_listing<'a>(
    records: impl IntoIterator<Item = &'a ListingRecord>,
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<ListingAvailability> {
    let total_days = usize::try_from((end - start).num_days() + 1).unwrap_or(0);
    let mut days: BTreeMap<&str, (&ListingRecord, BTreeSet<NaiveDate>)> = BTreeMap::new();

    for record in records {
        let entry = days
            .entry(record.listing_id.as_str())
            .or_insert_with(|| (record, BTreeSet::new()));
        entry
            .1
            .extend(stay_days(record).filter(|day| (start..=end).contains(day)));
    }

    let mut rows: Vec<ListingAvailability> = days
        .into_values()
        .map(|(first, available)| {
            let rate = if total_days > 0 {
                (available.len() as f64 / total_days as f64 * 1000.0).round() / 10.0
            } else {
                0.0
            };
            ListingAvailability {
                listing_id: first.listing_id.clone(),
                title: first.title.clone(),
                property_type: first.property_type.clone(),
                municipality: first.municipality.clone(),
                days_available: available.len(),
                total_days,
                availability_rate: rate,
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.days_available
            .cmp(&a.days_available)
            .then_with(|| a.listing_id.cmp(&b.listing_id))
    });
    rows
}

/// Per day, the number of distinct listings available for each property type.
pub fn timeline<'a>(
    records: impl IntoIterator<Item = &'a ListingRecord>,
) -> BTreeMap<NaiveDate, BTreeMap<String, usize>> {
    let mut seen: BTreeMap<NaiveDate, BTreeMap<String, HashSet<&str>>> = BTreeMap::new();

    for record in records {
        let property_type = record.property_type.as_deref().unwrap_or(UNKNOWN_TYPE);
        for day in stay_days(record) {
            seen.entry(day)
                .or_default()
                .entry(property_type.to_string())
                .or_default()
                .insert(record.listing_id.as_str());
        }
    }

    seen.into_iter()
        .map(|(day, types)| {
            let counts = types.into_iter().map(|(t, ids)| (t, ids.len())).collect();
            (day, counts)
        })
        .collect()
}

/// Headline numbers for a finished run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetStats {
    pub records: usize,
    pub unique_listings: usize,
    /// Distinct listings per property type.
    pub per_type: BTreeMap<String, usize>,
    pub mean_price: Option<f64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

pub fn dataset_stats<'a>(records: impl IntoIterator<Item = &'a ListingRecord>) -> DatasetStats {
    let mut stats = DatasetStats::default();
    let mut ids = HashSet::new();
    let mut per_type: BTreeMap<String, HashSet<&str>> = BTreeMap::new();
    let mut prices = Vec::new();

    for record in records {
        stats.records += 1;
        ids.insert(record.listing_id.as_str());
        per_type
            .entry(record.property_type.clone().unwrap_or_else(|| UNKNOWN_TYPE.to_string()))
            .or_default()
            .insert(record.listing_id.as_str());
        if let Some(price) = record.price {
            prices.push(price);
        }
    }

    stats.unique_listings = ids.len();
    stats.per_type = per_type.into_iter().map(|(t, ids)| (t, ids.len())).collect();
    if !prices.is_empty() {
        stats.mean_price = Some(prices.iter().sum::<f64>() / prices.len() as f64);
        stats.min_price = prices.iter().copied().reduce(f64::min);
        stats.max_price = prices.iter().copied().reduce(f64::max);
    }
    stats
}
