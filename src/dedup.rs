use crate::models::ListingRecord;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Collapse records to one per `listing_id`, keeping the most complete one.
///
/// Ties are settled by a canonical ordering of the records, so the result does
/// not depend on input order. The output is sorted by `listing_id`.
pub fn dedupe(records: impl IntoIterator<Item = ListingRecord>) -> Vec<ListingRecord> {
    let mut best: BTreeMap<String, ListingRecord> = BTreeMap::new();

    for record in records {
        match best.get_mut(&record.listing_id) {
            Some(kept) => {
                if prefer(&record, kept) == Ordering::Greater {
                    *kept = record;
                }
            }
            None => {
                best.insert(record.listing_id.clone(), record);
            }
        }
    }

    best.into_values().collect()
}

/// `Greater` when `a` should replace `b`.
fn prefer(a: &ListingRecord, b: &ListingRecord) -> Ordering {
    a.completeness()
        .cmp(&b.completeness())
        .then_with(|| canonical(b).cmp(&canonical(a)))
}

/// Total order over record contents; the smaller form wins a tie.
fn canonical(record: &ListingRecord) -> String {
    serde_json::to_string(record).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Coordinates, ScanCombination, Source};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn record(id: &str) -> ListingRecord {
        ListingRecord::bare(
            id,
            Source::Airbnb,
            "Schagen",
            ScanCombination::new(NaiveDate::from_ymd_opt(2025, 12, 1).unwrap(), 1, 1),
            Utc.with_ymd_and_hms(2025, 11, 20, 9, 0, 0).unwrap(),
        )
    }

    fn sample() -> Vec<ListingRecord> {
        let mut a_full = record("a");
        a_full.title = Some("Strandhuis".to_string());
        a_full.coordinates = Some(Coordinates::new(52.78, 4.80));
        a_full.price = Some(140.0);

        let mut a_partial = record("a");
        a_partial.title = Some("Strandhuis".to_string());

        let mut b_one = record("b");
        b_one.price = Some(80.0);
        let mut b_two = record("b");
        b_two.price = Some(85.0);

        vec![a_partial, record("c"), b_one, a_full, record("a"), b_two, record("c")]
    }

    #[test]
    fn test_keeps_one_record_per_listing() {
        let unique = dedupe(sample());
        let ids: Vec<_> = unique.iter().map(|r| r.listing_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_prefers_most_complete_record() {
        let unique = dedupe(sample());
        assert_eq!(unique[0].completeness(), 3);
        assert_eq!(unique[0].price, Some(140.0));
    }

    #[test]
    fn test_idempotent() {
        let once = dedupe(sample());
        let twice = dedupe(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_independent_of_input_order() {
        let forward = dedupe(sample());
        let mut reversed_input = sample();
        reversed_input.reverse();
        assert_eq!(dedupe(reversed_input), forward);

        let mut rotated = sample();
        rotated.rotate_left(3);
        assert_eq!(dedupe(rotated), forward);
    }

    #[test]
    fn test_equal_completeness_tie_is_stable() {
        // b has two records with one field each; the same one wins either way round
        let unique = dedupe(sample());
        let b = unique.iter().find(|r| r.listing_id == "b").unwrap();
        let mut swapped = sample();
        swapped.swap(2, 5);
        let b_swapped = dedupe(swapped).into_iter().find(|r| r.listing_id == "b").unwrap();
        assert_eq!(b.price, b_swapped.price);
    }

    #[test]
    fn test_empty_input() {
        assert!(dedupe(Vec::new()).is_empty());
    }
}
