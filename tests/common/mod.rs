#![allow(dead_code)]

use bnbscan::api_client::{ApiClient, ListingApi, RawBatch, RetryPolicy, SearchRequest, Sleeper};
use bnbscan::boundary::BoundaryIndex;
use bnbscan::error::FetchError;
use bnbscan::models::{task_key, Coordinates, ListingRecord, Source};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const BOUNDARIES: &str = r#"{
    "type": "FeatureCollection",
    "features": [
        {"type": "Feature", "properties": {"naam": "Schagen"},
         "geometry": {"type": "Polygon", "coordinates": [[[4.6, 52.7], [4.9, 52.7], [4.9, 52.9], [4.6, 52.9], [4.6, 52.7]]]}},
        {"type": "Feature", "properties": {"naam": "Schagenbrug"},
         "geometry": {"type": "Polygon", "coordinates": [[[5.0, 53.0], [5.1, 53.0], [5.1, 53.1], [5.0, 53.1], [5.0, 53.0]]]}}
    ]
}"#;

pub fn boundaries() -> BoundaryIndex {
    BoundaryIndex::from_geojson_str(BOUNDARIES, "naam").unwrap()
}

pub struct NoSleep;

impl Sleeper for NoSleep {
    fn sleep(&self, _duration: Duration) {}
}

/// Ids 0..60 lie inside Schagen, 60..65 far outside, 65..70 have no location.
pub fn synthetic_listing(id: usize, request: &SearchRequest) -> ListingRecord {
    let mut record = ListingRecord::bare(
        format!("{:03}", id),
        Source::Airbnb,
        request.municipality.clone(),
        request.combination,
        request.measured_at,
    );
    record.title = Some(format!("Listing {}", id));
    record.price = Some(50.0 + id as f64);
    record.coordinates = match id {
        0..=59 => Some(Coordinates::new(
            52.75 + (id % 8) as f64 * 0.015625,
            4.6875 + (id % 4) as f64 * 0.0625,
        )),
        60..=64 => Some(Coordinates::new(50.75, 5.75)),
        _ => None,
    };
    record
}

/// Three overlapping batches per scan, handed out in turn:
/// ids 0..30, then 20..50, then 40..70.
#[derive(Default)]
pub struct OverlappingApi {
    calls_per_task: Mutex<HashMap<String, usize>>,
    calls: AtomicUsize,
}

impl OverlappingApi {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Distinct scans that reached the upstream.
    pub fn tasks_seen(&self) -> usize {
        self.calls_per_task.lock().unwrap().len()
    }
}

impl ListingApi for OverlappingApi {
    fn name(&self) -> &str {
        "overlapping"
    }

    fn fetch(&self, request: &SearchRequest) -> Result<RawBatch, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let turn = {
            let mut counts = self.calls_per_task.lock().unwrap();
            let count = counts
                .entry(task_key(&request.municipality, &request.combination))
                .or_insert(0);
            *count += 1;
            (*count - 1) % 3
        };
        let start = turn * 20;
        Ok(RawBatch {
            records: (start..start + 30).map(|id| synthetic_listing(id, request)).collect(),
            skipped: 0,
        })
    }
}

pub fn client(api: Arc<dyn ListingApi>) -> ApiClient {
    ApiClient::with_sleeper(api, Arc::new(NoSleep), RetryPolicy::default())
}
