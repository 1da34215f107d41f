use crate::api_client::{ListingApi, RawBatch, SearchRequest};
use crate::error::FetchError;
use crate::parser::{parse_airbnb_entry, ObservedIn};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Connection settings for the Airbnb search endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AirbnbSettings {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub proxy_url: Option<String>,
    pub timeout_secs: u64,
    /// Upper bound on result pages followed per request.
    pub max_pages: usize,
}

impl Default for AirbnbSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://www.airbnb.nl/api/v3/StaysSearch".to_string(),
            api_key: None,
            proxy_url: None,
            timeout_secs: 30,
            max_pages: 15,
        }
    }
}

pub struct AirbnbApi {
    client: Client,
    settings: AirbnbSettings,
}

impl AirbnbApi {
    pub fn new(settings: AirbnbSettings) -> Result<Self, FetchError> {
        let mut builder = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)));
        if let Some(proxy) = settings.proxy_url.as_deref().filter(|p| !p.is_empty()) {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }
        Ok(Self {
            client: builder.build()?,
            settings,
        })
    }

    fn fetch_page(&self, body: &Value) -> Result<Value, FetchError> {
        let mut request = self.client.post(&self.settings.endpoint).json(body);
        if let Some(key) = &self.settings.api_key {
            request = request.header("X-Airbnb-API-Key", key);
        }
        let response = request.send()?;
        let status = response.status();
        let text = response.text()?;
        if !status.is_success() {
            return Err(FetchError::from_status(status.as_u16(), &text));
        }
        serde_json::from_str(&text).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

impl ListingApi for AirbnbApi {
    fn name(&self) -> &str {
        "airbnb"
    }

    fn fetch(&self, request: &SearchRequest) -> Result<RawBatch, FetchError> {
        let observed = ObservedIn {
            municipality: &request.municipality,
            combination: request.combination,
            measured_at: request.measured_at,
        };
        let mut batch = RawBatch::default();
        let mut cursor: Option<String> = None;

        for page in 0..self.settings.max_pages.max(1) {
            let response = self.fetch_page(&search_body(request, cursor.as_deref()))?;
            let page_batch = parse_search_response(&response, &observed)?;
            debug!(
                "Airbnb page {} for {} {}: {} listings",
                page + 1,
                request.municipality,
                request.combination,
                page_batch.records.len()
            );
            let empty = page_batch.records.is_empty() && page_batch.skipped == 0;
            batch.records.extend(page_batch.records);
            batch.skipped += page_batch.skipped;

            cursor = next_cursor(&response);
            if empty || cursor.is_none() {
                break;
            }
        }
        Ok(batch)
    }
}

fn filter(name: &str, values: Vec<String>) -> Value {
    json!({ "filterName": name, "filterValues": values })
}

/// Request body for one result page.
pub fn search_body(request: &SearchRequest, cursor: Option<&str>) -> Value {
    let c = &request.combination;
    let v = &request.viewport;
    let o = &request.options;

    let mut params = vec![
        filter("checkin", vec![c.date.to_string()]),
        filter("checkout", vec![c.check_out().to_string()]),
        filter("adults", vec![c.guests.to_string()]),
        filter("neLat", vec![v.ne_lat.to_string()]),
        filter("neLng", vec![v.ne_lon.to_string()]),
        filter("swLat", vec![v.sw_lat.to_string()]),
        filter("swLng", vec![v.sw_lon.to_string()]),
        filter("zoomLevel", vec![o.zoom.to_string()]),
        filter("searchByMap", vec!["true".to_string()]),
        filter("itemsPerGrid", vec!["50".to_string()]),
    ];
    if o.price_min > 0 {
        params.push(filter("priceMin", vec![o.price_min.to_string()]));
    }
    if o.price_max > 0 {
        params.push(filter("priceMax", vec![o.price_max.to_string()]));
    }
    if !o.amenities.is_empty() {
        params.push(filter(
            "amenities",
            o.amenities.iter().map(u32::to_string).collect(),
        ));
    }

    json!({
        "operationName": "StaysSearch",
        "variables": {
            "staysSearchRequest": {
                "cursor": cursor,
                "rawParams": params,
                "requestedPageType": "STAYS_SEARCH",
                "metadataOnly": false,
                "searchType": "user_map_move",
            },
            "currency": o.currency,
            "locale": o.language,
        }
    })
}

/// The result array: the GraphQL path, a bare array, or a top-level `results`.
pub fn search_results(response: &Value) -> Option<&Vec<Value>> {
    response
        .pointer("/data/presentation/staysSearch/results/searchResults")
        .and_then(Value::as_array)
        .or_else(|| response.as_array())
        .or_else(|| response["results"].as_array())
}

pub fn next_cursor(response: &Value) -> Option<String> {
    response
        .pointer("/data/presentation/staysSearch/results/paginationInfo/nextPageCursor")
        .and_then(Value::as_str)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

/// Parse one response page. Entries without an id are counted, not returned.
pub fn parse_search_response(response: &Value, observed: &ObservedIn<'_>) -> Result<RawBatch, FetchError> {
    let results = search_results(response)
        .ok_or_else(|| FetchError::Decode("response carries no search results".to_string()))?;

    let mut batch = RawBatch::default();
    for entry in results {
        // GraphQL results wrap the listing
        let listing = if entry["listing"].is_object() {
            merge_listing(entry)
        } else {
            entry.clone()
        };
        match parse_airbnb_entry(&listing, observed) {
            Some(record) => batch.records.push(record),
            None => batch.skipped += 1,
        }
    }
    Ok(batch)
}

/// Flatten `{listing: {...}, pricingQuote: {...}}` into one object.
fn merge_listing(entry: &Value) -> Value {
    let mut merged = entry["listing"].clone();
    if let (Some(target), Some(outer)) = (merged.as_object_mut(), entry.as_object()) {
        for (key, value) in outer {
            if key != "listing" {
                target.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
    }
    merged
}
