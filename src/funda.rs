use crate::api_client::{ListingApi, RawBatch, SearchRequest};
use crate::error::FetchError;
use crate::models::{Coordinates, ListingRecord, Source};
use crate::parser::ObservedIn;
use regex::Regex;
use reqwest::blocking::Client;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

const BASE_URL: &str = "https://www.funda.nl";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingKind {
    Koop,
    Huur,
}

impl ListingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingKind::Koop => "koop",
            ListingKind::Huur => "huur",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FundaSettings {
    pub listing_kind: ListingKind,
    pub max_pages: usize,
    /// Pause between page requests, in seconds.
    pub request_delay: f64,
    pub timeout_secs: u64,
}

impl Default for FundaSettings {
    fn default() -> Self {
        Self {
            listing_kind: ListingKind::Koop,
            max_pages: 5,
            request_delay: 1.0,
            timeout_secs: 15,
        }
    }
}

/// Funda search and detail pages. Stay parameters of a request are ignored;
/// only the municipality and the measurement context are used.
pub struct FundaApi {
    client: Client,
    settings: FundaSettings,
}

impl FundaApi {
    pub fn new(settings: FundaSettings) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .build()?;
        Ok(Self { client, settings })
    }

    fn get(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send()?;
        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(FetchError::from_status(status.as_u16(), &body));
        }
        Ok(body)
    }

    fn pause(&self) {
        if self.settings.request_delay > 0.0 {
            thread::sleep(Duration::from_secs_f64(self.settings.request_delay));
        }
    }

    fn gather_detail_urls(&self, city: &str) -> Result<Vec<String>, FetchError> {
        let mut urls: Vec<String> = Vec::new();

        for page in 1..=self.settings.max_pages.max(1) {
            let page_url = search_url(city, self.settings.listing_kind, page);
            debug!("Fetching Funda search page: {}", page_url);

            let body = match self.get(&page_url) {
                Ok(body) => body,
                // the first page decides whether the search works at all
                Err(e) if page == 1 => return Err(e),
                Err(e) => {
                    warn!("Funda search page {} for {} failed: {}", page, city, e);
                    break;
                }
            };

            let before = urls.len();
            for url in extract_detail_urls(&body) {
                // featured listings repeat on every page
                if !urls.contains(&url) {
                    urls.push(url);
                }
            }
            if urls.len() == before {
                debug!("No new listings on page {}, stopping", page);
                break;
            }
            self.pause();
        }

        debug!("Found {} Funda detail URLs for {}", urls.len(), city);
        Ok(urls)
    }
}

impl ListingApi for FundaApi {
    fn name(&self) -> &str {
        "funda"
    }

    fn fetch(&self, request: &SearchRequest) -> Result<RawBatch, FetchError> {
        let observed = ObservedIn {
            municipality: &request.municipality,
            combination: request.combination,
            measured_at: request.measured_at,
        };
        let mut batch = RawBatch::default();

        for url in self.gather_detail_urls(&request.municipality)? {
            match self.get(&url) {
                Ok(body) => match parse_detail_page(&body, &url, &observed) {
                    Some(record) => batch.records.push(record),
                    None => {
                        debug!("Skipping property with no data: {}", url);
                        batch.skipped += 1;
                    }
                },
                Err(e) if e.is_rate_limit() => return Err(e),
                Err(e) => {
                    warn!("Error scraping property {}: {}", url, e);
                    batch.skipped += 1;
                }
            }
            self.pause();
        }
        Ok(batch)
    }
}

pub fn search_url(city: &str, kind: ListingKind, page: usize) -> String {
    let area = format!("[\"{}\"]", city.trim().to_lowercase());
    let mut url = format!(
        "{}/zoeken/{}?selected_area={}",
        BASE_URL,
        kind.as_str(),
        urlencoding::encode(&area)
    );
    if page > 1 {
        url.push_str(&format!("&search_result={}", page));
    }
    url
}

fn detail_path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:https?://www\.funda\.nl)?/detail/(?:koop|huur)/[^/]+/[^/]+/(\d+)/?$")
            .expect("valid detail url regex")
    })
}

/// Listing id from a detail URL.
pub fn listing_id_from_url(url: &str) -> Option<String> {
    detail_path_regex()
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Absolute detail URLs on a search page, in page order, without repeats.
pub fn extract_detail_urls(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(link_selector) = Selector::parse("a[href*='/detail/']") else {
        return Vec::new();
    };

    let mut urls = Vec::new();
    for element in document.select(&link_selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let href = href.split(['?', '#']).next().unwrap_or(href);
        if !detail_path_regex().is_match(href) {
            continue;
        }
        let full_url = if href.starts_with("http") {
            href.to_string()
        } else {
            format!("{}{}", BASE_URL, href)
        };
        if !urls.contains(&full_url) {
            urls.push(full_url);
        }
    }
    urls
}

/// The first JSON-LD object on the page that names a listing.
fn json_ld(document: &Html) -> Option<Value> {
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;
    document
        .select(&selector)
        .filter_map(|script| serde_json::from_str::<Value>(&script.text().collect::<String>()).ok())
        .flat_map(|value| match value {
            Value::Array(items) => items,
            Value::Object(ref map) if map.contains_key("@graph") => {
                map["@graph"].as_array().cloned().unwrap_or_default()
            }
            other => vec![other],
        })
        .find(|item| item["name"].is_string() || item["offers"].is_object())
}

/// Dutch formatted amount: `.` groups thousands, `,` marks decimals.
fn amount(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(['.', ' '], "").replace(',', ".").parse().ok(),
        _ => None,
    }
}

fn degrees(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Largest `€ 1.234.567` style amount above 1000 in the page text.
fn price_from_text(text: &str) -> Option<f64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"€\s*([\d.]+)").expect("valid price regex"));
    re.captures_iter(text)
        .filter_map(|c| c[1].replace('.', "").parse::<f64>().ok())
        .filter(|p| *p > 1000.0)
        .max_by(f64::total_cmp)
}

fn schema_type(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(types) => types
            .iter()
            .filter_map(Value::as_str)
            .find(|t| *t != "Product")
            .map(str::to_string),
        _ => None,
    }
}

fn bedrooms_from_text(text: &str) -> Option<u32> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)(\d+)\s*slaapkamers?").expect("valid bedroom regex")
    });
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

/// Build a record from a detail page. Pages with neither a name nor a price
/// yield `None`.
pub fn parse_detail_page(html: &str, url: &str, observed: &ObservedIn<'_>) -> Option<ListingRecord> {
    let listing_id = listing_id_from_url(url)?;
    let document = Html::parse_document(html);
    let data = json_ld(&document).unwrap_or(Value::Null);

    let title = data["name"]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| {
            let h1 = Selector::parse("h1").ok()?;
            let text = document.select(&h1).next()?.text().collect::<Vec<_>>().join(" ");
            let text = text.trim();
            (!text.is_empty()).then(|| text.to_string())
        });
    let body_text = document.root_element().text().collect::<Vec<_>>().join(" ");
    let price = amount(&data["offers"]["price"])
        .filter(|p| *p > 0.0)
        .or_else(|| price_from_text(&body_text));
    if title.is_none() && price.is_none() {
        return None;
    }

    let geo = if data["geo"].is_object() {
        &data["geo"]
    } else {
        &data["address"]["geo"]
    };
    let coordinates = match (degrees(&geo["latitude"]), degrees(&geo["longitude"])) {
        (Some(lat), Some(lon)) => Some(Coordinates::new(lat, lon)),
        _ => None,
    };

    Some(ListingRecord {
        title,
        price,
        property_type: schema_type(&data["@type"]),
        coordinates,
        bedrooms: bedrooms_from_text(&body_text),
        url: Some(url.to_string()),
        ..ListingRecord::bare(
            listing_id,
            Source::Funda,
            observed.municipality,
            observed.combination,
            observed.measured_at,
        )
    })
}
