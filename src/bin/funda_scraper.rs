use anyhow::{Context, Result};
use bnbscan::api_client::{ApiClient, RetryPolicy, SearchOptions, SearchRequest, ThreadSleeper, Viewport};
use bnbscan::availability::dataset_stats;
use bnbscan::boundary::BoundaryIndex;
use bnbscan::dedup::dedupe;
use bnbscan::export;
use bnbscan::funda::{FundaApi, FundaSettings, ListingKind};
use bnbscan::logging::init_logging;
use bnbscan::models::ScanCombination;
use bnbscan::spatial::filter_within;
use chrono::Utc;
use clap::Parser;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Funda.nl Property Scraper")]
struct Args {
    /// Municipality to scrape (repeatable)
    #[clap(short, long = "municipality", required = true)]
    municipalities: Vec<String>,

    /// Scrape rentals instead of properties for sale
    #[clap(long)]
    rent: bool,

    /// Maximum number of search result pages per municipality
    #[clap(short = 'p', long, default_value = "5")]
    max_pages: usize,

    /// Seconds between page requests
    #[clap(long, default_value = "1.0")]
    delay: f64,

    /// GeoJSON boundaries; when given, listings outside the municipality are dropped
    #[clap(short, long)]
    boundaries: Option<PathBuf>,

    /// Property holding the municipality name in the boundary file
    #[clap(long, default_value = "naam")]
    name_property: String,

    /// Directory that receives the run folder
    #[clap(short, long, default_value = "outputs")]
    output: PathBuf,

    /// Enable debug output
    #[clap(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let settings = FundaSettings {
        listing_kind: if args.rent { ListingKind::Huur } else { ListingKind::Koop },
        max_pages: args.max_pages,
        request_delay: args.delay.max(0.0),
        ..FundaSettings::default()
    };
    let boundaries = match &args.boundaries {
        Some(path) => Some(BoundaryIndex::from_geojson_file(path, &args.name_property)?),
        None => None,
    };

    let started = Utc::now();
    // stays do not apply to Funda; the combination only records the measurement date
    let combination = ScanCombination::new(started.date_naive(), 0, 0);
    let api = FundaApi::new(settings.clone()).context("Failed to build HTTP client")?;
    let client = ApiClient::with_sleeper(Arc::new(api), Arc::new(ThreadSleeper), RetryPolicy::default());

    let mut records = Vec::new();
    for municipality in &args.municipalities {
        info!("Starting scrape for {}", municipality);
        let boundary = match &boundaries {
            Some(index) => Some(index.get(municipality)?),
            None => None,
        };
        let request = SearchRequest {
            municipality: municipality.trim().to_string(),
            combination,
            viewport: boundary.and_then(|b| b.viewport()).unwrap_or_default(),
            options: SearchOptions::default(),
            measured_at: started,
        };

        let batch = match client.call(&request) {
            Ok(batch) => batch,
            Err(e) => {
                error!("Scrape of {} failed: {}", municipality, e);
                continue;
            }
        };
        let unique = dedupe(batch.records);
        let found = unique.len();
        let kept = match boundary {
            Some(boundary) => filter_within(unique, boundary).retained,
            None => unique,
        };
        info!("{}: {} listings found, {} kept", municipality, found, kept.len());
        records.extend(kept);
    }

    let run_dir = export::create_run_dir(&args.output, &args.municipalities, started)?;
    export::write_config_json(
        &json!({
            "source": "funda",
            "municipalities": args.municipalities,
            "measured_at": started,
            "boundaries": args.boundaries,
            "funda": settings,
        }),
        &run_dir,
    )?;
    export::write_records_csv(&records, &run_dir.join("listings.csv"))?;

    let stats = dataset_stats(&records);
    println!("\n=== Summary ===");
    println!("Total properties: {}", stats.unique_listings);
    for (property_type, count) in &stats.per_type {
        println!("  • {}: {}", property_type, count);
    }
    println!("Saved to: {}", run_dir.display());

    Ok(())
}
